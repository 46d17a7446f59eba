//! Wire DTOs for the portal REST API.
//!
//! DESIGN
//! ======
//! The server is backed by Postgres through a JS driver that renders
//! `bigint`/`numeric` columns as strings, so ids, counts and grades accept
//! either JSON numbers or numeric strings.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

// =============================================================================
// USERS
// =============================================================================

/// Account role. Decides which dashboard and routes a user can reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "student" => Ok(Self::Student),
            other => Err(format!("unknown role '{other}' (expected 'admin' or 'student')")),
        }
    }
}

/// The logged-in user as returned by the auth endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "deserialize_i64_lenient")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SignupRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub role: Role,
}

/// Body of a successful `/auth/login` or `/auth/signup`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Body of `/auth/me`. A missing `user` leaves the cached profile in place.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct MeResponse {
    #[serde(default)]
    pub user: Option<UserProfile>,
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(deserialize_with = "deserialize_i64_lenient")]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub deadline: OffsetDateTime,
    /// Only present on admin listings.
    #[serde(default, deserialize_with = "deserialize_opt_i64_lenient")]
    pub submission_count: Option<i64>,
}

impl Assignment {
    #[must_use]
    pub fn is_overdue(&self, now: OffsetDateTime) -> bool {
        now > self.deadline
    }
}

/// Create/update payload for an assignment.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssignmentDraft {
    pub title: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub deadline: OffsetDateTime,
}

// =============================================================================
// SUBMISSIONS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(deserialize_with = "deserialize_i64_lenient")]
    pub id: i64,
    #[serde(deserialize_with = "deserialize_i64_lenient")]
    pub assignment_id: i64,
    pub file_url: String,
    /// Score out of 100; `None` until graded.
    #[serde(default, deserialize_with = "deserialize_opt_f64_lenient")]
    pub grade: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub student_email: Option<String>,
    #[serde(default)]
    pub assignment_title: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub assignment_deadline: Option<OffsetDateTime>,
}

impl Submission {
    #[must_use]
    pub fn is_graded(&self) -> bool {
        self.grade.is_some()
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitRequest<'a> {
    #[serde(rename = "fileUrl")]
    pub file_url: &'a str,
}

#[derive(Debug, Serialize)]
pub struct GradeRequest<'a> {
    pub grade: f64,
    pub feedback: &'a str,
}

// =============================================================================
// STATS
// =============================================================================

/// Admin overview from `/stats/overview`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    #[serde(deserialize_with = "deserialize_i64_lenient")]
    pub total_assignments: i64,
    #[serde(deserialize_with = "deserialize_i64_lenient")]
    pub total_students: i64,
    #[serde(deserialize_with = "deserialize_i64_lenient")]
    pub total_submissions: i64,
    pub submissions_per_assignment: Vec<AssignmentSubmissionCount>,
    pub recent_submissions: Vec<RecentSubmission>,
}

/// Row of the overview's recent-activity list. The overview query returns a
/// narrower projection than `/submissions`, so everything but `id` is optional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecentSubmission {
    #[serde(deserialize_with = "deserialize_i64_lenient")]
    pub id: i64,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub assignment_title: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub submitted_at: Option<OffsetDateTime>,
    #[serde(default, deserialize_with = "deserialize_opt_f64_lenient")]
    pub grade: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSubmissionCount {
    #[serde(deserialize_with = "deserialize_i64_lenient")]
    pub id: i64,
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_i64_lenient")]
    pub submission_count: i64,
}

// =============================================================================
// ENVELOPES
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct AssignmentsEnvelope {
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignmentEnvelope {
    pub assignment: Assignment,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmissionsEnvelope {
    #[serde(default)]
    pub submissions: Vec<Submission>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatsEnvelope {
    #[serde(default)]
    pub stats: Stats,
}

// =============================================================================
// LENIENT NUMBERS
// =============================================================================

fn number_from_value<E: serde::de::Error>(value: &serde_json::Value) -> Result<Option<f64>, E> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(number) => number
            .as_f64()
            .map(Some)
            .ok_or_else(|| E::custom("expected finite number")),
        serde_json::Value::String(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| E::custom(format!("expected numeric string, got '{raw}'"))),
        _ => Err(E::custom("expected number or numeric string")),
    }
}

fn integer_from_value<E: serde::de::Error>(value: &serde_json::Value) -> Result<Option<i64>, E> {
    if let serde_json::Value::Number(number) = value
        && let Some(int) = number.as_i64()
    {
        return Ok(Some(int));
    }
    if let serde_json::Value::String(raw) = value
        && let Ok(int) = raw.trim().parse::<i64>()
    {
        return Ok(Some(int));
    }
    let Some(float) = number_from_value::<E>(value)? else {
        return Ok(None);
    };
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    if float.is_finite() && float.fract() == 0.0 && float >= i64::MIN as f64 && float <= i64::MAX as f64 {
        return Ok(Some(float as i64));
    }
    Err(E::custom("expected integer-compatible number"))
}

fn deserialize_i64_lenient<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    integer_from_value::<D::Error>(&value)?.ok_or_else(|| D::Error::custom("expected integer, got null"))
}

fn deserialize_opt_i64_lenient<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    integer_from_value::<D::Error>(&value)
}

fn deserialize_opt_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    number_from_value::<D::Error>(&value)
}
