//! Landing view for the logged-in user.
//!
//! Admins see the overview stats alongside every assignment. Students see
//! each assignment paired with the status of their own submission. Both
//! fetch their two resources concurrently; either failing fails the view.

#[cfg(test)]
#[path = "dashboard_test.rs"]
mod dashboard_test;

use time::OffsetDateTime;

use crate::net::api;
use crate::net::error::ApiError;
use crate::net::http::ApiClient;
use crate::net::types::{Assignment, Role, Stats, Submission, UserProfile};

/// Where a student stands on one assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionStatus {
    NotSubmitted { overdue: bool },
    Submitted,
    /// Submitted, and the assignment deadline has since passed.
    Late,
}

impl SubmissionStatus {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::NotSubmitted { overdue: false } => "not submitted",
            Self::NotSubmitted { overdue: true } => "overdue",
            Self::Submitted => "submitted",
            Self::Late => "late",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StudentRow {
    pub assignment: Assignment,
    pub submission: Option<Submission>,
    pub status: SubmissionStatus,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Dashboard {
    Admin { stats: Stats, assignments: Vec<Assignment> },
    Student { rows: Vec<StudentRow>, submissions: Vec<Submission> },
}

/// Load the dashboard matching `user`'s role.
///
/// # Errors
///
/// Returns the first [`ApiError`] from either request.
pub async fn load_dashboard(client: &ApiClient, user: &UserProfile) -> Result<Dashboard, ApiError> {
    match user.role {
        Role::Admin => {
            let (stats, assignments) = tokio::try_join!(api::fetch_stats(client), api::list_assignments(client))?;
            Ok(Dashboard::Admin { stats, assignments })
        }
        Role::Student => {
            let (assignments, submissions) =
                tokio::try_join!(api::list_assignments(client), api::fetch_my_submissions(client))?;
            let now = OffsetDateTime::now_utc();
            let rows = student_rows(assignments, &submissions, now);
            tracing::debug!(assignments = rows.len(), submissions = submissions.len(), "student dashboard loaded");
            Ok(Dashboard::Student { rows, submissions })
        }
    }
}

fn student_rows(assignments: Vec<Assignment>, submissions: &[Submission], now: OffsetDateTime) -> Vec<StudentRow> {
    assignments
        .into_iter()
        .map(|assignment| {
            let submission = find_submission(submissions, assignment.id).cloned();
            let status = submission_status(&assignment, submission.as_ref(), now);
            StudentRow { assignment, submission, status }
        })
        .collect()
}

pub(crate) fn find_submission(submissions: &[Submission], assignment_id: i64) -> Option<&Submission> {
    submissions.iter().find(|s| s.assignment_id == assignment_id)
}

/// Classify a student's standing on `assignment` at `now`.
///
/// A submission counts as late once `now` is past the deadline the server
/// reported with it, falling back to the assignment's own deadline.
#[must_use]
pub fn submission_status(assignment: &Assignment, submission: Option<&Submission>, now: OffsetDateTime) -> SubmissionStatus {
    let Some(submission) = submission else {
        return SubmissionStatus::NotSubmitted { overdue: assignment.is_overdue(now) };
    };
    let deadline = submission.assignment_deadline.unwrap_or(assignment.deadline);
    if now > deadline { SubmissionStatus::Late } else { SubmissionStatus::Submitted }
}
