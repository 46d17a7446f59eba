//! Typed helpers for the portal's domain endpoints.
//!
//! ERROR HANDLING
//! ==============
//! Inputs the server would reject anyway (blank titles, non-http file URLs,
//! grades outside 0..=100) fail locally with [`ApiError::Validation`] before
//! any request is sent.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use serde_json::Value;

use super::error::ApiError;
use super::http::ApiClient;
use super::types::{
    Assignment, AssignmentDraft, AssignmentEnvelope, AssignmentsEnvelope, GradeRequest, Stats, StatsEnvelope,
    Submission, SubmissionsEnvelope, SubmitRequest,
};

pub const MAX_GRADE: f64 = 100.0;

fn assignment_endpoint(assignment_id: i64) -> String {
    format!("/assignments/{assignment_id}")
}

fn submit_endpoint(assignment_id: i64) -> String {
    format!("/submit/{assignment_id}")
}

fn submissions_endpoint(assignment_id: i64) -> String {
    format!("/submissions/{assignment_id}")
}

fn grade_endpoint(submission_id: i64) -> String {
    format!("/grade/{submission_id}")
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

/// `GET /assignments`.
///
/// # Errors
///
/// Returns any [`ApiError`] from the request.
pub async fn list_assignments(client: &ApiClient) -> Result<Vec<Assignment>, ApiError> {
    let body: AssignmentsEnvelope = client.get("/assignments").await?;
    Ok(body.assignments)
}

/// `GET /assignments/:id`.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] for an unknown id, or any other request error.
pub async fn fetch_assignment(client: &ApiClient, assignment_id: i64) -> Result<Assignment, ApiError> {
    let body: AssignmentEnvelope = client.get(&assignment_endpoint(assignment_id)).await?;
    Ok(body.assignment)
}

/// `POST /assignments`. Admin only.
///
/// # Errors
///
/// Returns [`ApiError::Validation`] for a blank title/description, or any request error.
pub async fn create_assignment(client: &ApiClient, draft: &AssignmentDraft) -> Result<(), ApiError> {
    validate_draft(draft)?;
    let _: Value = client.post("/assignments", draft).await?;
    Ok(())
}

/// `PUT /assignments/:id`. Admin only.
///
/// # Errors
///
/// Returns [`ApiError::Validation`] for a blank title/description, or any request error.
pub async fn update_assignment(client: &ApiClient, assignment_id: i64, draft: &AssignmentDraft) -> Result<(), ApiError> {
    validate_draft(draft)?;
    let _: Value = client.put(&assignment_endpoint(assignment_id), draft).await?;
    Ok(())
}

/// `DELETE /assignments/:id`. Admin only.
///
/// # Errors
///
/// Returns any [`ApiError`] from the request.
pub async fn delete_assignment(client: &ApiClient, assignment_id: i64) -> Result<(), ApiError> {
    let _: Value = client.delete(&assignment_endpoint(assignment_id)).await?;
    Ok(())
}

fn validate_draft(draft: &AssignmentDraft) -> Result<(), ApiError> {
    if draft.title.trim().is_empty() {
        return Err(ApiError::invalid_input("title is required"));
    }
    if draft.description.trim().is_empty() {
        return Err(ApiError::invalid_input("description is required"));
    }
    Ok(())
}

// =============================================================================
// SUBMISSIONS
// =============================================================================

/// `GET /my-submissions`. The logged-in student's own submissions.
///
/// # Errors
///
/// Returns any [`ApiError`] from the request.
pub async fn fetch_my_submissions(client: &ApiClient) -> Result<Vec<Submission>, ApiError> {
    let body: SubmissionsEnvelope = client.get("/my-submissions").await?;
    Ok(body.submissions)
}

/// `POST /submit/:id {fileUrl}`.
///
/// # Errors
///
/// Returns [`ApiError::Validation`] unless `file_url` is an http(s) URL, or any request error.
pub async fn submit_assignment(client: &ApiClient, assignment_id: i64, file_url: &str) -> Result<(), ApiError> {
    let file_url = validate_file_url(file_url)?;
    let _: Value = client
        .post(&submit_endpoint(assignment_id), &SubmitRequest { file_url })
        .await?;
    Ok(())
}

/// `GET /submissions/:assignmentId`. Admin only.
///
/// # Errors
///
/// Returns any [`ApiError`] from the request.
pub async fn fetch_submissions(client: &ApiClient, assignment_id: i64) -> Result<Vec<Submission>, ApiError> {
    let body: SubmissionsEnvelope = client.get(&submissions_endpoint(assignment_id)).await?;
    Ok(body.submissions)
}

/// `PATCH /grade/:submissionId {grade, feedback}`. Admin only.
///
/// # Errors
///
/// Returns [`ApiError::Validation`] for a grade outside `0..=100`, or any request error.
pub async fn grade_submission(client: &ApiClient, submission_id: i64, grade: f64, feedback: &str) -> Result<(), ApiError> {
    validate_grade(grade)?;
    let _: Value = client
        .patch(&grade_endpoint(submission_id), &GradeRequest { grade, feedback: feedback.trim() })
        .await?;
    Ok(())
}

fn validate_file_url(raw: &str) -> Result<&str, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid_input("file URL is required"));
    }
    match reqwest::Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(trimmed),
        _ => Err(ApiError::invalid_input(format!("file URL must be an http(s) URL: {trimmed}"))),
    }
}

fn validate_grade(grade: f64) -> Result<(), ApiError> {
    if grade.is_finite() && (0.0..=MAX_GRADE).contains(&grade) {
        Ok(())
    } else {
        Err(ApiError::invalid_input(format!("grade must be between 0 and {MAX_GRADE}")))
    }
}

// =============================================================================
// STATS
// =============================================================================

/// `GET /stats/overview`. Admin only.
///
/// # Errors
///
/// Returns any [`ApiError`] from the request.
pub async fn fetch_stats(client: &ApiClient) -> Result<Stats, ApiError> {
    let body: StatsEnvelope = client.get("/stats/overview").await?;
    Ok(body.stats)
}
