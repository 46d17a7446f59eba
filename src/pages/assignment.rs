//! Single-assignment views: the detail page and the admin submissions list.

#[cfg(test)]
#[path = "assignment_test.rs"]
mod assignment_test;

use crate::net::api;
use crate::net::error::ApiError;
use crate::net::http::ApiClient;
use crate::net::types::{Assignment, Role, Submission, UserProfile};
use crate::pages::dashboard::find_submission;

#[derive(Clone, Debug, PartialEq)]
pub struct AssignmentDetail {
    pub assignment: Assignment,
    /// The viewing student's own submission. Always `None` for admins.
    pub submission: Option<Submission>,
}

/// Load one assignment and, for students, their submission to it.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] for an unknown id, or any other request error.
pub async fn load_assignment_detail(
    client: &ApiClient,
    user: &UserProfile,
    assignment_id: i64,
) -> Result<AssignmentDetail, ApiError> {
    if user.role != Role::Student {
        let assignment = api::fetch_assignment(client, assignment_id).await?;
        return Ok(AssignmentDetail { assignment, submission: None });
    }

    let (assignment, mine) =
        tokio::try_join!(api::fetch_assignment(client, assignment_id), api::fetch_my_submissions(client))?;
    let submission = find_submission(&mine, assignment_id).cloned();
    Ok(AssignmentDetail { assignment, submission })
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionsList {
    pub assignment: Assignment,
    pub submissions: Vec<Submission>,
}

impl SubmissionsList {
    #[must_use]
    pub fn ungraded(&self) -> usize {
        self.submissions.iter().filter(|s| !s.is_graded()).count()
    }
}

/// Load every submission to an assignment. Admin only.
///
/// # Errors
///
/// Returns the first [`ApiError`] from either request.
pub async fn load_submissions_list(client: &ApiClient, assignment_id: i64) -> Result<SubmissionsList, ApiError> {
    let (submissions, assignment) = tokio::try_join!(
        api::fetch_submissions(client, assignment_id),
        api::fetch_assignment(client, assignment_id)
    )?;
    Ok(SubmissionsList { assignment, submissions })
}
