//! Storage abstraction for applications so services and the verification
//! engine can be exercised in isolation.

use super::super::domain::{AnswerId, ApplicationId, ProjectId, UserId};
use super::domain::{Application, ApplicationAnswer, ApplicationStatus};
use crate::error::CoreError;

pub trait ApplicationRepository: Send + Sync {
    /// Insert honoring the (project, user) uniqueness constraint; a
    /// duplicate is a `Conflict`.
    fn insert_application(&self, application: Application) -> Result<Application, CoreError>;
    fn update_application(&self, application: Application) -> Result<(), CoreError>;
    fn fetch_application(&self, id: &ApplicationId) -> Result<Option<Application>, CoreError>;
    fn find_application(
        &self,
        project: &ProjectId,
        applicant: &UserId,
    ) -> Result<Option<Application>, CoreError>;
    fn applications_for_project(
        &self,
        project: &ProjectId,
    ) -> Result<Vec<Application>, CoreError>;

    /// Resolve an answer to its owning application.
    fn fetch_answer(
        &self,
        id: &AnswerId,
    ) -> Result<Option<(Application, ApplicationAnswer)>, CoreError>;
    /// Answers awaiting verification across all applications.
    fn pending_answers(&self) -> Result<Vec<(Application, ApplicationAnswer)>, CoreError>;
}

/// Statuses the project-wide scoring sweep recomputes.
pub const SCORABLE_STATUSES: &[ApplicationStatus] = &[
    ApplicationStatus::Submitted,
    ApplicationStatus::Reviewing,
    ApplicationStatus::Completed,
];
