//! Applications and their per-item answers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{
    AnswerId, ApplicationId, CatalogItemId, FileReference, ProjectId, QuestionId, UserId,
    WalletEntryId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    Reviewing,
    Completed,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Reviewing => "reviewing",
            Self::Completed => "completed",
        }
    }
}

const APPLICATION_TRANSITIONS: &[(ApplicationStatus, ApplicationStatus)] = &[
    (ApplicationStatus::Draft, ApplicationStatus::Submitted),
    (ApplicationStatus::Submitted, ApplicationStatus::Reviewing),
    (ApplicationStatus::Reviewing, ApplicationStatus::Completed),
];

pub fn can_transition(from: ApplicationStatus, to: ApplicationStatus) -> bool {
    APPLICATION_TRANSITIONS
        .iter()
        .any(|(lhs, rhs)| *lhs == from && *rhs == to)
}

/// Document-verification status of a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    InReview,
    Approved,
    /// Legacy terminal-non-approved state retained for old data.
    Rejected,
    SupplementRequested,
    Supplemented,
    Disqualified,
}

impl DocumentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::SupplementRequested => "supplement_requested",
            Self::Supplemented => "supplemented",
            Self::Disqualified => "disqualified",
        }
    }

    pub const fn is_terminal_approved(self) -> bool {
        matches!(self, Self::Approved)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Disqualified)
    }
}

/// Transition table for the document-status graph. Enum growth over time is
/// absorbed here rather than in branch logic.
const DOCUMENT_TRANSITIONS: &[(DocumentStatus, DocumentStatus)] = &[
    (DocumentStatus::Pending, DocumentStatus::InReview),
    (DocumentStatus::Pending, DocumentStatus::SupplementRequested),
    (DocumentStatus::InReview, DocumentStatus::Approved),
    (DocumentStatus::InReview, DocumentStatus::SupplementRequested),
    (DocumentStatus::InReview, DocumentStatus::Disqualified),
    (DocumentStatus::SupplementRequested, DocumentStatus::Supplemented),
    (DocumentStatus::Supplemented, DocumentStatus::InReview),
];

pub fn can_document_transition(from: DocumentStatus, to: DocumentStatus) -> bool {
    DOCUMENT_TRANSITIONS
        .iter()
        .any(|(lhs, rhs)| *lhs == from && *rhs == to)
}

/// Per-application submission for one catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationAnswer {
    pub id: AnswerId,
    pub application: ApplicationId,
    pub catalog_item: CatalogItemId,
    /// Raw submitted value; may itself be a JSON document.
    pub value: String,
    /// Entries of a repeatable item; empty for single-valued answers.
    pub entries: Vec<String>,
    pub file: Option<FileReference>,
    /// Pre-filled from (and promoted back into) the coach's wallet.
    pub linked_wallet_entry: Option<WalletEntryId>,
    pub document_status: DocumentStatus,
    pub item_score: Option<f64>,
    pub supplement_requested_at: Option<DateTime<Utc>>,
    pub supplement_deadline: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl ApplicationAnswer {
    pub fn new(
        id: AnswerId,
        application: ApplicationId,
        catalog_item: CatalogItemId,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id,
            application,
            catalog_item,
            value: value.into(),
            entries: Vec::new(),
            file: None,
            linked_wallet_entry: None,
            document_status: DocumentStatus::Pending,
            item_score: None,
            supplement_requested_at: None,
            supplement_deadline: None,
            reviewed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionDecision {
    Selected,
    Waitlisted,
    NotSelected,
}

/// Textual answer to a project's custom question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAnswer {
    pub question: QuestionId,
    pub value: String,
}

/// A (project, user) application; unique per project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub project: ProjectId,
    pub applicant: UserId,
    pub status: ApplicationStatus,
    pub auto_score: Option<f64>,
    pub final_score: Option<f64>,
    pub recommended: bool,
    pub selection: Option<SelectionDecision>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Set by the sweep when the recruiting window closes; all writes are
    /// rejected afterwards.
    pub is_frozen: bool,
    pub answers: Vec<ApplicationAnswer>,
    pub custom_answers: Vec<CustomAnswer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn new(id: ApplicationId, project: ProjectId, applicant: UserId, at: DateTime<Utc>) -> Self {
        Self {
            id,
            project,
            applicant,
            status: ApplicationStatus::Draft,
            auto_score: None,
            final_score: None,
            recommended: false,
            selection: None,
            submitted_at: None,
            is_frozen: false,
            answers: Vec::new(),
            custom_answers: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn answer(&self, id: &AnswerId) -> Option<&ApplicationAnswer> {
        self.answers.iter().find(|answer| &answer.id == id)
    }

    pub fn answer_mut(&mut self, id: &AnswerId) -> Option<&mut ApplicationAnswer> {
        self.answers.iter_mut().find(|answer| &answer.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_states_advance_linearly() {
        assert!(can_transition(
            ApplicationStatus::Draft,
            ApplicationStatus::Submitted
        ));
        assert!(can_transition(
            ApplicationStatus::Reviewing,
            ApplicationStatus::Completed
        ));
        assert!(!can_transition(
            ApplicationStatus::Submitted,
            ApplicationStatus::Draft
        ));
        assert!(!can_transition(
            ApplicationStatus::Draft,
            ApplicationStatus::Completed
        ));
    }

    #[test]
    fn document_graph_allows_the_supplement_loop() {
        assert!(can_document_transition(
            DocumentStatus::InReview,
            DocumentStatus::SupplementRequested
        ));
        assert!(can_document_transition(
            DocumentStatus::SupplementRequested,
            DocumentStatus::Supplemented
        ));
        assert!(can_document_transition(
            DocumentStatus::Supplemented,
            DocumentStatus::InReview
        ));
    }

    #[test]
    fn approved_and_legacy_rejected_are_terminal() {
        assert!(DocumentStatus::Approved.is_terminal());
        assert!(DocumentStatus::Approved.is_terminal_approved());
        assert!(DocumentStatus::Rejected.is_terminal());
        assert!(!DocumentStatus::Rejected.is_terminal_approved());
        assert!(!can_document_transition(
            DocumentStatus::Approved,
            DocumentStatus::InReview
        ));
        assert!(!can_document_transition(
            DocumentStatus::Rejected,
            DocumentStatus::InReview
        ));
    }
}
