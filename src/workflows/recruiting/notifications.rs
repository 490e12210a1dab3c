//! Notification contract: the engine writes typed records; delivery is an
//! external concern flipped through `email_sent`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{AnswerId, ApplicationId, ProjectId, UserId, WalletEntryId};
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SupplementRequest,
    SupplementSubmitted,
    ReviewComplete,
    SelectionResult,
    VerificationSupplementRequest,
    VerificationCompleted,
    VerificationReset,
    ProjectUpdate,
    DeadlineReminder,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SupplementRequest => "supplement_request",
            Self::SupplementSubmitted => "supplement_submitted",
            Self::ReviewComplete => "review_complete",
            Self::SelectionResult => "selection_result",
            Self::VerificationSupplementRequest => "verification_supplement_request",
            Self::VerificationCompleted => "verification_completed",
            Self::VerificationReset => "verification_reset",
            Self::ProjectUpdate => "project_update",
            Self::DeadlineReminder => "deadline_reminder",
        }
    }
}

/// User-scoped event record with optional links into the domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<AnswerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_entry: Option<WalletEntryId>,
    pub read: bool,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user,
            kind,
            title: title.into(),
            body: body.into(),
            application: None,
            project: None,
            answer: None,
            wallet_entry: None,
            read: false,
            email_sent: false,
            created_at: at,
        }
    }

    pub fn about_application(mut self, id: ApplicationId) -> Self {
        self.application = Some(id);
        self
    }

    pub fn about_project(mut self, id: ProjectId) -> Self {
        self.project = Some(id);
        self
    }

    pub fn about_answer(mut self, id: AnswerId) -> Self {
        self.answer = Some(id);
        self
    }

    pub fn about_wallet_entry(mut self, id: WalletEntryId) -> Self {
        self.wallet_entry = Some(id);
        self
    }
}

/// Outbound notification hook in the style of an alert publisher.
///
/// A failing sink must never fail the originating operation; callers log the
/// error and move on, leaving `email_sent = false` on the stored record.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: Notification) -> Result<(), CoreError>;
}

/// Deliver through the sink, degrading failures to a warning.
pub fn deliver_best_effort<S: NotificationSink + ?Sized>(sink: &S, notification: Notification) {
    let kind = notification.kind.label();
    if let Err(err) = sink.deliver(notification) {
        tracing::warn!(kind, error = %err, "notification delivery failed");
    }
}
