//! Application lifecycle: drafting, submission, freezing, and the
//! coach-facing side of the supplement loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::super::catalog::CatalogRepository;
use super::super::domain::{
    AnswerId, ApplicationId, CatalogItemId, FileReference, Principal, ProjectId, QuestionId, Role,
    WalletEntryId,
};
use super::super::notifications::{
    deliver_best_effort, Notification, NotificationKind, NotificationSink,
};
use super::super::projects::{Project, ProjectRepository};
use super::super::scoring::{calc_auto, load_catalog};
use super::super::settings::SettingsProvider;
use super::super::users::UserRepository;
use super::super::verification::{VerificationStore, VerificationTarget};
use super::super::wallet::WalletRepository;
use super::domain::{
    can_document_transition, can_transition, Application, ApplicationStatus, CustomAnswer,
    DocumentStatus,
};
use super::repository::ApplicationRepository;
use crate::error::CoreError;

static NEXT_APPLICATION: AtomicU64 = AtomicU64::new(1);
static NEXT_ANSWER: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    ApplicationId::new(format!(
        "app-{:06}",
        NEXT_APPLICATION.fetch_add(1, Ordering::Relaxed)
    ))
}

fn next_answer_id() -> AnswerId {
    AnswerId::new(format!("ans-{:06}", NEXT_ANSWER.fetch_add(1, Ordering::Relaxed)))
}

pub struct ApplicationService<S, N, C> {
    store: Arc<S>,
    notifications: Arc<N>,
    settings: Arc<C>,
}

impl<S, N, C> ApplicationService<S, N, C>
where
    S: ApplicationRepository
        + ProjectRepository
        + CatalogRepository
        + UserRepository
        + VerificationStore
        + WalletRepository,
    N: NotificationSink,
    C: SettingsProvider,
{
    pub fn new(store: Arc<S>, notifications: Arc<N>, settings: Arc<C>) -> Self {
        Self {
            store,
            notifications,
            settings,
        }
    }

    pub fn get(&self, id: &ApplicationId) -> Result<Application, CoreError> {
        self.store
            .fetch_application(id)?
            .ok_or_else(|| CoreError::not_found(format!("application {id}")))
    }

    /// Open a draft for the calling coach. One application per
    /// (project, user); a second draft is a `Conflict`.
    pub fn start_draft(
        &self,
        principal: &Principal,
        project: &ProjectId,
    ) -> Result<Application, CoreError> {
        principal.require_any(&[Role::Coach])?;
        let project = self.project(project)?;
        if !project.accepts_applications(Utc::now()) {
            return Err(CoreError::PreconditionFailed(format!(
                "project {} is not recruiting",
                project.id
            )));
        }
        let application = Application::new(
            next_application_id(),
            project.id.clone(),
            principal.user_id.clone(),
            Utc::now(),
        );
        self.store.insert_application(application)
    }

    /// Create or replace the answer for one catalog item on a draft. A
    /// wallet entry may be linked up front so an already verified record
    /// carries into the review.
    pub fn save_answer(
        &self,
        principal: &Principal,
        id: &ApplicationId,
        catalog_item: &CatalogItemId,
        value: impl Into<String>,
        entries: Vec<String>,
        file: Option<FileReference>,
        wallet_entry: Option<WalletEntryId>,
    ) -> Result<AnswerId, CoreError> {
        let mut application = self.editable_draft(principal, id)?;
        if let Some(entry_id) = &wallet_entry {
            let entry = self
                .store
                .fetch_entry(entry_id)?
                .ok_or_else(|| CoreError::not_found(format!("wallet entry {entry_id}")))?;
            if entry.user != application.applicant {
                return Err(CoreError::PermissionDenied(format!(
                    "wallet entry {entry_id} belongs to another user"
                )));
            }
            if &entry.catalog_item != catalog_item {
                return Err(CoreError::ValidationFailed(format!(
                    "wallet entry {entry_id} answers a different catalog item"
                )));
            }
        }
        let value = value.into();
        let now = Utc::now();

        let answer_id = match application
            .answers
            .iter_mut()
            .find(|answer| &answer.catalog_item == catalog_item)
        {
            Some(answer) => {
                answer.value = value;
                answer.entries = entries;
                answer.file = file;
                answer.linked_wallet_entry = wallet_entry;
                answer.id.clone()
            }
            None => {
                let mut answer = super::domain::ApplicationAnswer::new(
                    next_answer_id(),
                    application.id.clone(),
                    catalog_item.clone(),
                    value,
                );
                answer.entries = entries;
                answer.file = file;
                answer.linked_wallet_entry = wallet_entry;
                let answer_id = answer.id.clone();
                application.answers.push(answer);
                answer_id
            }
        };

        application.updated_at = now;
        self.store.update_application(application)?;
        Ok(answer_id)
    }

    pub fn set_custom_answer(
        &self,
        principal: &Principal,
        id: &ApplicationId,
        question: &QuestionId,
        value: impl Into<String>,
    ) -> Result<(), CoreError> {
        let mut application = self.editable_draft(principal, id)?;
        let value = value.into();
        match application
            .custom_answers
            .iter_mut()
            .find(|answer| &answer.question == question)
        {
            Some(answer) => answer.value = value,
            None => application.custom_answers.push(CustomAnswer {
                question: question.clone(),
                value,
            }),
        }
        application.updated_at = Utc::now();
        self.store.update_application(application)
    }

    /// Submit a draft: required items answered, window open, answers move to
    /// `Pending`, and the auto score is computed before the status flips.
    pub fn submit(&self, principal: &Principal, id: &ApplicationId) -> Result<Application, CoreError> {
        let mut application = self.get(id)?;
        principal.require_self(&application.applicant)?;
        let now = Utc::now();

        if application.is_frozen {
            return Err(CoreError::PreconditionFailed(format!(
                "application {id} is frozen"
            )));
        }
        if !can_transition(application.status, ApplicationStatus::Submitted) {
            return Err(CoreError::PreconditionFailed(format!(
                "application {id} cannot be submitted from {}",
                application.status.label()
            )));
        }

        let project = self.project(&application.project)?;
        if !project.accepts_applications(now) {
            return Err(CoreError::PreconditionFailed(format!(
                "project {} is not recruiting",
                project.id
            )));
        }
        self.require_required_items(&project, &application)?;

        for answer in &mut application.answers {
            answer.document_status = DocumentStatus::Pending;
        }

        let user = self
            .store
            .fetch_user(&application.applicant)?
            .ok_or_else(|| CoreError::not_found(format!("user {}", application.applicant)))?;
        let questions = self.store.questions_for(&application.project)?;
        let catalog = load_catalog(self.store.as_ref(), &application)?;
        calc_auto(&mut application, &project, &catalog, &user, &questions)?;

        application.status = ApplicationStatus::Submitted;
        application.submitted_at = Some(now);
        application.updated_at = now;
        self.store.update_application(application.clone())?;

        tracing::info!(
            application = %application.id,
            project = %application.project,
            auto_score = application.auto_score,
            "application submitted"
        );
        Ok(application)
    }

    /// Freeze every application of every project whose recruiting window has
    /// closed. Returns how many applications were newly frozen.
    pub fn freeze_closed(&self, now: DateTime<Utc>) -> Result<u32, CoreError> {
        let mut frozen = 0;
        for project in self.store.list_projects()? {
            if !project.recruiting_closed(now) {
                continue;
            }
            for mut application in self.store.applications_for_project(&project.id)? {
                if application.is_frozen {
                    continue;
                }
                application.is_frozen = true;
                application.updated_at = now;
                self.store.update_application(application)?;
                frozen += 1;
            }
        }
        if frozen > 0 {
            tracing::info!(frozen, "froze applications of closed projects");
        }
        Ok(frozen)
    }

    /// Coach's side of the supplement loop: replace the answer, move it to
    /// `Supplemented`, and reset any confirmations of the old evidence.
    pub fn supplement_answer(
        &self,
        principal: &Principal,
        answer_id: &AnswerId,
        value: impl Into<String>,
        entries: Vec<String>,
        file: Option<FileReference>,
    ) -> Result<(), CoreError> {
        let (mut application, answer) = self
            .store
            .fetch_answer(answer_id)?
            .ok_or_else(|| CoreError::not_found(format!("answer {answer_id}")))?;
        principal.require_self(&application.applicant)?;

        if !can_document_transition(answer.document_status, DocumentStatus::Supplemented) {
            return Err(CoreError::PreconditionFailed(format!(
                "answer {answer_id} is not awaiting a supplement ({})",
                answer.document_status.label()
            )));
        }

        let now = Utc::now();
        {
            let slot = application
                .answer_mut(answer_id)
                .ok_or_else(|| CoreError::Internal(format!("answer {answer_id} detached")))?;
            slot.value = value.into();
            slot.entries = entries;
            slot.file = file;
            slot.document_status = DocumentStatus::Supplemented;
        }
        application.updated_at = now;

        // Old confirmations no longer vouch for the new evidence.
        let target = VerificationTarget::Answer(answer_id.clone());
        let cleared = self.store.invalidate_all(&target)?;
        self.store.update_application(application.clone())?;

        tracing::info!(answer = %answer_id, cleared, "supplement submitted");
        let project = self.project(&application.project)?;
        deliver_best_effort(
            self.notifications.as_ref(),
            Notification::new(
                project.owner.clone(),
                NotificationKind::SupplementSubmitted,
                "Supplement submitted",
                format!(
                    "Applicant {} supplemented an answer on application {}.",
                    application.applicant, application.id
                ),
                now,
            )
            .about_application(application.id.clone())
            .about_answer(answer_id.clone()),
        );
        Ok(())
    }

    /// Remind coaches whose supplement deadline falls within the next day.
    pub fn remind_deadlines(&self, now: DateTime<Utc>) -> Result<u32, CoreError> {
        let horizon = now + Duration::days(1);
        let mut reminded = 0;
        for (application, answer) in self.store.pending_answers()? {
            if answer.document_status != DocumentStatus::SupplementRequested {
                continue;
            }
            let Some(deadline) = answer.supplement_deadline else {
                continue;
            };
            if deadline <= now || deadline > horizon {
                continue;
            }
            deliver_best_effort(
                self.notifications.as_ref(),
                Notification::new(
                    application.applicant.clone(),
                    NotificationKind::DeadlineReminder,
                    "Supplement deadline approaching",
                    format!("A requested supplement is due by {deadline}."),
                    now,
                )
                .about_application(application.id.clone())
                .about_answer(answer.id.clone()),
            );
            reminded += 1;
        }
        Ok(reminded)
    }

    /// Auto-save cadence for draft editors, read live from settings.
    pub fn auto_save_interval_seconds(&self) -> Result<u64, CoreError> {
        Ok(self.settings.current()?.auto_save_interval_seconds)
    }

    fn editable_draft(
        &self,
        principal: &Principal,
        id: &ApplicationId,
    ) -> Result<Application, CoreError> {
        let application = self.get(id)?;
        principal.require_self(&application.applicant)?;
        if application.is_frozen {
            return Err(CoreError::PreconditionFailed(format!(
                "application {id} is frozen"
            )));
        }
        if application.status != ApplicationStatus::Draft {
            return Err(CoreError::PreconditionFailed(format!(
                "application {id} is {} and can only be changed through a supplement",
                application.status.label()
            )));
        }
        Ok(application)
    }

    fn require_required_items(
        &self,
        project: &Project,
        application: &Application,
    ) -> Result<(), CoreError> {
        for item in project.items.iter().filter(|item| item.required) {
            let answered = application.answers.iter().any(|answer| {
                answer.catalog_item == item.catalog_item
                    && (!answer.value.trim().is_empty()
                        || !answer.entries.is_empty()
                        || answer.file.is_some())
            });
            if !answered {
                return Err(CoreError::ValidationFailed(format!(
                    "required item {} is unanswered",
                    item.catalog_item
                )));
            }
        }
        Ok(())
    }

    fn project(&self, id: &ProjectId) -> Result<Project, CoreError> {
        self.store
            .fetch_project(id)?
            .ok_or_else(|| CoreError::not_found(format!("project {id}")))
    }
}
