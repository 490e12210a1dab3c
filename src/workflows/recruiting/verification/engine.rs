//! N-of-M verification over wallet entries and application answers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use super::super::applications::{
    can_document_transition, Application, ApplicationRepository, DocumentStatus,
};
use super::super::domain::{Principal, RecordId, Role, UserId, WalletEntryId};
use super::super::notifications::{
    deliver_best_effort, Notification, NotificationKind, NotificationSink,
};
use super::super::settings::SettingsProvider;
use super::super::wallet::{WalletEntry, WalletRepository};
use super::domain::{
    valid_count, PendingTarget, VerificationRecord, VerificationStore, VerificationTarget,
};
use crate::error::CoreError;

static NEXT_RECORD: AtomicU64 = AtomicU64::new(1);
static NEXT_WALLET_ENTRY: AtomicU64 = AtomicU64::new(1);

fn next_record_id() -> RecordId {
    RecordId::new(format!("rec-{:06}", NEXT_RECORD.fetch_add(1, Ordering::Relaxed)))
}

fn next_wallet_entry_id() -> WalletEntryId {
    WalletEntryId::new(format!(
        "wal-{:06}",
        NEXT_WALLET_ENTRY.fetch_add(1, Ordering::Relaxed)
    ))
}

/// Result of a confirmation, reported back to the caller for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmOutcome {
    pub record: RecordId,
    pub valid_count: u32,
    pub required_count: u32,
    pub promoted: bool,
}

/// The verification engine. All state changes on a target happen under one
/// lock so concurrent confirmations of the same target cannot interleave
/// their read-modify-write sequences.
pub struct VerificationEngine<S, N, C> {
    store: Arc<S>,
    notifications: Arc<N>,
    settings: Arc<C>,
    guard: Mutex<()>,
}

impl<S, N, C> VerificationEngine<S, N, C>
where
    S: VerificationStore + WalletRepository + ApplicationRepository,
    N: NotificationSink,
    C: SettingsProvider,
{
    pub fn new(store: Arc<S>, notifications: Arc<N>, settings: Arc<C>) -> Self {
        Self {
            store,
            notifications,
            settings,
            guard: Mutex::new(()),
        }
    }

    /// Record one verifier's confirmation; promotes the target once the
    /// configured count is reached.
    pub fn confirm(
        &self,
        principal: &Principal,
        target: &VerificationTarget,
    ) -> Result<ConfirmOutcome, CoreError> {
        principal.require_any(&[Role::Verifier, Role::ProjectManager])?;
        let _held = self.lock()?;
        let required = self.required_count()?;
        let now = Utc::now();

        self.require_confirmable(target)?;

        let existing = self.store.find_record(target, &principal.user_id)?;
        if existing.as_ref().is_some_and(|record| record.is_valid) {
            return Err(CoreError::PreconditionFailed(format!(
                "verifier {} already confirmed {target}",
                principal.user_id
            )));
        }

        // Only this verifier's record changes under the lock, so the
        // post-write count is known up front. A confirm that would promote
        // an answer past a blocked transition is rejected before any record
        // is written, so a failed confirm leaves no trace.
        let count = valid_count(self.store.as_ref(), target)? + 1;
        let promoted = count >= required;
        if promoted {
            if let VerificationTarget::Answer(id) = target {
                let (_, answer) = self.answer(id)?;
                let status = match answer.document_status {
                    DocumentStatus::Pending | DocumentStatus::Supplemented => {
                        DocumentStatus::InReview
                    }
                    other => other,
                };
                if !can_document_transition(status, DocumentStatus::Approved) {
                    return Err(CoreError::PreconditionFailed(format!(
                        "answer {id} cannot be approved from {}",
                        answer.document_status.label()
                    )));
                }
            }
        }

        let record = match existing {
            Some(mut record) => {
                // A cancelled confirmation comes back with a fresh timestamp.
                record.is_valid = true;
                record.confirmed_at = now;
                self.store.update_record(record.clone())?;
                record
            }
            None => self.store.insert_record(VerificationRecord {
                id: next_record_id(),
                target: target.clone(),
                verifier: principal.user_id.clone(),
                confirmed_at: now,
                is_valid: true,
            })?,
        };
        match target {
            VerificationTarget::Wallet(id) => {
                if promoted {
                    let mut entry = self.wallet_entry(id)?;
                    entry.globally_verified = true;
                    entry.globally_verified_at = Some(now);
                    entry.rejection_reason = None;
                    entry.updated_at = now;
                    self.store.update_entry(entry.clone())?;
                    self.notify_promoted_wallet(&entry, now);
                }
            }
            VerificationTarget::Answer(id) => {
                let (mut application, answer) = self.answer(id)?;
                let mut status = answer.document_status;
                if status == DocumentStatus::Pending || status == DocumentStatus::Supplemented {
                    status = DocumentStatus::InReview;
                }
                if promoted {
                    // Checked against the transition table above.
                    status = DocumentStatus::Approved;
                }
                {
                    let slot = application
                        .answer_mut(id)
                        .ok_or_else(|| CoreError::Internal(format!("answer {id} detached")))?;
                    slot.document_status = status;
                    if promoted {
                        slot.reviewed_at = Some(now);
                    }
                }
                if promoted {
                    self.reflect_into_wallet(&mut application, id, now)?;
                }
                application.updated_at = now;
                self.store.update_application(application.clone())?;
                if promoted {
                    self.notify_promoted_answer(&application, id, now);
                }
            }
        }

        tracing::info!(
            target = %target,
            verifier = %principal.user_id,
            valid = count,
            required,
            promoted,
            "verification confirmed"
        );
        Ok(ConfirmOutcome {
            record: record.id,
            valid_count: count,
            required_count: required,
            promoted,
        })
    }

    /// Withdraw a confirmation. Only the original verifier or a super-admin
    /// may cancel, and only while the record is still valid.
    pub fn cancel(&self, principal: &Principal, record: &RecordId) -> Result<(), CoreError> {
        let _held = self.lock()?;
        let mut stored = self
            .store
            .fetch_record(record)?
            .ok_or_else(|| CoreError::not_found(format!("verification record {record}")))?;
        if stored.verifier != principal.user_id && !principal.is_super_admin() {
            return Err(CoreError::PermissionDenied(
                "only the original verifier may cancel a confirmation".to_string(),
            ));
        }
        if !stored.is_valid {
            return Err(CoreError::PreconditionFailed(format!(
                "verification record {record} is already invalid"
            )));
        }

        stored.is_valid = false;
        self.store.update_record(stored.clone())?;

        // A wallet entry that drops below the threshold loses its flag. An
        // approved answer stays approved; demotion there goes through reset
        // or the supplement flow.
        if let VerificationTarget::Wallet(id) = &stored.target {
            let count = valid_count(self.store.as_ref(), &stored.target)?;
            let required = self.required_count()?;
            let mut entry = self.wallet_entry(id)?;
            if entry.globally_verified && count < required {
                entry.globally_verified = false;
                entry.globally_verified_at = None;
                entry.updated_at = Utc::now();
                self.store.update_entry(entry)?;
            }
        }

        tracing::info!(target = %stored.target, verifier = %stored.verifier, "confirmation cancelled");
        Ok(())
    }

    /// Clear a wallet entry back to unverified, invalidating every record.
    pub fn reset(
        &self,
        principal: &Principal,
        wallet: &WalletEntryId,
        reason: &str,
    ) -> Result<(), CoreError> {
        principal.require_any(&[Role::ProjectManager])?;
        let _held = self.lock()?;
        let mut entry = self.wallet_entry(wallet)?;
        let target = VerificationTarget::Wallet(wallet.clone());
        let cleared = self.store.invalidate_all(&target)?;

        let now = Utc::now();
        entry.globally_verified = false;
        entry.globally_verified_at = None;
        entry.updated_at = now;
        self.store.update_entry(entry.clone())?;

        tracing::info!(target = %target, cleared, "wallet verification reset");
        deliver_best_effort(
            self.notifications.as_ref(),
            Notification::new(
                entry.user.clone(),
                NotificationKind::VerificationReset,
                "Verification reset",
                format!("Verification of a wallet entry was reset: {reason}"),
                now,
            )
            .about_wallet_entry(wallet.clone()),
        );
        Ok(())
    }

    /// Ask the owner for better evidence. Wallet targets are knocked back to
    /// unverified; answer targets enter the supplement window.
    pub fn request_supplement(
        &self,
        principal: &Principal,
        target: &VerificationTarget,
        reason: &str,
    ) -> Result<(), CoreError> {
        principal.require_any(&[Role::Verifier, Role::ProjectManager])?;
        let _held = self.lock()?;
        let now = Utc::now();
        match target {
            VerificationTarget::Wallet(id) => {
                let mut entry = self.wallet_entry(id)?;
                if entry.globally_verified {
                    return Err(CoreError::PreconditionFailed(format!(
                        "wallet entry {id} is globally verified; reset it first"
                    )));
                }
                self.store.invalidate_all(target)?;
                entry.rejection_reason = Some(reason.to_string());
                entry.updated_at = now;
                self.store.update_entry(entry.clone())?;
                deliver_best_effort(
                    self.notifications.as_ref(),
                    Notification::new(
                        entry.user.clone(),
                        NotificationKind::VerificationSupplementRequest,
                        "Supplement requested for a wallet entry",
                        reason,
                        now,
                    )
                    .about_wallet_entry(id.clone()),
                );
            }
            VerificationTarget::Answer(id) => {
                let (mut application, answer) = self.answer(id)?;
                if !can_document_transition(
                    answer.document_status,
                    DocumentStatus::SupplementRequested,
                ) {
                    return Err(CoreError::PreconditionFailed(format!(
                        "answer {id} cannot enter supplement from {}",
                        answer.document_status.label()
                    )));
                }
                let window = self.settings.current()?.supplement_window_days;
                {
                    let slot = application
                        .answer_mut(id)
                        .ok_or_else(|| CoreError::Internal(format!("answer {id} detached")))?;
                    slot.document_status = DocumentStatus::SupplementRequested;
                    slot.supplement_requested_at = Some(now);
                    slot.supplement_deadline = Some(now + Duration::days(window));
                }
                application.updated_at = now;
                self.store.update_application(application.clone())?;
                deliver_best_effort(
                    self.notifications.as_ref(),
                    Notification::new(
                        application.applicant.clone(),
                        NotificationKind::SupplementRequest,
                        "Supplement requested for an application answer",
                        reason,
                        now,
                    )
                    .about_application(application.id.clone())
                    .about_answer(id.clone()),
                );
            }
        }
        tracing::info!(target = %target, "supplement requested");
        Ok(())
    }

    /// Everything still collecting confirmations, annotated for the
    /// verifier's work queue.
    pub fn list_pending(&self, principal: &Principal) -> Result<Vec<PendingTarget>, CoreError> {
        principal.require_any(&[Role::Verifier, Role::ProjectManager])?;
        let required = self.required_count()?;
        let mut pending = Vec::new();
        for entry in self.store.unverified_entries()? {
            let target = VerificationTarget::Wallet(entry.id.clone());
            pending.push(self.annotate(target, entry.user, required, principal)?);
        }
        for (application, answer) in self.store.pending_answers()? {
            if answer.document_status.is_terminal() {
                continue;
            }
            let target = VerificationTarget::Answer(answer.id.clone());
            pending.push(self.annotate(target, application.applicant, required, principal)?);
        }
        Ok(pending)
    }

    fn annotate(
        &self,
        target: VerificationTarget,
        owner: UserId,
        required: u32,
        principal: &Principal,
    ) -> Result<PendingTarget, CoreError> {
        let count = valid_count(self.store.as_ref(), &target)?;
        let confirmed = self
            .store
            .find_record(&target, &principal.user_id)?
            .is_some_and(|record| record.is_valid);
        Ok(PendingTarget {
            target,
            owner,
            valid_count: count,
            required_count: required,
            principal_confirmed: confirmed,
        })
    }

    /// Push an approved answer's evidence into the coach's wallet so the
    /// next application starts pre-verified. At most one entry per
    /// (user, catalog item) ever exists.
    fn reflect_into_wallet(
        &self,
        application: &mut Application,
        answer_id: &super::super::domain::AnswerId,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let (value, file, linked, catalog_item) = {
            let answer = application
                .answer(answer_id)
                .ok_or_else(|| CoreError::Internal(format!("answer {answer_id} detached")))?;
            (
                answer.value.clone(),
                answer.file.clone(),
                answer.linked_wallet_entry.clone(),
                answer.catalog_item.clone(),
            )
        };

        let entry_id = if let Some(id) = linked {
            let mut entry = self.wallet_entry(&id)?;
            entry.value = value;
            entry.file = file;
            entry.globally_verified = true;
            entry.globally_verified_at = Some(now);
            entry.rejection_reason = None;
            entry.updated_at = now;
            self.store.update_entry(entry)?;
            id
        } else if let Some(mut entry) = self
            .store
            .find_entry(&application.applicant, &catalog_item)?
        {
            entry.value = value;
            entry.file = file;
            entry.globally_verified = true;
            entry.globally_verified_at = Some(now);
            entry.rejection_reason = None;
            entry.updated_at = now;
            let id = entry.id.clone();
            self.store.update_entry(entry)?;
            id
        } else {
            let mut entry = WalletEntry::new(
                next_wallet_entry_id(),
                application.applicant.clone(),
                catalog_item,
                value,
                now,
            );
            entry.file = file;
            entry.globally_verified = true;
            entry.globally_verified_at = Some(now);
            self.store.insert_entry(entry)?.id
        };

        let slot = application
            .answer_mut(answer_id)
            .ok_or_else(|| CoreError::Internal(format!("answer {answer_id} detached")))?;
        slot.linked_wallet_entry = Some(entry_id);
        Ok(())
    }

    fn require_confirmable(&self, target: &VerificationTarget) -> Result<(), CoreError> {
        match target {
            VerificationTarget::Wallet(id) => {
                let entry = self.wallet_entry(id)?;
                if entry.globally_verified {
                    return Err(CoreError::PreconditionFailed(format!(
                        "wallet entry {id} is already globally verified"
                    )));
                }
            }
            VerificationTarget::Answer(id) => {
                let (_, answer) = self.answer(id)?;
                if answer.document_status.is_terminal() {
                    return Err(CoreError::PreconditionFailed(format!(
                        "answer {id} is already {}",
                        answer.document_status.label()
                    )));
                }
            }
        }
        Ok(())
    }

    fn notify_promoted_wallet(&self, entry: &WalletEntry, now: DateTime<Utc>) {
        deliver_best_effort(
            self.notifications.as_ref(),
            Notification::new(
                entry.user.clone(),
                NotificationKind::VerificationCompleted,
                "Wallet entry verified",
                "Your evidence has been verified and will carry into future applications.",
                now,
            )
            .about_wallet_entry(entry.id.clone()),
        );
    }

    fn notify_promoted_answer(
        &self,
        application: &Application,
        answer: &super::super::domain::AnswerId,
        now: DateTime<Utc>,
    ) {
        deliver_best_effort(
            self.notifications.as_ref(),
            Notification::new(
                application.applicant.clone(),
                NotificationKind::VerificationCompleted,
                "Application answer verified",
                "An answer on your application has been approved.",
                now,
            )
            .about_application(application.id.clone())
            .about_answer(answer.clone()),
        );
    }

    fn wallet_entry(&self, id: &WalletEntryId) -> Result<WalletEntry, CoreError> {
        self.store
            .fetch_entry(id)?
            .ok_or_else(|| CoreError::not_found(format!("wallet entry {id}")))
    }

    fn answer(
        &self,
        id: &super::super::domain::AnswerId,
    ) -> Result<(Application, super::super::applications::ApplicationAnswer), CoreError> {
        self.store
            .fetch_answer(id)?
            .ok_or_else(|| CoreError::not_found(format!("answer {id}")))
    }

    fn required_count(&self) -> Result<u32, CoreError> {
        Ok(self.settings.current()?.required_verifier_count)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, CoreError> {
        self.guard
            .lock()
            .map_err(|_| CoreError::Internal("verification lock poisoned".to_string()))
    }
}
