//! Process-local store backing the binary wiring and the integration tests.
//!
//! One mutex over the whole dataset: every repository call is a single
//! critical section, which also gives the verification engine the
//! serialisation it needs on same-target read-modify-write sequences.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::applications::{Application, ApplicationAnswer, ApplicationRepository};
use super::catalog::{CatalogItem, CatalogRepository, ItemFilter};
use super::catalog::templates::{TemplateRepository, UnifiedTemplate};
use super::domain::{
    AnswerId, ApplicationId, CatalogItemId, ProjectId, RecordId, TemplateId, UserId, WalletEntryId,
};
use super::notifications::{Notification, NotificationSink};
use super::projects::{CustomQuestion, Project, ProjectRepository};
use super::selection::{EvaluationRepository, ReviewerEvaluation};
use super::users::{User, UserRepository};
use super::verification::{VerificationRecord, VerificationStore, VerificationTarget};
use super::wallet::{WalletEntry, WalletRepository};
use crate::error::CoreError;

#[derive(Debug, Default)]
struct Dataset {
    users: HashMap<UserId, User>,
    templates: HashMap<TemplateId, UnifiedTemplate>,
    items: HashMap<CatalogItemId, CatalogItem>,
    projects: HashMap<ProjectId, Project>,
    questions: Vec<CustomQuestion>,
    applications: HashMap<ApplicationId, Application>,
    wallet: HashMap<WalletEntryId, WalletEntry>,
    records: HashMap<RecordId, VerificationRecord>,
    evaluations: Vec<ReviewerEvaluation>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Dataset>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Dataset>, CoreError> {
        self.data
            .lock()
            .map_err(|_| CoreError::Internal("memory store lock poisoned".to_string()))
    }
}

impl UserRepository for MemoryStore {
    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, CoreError> {
        Ok(self.lock()?.users.get(id).cloned())
    }

    fn insert_user(&self, user: User) -> Result<User, CoreError> {
        let mut data = self.lock()?;
        if data.users.contains_key(&user.id) {
            return Err(CoreError::Conflict(format!("user {} exists", user.id)));
        }
        data.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }
}

impl TemplateRepository for MemoryStore {
    fn insert_template(&self, template: UnifiedTemplate) -> Result<UnifiedTemplate, CoreError> {
        let mut data = self.lock()?;
        if data.templates.contains_key(&template.id) {
            return Err(CoreError::Conflict(format!(
                "template {} exists",
                template.id
            )));
        }
        data.templates.insert(template.id.clone(), template.clone());
        Ok(template)
    }

    fn update_template(&self, template: UnifiedTemplate) -> Result<(), CoreError> {
        let mut data = self.lock()?;
        if !data.templates.contains_key(&template.id) {
            return Err(CoreError::not_found(format!("template {}", template.id)));
        }
        data.templates.insert(template.id.clone(), template);
        Ok(())
    }

    fn fetch_template(&self, id: &TemplateId) -> Result<Option<UnifiedTemplate>, CoreError> {
        Ok(self.lock()?.templates.get(id).cloned())
    }

    fn list_templates(&self, active_only: bool) -> Result<Vec<UnifiedTemplate>, CoreError> {
        let data = self.lock()?;
        Ok(data
            .templates
            .values()
            .filter(|template| !active_only || template.active)
            .cloned()
            .collect())
    }
}

impl CatalogRepository for MemoryStore {
    fn insert_item(&self, item: CatalogItem) -> Result<CatalogItem, CoreError> {
        let mut data = self.lock()?;
        if data.items.contains_key(&item.id) {
            return Err(CoreError::Conflict(format!("catalog item {} exists", item.id)));
        }
        data.items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    fn update_item(&self, item: CatalogItem) -> Result<(), CoreError> {
        let mut data = self.lock()?;
        if !data.items.contains_key(&item.id) {
            return Err(CoreError::not_found(format!("catalog item {}", item.id)));
        }
        data.items.insert(item.id.clone(), item);
        Ok(())
    }

    fn fetch_item(&self, id: &CatalogItemId) -> Result<Option<CatalogItem>, CoreError> {
        Ok(self.lock()?.items.get(id).cloned())
    }

    fn list_items(&self, filter: ItemFilter) -> Result<Vec<CatalogItem>, CoreError> {
        let data = self.lock()?;
        Ok(data
            .items
            .values()
            .filter(|item| !filter.active_only || item.active)
            .filter(|item| filter.category.map_or(true, |wanted| item.category == wanted))
            .cloned()
            .collect())
    }
}

impl ProjectRepository for MemoryStore {
    fn insert_project(&self, project: Project) -> Result<Project, CoreError> {
        let mut data = self.lock()?;
        if data.projects.contains_key(&project.id) {
            return Err(CoreError::Conflict(format!("project {} exists", project.id)));
        }
        data.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    fn update_project(&self, project: Project) -> Result<(), CoreError> {
        let mut data = self.lock()?;
        if !data.projects.contains_key(&project.id) {
            return Err(CoreError::not_found(format!("project {}", project.id)));
        }
        data.projects.insert(project.id.clone(), project);
        Ok(())
    }

    fn fetch_project(&self, id: &ProjectId) -> Result<Option<Project>, CoreError> {
        Ok(self.lock()?.projects.get(id).cloned())
    }

    fn list_projects(&self) -> Result<Vec<Project>, CoreError> {
        Ok(self.lock()?.projects.values().cloned().collect())
    }

    fn insert_question(&self, question: CustomQuestion) -> Result<CustomQuestion, CoreError> {
        let mut data = self.lock()?;
        if data.questions.iter().any(|stored| stored.id == question.id) {
            return Err(CoreError::Conflict(format!("question {} exists", question.id)));
        }
        data.questions.push(question.clone());
        Ok(question)
    }

    fn questions_for(&self, project: &ProjectId) -> Result<Vec<CustomQuestion>, CoreError> {
        let data = self.lock()?;
        Ok(data
            .questions
            .iter()
            .filter(|question| &question.project == project)
            .cloned()
            .collect())
    }
}

impl ApplicationRepository for MemoryStore {
    fn insert_application(&self, application: Application) -> Result<Application, CoreError> {
        let mut data = self.lock()?;
        let duplicate = data.applications.values().any(|stored| {
            stored.project == application.project && stored.applicant == application.applicant
        });
        if duplicate || data.applications.contains_key(&application.id) {
            return Err(CoreError::Conflict(format!(
                "user {} already applied to project {}",
                application.applicant, application.project
            )));
        }
        data.applications
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn update_application(&self, application: Application) -> Result<(), CoreError> {
        let mut data = self.lock()?;
        if !data.applications.contains_key(&application.id) {
            return Err(CoreError::not_found(format!(
                "application {}",
                application.id
            )));
        }
        data.applications.insert(application.id.clone(), application);
        Ok(())
    }

    fn fetch_application(&self, id: &ApplicationId) -> Result<Option<Application>, CoreError> {
        Ok(self.lock()?.applications.get(id).cloned())
    }

    fn find_application(
        &self,
        project: &ProjectId,
        applicant: &UserId,
    ) -> Result<Option<Application>, CoreError> {
        let data = self.lock()?;
        Ok(data
            .applications
            .values()
            .find(|stored| &stored.project == project && &stored.applicant == applicant)
            .cloned())
    }

    fn applications_for_project(
        &self,
        project: &ProjectId,
    ) -> Result<Vec<Application>, CoreError> {
        let data = self.lock()?;
        let mut applications: Vec<Application> = data
            .applications
            .values()
            .filter(|stored| &stored.project == project)
            .cloned()
            .collect();
        applications.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(applications)
    }

    fn fetch_answer(
        &self,
        id: &AnswerId,
    ) -> Result<Option<(Application, ApplicationAnswer)>, CoreError> {
        let data = self.lock()?;
        for application in data.applications.values() {
            if let Some(answer) = application.answer(id) {
                return Ok(Some((application.clone(), answer.clone())));
            }
        }
        Ok(None)
    }

    fn pending_answers(&self) -> Result<Vec<(Application, ApplicationAnswer)>, CoreError> {
        let data = self.lock()?;
        let mut pending = Vec::new();
        for application in data.applications.values() {
            for answer in &application.answers {
                if !answer.document_status.is_terminal() {
                    pending.push((application.clone(), answer.clone()));
                }
            }
        }
        pending.sort_by(|a, b| a.1.id.cmp(&b.1.id));
        Ok(pending)
    }
}

impl WalletRepository for MemoryStore {
    fn insert_entry(&self, entry: WalletEntry) -> Result<WalletEntry, CoreError> {
        let mut data = self.lock()?;
        let duplicate = data
            .wallet
            .values()
            .any(|stored| stored.user == entry.user && stored.catalog_item == entry.catalog_item);
        if duplicate || data.wallet.contains_key(&entry.id) {
            return Err(CoreError::Conflict(format!(
                "wallet entry for ({}, {}) exists",
                entry.user, entry.catalog_item
            )));
        }
        data.wallet.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    fn update_entry(&self, entry: WalletEntry) -> Result<(), CoreError> {
        let mut data = self.lock()?;
        if !data.wallet.contains_key(&entry.id) {
            return Err(CoreError::not_found(format!("wallet entry {}", entry.id)));
        }
        data.wallet.insert(entry.id.clone(), entry);
        Ok(())
    }

    fn fetch_entry(&self, id: &WalletEntryId) -> Result<Option<WalletEntry>, CoreError> {
        Ok(self.lock()?.wallet.get(id).cloned())
    }

    fn find_entry(
        &self,
        user: &UserId,
        catalog_item: &CatalogItemId,
    ) -> Result<Option<WalletEntry>, CoreError> {
        let data = self.lock()?;
        Ok(data
            .wallet
            .values()
            .find(|stored| &stored.user == user && &stored.catalog_item == catalog_item)
            .cloned())
    }

    fn entries_for_user(&self, user: &UserId) -> Result<Vec<WalletEntry>, CoreError> {
        let data = self.lock()?;
        let mut entries: Vec<WalletEntry> = data
            .wallet
            .values()
            .filter(|stored| &stored.user == user)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    fn unverified_entries(&self) -> Result<Vec<WalletEntry>, CoreError> {
        let data = self.lock()?;
        let mut entries: Vec<WalletEntry> = data
            .wallet
            .values()
            .filter(|stored| !stored.globally_verified)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }
}

impl VerificationStore for MemoryStore {
    fn insert_record(&self, record: VerificationRecord) -> Result<VerificationRecord, CoreError> {
        let mut data = self.lock()?;
        let duplicate = data
            .records
            .values()
            .any(|stored| stored.target == record.target && stored.verifier == record.verifier);
        if duplicate || data.records.contains_key(&record.id) {
            return Err(CoreError::Conflict(format!(
                "verification record for ({}, {}) exists",
                record.target, record.verifier
            )));
        }
        data.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_record(&self, record: VerificationRecord) -> Result<(), CoreError> {
        let mut data = self.lock()?;
        if !data.records.contains_key(&record.id) {
            return Err(CoreError::not_found(format!(
                "verification record {}",
                record.id
            )));
        }
        data.records.insert(record.id.clone(), record);
        Ok(())
    }

    fn fetch_record(&self, id: &RecordId) -> Result<Option<VerificationRecord>, CoreError> {
        Ok(self.lock()?.records.get(id).cloned())
    }

    fn find_record(
        &self,
        target: &VerificationTarget,
        verifier: &UserId,
    ) -> Result<Option<VerificationRecord>, CoreError> {
        let data = self.lock()?;
        Ok(data
            .records
            .values()
            .find(|stored| &stored.target == target && &stored.verifier == verifier)
            .cloned())
    }

    fn records_for(
        &self,
        target: &VerificationTarget,
    ) -> Result<Vec<VerificationRecord>, CoreError> {
        let data = self.lock()?;
        let mut records: Vec<VerificationRecord> = data
            .records
            .values()
            .filter(|stored| &stored.target == target)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    fn invalidate_all(&self, target: &VerificationTarget) -> Result<u32, CoreError> {
        let mut data = self.lock()?;
        let mut cleared = 0;
        for record in data.records.values_mut() {
            if &record.target == target && record.is_valid {
                record.is_valid = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

impl EvaluationRepository for MemoryStore {
    fn insert_evaluation(
        &self,
        evaluation: ReviewerEvaluation,
    ) -> Result<ReviewerEvaluation, CoreError> {
        let mut data = self.lock()?;
        let duplicate = data.evaluations.iter().any(|stored| {
            stored.application == evaluation.application && stored.reviewer == evaluation.reviewer
        });
        if duplicate {
            return Err(CoreError::Conflict(format!(
                "reviewer {} already evaluated application {}",
                evaluation.reviewer, evaluation.application
            )));
        }
        data.evaluations.push(evaluation.clone());
        Ok(evaluation)
    }

    fn evaluations_for(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<ReviewerEvaluation>, CoreError> {
        let data = self.lock()?;
        Ok(data
            .evaluations
            .iter()
            .filter(|stored| &stored.application == application)
            .cloned()
            .collect())
    }
}

/// Recording sink: keeps everything it is handed, for assertions and for
/// the demo binary's log-only delivery.
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for MemorySink {
    fn deliver(&self, notification: Notification) -> Result<(), CoreError> {
        tracing::debug!(
            user = %notification.user,
            kind = notification.kind.label(),
            "notification recorded"
        );
        self.delivered
            .lock()
            .map_err(|_| CoreError::Internal("notification sink lock poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}
