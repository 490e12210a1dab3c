//! Project lifecycle operations and the repository seam behind them.

use std::sync::Arc;

use chrono::Utc;

use super::super::domain::{Principal, ProjectId, Role};
use super::super::notifications::{
    deliver_best_effort, Notification, NotificationKind, NotificationSink,
};
use super::domain::{can_transition, CustomQuestion, Project, ProjectStatus};
use crate::error::CoreError;

/// Storage abstraction for projects and their custom questions.
pub trait ProjectRepository: Send + Sync {
    fn insert_project(&self, project: Project) -> Result<Project, CoreError>;
    fn update_project(&self, project: Project) -> Result<(), CoreError>;
    fn fetch_project(&self, id: &ProjectId) -> Result<Option<Project>, CoreError>;
    fn list_projects(&self) -> Result<Vec<Project>, CoreError>;
    fn insert_question(&self, question: CustomQuestion) -> Result<CustomQuestion, CoreError>;
    fn questions_for(&self, project: &ProjectId) -> Result<Vec<CustomQuestion>, CoreError>;
}

pub struct ProjectService<R, N> {
    repository: Arc<R>,
    notifications: Arc<N>,
}

impl<R, N> ProjectService<R, N>
where
    R: ProjectRepository,
    N: NotificationSink,
{
    pub fn new(repository: Arc<R>, notifications: Arc<N>) -> Self {
        Self {
            repository,
            notifications,
        }
    }

    pub fn get(&self, id: &ProjectId) -> Result<Project, CoreError> {
        self.repository
            .fetch_project(id)?
            .ok_or_else(|| CoreError::not_found(format!("project {id}")))
    }

    pub fn create(&self, principal: &Principal, project: Project) -> Result<Project, CoreError> {
        principal.require_any(&[Role::ProjectManager])?;
        project.validate()?;
        self.repository.insert_project(project)
    }

    /// Only the owning/assigned manager (or super-admin) may edit; weight
    /// violations are rejected before anything is written.
    pub fn update(&self, principal: &Principal, project: Project) -> Result<(), CoreError> {
        principal.require_any(&[Role::ProjectManager])?;
        let stored = self.get(&project.id)?;
        self.require_editable(principal, &stored)?;
        project.validate()?;
        self.repository.update_project(project)
    }

    /// Advance the lifecycle one step along the transition table.
    pub fn advance(
        &self,
        principal: &Principal,
        id: &ProjectId,
        to: ProjectStatus,
    ) -> Result<Project, CoreError> {
        principal.require_any(&[Role::ProjectManager])?;
        let mut project = self.get(id)?;
        self.require_editable(principal, &project)?;

        // Approval decisions stay with the operator side.
        if matches!(to, ProjectStatus::Approved | ProjectStatus::Rejected) {
            principal.require_super_admin()?;
        }

        if !can_transition(project.status, to) {
            return Err(CoreError::PreconditionFailed(format!(
                "project cannot move from {} to {}",
                project.status.label(),
                to.label()
            )));
        }

        let from = project.status;
        project.status = to;
        project.updated_at = Utc::now();
        self.repository.update_project(project.clone())?;

        tracing::info!(
            project = %project.id,
            from = from.label(),
            to = to.label(),
            "project lifecycle advanced"
        );
        self.notify_owner(&project, from, to);
        Ok(project)
    }

    pub fn add_question(
        &self,
        principal: &Principal,
        question: CustomQuestion,
    ) -> Result<CustomQuestion, CoreError> {
        principal.require_any(&[Role::ProjectManager])?;
        let project = self.get(&question.project)?;
        self.require_editable(principal, &project)?;
        self.repository.insert_question(question)
    }

    fn require_editable(&self, principal: &Principal, project: &Project) -> Result<(), CoreError> {
        if principal.is_super_admin() || project.editable_by(&principal.user_id) {
            return Ok(());
        }
        Err(CoreError::PermissionDenied(
            "only the owning project manager may modify this project".to_string(),
        ))
    }

    fn notify_owner(&self, project: &Project, from: ProjectStatus, to: ProjectStatus) {
        let notification = Notification::new(
            project.owner.clone(),
            NotificationKind::ProjectUpdate,
            format!("Project '{}' is now {}", project.name, to.label()),
            format!(
                "Status changed from {} to {}.",
                from.label(),
                to.label()
            ),
            Utc::now(),
        )
        .about_project(project.id.clone());
        deliver_best_effort(self.notifications.as_ref(), notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;

    use super::super::super::domain::UserId;
    use super::super::super::memory::{MemorySink, MemoryStore};
    use super::super::domain::ProjectWeights;

    fn draft_project(id: &str) -> Project {
        Project {
            id: ProjectId::new(id),
            name: "Youth coaching cohort".to_string(),
            status: ProjectStatus::Draft,
            recruit_start: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            recruit_end: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            activity_start: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            activity_end: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
            max_participants: 10,
            weights: ProjectWeights {
                quantitative: 70,
                qualitative: 30,
            },
            items: Vec::new(),
            reviewers: Vec::new(),
            owner: UserId::new("pm-1"),
            assigned_manager: Some(UserId::new("pm-2")),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service_with(project: Project) -> ProjectService<MemoryStore, MemorySink> {
        let repository = Arc::new(MemoryStore::new());
        repository.insert_project(project).expect("project seeds");
        ProjectService::new(repository, Arc::new(MemorySink::new()))
    }

    #[test]
    fn only_owning_managers_may_advance() {
        let service = service_with(draft_project("p-1"));

        let outsider = Principal::new(UserId::new("pm-9"), [Role::ProjectManager]);
        let refused = service.advance(&outsider, &ProjectId::new("p-1"), ProjectStatus::Pending);
        assert!(matches!(refused, Err(CoreError::PermissionDenied(_))));

        let assigned = Principal::new(UserId::new("pm-2"), [Role::ProjectManager]);
        let advanced = service
            .advance(&assigned, &ProjectId::new("p-1"), ProjectStatus::Pending)
            .expect("assigned manager advances");
        assert_eq!(advanced.status, ProjectStatus::Pending);
    }

    #[test]
    fn approval_decisions_need_a_super_admin() {
        let mut project = draft_project("p-2");
        project.status = ProjectStatus::Pending;
        let service = service_with(project);

        let owner = Principal::new(UserId::new("pm-1"), [Role::ProjectManager]);
        let refused = service.advance(&owner, &ProjectId::new("p-2"), ProjectStatus::Approved);
        assert!(matches!(refused, Err(CoreError::PermissionDenied(_))));

        let admin = Principal::new(UserId::new("admin-1"), [Role::SuperAdmin]);
        let approved = service
            .advance(&admin, &ProjectId::new("p-2"), ProjectStatus::Approved)
            .expect("operator approves");
        assert_eq!(approved.status, ProjectStatus::Approved);

        // Lifecycle steps still follow the transition table.
        let skipped = service.advance(&admin, &ProjectId::new("p-2"), ProjectStatus::Reviewing);
        assert!(matches!(skipped, Err(CoreError::PreconditionFailed(_))));
    }
}
