//! Qualitative review, final scores, and selection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::applications::{
    Application, ApplicationRepository, ApplicationStatus, SelectionDecision, SCORABLE_STATUSES,
};
use super::domain::{ApplicationId, Principal, ProjectId, Role, UserId};
use super::notifications::{deliver_best_effort, Notification, NotificationKind, NotificationSink};
use super::projects::{ProjectRepository, ProjectWeights};
use crate::error::CoreError;

const SUB_SCORE_MAX: u8 = 10;

/// One reviewer's qualitative take on one application; unique per
/// (application, reviewer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerEvaluation {
    pub application: ApplicationId,
    pub reviewer: UserId,
    pub motivation: u8,
    pub expertise: u8,
    pub role_fit: u8,
    pub comment: String,
    pub recommended: bool,
    pub created_at: DateTime<Utc>,
}

impl ReviewerEvaluation {
    /// Sum of the three sub-scores, 0–30.
    pub fn total(&self) -> f64 {
        f64::from(self.motivation) + f64::from(self.expertise) + f64::from(self.role_fit)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        for (name, score) in [
            ("motivation", self.motivation),
            ("expertise", self.expertise),
            ("role_fit", self.role_fit),
        ] {
            if score > SUB_SCORE_MAX {
                return Err(CoreError::ValidationFailed(format!(
                    "{name} score {score} exceeds the 0-{SUB_SCORE_MAX} scale"
                )));
            }
        }
        Ok(())
    }
}

/// Storage abstraction for reviewer evaluations.
pub trait EvaluationRepository: Send + Sync {
    /// Insert honoring (application, reviewer) uniqueness; a duplicate is a
    /// `Conflict`.
    fn insert_evaluation(
        &self,
        evaluation: ReviewerEvaluation,
    ) -> Result<ReviewerEvaluation, CoreError>;
    fn evaluations_for(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<ReviewerEvaluation>, CoreError>;
}

/// Mean of the evaluation totals; `None` when nobody has evaluated.
pub fn qualitative_avg(evaluations: &[ReviewerEvaluation]) -> Option<f64> {
    if evaluations.is_empty() {
        return None;
    }
    let sum: f64 = evaluations.iter().map(ReviewerEvaluation::total).sum();
    Some(sum / evaluations.len() as f64)
}

/// Weighted blend of the quantitative and qualitative scores. A missing
/// side contributes zero rather than poisoning the result.
pub fn final_score(auto: Option<f64>, qualitative: Option<f64>, weights: ProjectWeights) -> f64 {
    auto.unwrap_or(0.0) * f64::from(weights.quantitative) / 100.0
        + qualitative.unwrap_or(0.0) * f64::from(weights.qualitative) / 100.0
}

/// Outcome of a finalization sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizeSummary {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// Applications skipped because nobody evaluated them.
    pub no_evaluation: u32,
    pub failures: Vec<(ApplicationId, String)>,
}

const MAX_REPORTED_FAILURES: usize = 20;

pub struct SelectionService<S, N> {
    store: Arc<S>,
    notifications: Arc<N>,
}

impl<S, N> SelectionService<S, N>
where
    S: ApplicationRepository + ProjectRepository + EvaluationRepository,
    N: NotificationSink,
{
    pub fn new(store: Arc<S>, notifications: Arc<N>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Record one reviewer's evaluation. Only reviewers assigned to the
    /// project may evaluate, each at most once per application.
    pub fn submit_evaluation(
        &self,
        principal: &Principal,
        evaluation: ReviewerEvaluation,
    ) -> Result<ReviewerEvaluation, CoreError> {
        principal.require_any(&[Role::Reviewer])?;
        principal.require_self(&evaluation.reviewer)?;
        evaluation.validate()?;

        let application = self.application(&evaluation.application)?;
        let project = self.project(&application.project)?;
        if !principal.is_super_admin() && !project.reviewers.contains(&evaluation.reviewer) {
            return Err(CoreError::PermissionDenied(format!(
                "reviewer {} is not assigned to project {}",
                evaluation.reviewer, project.id
            )));
        }
        let stored = self.store.insert_evaluation(evaluation)?;

        deliver_best_effort(
            self.notifications.as_ref(),
            Notification::new(
                project.owner.clone(),
                NotificationKind::ReviewComplete,
                "Evaluation recorded",
                format!(
                    "Reviewer {} evaluated application {}.",
                    stored.reviewer, stored.application
                ),
                stored.created_at,
            )
            .about_application(stored.application.clone())
            .about_project(project.id.clone()),
        );
        Ok(stored)
    }

    /// Compute final scores for every scorable application of a project
    /// that has at least one evaluation. Unevaluated applications keep a
    /// blank final score and are only counted.
    pub fn finalize_project(
        &self,
        principal: &Principal,
        project_id: &ProjectId,
    ) -> Result<FinalizeSummary, CoreError> {
        principal.require_any(&[Role::ProjectManager])?;
        let project = self.project(project_id)?;
        let mut summary = FinalizeSummary {
            total: 0,
            succeeded: 0,
            failed: 0,
            no_evaluation: 0,
            failures: Vec::new(),
        };

        for mut application in self.store.applications_for_project(project_id)? {
            if !SCORABLE_STATUSES.contains(&application.status) {
                continue;
            }
            summary.total += 1;
            let result = self
                .store
                .evaluations_for(&application.id)
                .and_then(|evaluations| {
                    let Some(qualitative) = qualitative_avg(&evaluations) else {
                        return Ok(false);
                    };
                    application.final_score = Some(final_score(
                        application.auto_score,
                        Some(qualitative),
                        project.weights,
                    ));
                    application.updated_at = Utc::now();
                    self.store.update_application(application.clone())?;
                    Ok(true)
                });
            match result {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.no_evaluation += 1,
                Err(err) => {
                    summary.failed += 1;
                    if summary.failures.len() < MAX_REPORTED_FAILURES {
                        summary.failures.push((application.id.clone(), err.to_string()));
                    }
                }
            }
        }

        tracing::info!(
            project = %project_id,
            total = summary.total,
            no_evaluation = summary.no_evaluation,
            "finalization sweep finished"
        );
        Ok(summary)
    }

    /// Rank by final score and flag the top `max_participants` as
    /// recommended. Ties break by auto score, then earlier submission.
    pub fn recommend_selection(
        &self,
        principal: &Principal,
        project_id: &ProjectId,
    ) -> Result<Vec<Application>, CoreError> {
        principal.require_any(&[Role::ProjectManager])?;
        let project = self.project(project_id)?;
        let mut applications: Vec<Application> = self
            .store
            .applications_for_project(project_id)?
            .into_iter()
            .filter(|application| SCORABLE_STATUSES.contains(&application.status))
            .collect();

        applications.sort_by(|a, b| {
            let by_final = b
                .final_score
                .unwrap_or(0.0)
                .total_cmp(&a.final_score.unwrap_or(0.0));
            by_final
                .then_with(|| {
                    b.auto_score
                        .unwrap_or(0.0)
                        .total_cmp(&a.auto_score.unwrap_or(0.0))
                })
                .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        });

        let quota = project.max_participants as usize;
        for (rank, application) in applications.iter_mut().enumerate() {
            application.recommended = rank < quota;
            application.updated_at = Utc::now();
            self.store.update_application(application.clone())?;
        }
        Ok(applications)
    }

    /// Record selection decisions in bulk and notify every applicant.
    pub fn decide(
        &self,
        principal: &Principal,
        decisions: &[(ApplicationId, SelectionDecision)],
    ) -> Result<(), CoreError> {
        principal.require_any(&[Role::ProjectManager])?;
        let now = Utc::now();
        for (id, decision) in decisions {
            let mut application = self.application(id)?;
            application.selection = Some(*decision);
            if application.status == ApplicationStatus::Reviewing {
                application.status = ApplicationStatus::Completed;
            }
            application.updated_at = now;
            self.store.update_application(application.clone())?;

            let verdict = match decision {
                SelectionDecision::Selected => "selected for the project",
                SelectionDecision::Waitlisted => "placed on the waitlist",
                SelectionDecision::NotSelected => "not selected this time",
            };
            deliver_best_effort(
                self.notifications.as_ref(),
                Notification::new(
                    application.applicant.clone(),
                    NotificationKind::SelectionResult,
                    "Selection result",
                    format!("Your application was {verdict}."),
                    now,
                )
                .about_application(id.clone())
                .about_project(application.project.clone()),
            );
        }
        Ok(())
    }

    fn application(&self, id: &ApplicationId) -> Result<Application, CoreError> {
        self.store
            .fetch_application(id)?
            .ok_or_else(|| CoreError::not_found(format!("application {id}")))
    }

    fn project(
        &self,
        id: &ProjectId,
    ) -> Result<super::projects::Project, CoreError> {
        self.store
            .fetch_project(id)?
            .ok_or_else(|| CoreError::not_found(format!("project {id}")))
    }
}
