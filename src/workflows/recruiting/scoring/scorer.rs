//! Automatic application scoring: extract, match, aggregate, clamp.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use super::super::applications::{
    Application, ApplicationRepository, CustomAnswer, SCORABLE_STATUSES,
};
use super::super::catalog::{CatalogItem, CatalogRepository, EvaluationMethod, MatchingType};
use super::super::domain::{ApplicationId, CatalogItemId, Principal, ProjectId, Role};
use super::super::projects::{CustomQuestion, Project, ProjectRepository, ScoringCriterion};
use super::super::users::{User, UserRepository};
use super::aggregate::{aggregate, AggregationMode};
use super::extract::extract_value;
use super::grade::{grade_score, match_criterion, GradeConfig, MatchInput};
use crate::error::CoreError;

/// Recompute the quantitative score of one application in place.
///
/// Pure over its inputs and idempotent: re-running over unchanged answers
/// produces identical `item_score`s and `auto_score`.
pub fn calc_auto(
    application: &mut Application,
    project: &Project,
    catalog: &HashMap<CatalogItemId, CatalogItem>,
    user: &User,
    questions: &[CustomQuestion],
) -> Result<f64, CoreError> {
    let mut total = 0.0;

    for answer in &mut application.answers {
        let Some(project_item) = project.item_for(&answer.catalog_item) else {
            answer.item_score = None;
            continue;
        };
        let Some(catalog_item) = catalog.get(&answer.catalog_item) else {
            answer.item_score = None;
            continue;
        };
        let effective = catalog_item.effective();

        // By-existence items score on the attachment alone.
        let item_score = if effective
            .as_ref()
            .is_some_and(|config| config.evaluation_method == EvaluationMethod::ByExistence)
        {
            let config = effective
                .as_ref()
                .and_then(|config| config.grades.as_ref())
                .map(|grades| serde_json::from_value::<GradeConfig>(grades.clone()))
                .transpose()
                .map_err(|err| {
                    CoreError::Internal(format!("by-existence grade config: {err}"))
                })?;
            match config {
                Some(config) => {
                    let input = MatchInput {
                        extracted: "",
                        raw_submitted: &answer.value,
                        file_attached: answer.file.is_some(),
                    };
                    grade_score(&config, &input).unwrap_or(0.0)
                }
                None => 0.0,
            }
        } else if project_item.criteria.is_empty() {
            answer.item_score = None;
            continue;
        } else {
            let repeatable = catalog_item.is_repeatable() && !answer.entries.is_empty();
            let mut sum = 0.0;
            for criterion in &project_item.criteria {
                sum += if repeatable {
                    score_repeated(criterion, &answer.entries, answer.file.is_some(), user)?
                } else {
                    score_single(criterion, &answer.value, answer.file.is_some(), user)?
                };
            }
            sum
        };

        let clamped = match project_item.max_score {
            Some(max) => item_score.min(max),
            None => item_score,
        };
        total += clamped;
        answer.item_score = Some(clamped);
    }

    total += question_score(questions, &application.custom_answers);
    application.auto_score = Some(total);
    Ok(total)
}

fn score_single(
    criterion: &ScoringCriterion,
    value: &str,
    file_attached: bool,
    user: &User,
) -> Result<f64, CoreError> {
    let extracted = extract_value(
        value,
        criterion.value_source,
        criterion.source_field.as_deref(),
        criterion.extract_pattern.as_deref(),
        user,
    )?;
    let input = MatchInput {
        extracted: &extracted,
        raw_submitted: value,
        file_attached,
    };
    let matched = match_criterion(
        criterion.matching_type,
        &criterion.expected_value,
        criterion.score,
        &input,
    )?;
    Ok(matched.unwrap_or(0.0))
}

fn score_repeated(
    criterion: &ScoringCriterion,
    entries: &[String],
    file_attached: bool,
    user: &User,
) -> Result<f64, CoreError> {
    let mode = criterion.aggregation_mode.unwrap_or_default();
    let mut entry_scores = Vec::with_capacity(entries.len());
    for entry in entries {
        let extracted = extract_value(
            entry,
            criterion.value_source,
            criterion.source_field.as_deref(),
            criterion.extract_pattern.as_deref(),
            user,
        )?;
        let input = MatchInput {
            extracted: &extracted,
            raw_submitted: entry,
            file_attached,
        };
        entry_scores.push(match_criterion(
            criterion.matching_type,
            &criterion.expected_value,
            criterion.score,
            &input,
        )?);
    }

    // Count mode reads its companion range grade off the criterion payload.
    let count_config = if mode == AggregationMode::Count
        && criterion.matching_type == MatchingType::Grade
    {
        serde_json::from_str::<GradeConfig>(&criterion.expected_value).ok()
    } else {
        None
    };
    aggregate(mode, &entry_scores, count_config.as_ref())
}

/// Evaluation-flagged custom questions contribute via their rule lists;
/// the first rule whose expected value equals the answer wins.
fn question_score(questions: &[CustomQuestion], answers: &[CustomAnswer]) -> f64 {
    let mut total = 0.0;
    for question in questions.iter().filter(|question| question.is_evaluation_item) {
        let Some(answer) = answers.iter().find(|answer| answer.question == question.id) else {
            continue;
        };
        if let Some(rule) = question
            .rules
            .iter()
            .find(|rule| rule.expected_value.trim() == answer.value.trim())
        {
            total += rule.score;
        }
    }
    total
}

/// Outcome of a project-wide recalculation sweep.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SweepSummary {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// First failures only; a large sweep reports a bounded sample.
    pub failures: Vec<(ApplicationId, String)>,
}

const MAX_REPORTED_FAILURES: usize = 20;

pub struct ScoringService<S> {
    store: Arc<S>,
}

impl<S> ScoringService<S>
where
    S: ApplicationRepository + ProjectRepository + CatalogRepository + UserRepository,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Recompute one application and persist the result.
    pub fn calc_auto(
        &self,
        principal: &Principal,
        id: &ApplicationId,
    ) -> Result<f64, CoreError> {
        principal.require_any(&[Role::ProjectManager])?;
        let mut application = self
            .store
            .fetch_application(id)?
            .ok_or_else(|| CoreError::not_found(format!("application {id}")))?;
        let total = self.recompute(&mut application)?;
        application.updated_at = Utc::now();
        self.store.update_application(application)?;
        Ok(total)
    }

    /// Sweep every scorable application of a project. Failures are isolated
    /// per application; the sweep always runs to the end.
    pub fn calc_auto_for_project(
        &self,
        principal: &Principal,
        project: &ProjectId,
    ) -> Result<SweepSummary, CoreError> {
        principal.require_any(&[Role::ProjectManager])?;
        let applications = self.store.applications_for_project(project)?;
        let mut summary = SweepSummary {
            total: 0,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
        };

        for mut application in applications {
            if !SCORABLE_STATUSES.contains(&application.status) {
                continue;
            }
            summary.total += 1;
            let result = self
                .recompute(&mut application)
                .and_then(|_| {
                    application.updated_at = Utc::now();
                    self.store.update_application(application.clone())
                });
            match result {
                Ok(()) => summary.succeeded += 1,
                Err(err) => {
                    summary.failed += 1;
                    if summary.failures.len() < MAX_REPORTED_FAILURES {
                        summary.failures.push((application.id.clone(), err.to_string()));
                    }
                }
            }
        }

        tracing::info!(
            project = %project,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "scoring sweep finished"
        );
        Ok(summary)
    }

    fn recompute(&self, application: &mut Application) -> Result<f64, CoreError> {
        let project = self
            .store
            .fetch_project(&application.project)?
            .ok_or_else(|| CoreError::not_found(format!("project {}", application.project)))?;
        let user = self
            .store
            .fetch_user(&application.applicant)?
            .ok_or_else(|| CoreError::not_found(format!("user {}", application.applicant)))?;
        let questions = self.store.questions_for(&application.project)?;
        let catalog = load_catalog(self.store.as_ref(), application)?;
        calc_auto(application, &project, &catalog, &user, &questions)
    }
}

/// Resolve the catalog items an application's answers refer to.
pub fn load_catalog<S: CatalogRepository + ?Sized>(
    store: &S,
    application: &Application,
) -> Result<HashMap<CatalogItemId, CatalogItem>, CoreError> {
    let mut catalog = HashMap::new();
    for answer in &application.answers {
        if catalog.contains_key(&answer.catalog_item) {
            continue;
        }
        if let Some(item) = store.fetch_item(&answer.catalog_item)? {
            catalog.insert(answer.catalog_item.clone(), item);
        }
    }
    Ok(catalog)
}
