//! Sponsored projects: lifecycle, recruiting windows, and per-project
//! scoring configuration.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::super::catalog::templates::{MatchingType, ProofLevel, ValueSource};
use super::super::domain::{CatalogItemId, ProjectId, QuestionId, UserId};
use super::super::scoring::aggregate::AggregationMode;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Pending,
    Rejected,
    Approved,
    Ready,
    Reviewing,
    InProgress,
    Evaluating,
    Closed,
}

impl ProjectStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Rejected => "rejected",
            Self::Approved => "approved",
            Self::Ready => "ready",
            Self::Reviewing => "reviewing",
            Self::InProgress => "in_progress",
            Self::Evaluating => "evaluating",
            Self::Closed => "closed",
        }
    }
}

/// Transition table; the only back-edge is rejected → draft for
/// re-submission.
const PROJECT_TRANSITIONS: &[(ProjectStatus, ProjectStatus)] = &[
    (ProjectStatus::Draft, ProjectStatus::Pending),
    (ProjectStatus::Pending, ProjectStatus::Approved),
    (ProjectStatus::Pending, ProjectStatus::Rejected),
    (ProjectStatus::Rejected, ProjectStatus::Draft),
    (ProjectStatus::Approved, ProjectStatus::Ready),
    (ProjectStatus::Ready, ProjectStatus::Reviewing),
    (ProjectStatus::Reviewing, ProjectStatus::InProgress),
    (ProjectStatus::InProgress, ProjectStatus::Evaluating),
    (ProjectStatus::Evaluating, ProjectStatus::Closed),
];

pub fn can_transition(from: ProjectStatus, to: ProjectStatus) -> bool {
    PROJECT_TRANSITIONS
        .iter()
        .any(|(lhs, rhs)| *lhs == from && *rhs == to)
}

/// Date-derived rendering of `ready` projects; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    RecruitingWait,
    Recruiting,
    RecruitingEnded,
}

/// Recruiting-window comparisons run on KST calendar dates.
pub fn kst_date(at: DateTime<Utc>) -> NaiveDate {
    let kst = FixedOffset::east_opt(9 * 3600).expect("KST offset is valid");
    at.with_timezone(&kst).date_naive()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectWeights {
    pub quantitative: u8,
    pub qualitative: u8,
}

impl ProjectWeights {
    pub fn validate(&self) -> Result<(), CoreError> {
        if u32::from(self.quantitative) + u32::from(self.qualitative) != 100 {
            return Err(CoreError::ValidationFailed(format!(
                "quantitative ({}) and qualitative ({}) weights must sum to 100",
                self.quantitative, self.qualitative
            )));
        }
        Ok(())
    }
}

/// One scoring rule attached to a project item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringCriterion {
    /// Stringly-typed payload; a JSON grade-config document for `Grade`
    /// matching.
    pub expected_value: String,
    pub matching_type: MatchingType,
    pub score: f64,
    pub value_source: ValueSource,
    pub source_field: Option<String>,
    pub extract_pattern: Option<String>,
    pub aggregation_mode: Option<AggregationMode>,
}

/// Project-scoped binding of a catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectItem {
    pub catalog_item: CatalogItemId,
    pub proof_required: ProofLevel,
    pub max_score: Option<f64>,
    pub display_order: u32,
    pub required: bool,
    pub criteria: Vec<ScoringCriterion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub status: ProjectStatus,
    pub recruit_start: NaiveDate,
    pub recruit_end: NaiveDate,
    pub activity_start: NaiveDate,
    pub activity_end: NaiveDate,
    pub max_participants: u32,
    pub weights: ProjectWeights,
    pub items: Vec<ProjectItem>,
    /// Reviewers assigned by the operator; only these may submit
    /// qualitative evaluations.
    pub reviewers: Vec<UserId>,
    pub owner: UserId,
    pub assigned_manager: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn validate(&self) -> Result<(), CoreError> {
        self.weights.validate()?;
        if self.recruit_end < self.recruit_start {
            return Err(CoreError::ValidationFailed(
                "recruiting window ends before it starts".to_string(),
            ));
        }
        Ok(())
    }

    /// Display status for `ready` projects; `None` in every other state.
    pub fn display_status(&self, now: DateTime<Utc>) -> Option<DisplayStatus> {
        if self.status != ProjectStatus::Ready {
            return None;
        }
        let today = kst_date(now);
        Some(if today < self.recruit_start {
            DisplayStatus::RecruitingWait
        } else if today <= self.recruit_end {
            DisplayStatus::Recruiting
        } else {
            DisplayStatus::RecruitingEnded
        })
    }

    pub fn accepts_applications(&self, now: DateTime<Utc>) -> bool {
        self.display_status(now) == Some(DisplayStatus::Recruiting)
    }

    pub fn recruiting_closed(&self, now: DateTime<Utc>) -> bool {
        kst_date(now) > self.recruit_end
    }

    pub fn item_for(&self, catalog_item: &CatalogItemId) -> Option<&ProjectItem> {
        self.items.iter().find(|item| &item.catalog_item == catalog_item)
    }

    /// The creating manager, the assigned manager, and super-admins may edit.
    pub fn editable_by(&self, user: &UserId) -> bool {
        &self.owner == user || self.assigned_manager.as_ref() == Some(user)
    }
}

/// Per-project ad-hoc question; evaluation-flagged questions contribute to
/// the auto score through their rule list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomQuestion {
    pub id: QuestionId,
    pub project: ProjectId,
    pub prompt: String,
    pub is_evaluation_item: bool,
    pub rules: Vec<AnswerRule>,
}

/// `{expected_value, score}`; first exact match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRule {
    pub expected_value: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn transitions_are_linear_with_one_back_edge() {
        assert!(can_transition(ProjectStatus::Draft, ProjectStatus::Pending));
        assert!(can_transition(ProjectStatus::Pending, ProjectStatus::Rejected));
        assert!(can_transition(ProjectStatus::Rejected, ProjectStatus::Draft));
        assert!(can_transition(ProjectStatus::Evaluating, ProjectStatus::Closed));

        assert!(!can_transition(ProjectStatus::Draft, ProjectStatus::Ready));
        assert!(!can_transition(ProjectStatus::Closed, ProjectStatus::Draft));
        assert!(!can_transition(ProjectStatus::Ready, ProjectStatus::Pending));
    }

    #[test]
    fn weights_must_sum_to_one_hundred() {
        assert!(ProjectWeights { quantitative: 70, qualitative: 30 }
            .validate()
            .is_ok());
        assert!(matches!(
            ProjectWeights { quantitative: 70, qualitative: 40 }.validate(),
            Err(CoreError::ValidationFailed(_))
        ));
    }

    #[test]
    fn kst_date_rolls_the_day_forward_of_utc() {
        // 2026-03-01 16:00 UTC is already 2026-03-02 01:00 in KST.
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 16, 0, 0).unwrap();
        assert_eq!(kst_date(at), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    }

    fn ready_project() -> Project {
        Project {
            id: ProjectId::new("p-1"),
            name: "Youth coaching cohort".to_string(),
            status: ProjectStatus::Ready,
            recruit_start: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            recruit_end: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            activity_start: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            activity_end: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
            max_participants: 10,
            weights: ProjectWeights { quantitative: 70, qualitative: 30 },
            items: Vec::new(),
            reviewers: Vec::new(),
            owner: UserId::new("pm-1"),
            assigned_manager: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn display_status_is_derived_from_kst_dates() {
        let project = ready_project();

        let before = Utc.with_ymd_and_hms(2026, 2, 20, 0, 0, 0).unwrap();
        assert_eq!(
            project.display_status(before),
            Some(DisplayStatus::RecruitingWait)
        );

        // 2026-03-01 16:00 UTC = 2026-03-02 KST: the window just opened.
        let opening = Utc.with_ymd_and_hms(2026, 3, 1, 16, 0, 0).unwrap();
        assert_eq!(
            project.display_status(opening),
            Some(DisplayStatus::Recruiting)
        );
        assert!(project.accepts_applications(opening));

        let after = Utc.with_ymd_and_hms(2026, 3, 25, 0, 0, 0).unwrap();
        assert_eq!(
            project.display_status(after),
            Some(DisplayStatus::RecruitingEnded)
        );

        let mut draft = ready_project();
        draft.status = ProjectStatus::Draft;
        assert_eq!(draft.display_status(after), None);
    }
}
