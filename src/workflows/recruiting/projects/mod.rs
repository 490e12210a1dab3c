//! Project lifecycle: configuration, approval, and date-derived
//! recruiting display status.

pub mod domain;
pub mod service;

pub use domain::{
    can_transition, kst_date, AnswerRule, CustomQuestion, DisplayStatus, Project, ProjectItem,
    ProjectStatus, ProjectWeights, ScoringCriterion,
};
pub use service::{ProjectRepository, ProjectService};
