//! Quantitative scoring: value extraction, grade matching, aggregation,
//! and the application-level orchestration on top.

pub mod aggregate;
pub mod extract;
pub mod grade;
pub mod scorer;

pub use aggregate::{aggregate, AggregationMode};
pub use extract::extract_value;
pub use grade::{grade_score, match_criterion, GradeConfig, MatchInput};
pub use scorer::{calc_auto, load_catalog, ScoringService, SweepSummary};
