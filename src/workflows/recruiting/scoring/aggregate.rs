//! Reduction of repeated answer entries to a single score.

use serde::{Deserialize, Serialize};

use super::grade::GradeConfig;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Evaluate entry 0 only.
    First,
    Sum,
    Max,
    /// Count entries and match the count against a numeric-range grade.
    Count,
    /// Score of the first entry matching any grade, else 0.
    AnyMatch,
    /// Maximum score across entries.
    BestMatch,
}

impl Default for AggregationMode {
    fn default() -> Self {
        Self::First
    }
}

/// Reduce per-entry match results (`None` = no grade matched) to one score.
///
/// `count_config` is the companion range grade for `Count`; when it is absent
/// the raw entry count scores verbatim.
pub fn aggregate(
    mode: AggregationMode,
    entry_scores: &[Option<f64>],
    count_config: Option<&GradeConfig>,
) -> Result<f64, CoreError> {
    let score = match mode {
        AggregationMode::First => entry_scores.first().copied().flatten().unwrap_or(0.0),
        AggregationMode::Sum => entry_scores.iter().flatten().sum(),
        AggregationMode::Max | AggregationMode::BestMatch => entry_scores
            .iter()
            .flatten()
            .copied()
            .fold(0.0_f64, f64::max),
        AggregationMode::AnyMatch => entry_scores
            .iter()
            .find_map(|score| score.as_ref().copied())
            .unwrap_or(0.0),
        AggregationMode::Count => {
            let count = entry_scores.len() as f64;
            match count_config {
                Some(GradeConfig::Numeric(grades)) => {
                    super::grade::numeric_match(grades, count, true).unwrap_or(0.0)
                }
                Some(_) => {
                    return Err(CoreError::ValidationFailed(
                        "count aggregation requires a numeric-range grade".to_string(),
                    ))
                }
                None => count,
            }
        }
    };
    Ok(score)
}
