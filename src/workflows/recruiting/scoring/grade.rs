//! Grade matching: reduces an extracted scalar and a criterion's expected
//! payload to a score.
//!
//! Grade configurations arrive as JSON documents and deserialize into a
//! tagged union so matching is a total function on the variant. Entry order
//! is authoritative: the first matching grade wins, and entries are never
//! re-sorted.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::super::catalog::templates::MatchingType;
use crate::error::CoreError;

/// Everything a single match needs to see.
#[derive(Debug, Clone, Copy)]
pub struct MatchInput<'a> {
    /// Scalar produced by the value extractor.
    pub extracted: &'a str,
    /// Raw submitted value; multi-select parses this as a JSON array.
    pub raw_submitted: &'a str,
    pub file_attached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GradeConfig {
    String(StringGrades),
    Numeric(NumericGrades),
    FileExists(FileExistsGrades),
    MultiSelect(MultiSelectGrades),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringGrades {
    pub grades: Vec<ValueGrade>,
    #[serde(default)]
    pub match_mode: StringMatchMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueGrade {
    pub value: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringMatchMode {
    #[default]
    Exact,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericGrades {
    pub grades: Vec<RangeGrade>,
    /// Signed adjustment (normally negative) applied when no file was
    /// submitted; the result is clamped at zero.
    #[serde(default)]
    pub proof_penalty: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeGrade {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileExistsGrades {
    pub grades: FileExistsScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileExistsScores {
    pub exists: f64,
    pub none: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSelectGrades {
    pub grades: Vec<ValueGrade>,
    #[serde(default)]
    pub mode: MultiSelectMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiSelectMode {
    /// Grades are count thresholds; the largest threshold ≤ the selection
    /// length wins.
    #[default]
    Threshold,
    /// Sum the scores of every grade whose value appears in the selection.
    Contains,
}

/// Apply one scoring criterion. `None` means nothing matched.
pub fn match_criterion(
    matching: MatchingType,
    expected: &str,
    criterion_score: f64,
    input: &MatchInput<'_>,
) -> Result<Option<f64>, CoreError> {
    match matching {
        MatchingType::Exact => Ok(exact_match(input.extracted, expected).then_some(criterion_score)),
        MatchingType::Contains => {
            Ok(contains_match(input.extracted, expected).then_some(criterion_score))
        }
        MatchingType::Range => {
            let Some(number) = first_number(input.extracted) else {
                return Ok(None);
            };
            Ok(range_contains(expected, number)?.then_some(criterion_score))
        }
        MatchingType::Grade => {
            let config: GradeConfig = serde_json::from_str(expected).map_err(|err| {
                CoreError::ValidationFailed(format!("malformed grade config: {err}"))
            })?;
            Ok(grade_score(&config, input))
        }
    }
}

/// Match against a parsed grade config; total over every variant.
pub fn grade_score(config: &GradeConfig, input: &MatchInput<'_>) -> Option<f64> {
    match config {
        GradeConfig::String(grades) => string_match(grades, input.extracted),
        GradeConfig::Numeric(grades) => {
            let number = first_number(input.extracted)?;
            numeric_match(grades, number, input.file_attached)
        }
        GradeConfig::FileExists(config) => Some(if input.file_attached {
            config.grades.exists
        } else {
            config.grades.none
        }),
        GradeConfig::MultiSelect(grades) => multi_select_match(grades, input.raw_submitted),
    }
}

fn string_match(config: &StringGrades, extracted: &str) -> Option<f64> {
    for grade in &config.grades {
        let hit = match config.match_mode {
            StringMatchMode::Exact => exact_match(extracted, &grade.value),
            StringMatchMode::Contains => contains_match(extracted, &grade.value),
        };
        if hit {
            return Some(grade.score);
        }
    }
    None
}

/// First `[min, max]` interval containing `number` wins; grade order is the
/// caller's order (sources relying on "highest wins" pre-sort by `min`
/// descending).
pub(crate) fn numeric_match(config: &NumericGrades, number: f64, file_attached: bool) -> Option<f64> {
    for grade in &config.grades {
        let above = grade.min.map(|min| number >= min).unwrap_or(true);
        let below = grade.max.map(|max| number <= max).unwrap_or(true);
        if above && below {
            let mut score = grade.score;
            if !file_attached {
                if let Some(penalty) = config.proof_penalty {
                    score = (score + penalty).max(0.0);
                }
            }
            return Some(score);
        }
    }
    None
}

fn multi_select_match(config: &MultiSelectGrades, raw_submitted: &str) -> Option<f64> {
    let selections = parse_selection(raw_submitted)?;
    match config.mode {
        MultiSelectMode::Contains => {
            let total = config
                .grades
                .iter()
                .filter(|grade| {
                    selections
                        .iter()
                        .any(|value| value.eq_ignore_ascii_case(&grade.value))
                })
                .map(|grade| grade.score)
                .sum();
            Some(total)
        }
        MultiSelectMode::Threshold => {
            let len = selections.len() as f64;
            config
                .grades
                .iter()
                .filter_map(|grade| {
                    let threshold = grade.value.trim().parse::<f64>().ok()?;
                    (threshold <= len).then_some((threshold, grade.score))
                })
                .max_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(_, score)| score)
        }
    }
}

fn parse_selection(raw: &str) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let array = value.as_array()?;
    Some(
        array
            .iter()
            .map(|entry| match entry {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
    )
}

/// Case-insensitive equality; an empty extracted value only matches an
/// explicitly empty expected value.
fn exact_match(extracted: &str, expected: &str) -> bool {
    if extracted.is_empty() {
        return expected.is_empty();
    }
    extracted.eq_ignore_ascii_case(expected)
}

fn contains_match(extracted: &str, expected: &str) -> bool {
    if extracted.is_empty() {
        return expected.is_empty();
    }
    extracted
        .to_lowercase()
        .contains(expected.to_lowercase().as_str())
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("static pattern compiles"))
}

/// First numeric token of a scalar, so "1,200 hours" still ranges on 1 and
/// "about 750" on 750.
pub(crate) fn first_number(text: &str) -> Option<f64> {
    number_pattern()
        .find(text)
        .and_then(|token| token.as_str().parse::<f64>().ok())
}

/// Expected-value grammar for range matching: `"a-b"`, `">=x"`, `"<=x"`,
/// `">x"`, `"<x"`, or a bare number (equality).
pub(crate) fn range_contains(expected: &str, number: f64) -> Result<bool, CoreError> {
    let spec = expected.trim();
    let parse = |text: &str| -> Result<f64, CoreError> {
        text.trim().parse::<f64>().map_err(|_| {
            CoreError::ValidationFailed(format!("malformed range expression '{spec}'"))
        })
    };

    if let Some(rest) = spec.strip_prefix(">=") {
        return Ok(number >= parse(rest)?);
    }
    if let Some(rest) = spec.strip_prefix("<=") {
        return Ok(number <= parse(rest)?);
    }
    if let Some(rest) = spec.strip_prefix('>') {
        return Ok(number > parse(rest)?);
    }
    if let Some(rest) = spec.strip_prefix('<') {
        return Ok(number < parse(rest)?);
    }
    if let Some((low, high)) = spec.split_once('-') {
        if let (Ok(low), Ok(high)) = (low.trim().parse::<f64>(), high.trim().parse::<f64>()) {
            return Ok(number >= low && number <= high);
        }
    }
    Ok((number - parse(spec)?).abs() < f64::EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(extracted: &str) -> MatchInput<'_> {
        MatchInput {
            extracted,
            raw_submitted: extracted,
            file_attached: true,
        }
    }

    #[test]
    fn exact_is_case_insensitive() {
        let score = match_criterion(MatchingType::Exact, "KSC", 10.0, &input("ksc")).unwrap();
        assert_eq!(score, Some(10.0));
        let miss = match_criterion(MatchingType::Exact, "KSC", 10.0, &input("KAC")).unwrap();
        assert_eq!(miss, None);
    }

    #[test]
    fn empty_extracted_only_matches_empty_expected() {
        assert_eq!(
            match_criterion(MatchingType::Exact, "", 5.0, &input("")).unwrap(),
            Some(5.0)
        );
        assert_eq!(
            match_criterion(MatchingType::Exact, "KSC", 5.0, &input("")).unwrap(),
            None
        );
        assert_eq!(
            match_criterion(MatchingType::Contains, "K", 5.0, &input("")).unwrap(),
            None
        );
    }

    #[test]
    fn contains_checks_expected_inside_extracted() {
        let score =
            match_criterion(MatchingType::Contains, "ksc", 15.0, &input("KSC (2023)")).unwrap();
        assert_eq!(score, Some(15.0));
    }

    #[test]
    fn range_grammar_covers_all_forms() {
        assert!(range_contains("100-500", 250.0).unwrap());
        assert!(!range_contains("100-500", 750.0).unwrap());
        assert!(range_contains(">=1000", 1000.0).unwrap());
        assert!(range_contains("<=10", 10.0).unwrap());
        assert!(range_contains(">5", 6.0).unwrap());
        assert!(!range_contains("<5", 5.0).unwrap());
        assert!(range_contains("42", 42.0).unwrap());
        assert!(matches!(
            range_contains(">=abc", 1.0),
            Err(CoreError::ValidationFailed(_))
        ));
    }

    #[test]
    fn range_matching_takes_the_first_numeric_token() {
        let score =
            match_criterion(MatchingType::Range, ">=1000", 30.0, &input("1200 hours")).unwrap();
        assert_eq!(score, Some(30.0));
        let none = match_criterion(MatchingType::Range, ">=1000", 30.0, &input("no hours")).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn string_grades_first_match_wins_in_given_order() {
        let config: GradeConfig = serde_json::from_value(serde_json::json!({
            "type": "string",
            "grades": [
                { "value": "KSC", "score": 40.0 },
                { "value": "KAC", "score": 30.0 },
                { "value": "KPC", "score": 20.0 },
            ],
        }))
        .unwrap();
        assert_eq!(grade_score(&config, &input("kac")), Some(30.0));
        assert_eq!(grade_score(&config, &input("unknown")), None);
    }

    #[test]
    fn numeric_grades_respect_order_and_bounds() {
        let config: GradeConfig = serde_json::from_value(serde_json::json!({
            "type": "numeric",
            "grades": [
                { "min": 1000.0, "score": 30.0 },
                { "min": 500.0, "score": 20.0 },
                { "min": 100.0, "score": 10.0 },
            ],
        }))
        .unwrap();
        assert_eq!(grade_score(&config, &input("1200")), Some(30.0));
        assert_eq!(grade_score(&config, &input("600")), Some(20.0));
        assert_eq!(grade_score(&config, &input("50")), None);
    }

    #[test]
    fn proof_penalty_applies_without_file_and_clamps_at_zero() {
        let config: GradeConfig = serde_json::from_value(serde_json::json!({
            "type": "numeric",
            "grades": [
                { "min": 1000.0, "score": 30.0 },
                { "min": 500.0, "score": 20.0 },
                { "min": 100.0, "score": 10.0 },
            ],
            "proof_penalty": -10.0,
        }))
        .unwrap();

        let without_file = MatchInput {
            extracted: "1200",
            raw_submitted: "1200",
            file_attached: false,
        };
        assert_eq!(grade_score(&config, &without_file), Some(20.0));

        let low = MatchInput {
            extracted: "120",
            raw_submitted: "120",
            file_attached: false,
        };
        assert_eq!(grade_score(&config, &low), Some(0.0));

        assert_eq!(grade_score(&config, &input("1200")), Some(30.0));
    }

    #[test]
    fn file_exists_grades_key_off_the_attachment() {
        let config: GradeConfig = serde_json::from_value(serde_json::json!({
            "type": "file_exists",
            "grades": { "exists": 20.0, "none": 0.0 },
        }))
        .unwrap();
        assert_eq!(grade_score(&config, &input("anything")), Some(20.0));

        let without = MatchInput {
            extracted: "",
            raw_submitted: "",
            file_attached: false,
        };
        assert_eq!(grade_score(&config, &without), Some(0.0));
    }

    #[test]
    fn multi_select_contains_sums_matching_grades() {
        let config: GradeConfig = serde_json::from_value(serde_json::json!({
            "type": "multi_select",
            "mode": "contains",
            "grades": [
                { "value": "youth", "score": 5.0 },
                { "value": "executive", "score": 10.0 },
                { "value": "group", "score": 3.0 },
            ],
        }))
        .unwrap();

        let selection = MatchInput {
            extracted: "",
            raw_submitted: r#"["executive","youth"]"#,
            file_attached: false,
        };
        assert_eq!(grade_score(&config, &selection), Some(15.0));
    }

    #[test]
    fn multi_select_threshold_picks_largest_threshold_not_above_len() {
        let config: GradeConfig = serde_json::from_value(serde_json::json!({
            "type": "multi_select",
            "grades": [
                { "value": "1", "score": 5.0 },
                { "value": "3", "score": 15.0 },
                { "value": "5", "score": 25.0 },
            ],
        }))
        .unwrap();

        let four = MatchInput {
            extracted: "",
            raw_submitted: r#"["a","b","c","d"]"#,
            file_attached: false,
        };
        assert_eq!(grade_score(&config, &four), Some(15.0));

        let none = MatchInput {
            extracted: "",
            raw_submitted: "not json",
            file_attached: false,
        };
        assert_eq!(grade_score(&config, &none), None);
    }

    #[test]
    fn malformed_grade_config_is_a_validation_error() {
        let result = match_criterion(MatchingType::Grade, "{not json", 0.0, &input("x"));
        assert!(matches!(result, Err(CoreError::ValidationFailed(_))));
    }
}
