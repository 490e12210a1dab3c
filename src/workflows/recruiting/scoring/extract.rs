//! Value extraction: turns a submitted value, a user record, and a criterion
//! into the scalar string the matcher consumes.

use regex::Regex;

use super::super::catalog::templates::ValueSource;
use super::super::users::User;
use crate::error::CoreError;

/// Produce the scalar used for matching. Invalid JSON or a missing field
/// yields the empty string, which never matches anything except an explicit
/// `""` expected value.
pub fn extract_value(
    submitted: &str,
    source: ValueSource,
    source_field: Option<&str>,
    extract_pattern: Option<&str>,
    user: &User,
) -> Result<String, CoreError> {
    match source {
        ValueSource::Submitted => Ok(submitted.to_string()),
        ValueSource::UserField => {
            let raw = source_field
                .and_then(|field| user.profile_field(field))
                .unwrap_or_default();
            match extract_pattern {
                Some(pattern) => apply_capture(pattern, &raw),
                None => Ok(raw),
            }
        }
        ValueSource::JsonField => Ok(json_field(submitted, source_field)),
    }
}

/// First capture group of the pattern, or empty when nothing captures.
fn apply_capture(pattern: &str, raw: &str) -> Result<String, CoreError> {
    let regex = Regex::new(pattern)
        .map_err(|err| CoreError::ValidationFailed(format!("invalid extract pattern: {err}")))?;
    Ok(regex
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .map(|group| group.as_str().to_string())
        .unwrap_or_default())
}

fn json_field(submitted: &str, source_field: Option<&str>) -> String {
    let Some(field) = source_field else {
        return String::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(submitted) else {
        return String::new();
    };

    let looked_up = match &value {
        serde_json::Value::Object(map) => map.get(field),
        serde_json::Value::Array(entries) => entries
            .first()
            .and_then(|first| first.as_object())
            .and_then(|map| map.get(field)),
        _ => None,
    };

    match looked_up {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(serde_json::Value::Number(number)) => number.to_string(),
        Some(serde_json::Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}
