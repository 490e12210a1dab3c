//! Unified templates: input schema plus evaluation configuration.
//!
//! A template describes both what a form collects and how the collected value
//! is graded. Catalog items bind to a template and copy its evaluation fields
//! (see `items.rs`); the registry itself only resolves the *effective*
//! configuration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{Principal, TemplateId};
use super::super::scoring::aggregate::AggregationMode;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeType {
    String,
    Numeric,
    FileExists,
    MultiSelect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingType {
    Exact,
    Contains,
    Range,
    Grade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    Submitted,
    UserField,
    JsonField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeEditMode {
    /// Mappings are locked; projects may not touch them.
    Fixed,
    /// Scores may be adjusted, grade boundaries may not.
    ScoreOnly,
    Flexible,
}

/// Lets one certification template be reused with different scoring
/// semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMethod {
    Standard,
    ByName,
    ByExistence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofLevel {
    None,
    Optional,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Date,
    File,
    Select,
    MultiSelect,
}

/// One typed field of a template's input schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateField {
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateLayout {
    SingleColumn,
    TwoColumn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatPolicy {
    Single,
    Repeatable,
}

/// Evaluation half of a unified template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationBlock {
    pub grade_type: Option<GradeType>,
    pub matching_type: Option<MatchingType>,
    pub value_source: ValueSource,
    /// Attribute or JSON key read when the source is not `Submitted`.
    pub source_field: Option<String>,
    /// Regex whose first capture group refines a user-field value.
    pub extract_pattern: Option<String>,
    pub aggregation_mode: Option<AggregationMode>,
    /// Default grade-to-score mapping, stored as the grade-config JSON
    /// document consumed by the matcher.
    pub default_grades: Option<serde_json::Value>,
    pub grade_edit_mode: GradeEditMode,
    pub proof_required: ProofLevel,
    pub evaluation_method: EvaluationMethod,
    pub help_text: Option<String>,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedTemplate {
    pub id: TemplateId,
    pub name: String,
    pub fields: Vec<TemplateField>,
    pub layout: TemplateLayout,
    pub repeat: RepeatPolicy,
    pub evaluation: EvaluationBlock,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The derived evaluation configuration a scorer actually consumes.
///
/// Never stored: resolved on demand from the template (or a catalog item's
/// copied binding) plus an optional evaluation-method override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub grade_type: Option<GradeType>,
    pub matching_type: Option<MatchingType>,
    pub grades: Option<serde_json::Value>,
    pub grade_edit_mode: GradeEditMode,
    pub value_source: ValueSource,
    pub source_field: Option<String>,
    pub extract_pattern: Option<String>,
    pub aggregation_mode: Option<AggregationMode>,
    pub evaluation_method: EvaluationMethod,
}

impl EffectiveConfig {
    pub fn has_scoring(&self) -> bool {
        self.grade_type.is_some() && self.matching_type.is_some()
    }

    /// Fixed by-existence mapping: a file is worth 20, its absence 0.
    pub fn by_existence() -> Self {
        Self {
            grade_type: Some(GradeType::FileExists),
            matching_type: Some(MatchingType::Exact),
            grades: Some(serde_json::json!({
                "type": "file_exists",
                "grades": { "exists": 20.0, "none": 0.0 },
            })),
            grade_edit_mode: GradeEditMode::Fixed,
            value_source: ValueSource::Submitted,
            source_field: None,
            extract_pattern: None,
            aggregation_mode: None,
            evaluation_method: EvaluationMethod::ByExistence,
        }
    }
}

/// Resolve the effective configuration of an evaluation block.
pub fn effective_config(
    evaluation: &EvaluationBlock,
    method_override: Option<EvaluationMethod>,
) -> EffectiveConfig {
    let resolved = method_override.unwrap_or(evaluation.evaluation_method);
    if resolved == EvaluationMethod::ByExistence {
        return EffectiveConfig::by_existence();
    }
    EffectiveConfig {
        grade_type: evaluation.grade_type,
        matching_type: evaluation.matching_type,
        grades: evaluation.default_grades.clone(),
        grade_edit_mode: evaluation.grade_edit_mode,
        value_source: evaluation.value_source,
        source_field: evaluation.source_field.clone(),
        extract_pattern: evaluation.extract_pattern.clone(),
        aggregation_mode: evaluation.aggregation_mode,
        evaluation_method: resolved,
    }
}

/// Storage abstraction for unified templates.
pub trait TemplateRepository: Send + Sync {
    fn insert_template(&self, template: UnifiedTemplate) -> Result<UnifiedTemplate, CoreError>;
    fn update_template(&self, template: UnifiedTemplate) -> Result<(), CoreError>;
    fn fetch_template(&self, id: &TemplateId) -> Result<Option<UnifiedTemplate>, CoreError>;
    fn list_templates(&self, active_only: bool) -> Result<Vec<UnifiedTemplate>, CoreError>;
}

/// Registry facade enforcing super-admin on writes.
pub struct TemplateRegistry<R> {
    repository: Arc<R>,
}

impl<R: TemplateRepository> TemplateRegistry<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn list(&self, active_only: bool) -> Result<Vec<UnifiedTemplate>, CoreError> {
        self.repository.list_templates(active_only)
    }

    pub fn get(&self, id: &TemplateId) -> Result<UnifiedTemplate, CoreError> {
        self.repository
            .fetch_template(id)?
            .ok_or_else(|| CoreError::not_found(format!("template {id}")))
    }

    pub fn create(
        &self,
        principal: &Principal,
        template: UnifiedTemplate,
    ) -> Result<UnifiedTemplate, CoreError> {
        principal.require_super_admin()?;
        validate_template(&template)?;
        self.repository.insert_template(template)
    }

    pub fn update(
        &self,
        principal: &Principal,
        template: UnifiedTemplate,
    ) -> Result<(), CoreError> {
        principal.require_super_admin()?;
        validate_template(&template)?;
        self.get(&template.id)?;
        self.repository.update_template(template)
    }

    /// Soft deactivation; items referencing the template keep their copied
    /// values and continue to work.
    pub fn deactivate(&self, principal: &Principal, id: &TemplateId) -> Result<(), CoreError> {
        principal.require_super_admin()?;
        let mut template = self.get(id)?;
        template.active = false;
        template.updated_at = Utc::now();
        self.repository.update_template(template)
    }

    pub fn effective(
        &self,
        id: &TemplateId,
        method_override: Option<EvaluationMethod>,
    ) -> Result<EffectiveConfig, CoreError> {
        let template = self.get(id)?;
        Ok(effective_config(&template.evaluation, method_override))
    }
}

fn validate_template(template: &UnifiedTemplate) -> Result<(), CoreError> {
    if template.name.trim().is_empty() {
        return Err(CoreError::ValidationFailed(
            "template name must not be empty".to_string(),
        ));
    }
    if let Some(pattern) = &template.evaluation.extract_pattern {
        regex::Regex::new(pattern).map_err(|err| {
            CoreError::ValidationFailed(format!("invalid extract pattern: {err}"))
        })?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn certification_template() -> UnifiedTemplate {
        UnifiedTemplate {
            id: TemplateId::new("tpl-cert"),
            name: "Coaching certification".to_string(),
            fields: vec![TemplateField {
                name: "certification_name".to_string(),
                label: "Certification".to_string(),
                field_type: FieldType::Text,
                required: true,
            }],
            layout: TemplateLayout::SingleColumn,
            repeat: RepeatPolicy::Repeatable,
            evaluation: EvaluationBlock {
                grade_type: Some(GradeType::String),
                matching_type: Some(MatchingType::Grade),
                value_source: ValueSource::Submitted,
                source_field: None,
                extract_pattern: None,
                aggregation_mode: Some(AggregationMode::BestMatch),
                default_grades: Some(serde_json::json!({
                    "type": "string",
                    "grades": [
                        { "value": "KSC", "score": 40.0 },
                        { "value": "KAC", "score": 30.0 },
                        { "value": "KPC", "score": 20.0 },
                        { "value": "none", "score": 0.0 },
                    ],
                })),
                grade_edit_mode: GradeEditMode::ScoreOnly,
                proof_required: ProofLevel::Required,
                evaluation_method: EvaluationMethod::Standard,
                help_text: None,
                placeholder: Some("Highest certification held".to_string()),
            },
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn effective_config_passes_stored_fields_through() {
        let template = certification_template();
        let effective = effective_config(&template.evaluation, None);
        assert!(effective.has_scoring());
        assert_eq!(effective.grade_type, Some(GradeType::String));
        assert_eq!(effective.aggregation_mode, Some(AggregationMode::BestMatch));
    }

    #[test]
    fn by_existence_override_replaces_grade_fields() {
        let template = certification_template();
        let effective =
            effective_config(&template.evaluation, Some(EvaluationMethod::ByExistence));
        assert_eq!(effective.grade_type, Some(GradeType::FileExists));
        assert_eq!(effective.grade_edit_mode, GradeEditMode::Fixed);
        let grades = effective.grades.expect("fixed grades");
        assert_eq!(grades["grades"]["exists"], 20.0);
        assert_eq!(grades["grades"]["none"], 0.0);
    }

    #[test]
    fn has_scoring_needs_both_grade_and_matching_type() {
        let mut template = certification_template();
        template.evaluation.matching_type = None;
        let effective = effective_config(&template.evaluation, None);
        assert!(!effective.has_scoring());
    }

    #[test]
    fn registry_writes_are_super_admin_only() {
        use crate::workflows::recruiting::domain::{Role, UserId};
        use crate::workflows::recruiting::memory::MemoryStore;

        let registry = TemplateRegistry::new(Arc::new(MemoryStore::new()));

        let manager = Principal::new(UserId::new("pm-1"), [Role::ProjectManager]);
        let refused = registry.create(&manager, certification_template());
        assert!(matches!(refused, Err(CoreError::PermissionDenied(_))));

        let admin = Principal::new(UserId::new("admin-1"), [Role::SuperAdmin]);
        let created = registry
            .create(&admin, certification_template())
            .expect("creates");
        registry.deactivate(&admin, &created.id).expect("deactivates");
        assert!(!registry.get(&created.id).expect("loads").active);
    }

    #[test]
    fn invalid_extract_pattern_is_rejected() {
        let mut template = certification_template();
        template.evaluation.extract_pattern = Some("([unclosed".to_string());
        assert!(matches!(
            validate_template(&template),
            Err(CoreError::ValidationFailed(_))
        ));
    }
}
