//! Competency catalog: named, ordered, categorised evaluation subjects.
//!
//! Binding a template copies its evaluation fields into the item as an
//! independently editable value object; later template edits never propagate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{CatalogItemId, Principal, TemplateId};
use super::super::scoring::aggregate::AggregationMode;
use super::templates::{
    effective_config, EffectiveConfig, EvaluationMethod, GradeEditMode, GradeType, MatchingType,
    ProofLevel, RepeatPolicy, UnifiedTemplate, ValueSource,
};
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Certification,
    Experience,
    Education,
    AdminOnly,
    Other,
}

impl ItemCategory {
    /// Hundreds digit of the 3-digit display order. The remainder orders
    /// items within the band.
    pub const fn band(self) -> u32 {
        match self {
            Self::Certification => 0,
            Self::Experience => 1,
            Self::Education => 2,
            Self::AdminOnly => 8,
            Self::Other => 9,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Certification => "certification",
            Self::Experience => "experience",
            Self::Education => "education",
            Self::AdminOnly => "admin_only",
            Self::Other => "other",
        }
    }
}

/// Compose a 3-digit display order from a category band and in-band rank.
pub fn display_order(category: ItemCategory, rank: u32) -> u32 {
    category.band() * 100 + rank.min(99)
}

/// Evaluation fields copied off a template at binding time.
///
/// Owned by the item; edited independently afterwards. The template is only
/// consulted again for display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateBinding {
    pub template_id: TemplateId,
    pub grade_type: Option<GradeType>,
    pub matching_type: Option<MatchingType>,
    pub value_source: ValueSource,
    pub source_field: Option<String>,
    pub extract_pattern: Option<String>,
    pub aggregation_mode: Option<AggregationMode>,
    pub grades: Option<serde_json::Value>,
    pub grade_edit_mode: GradeEditMode,
    pub proof_required: ProofLevel,
    pub evaluation_method: EvaluationMethod,
    pub repeat: RepeatPolicy,
    pub help_text: Option<String>,
    pub placeholder: Option<String>,
}

impl TemplateBinding {
    /// Snapshot the template's evaluation block.
    pub fn from_template(template: &UnifiedTemplate) -> Self {
        let eval = &template.evaluation;
        Self {
            template_id: template.id.clone(),
            grade_type: eval.grade_type,
            matching_type: eval.matching_type,
            value_source: eval.value_source,
            source_field: eval.source_field.clone(),
            extract_pattern: eval.extract_pattern.clone(),
            aggregation_mode: eval.aggregation_mode,
            grades: eval.default_grades.clone(),
            grade_edit_mode: eval.grade_edit_mode,
            proof_required: eval.proof_required,
            evaluation_method: eval.evaluation_method,
            repeat: template.repeat,
            help_text: eval.help_text.clone(),
            placeholder: eval.placeholder.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: CatalogItemId,
    pub name: String,
    pub code: String,
    pub category: ItemCategory,
    pub display_order: u32,
    /// Items without a binding are display-only.
    pub binding: Option<TemplateBinding>,
    /// Takes precedence over the binding's method when resolving the
    /// effective config.
    pub evaluation_method_override: Option<EvaluationMethod>,
    pub visible_in_profile: bool,
    /// Links a pure-evaluation item to the user-visible data entry item it
    /// reads from.
    pub data_source_item_code: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogItem {
    /// Effective evaluation config from the copied binding, honoring the
    /// item-level method override. `None` for display-only items.
    pub fn effective(&self) -> Option<EffectiveConfig> {
        let binding = self.binding.as_ref()?;
        let block = super::templates::EvaluationBlock {
            grade_type: binding.grade_type,
            matching_type: binding.matching_type,
            value_source: binding.value_source,
            source_field: binding.source_field.clone(),
            extract_pattern: binding.extract_pattern.clone(),
            aggregation_mode: binding.aggregation_mode,
            default_grades: binding.grades.clone(),
            grade_edit_mode: binding.grade_edit_mode,
            proof_required: binding.proof_required,
            evaluation_method: binding.evaluation_method,
            help_text: binding.help_text.clone(),
            placeholder: binding.placeholder.clone(),
        };
        Some(effective_config(&block, self.evaluation_method_override))
    }

    pub fn is_repeatable(&self) -> bool {
        self.binding
            .as_ref()
            .map(|binding| binding.repeat == RepeatPolicy::Repeatable)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ItemFilter {
    pub category: Option<ItemCategory>,
    pub active_only: bool,
}

/// Storage abstraction for catalog items.
pub trait CatalogRepository: Send + Sync {
    fn insert_item(&self, item: CatalogItem) -> Result<CatalogItem, CoreError>;
    fn update_item(&self, item: CatalogItem) -> Result<(), CoreError>;
    fn fetch_item(&self, id: &CatalogItemId) -> Result<Option<CatalogItem>, CoreError>;
    fn list_items(&self, filter: ItemFilter) -> Result<Vec<CatalogItem>, CoreError>;
}

/// Catalog facade; writes are super-admin only, like the template registry.
pub struct CatalogService<R> {
    repository: Arc<R>,
}

impl<R: CatalogRepository> CatalogService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// List filtered by category/active, sorted by display order.
    pub fn list(&self, filter: ItemFilter) -> Result<Vec<CatalogItem>, CoreError> {
        let mut items = self.repository.list_items(filter)?;
        items.sort_by_key(|item| item.display_order);
        Ok(items)
    }

    pub fn get(&self, id: &CatalogItemId) -> Result<CatalogItem, CoreError> {
        self.repository
            .fetch_item(id)?
            .ok_or_else(|| CoreError::not_found(format!("catalog item {id}")))
    }

    pub fn create(
        &self,
        principal: &Principal,
        item: CatalogItem,
    ) -> Result<CatalogItem, CoreError> {
        principal.require_super_admin()?;
        validate_item(&item)?;
        self.repository.insert_item(item)
    }

    /// Bind a template, snapshotting its evaluation fields onto the item.
    pub fn bind_template(
        &self,
        principal: &Principal,
        id: &CatalogItemId,
        template: &UnifiedTemplate,
    ) -> Result<CatalogItem, CoreError> {
        principal.require_super_admin()?;
        let mut item = self.get(id)?;
        item.binding = Some(TemplateBinding::from_template(template));
        item.updated_at = Utc::now();
        self.repository.update_item(item.clone())?;
        Ok(item)
    }

    pub fn update(&self, principal: &Principal, item: CatalogItem) -> Result<(), CoreError> {
        principal.require_super_admin()?;
        validate_item(&item)?;
        self.get(&item.id)?;
        self.repository.update_item(item)
    }

    pub fn deactivate(&self, principal: &Principal, id: &CatalogItemId) -> Result<(), CoreError> {
        principal.require_super_admin()?;
        let mut item = self.get(id)?;
        item.active = false;
        item.updated_at = Utc::now();
        self.repository.update_item(item)
    }
}

fn validate_item(item: &CatalogItem) -> Result<(), CoreError> {
    if item.name.trim().is_empty() || item.code.trim().is_empty() {
        return Err(CoreError::ValidationFailed(
            "catalog item name and code must not be empty".to_string(),
        ));
    }
    if item.display_order / 100 != item.category.band() {
        return Err(CoreError::ValidationFailed(format!(
            "display order {} does not sit in the {} band",
            item.display_order,
            item.category.label()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: ItemCategory, order: u32) -> CatalogItem {
        CatalogItem {
            id: CatalogItemId::new("item-1"),
            name: "Highest coaching certification".to_string(),
            code: "CERT_HIGHEST".to_string(),
            category,
            display_order: order,
            binding: None,
            evaluation_method_override: None,
            visible_in_profile: true,
            data_source_item_code: None,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn bands_follow_the_category_scheme() {
        assert_eq!(display_order(ItemCategory::Certification, 1), 1);
        assert_eq!(display_order(ItemCategory::Experience, 5), 105);
        assert_eq!(display_order(ItemCategory::Education, 10), 210);
        assert_eq!(display_order(ItemCategory::AdminOnly, 2), 802);
        assert_eq!(display_order(ItemCategory::Other, 99), 999);
    }

    #[test]
    fn display_order_outside_band_is_rejected() {
        let bad = item(ItemCategory::Education, 805);
        assert!(matches!(
            validate_item(&bad),
            Err(CoreError::ValidationFailed(_))
        ));
        let good = item(ItemCategory::Education, 210);
        assert!(validate_item(&good).is_ok());
    }

    #[test]
    fn display_only_items_have_no_effective_config() {
        assert!(item(ItemCategory::Other, 901).effective().is_none());
    }

    #[test]
    fn item_override_takes_precedence_over_binding_method() {
        use super::super::templates::tests::certification_template;

        let template = certification_template();
        let mut bound = item(ItemCategory::Certification, 1);
        bound.binding = Some(TemplateBinding::from_template(&template));

        let standard = bound.effective().expect("bound items resolve");
        assert_eq!(standard.grade_type, Some(GradeType::String));

        bound.evaluation_method_override = Some(EvaluationMethod::ByExistence);
        let by_existence = bound.effective().expect("bound items resolve");
        assert_eq!(by_existence.grade_type, Some(GradeType::FileExists));
        assert_eq!(by_existence.grade_edit_mode, GradeEditMode::Fixed);
    }

    #[test]
    fn catalog_writes_are_super_admin_only() {
        use crate::workflows::recruiting::domain::{Role, UserId};
        use crate::workflows::recruiting::memory::MemoryStore;

        let service = CatalogService::new(Arc::new(MemoryStore::new()));

        let manager = Principal::new(UserId::new("pm-1"), [Role::ProjectManager]);
        let refused = service.create(&manager, item(ItemCategory::Certification, 1));
        assert!(matches!(refused, Err(CoreError::PermissionDenied(_))));

        let admin = Principal::new(UserId::new("admin-1"), [Role::SuperAdmin]);
        let created = service
            .create(&admin, item(ItemCategory::Certification, 1))
            .expect("creates");
        service.deactivate(&admin, &created.id).expect("deactivates");
        assert!(!service.get(&created.id).expect("loads").active);
    }

    #[test]
    fn binding_snapshots_are_independent_of_later_template_edits() {
        use super::super::templates::tests::certification_template;

        let mut template = certification_template();
        let binding = TemplateBinding::from_template(&template);

        template.evaluation.default_grades = Some(serde_json::json!({
            "type": "string",
            "grades": [{ "value": "KSC", "score": 99.0 }],
        }));

        let grades = binding.grades.expect("copied grades");
        assert_eq!(grades["grades"][0]["score"], 40.0);
    }
}
