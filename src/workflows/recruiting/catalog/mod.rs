//! Competency catalog and the unified template layer behind it.

pub mod items;
pub mod templates;

pub use items::{
    display_order, CatalogItem, CatalogRepository, CatalogService, ItemCategory, ItemFilter,
    TemplateBinding,
};
pub use templates::{
    effective_config, EffectiveConfig, EvaluationBlock, EvaluationMethod, FieldType, GradeEditMode,
    GradeType, MatchingType, ProofLevel, RepeatPolicy, TemplateField, TemplateLayout,
    TemplateRegistry, TemplateRepository, UnifiedTemplate, ValueSource,
};
