//! Application lifecycle: drafts, submission, freezing, and the
//! supplement loop on individual answers.

pub mod domain;
pub mod repository;
pub mod service;

pub use domain::{
    can_document_transition, can_transition, Application, ApplicationAnswer, ApplicationStatus,
    CustomAnswer, DocumentStatus, SelectionDecision,
};
pub use repository::{ApplicationRepository, SCORABLE_STATUSES};
pub use service::ApplicationService;
