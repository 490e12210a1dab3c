//! Recruiting and evaluation pipeline for sponsored coaching projects:
//! competency catalog, automatic scoring, evidence verification, and the
//! application/project/selection lifecycles.

pub mod applications;
pub mod catalog;
pub mod domain;
pub mod memory;
pub mod notifications;
pub mod projects;
pub mod router;
pub mod scoring;
pub mod selection;
pub mod settings;
pub mod users;
pub mod verification;
pub mod wallet;

pub use applications::{Application, ApplicationService, ApplicationStatus, DocumentStatus};
pub use domain::{Principal, Role};
pub use memory::{MemorySink, MemoryStore};
pub use router::{recruiting_router, RecruitingState};
pub use scoring::ScoringService;
pub use selection::SelectionService;
pub use settings::{MemorySettings, SettingsProvider, SystemSettings};
pub use verification::{VerificationEngine, VerificationTarget};
