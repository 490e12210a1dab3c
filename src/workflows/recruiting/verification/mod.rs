//! Evidence verification: N-of-M confirmation over wallet entries and
//! application answers, with promotion reflected back into the wallet.

pub mod domain;
pub mod engine;

pub use domain::{
    valid_count, PendingTarget, VerificationRecord, VerificationStore, VerificationTarget,
};
pub use engine::{ConfirmOutcome, VerificationEngine};
