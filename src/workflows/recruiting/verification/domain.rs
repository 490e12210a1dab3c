//! Verification records and the targets they attach to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{AnswerId, RecordId, UserId, WalletEntryId};
use crate::error::CoreError;

/// What a confirmation attaches to. Every engine operation is written
/// against this sum type rather than one code path per kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum VerificationTarget {
    Wallet(WalletEntryId),
    Answer(AnswerId),
}

impl VerificationTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Wallet(_) => "wallet",
            Self::Answer(_) => "answer",
        }
    }

    pub fn id_str(&self) -> &str {
        match self {
            Self::Wallet(id) => id.as_str(),
            Self::Answer(id) => id.as_str(),
        }
    }
}

impl std::fmt::Display for VerificationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id_str())
    }
}

/// One verifier's confirmation of one target; unique per (target, verifier).
///
/// Cancellation and resets flip `is_valid` instead of deleting, so the
/// history of who confirmed what survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: RecordId,
    pub target: VerificationTarget,
    pub verifier: UserId,
    pub confirmed_at: DateTime<Utc>,
    pub is_valid: bool,
}

/// A target still collecting confirmations, annotated for the work queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTarget {
    pub target: VerificationTarget,
    pub owner: UserId,
    pub valid_count: u32,
    pub required_count: u32,
    /// Whether the listing principal already holds a valid record.
    pub principal_confirmed: bool,
}

/// Storage abstraction for verification records.
pub trait VerificationStore: Send + Sync {
    fn insert_record(&self, record: VerificationRecord) -> Result<VerificationRecord, CoreError>;
    fn update_record(&self, record: VerificationRecord) -> Result<(), CoreError>;
    fn fetch_record(&self, id: &RecordId) -> Result<Option<VerificationRecord>, CoreError>;
    fn find_record(
        &self,
        target: &VerificationTarget,
        verifier: &UserId,
    ) -> Result<Option<VerificationRecord>, CoreError>;
    fn records_for(&self, target: &VerificationTarget)
        -> Result<Vec<VerificationRecord>, CoreError>;
    /// Flip every valid record on the target to invalid; returns how many.
    fn invalidate_all(&self, target: &VerificationTarget) -> Result<u32, CoreError>;
}

/// Count of currently valid confirmations on a target.
pub fn valid_count<S: VerificationStore + ?Sized>(
    store: &S,
    target: &VerificationTarget,
) -> Result<u32, CoreError> {
    let records = store.records_for(target)?;
    Ok(records.iter().filter(|record| record.is_valid).count() as u32)
}
