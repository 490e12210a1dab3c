//! Coach competency wallet: canonical, cross-project evidence records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CatalogItemId, FileReference, UserId, WalletEntryId};
use crate::error::CoreError;

/// One canonical record per (user, catalog item), promoted monotonically and
/// never duplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletEntry {
    pub id: WalletEntryId,
    pub user: UserId,
    pub catalog_item: CatalogItemId,
    pub value: String,
    pub file: Option<FileReference>,
    pub globally_verified: bool,
    pub globally_verified_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletEntry {
    pub fn new(
        id: WalletEntryId,
        user: UserId,
        catalog_item: CatalogItemId,
        value: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user,
            catalog_item,
            value: value.into(),
            file: None,
            globally_verified: false,
            globally_verified_at: None,
            rejection_reason: None,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Storage abstraction for wallet entries.
pub trait WalletRepository: Send + Sync {
    fn insert_entry(&self, entry: WalletEntry) -> Result<WalletEntry, CoreError>;
    fn update_entry(&self, entry: WalletEntry) -> Result<(), CoreError>;
    fn fetch_entry(&self, id: &WalletEntryId) -> Result<Option<WalletEntry>, CoreError>;
    /// The at-most-one entry for a (user, catalog item) pair.
    fn find_entry(
        &self,
        user: &UserId,
        catalog_item: &CatalogItemId,
    ) -> Result<Option<WalletEntry>, CoreError>;
    fn entries_for_user(&self, user: &UserId) -> Result<Vec<WalletEntry>, CoreError>;
    /// Entries still collecting confirmations.
    fn unverified_entries(&self) -> Result<Vec<WalletEntry>, CoreError>;
}
