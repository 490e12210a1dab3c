//! User records and the profile fields that double as evaluation value sources.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::domain::{Role, UserId};
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    /// Soft-deleted entries retain referential identity.
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub status: UserStatus,
    pub roles: BTreeSet<Role>,
    /// Ancillary profile fields; any of these may act as a `user_field`
    /// evaluation value source.
    pub certification_number: Option<String>,
    pub coaching_hours: Option<u32>,
    pub affiliation: Option<String>,
}

impl User {
    /// Resolve a named profile attribute to the scalar used for matching.
    ///
    /// Unknown names resolve to `None`; the extractor turns that into the
    /// never-matching empty string.
    pub fn profile_field(&self, name: &str) -> Option<String> {
        match name {
            "name" => Some(self.name.clone()),
            "email" => Some(self.email.clone()),
            "certification_number" => self.certification_number.clone(),
            "coaching_hours" => self.coaching_hours.map(|hours| hours.to_string()),
            "affiliation" => self.affiliation.clone(),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Storage abstraction for user lookups.
pub trait UserRepository: Send + Sync {
    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, CoreError>;
    fn insert_user(&self, user: User) -> Result<User, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coach() -> User {
        User {
            id: UserId::new("u-7"),
            name: "Han Seo-yeon".to_string(),
            email: "coach@example.com".to_string(),
            status: UserStatus::Active,
            roles: [Role::Coach].into_iter().collect(),
            certification_number: Some("KSC-2024-0113".to_string()),
            coaching_hours: Some(1250),
            affiliation: None,
        }
    }

    #[test]
    fn profile_fields_resolve_by_name() {
        let user = coach();
        assert_eq!(
            user.profile_field("certification_number").as_deref(),
            Some("KSC-2024-0113")
        );
        assert_eq!(user.profile_field("coaching_hours").as_deref(), Some("1250"));
        assert_eq!(user.profile_field("affiliation"), None);
        assert_eq!(user.profile_field("no_such_field"), None);
    }
}
