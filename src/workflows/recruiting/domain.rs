//! Identifiers, principals, and shared value objects for the recruiting core.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier wrapper for registered users.
    UserId
);
string_id!(
    /// Identifier wrapper for unified templates.
    TemplateId
);
string_id!(
    /// Identifier wrapper for competency catalog items.
    CatalogItemId
);
string_id!(
    /// Identifier wrapper for sponsored projects.
    ProjectId
);
string_id!(
    /// Identifier wrapper for submitted applications.
    ApplicationId
);
string_id!(
    /// Identifier wrapper for per-item application answers.
    AnswerId
);
string_id!(
    /// Identifier wrapper for cross-project wallet entries.
    WalletEntryId
);
string_id!(
    /// Identifier wrapper for verifier confirmation records.
    RecordId
);
string_id!(
    /// Identifier wrapper for project-scoped custom questions.
    QuestionId
);

/// Roles an authenticated principal may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    ProjectManager,
    Verifier,
    Reviewer,
    Coach,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::ProjectManager => "project_manager",
            Self::Verifier => "verifier",
            Self::Reviewer => "reviewer",
            Self::Coach => "coach",
        }
    }
}

/// Authenticated caller supplied by the (external) transport layer.
///
/// The core never authenticates; it only enforces role requirements at its
/// entry points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: BTreeSet<Role>,
}

impl Principal {
    pub fn new(user_id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_role(Role::SuperAdmin)
    }

    /// Require at least one of `allowed`; super-admin always passes.
    pub fn require_any(&self, allowed: &[Role]) -> Result<(), CoreError> {
        if self.is_super_admin() || allowed.iter().any(|role| self.has_role(*role)) {
            return Ok(());
        }
        let wanted: Vec<&str> = allowed.iter().map(|role| role.label()).collect();
        Err(CoreError::PermissionDenied(format!(
            "requires one of [{}]",
            wanted.join(", ")
        )))
    }

    pub fn require_super_admin(&self) -> Result<(), CoreError> {
        if self.is_super_admin() {
            return Ok(());
        }
        Err(CoreError::PermissionDenied(
            "requires super_admin".to_string(),
        ))
    }

    /// Require the principal to be the named user (self-service paths);
    /// super-admin always passes.
    pub fn require_self(&self, owner: &UserId) -> Result<(), CoreError> {
        if self.is_super_admin() || &self.user_id == owner {
            return Ok(());
        }
        Err(CoreError::PermissionDenied(
            "only the owning user may perform this operation".to_string(),
        ))
    }
}

/// Opaque evidence reference: identity plus metadata, never bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub key: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub uploaded_by: UserId,
}

impl FileReference {
    /// Parsed media type, if the stored metadata is well formed.
    pub fn media_type(&self) -> Option<mime::Mime> {
        self.content_type.parse().ok()
    }
}
