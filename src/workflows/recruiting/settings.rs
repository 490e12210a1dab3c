//! Operator-tunable system settings.
//!
//! Settings are read per operation rather than cached so that a changed
//! `required_verifier_count` takes effect on the very next confirmation.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::domain::Principal;
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSettings {
    /// N in the N-of-M promotion rule.
    pub required_verifier_count: u32,
    /// Window granted to a coach after a supplement request.
    pub supplement_window_days: i64,
    /// How long a reviewer's claim on an application stays exclusive.
    pub review_lock_expiry_minutes: i64,
    /// Draft auto-save cadence surfaced to the UI.
    pub auto_save_interval_seconds: u64,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            required_verifier_count: 2,
            supplement_window_days: 7,
            review_lock_expiry_minutes: 30,
            auto_save_interval_seconds: 60,
        }
    }
}

impl SystemSettings {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.required_verifier_count == 0 {
            return Err(CoreError::ValidationFailed(
                "required_verifier_count must be at least 1".to_string(),
            ));
        }
        if self.supplement_window_days <= 0 {
            return Err(CoreError::ValidationFailed(
                "supplement_window_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Source of truth for settings; implementations must not cache across calls.
pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> Result<SystemSettings, CoreError>;
    fn update(&self, principal: &Principal, settings: SystemSettings) -> Result<(), CoreError>;
}

/// Process-local provider used by the binary wiring and tests.
#[derive(Debug, Default)]
pub struct MemorySettings {
    inner: Mutex<SystemSettings>,
}

impl MemorySettings {
    pub fn new(settings: SystemSettings) -> Self {
        Self {
            inner: Mutex::new(settings),
        }
    }
}

impl SettingsProvider for MemorySettings {
    fn current(&self) -> Result<SystemSettings, CoreError> {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| CoreError::Internal("settings lock poisoned".to_string()))
    }

    fn update(&self, principal: &Principal, settings: SystemSettings) -> Result<(), CoreError> {
        principal.require_super_admin()?;
        settings.validate()?;
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| CoreError::Internal("settings lock poisoned".to_string()))?;
        *guard = settings;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::recruiting::domain::{Role, UserId};

    #[test]
    fn defaults_require_two_verifiers() {
        assert_eq!(SystemSettings::default().required_verifier_count, 2);
    }

    #[test]
    fn zero_verifier_count_is_rejected() {
        let settings = SystemSettings {
            required_verifier_count: 0,
            ..SystemSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CoreError::ValidationFailed(_))
        ));
    }

    #[test]
    fn update_is_super_admin_only() {
        let provider = MemorySettings::default();
        let coach = Principal::new(UserId::new("u-1"), [Role::Coach]);
        let admin = Principal::new(UserId::new("u-2"), [Role::SuperAdmin]);

        let mut wanted = SystemSettings::default();
        wanted.required_verifier_count = 3;

        assert!(provider.update(&coach, wanted.clone()).is_err());
        provider.update(&admin, wanted).expect("admin may update");
        assert_eq!(provider.current().unwrap().required_verifier_count, 3);
    }
}
