//! Tenancy configuration.
//!
//! Centralizes the license-key secret, grace period and cache TTLs.
//! Configuration is loaded from environment variables with defaults suitable
//! for local development.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

impl From<ConfigError> for crate::error::TenancyError {
    fn from(err: ConfigError) -> Self {
        crate::error::TenancyError::Config(err.to_string())
    }
}

/// Tenancy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Application secret mixed into license key derivation.
    pub app_secret: Option<String>,

    /// Days after `expires_at` during which a license still validates.
    pub grace_period_days: i64,

    /// Number of hex characters kept from the key digest.
    pub license_key_length: usize,

    /// Characters per dash-separated block of a license key.
    pub license_key_group_size: usize,

    /// Reject a second active license for the same organization.
    pub enforce_single_active_license: bool,

    /// Cache lifetimes.
    pub cache: CacheTtls,
}

impl Default for TenancyConfig {
    /// Returns default configuration suitable for local development.
    fn default() -> Self {
        Self {
            app_secret: None,
            grace_period_days: 7,
            license_key_length: 32,
            license_key_group_size: 4,
            enforce_single_active_license: true,
            cache: CacheTtls::default(),
        }
    }
}

impl TenancyConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TENANCY_APP_SECRET`: secret for license key derivation
    /// - `TENANCY_GRACE_PERIOD_DAYS`: grace period after expiry (default: 7)
    /// - `TENANCY_LICENSE_KEY_LENGTH`: hex characters per key (default: 32)
    /// - `TENANCY_LICENSE_KEY_GROUP`: characters per key block (default: 4)
    /// - `TENANCY_ENFORCE_SINGLE_ACTIVE_LICENSE`: one active license per org (default: true)
    /// - `TENANCY_CACHE_*_TTL_SECS`: see [`CacheTtls::from_env`]
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            app_secret: std::env::var("TENANCY_APP_SECRET").ok(),
            grace_period_days: env_parse("TENANCY_GRACE_PERIOD_DAYS")
                .unwrap_or(default.grace_period_days),
            license_key_length: env_parse("TENANCY_LICENSE_KEY_LENGTH")
                .unwrap_or(default.license_key_length),
            license_key_group_size: env_parse("TENANCY_LICENSE_KEY_GROUP")
                .unwrap_or(default.license_key_group_size),
            enforce_single_active_license: std::env::var("TENANCY_ENFORCE_SINGLE_ACTIVE_LICENSE")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(default.enforce_single_active_license),
            cache: CacheTtls::from_env(),
        }
    }

    /// Builder-style setter for the application secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.app_secret = Some(secret.into());
        self
    }

    /// Grace period as a chrono duration.
    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::days(self.grace_period_days)
    }

    /// Validate that all required configuration is present for production.
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        match self.app_secret.as_deref() {
            None | Some("") => {
                return Err(ConfigError::MissingEnvVar("TENANCY_APP_SECRET".to_string()))
            }
            Some(_) => {}
        }
        if self.license_key_length == 0 || self.license_key_length > 64 {
            return Err(ConfigError::InvalidValue {
                key: "license_key_length".to_string(),
                message: "must be between 1 and 64".to_string(),
            });
        }
        if self.license_key_group_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "license_key_group_size".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.grace_period_days < 0 {
            return Err(ConfigError::InvalidValue {
                key: "grace_period_days".to_string(),
                message: "must not be negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Cache lifetimes, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtls {
    /// Successful license validation.
    pub license_valid_secs: u64,
    /// Failed license validation.
    pub license_invalid_secs: u64,
    /// License validation that failed on usage limits.
    pub license_usage_invalid_secs: u64,
    /// Materialized hierarchy tree.
    pub hierarchy_tree_secs: u64,
    /// Organization usage metrics.
    pub organization_usage_secs: u64,
    /// A user's organization list.
    pub user_organizations_secs: u64,
    /// Permission decision.
    pub permission_secs: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            license_valid_secs: 300,
            license_invalid_secs: 60,
            license_usage_invalid_secs: 30,
            hierarchy_tree_secs: 3600,
            organization_usage_secs: 300,
            user_organizations_secs: 1800,
            permission_secs: 900,
        }
    }
}

impl CacheTtls {
    /// Load TTL overrides from `TENANCY_CACHE_<NAME>_TTL_SECS` variables.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            license_valid_secs: env_parse("TENANCY_CACHE_LICENSE_VALID_TTL_SECS")
                .unwrap_or(default.license_valid_secs),
            license_invalid_secs: env_parse("TENANCY_CACHE_LICENSE_INVALID_TTL_SECS")
                .unwrap_or(default.license_invalid_secs),
            license_usage_invalid_secs: env_parse("TENANCY_CACHE_LICENSE_USAGE_INVALID_TTL_SECS")
                .unwrap_or(default.license_usage_invalid_secs),
            hierarchy_tree_secs: env_parse("TENANCY_CACHE_HIERARCHY_TREE_TTL_SECS")
                .unwrap_or(default.hierarchy_tree_secs),
            organization_usage_secs: env_parse("TENANCY_CACHE_ORG_USAGE_TTL_SECS")
                .unwrap_or(default.organization_usage_secs),
            user_organizations_secs: env_parse("TENANCY_CACHE_USER_ORGS_TTL_SECS")
                .unwrap_or(default.user_organizations_secs),
            permission_secs: env_parse("TENANCY_CACHE_PERMISSION_TTL_SECS")
                .unwrap_or(default.permission_secs),
        }
    }

    /// TTL of a successful validation.
    pub fn license_valid(&self) -> Duration {
        Duration::from_secs(self.license_valid_secs)
    }

    /// TTL of a failed validation.
    pub fn license_invalid(&self) -> Duration {
        Duration::from_secs(self.license_invalid_secs)
    }

    /// TTL of a validation that failed on usage limits.
    pub fn license_usage_invalid(&self) -> Duration {
        Duration::from_secs(self.license_usage_invalid_secs)
    }

    /// TTL of a hierarchy tree.
    pub fn hierarchy_tree(&self) -> Duration {
        Duration::from_secs(self.hierarchy_tree_secs)
    }

    /// TTL of organization usage.
    pub fn organization_usage(&self) -> Duration {
        Duration::from_secs(self.organization_usage_secs)
    }

    /// TTL of a user's organization list.
    pub fn user_organizations(&self) -> Duration {
        Duration::from_secs(self.user_organizations_secs)
    }

    /// TTL of a permission decision.
    pub fn permission(&self) -> Duration {
        Duration::from_secs(self.permission_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TenancyConfig::default();
        assert_eq!(config.grace_period_days, 7);
        assert_eq!(config.license_key_length, 32);
        assert_eq!(config.license_key_group_size, 4);
        assert!(config.enforce_single_active_license);
        assert_eq!(config.grace_period(), chrono::Duration::days(7));
    }

    #[test]
    fn test_default_ttls() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.license_valid(), Duration::from_secs(300));
        assert_eq!(ttls.license_invalid(), Duration::from_secs(60));
        assert_eq!(ttls.license_usage_invalid(), Duration::from_secs(30));
        assert_eq!(ttls.hierarchy_tree(), Duration::from_secs(3600));
        assert_eq!(ttls.user_organizations(), Duration::from_secs(1800));
        assert_eq!(ttls.permission(), Duration::from_secs(900));
    }

    #[test]
    fn test_validate_for_production() {
        let config = TenancyConfig::default();
        assert!(matches!(
            config.validate_for_production(),
            Err(ConfigError::MissingEnvVar(_))
        ));

        let config = TenancyConfig::default().with_secret("s3cret");
        assert!(config.validate_for_production().is_ok());

        let mut config = TenancyConfig::default().with_secret("s3cret");
        config.license_key_group_size = 0;
        assert!(matches!(
            config.validate_for_production(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
