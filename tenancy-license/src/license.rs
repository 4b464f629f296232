//! Enterprise license domain models
//!
//! This module provides the EnterpriseLicense entity, its lifecycle status and
//! the issuance configuration. A license gates feature access and carries the
//! usage caps enforced for its organization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tenancy_core::{ResourceType, TenancyError, TenancyResult};
use uuid::Uuid;

use crate::tiers::{LicenseTier, LicenseType};

/// Lifecycle status of a license.
///
/// ```text
/// issue ──→ Active ⇄ Suspended
///             │  ╲        │
///             │   ╲       ▼
///             │    ──→ Revoked (terminal)
///             ▼
///          Expired (derived at validation, past the grace period)
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    /// Usable
    Active,
    /// Expired past its grace period
    Expired,
    /// Temporarily disabled
    Suspended,
    /// Permanently disabled
    Revoked,
}

impl LicenseStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Suspended => "suspended",
            LicenseStatus::Revoked => "revoked",
        }
    }

    /// Check if no transition may leave this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LicenseStatus::Revoked)
    }
}

impl std::fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An enterprise license issued to an organization.
///
/// # Examples
///
/// ```
/// use tenancy_license::{EnterpriseLicense, LicenseTier, LicenseType};
/// use uuid::Uuid;
///
/// let mut license = EnterpriseLicense::new(
///     Uuid::now_v7(),
///     "ABCD-EF01",
///     LicenseType::Perpetual,
///     LicenseTier::Basic,
/// );
/// license.authorized_domains = vec!["*.acme.com".to_string()];
/// assert!(license.is_domain_authorized("app.acme.com"));
/// assert!(!license.is_domain_authorized("acme.org"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnterpriseLicense {
    /// Unique identifier
    pub id: Uuid,

    /// Organization the license was issued to
    pub organization_id: Uuid,

    /// Unique license key
    pub license_key: String,

    /// Term type
    pub license_type: LicenseType,

    /// Commercial tier
    pub license_tier: LicenseTier,

    /// Enabled feature flags
    #[serde(default)]
    pub features: BTreeSet<String>,

    /// Resource type → limit (None = unlimited)
    #[serde(default)]
    pub limits: BTreeMap<String, Option<u64>>,

    /// When the license was issued
    pub issued_at: DateTime<Utc>,

    /// When the license expires (None = never)
    pub expires_at: Option<DateTime<Utc>>,

    /// Exact hostnames or `*.`-prefixed wildcard suffixes; empty = any domain
    #[serde(default)]
    pub authorized_domains: Vec<String>,

    /// Lifecycle status
    pub status: LicenseStatus,

    /// Last successful validation
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl EnterpriseLicense {
    /// Creates an active license with the tier's default features and limits
    /// and no expiry.
    pub fn new(
        organization_id: Uuid,
        license_key: impl Into<String>,
        license_type: LicenseType,
        license_tier: LicenseTier,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            organization_id,
            license_key: license_key.into(),
            license_type,
            license_tier,
            features: license_tier.default_features(),
            limits: license_tier.default_limits(),
            issued_at: Utc::now(),
            expires_at: None,
            authorized_domains: Vec::new(),
            status: LicenseStatus::Active,
            last_validated_at: None,
        }
    }

    /// Check if a feature flag is enabled.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Finite limit configured for a resource type.
    ///
    /// Limit keys may be written as `users` or `max_users`.
    ///
    /// # Returns
    ///
    /// `None` when no limit is configured or the limit is unlimited
    pub fn limit(&self, resource: ResourceType) -> Option<u64> {
        self.limits
            .iter()
            .filter(|(key, _)| ResourceType::parse(key) == Some(resource))
            .find_map(|(_, limit)| *limit)
    }

    /// Check if `domain` may use this license.
    ///
    /// An empty list authorizes any domain. `*.acme.com` authorizes
    /// `acme.com` and any host ending in `.acme.com`. Matching is
    /// case-insensitive.
    pub fn is_domain_authorized(&self, domain: &str) -> bool {
        if self.authorized_domains.is_empty() {
            return true;
        }
        let domain = domain.trim().trim_end_matches('.').to_lowercase();
        self.authorized_domains.iter().any(|pattern| {
            let pattern = pattern.trim().to_lowercase();
            match pattern.strip_prefix("*.") {
                Some(suffix) => domain == suffix || domain.ends_with(&format!(".{}", suffix)),
                None => domain == pattern,
            }
        })
    }

    /// Whole days elapsed since expiry, or `None` if not expired at `now`.
    pub fn days_expired(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at
            .filter(|expires_at| *expires_at < now)
            .map(|expires_at| (now - expires_at).num_days())
    }
}

/// Configuration for issuing a license.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseConfig {
    /// Term type
    pub license_type: LicenseType,

    /// Commercial tier
    pub license_tier: LicenseTier,

    /// Feature flags (None = tier defaults)
    pub features: Option<BTreeSet<String>>,

    /// Limits (None = tier defaults)
    pub limits: Option<BTreeMap<String, Option<u64>>>,

    /// Explicit expiry (None = term default of the license type)
    pub expires_at: Option<DateTime<Utc>>,

    /// Authorized domain patterns
    #[serde(default)]
    pub authorized_domains: Vec<String>,
}

impl LicenseConfig {
    /// Creates a config using the tier's defaults.
    pub fn new(license_type: LicenseType, license_tier: LicenseTier) -> Self {
        Self {
            license_type,
            license_tier,
            features: None,
            limits: None,
            expires_at: None,
            authorized_domains: Vec::new(),
        }
    }

    /// Replace the feature set.
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = Some(features.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the limits.
    pub fn with_limits<I, S>(mut self, limits: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<u64>)>,
        S: Into<String>,
    {
        self.limits = Some(limits.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    /// Set an explicit expiry.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the authorized domain patterns.
    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Validate domain patterns.
    ///
    /// A wildcard is only allowed as a leading `*.` label.
    pub fn validate(&self) -> TenancyResult<()> {
        for pattern in &self.authorized_domains {
            let host = pattern.strip_prefix("*.").unwrap_or(pattern);
            if host.is_empty() || host.contains('*') || host.contains(char::is_whitespace) {
                return Err(TenancyError::Validation(format!(
                    "invalid authorized domain pattern: {:?}",
                    pattern
                )));
            }
        }
        Ok(())
    }
}
