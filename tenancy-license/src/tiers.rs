//! License tiers and types
//!
//! This module defines the commercial tiers a license can be issued at, the
//! default feature flags and usage limits attached to each tier, and the
//! license term types.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Feature flag names understood by the access control resolver.
pub mod features {
    /// Provisioning cloud infrastructure
    pub const INFRASTRUCTURE_PROVISIONING: &str = "infrastructure_provisioning";
    /// Attaching and managing custom domains
    pub const DOMAIN_MANAGEMENT: &str = "domain_management";
    /// White-label branding
    pub const WHITE_LABEL: &str = "white_label";
    /// Programmatic API access
    pub const API_ACCESS: &str = "api_access";
    /// Terraform-driven deployments
    pub const TERRAFORM_INTEGRATION: &str = "terraform_integration";
    /// Payment processing
    pub const PAYMENT_PROCESSING: &str = "payment_processing";
    /// Advanced analytics dashboards
    pub const ADVANCED_ANALYTICS: &str = "advanced_analytics";
    /// Single sign-on
    pub const SSO: &str = "sso";
    /// Creating child organizations
    pub const MULTI_TENANCY: &str = "multi_tenancy";
    /// Organization audit logs
    pub const AUDIT_LOGS: &str = "audit_logs";
}

/// Commercial tier of a license.
///
/// Tiers determine the default feature set and usage limits applied at
/// issuance. Both can be overridden per license.
///
/// # Examples
///
/// ```
/// use tenancy_license::LicenseTier;
///
/// let tier = LicenseTier::Professional;
/// assert!(tier.default_features().contains("api_access"));
/// assert_eq!(tier.default_limits().get("users"), Some(&Some(50)));
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LicenseTier {
    /// Entry tier
    Basic,

    /// Professional tier
    Professional,

    /// Full-featured enterprise tier
    Enterprise,
}

impl LicenseTier {
    /// Default feature flags for this tier.
    pub fn default_features(&self) -> BTreeSet<String> {
        let names: &[&str] = match self {
            LicenseTier::Basic => &[features::DOMAIN_MANAGEMENT],
            LicenseTier::Professional => &[
                features::DOMAIN_MANAGEMENT,
                features::API_ACCESS,
                features::INFRASTRUCTURE_PROVISIONING,
                features::ADVANCED_ANALYTICS,
                features::MULTI_TENANCY,
            ],
            LicenseTier::Enterprise => &[
                features::DOMAIN_MANAGEMENT,
                features::API_ACCESS,
                features::INFRASTRUCTURE_PROVISIONING,
                features::ADVANCED_ANALYTICS,
                features::MULTI_TENANCY,
                features::WHITE_LABEL,
                features::TERRAFORM_INTEGRATION,
                features::PAYMENT_PROCESSING,
                features::SSO,
                features::AUDIT_LOGS,
            ],
        };
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Default usage limits for this tier.
    ///
    /// Values of `None` indicate unlimited.
    pub fn default_limits(&self) -> BTreeMap<String, Option<u64>> {
        let limits: [(&str, Option<u64>); 6] = match self {
            LicenseTier::Basic => [
                ("users", Some(10)),
                ("servers", Some(5)),
                ("applications", Some(10)),
                ("domains", Some(5)),
                ("cloud_providers", Some(1)),
                ("child_organizations", Some(0)),
            ],
            LicenseTier::Professional => [
                ("users", Some(50)),
                ("servers", Some(25)),
                ("applications", Some(100)),
                ("domains", Some(50)),
                ("cloud_providers", Some(3)),
                ("child_organizations", Some(10)),
            ],
            LicenseTier::Enterprise => [
                ("users", None), // Unlimited
                ("servers", None),
                ("applications", None),
                ("domains", None),
                ("cloud_providers", None),
                ("child_organizations", None),
            ],
        };
        limits
            .iter()
            .map(|(name, limit)| (name.to_string(), *limit))
            .collect()
    }

    /// Parse tier from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "basic" => Some(LicenseTier::Basic),
            "professional" | "pro" => Some(LicenseTier::Professional),
            "enterprise" => Some(LicenseTier::Enterprise),
            _ => None,
        }
    }

    /// Get string representation of the tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseTier::Basic => "basic",
            LicenseTier::Professional => "professional",
            LicenseTier::Enterprise => "enterprise",
        }
    }
}

/// License term type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LicenseType {
    /// Never expires
    Perpetual,

    /// Renewable term
    Subscription,

    /// Short evaluation term
    Trial,
}

impl LicenseType {
    /// Term applied at issuance when no explicit expiry is given.
    ///
    /// # Returns
    ///
    /// `None` for perpetual licenses
    pub fn default_term(&self) -> Option<Duration> {
        match self {
            LicenseType::Perpetual => None,
            LicenseType::Subscription => Some(Duration::days(365)),
            LicenseType::Trial => Some(Duration::days(30)),
        }
    }

    /// Parse license type from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "perpetual" => Some(LicenseType::Perpetual),
            "subscription" => Some(LicenseType::Subscription),
            "trial" => Some(LicenseType::Trial),
            _ => None,
        }
    }

    /// Get string representation of the license type.
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseType::Perpetual => "perpetual",
            LicenseType::Subscription => "subscription",
            LicenseType::Trial => "trial",
        }
    }
}
