//! Validation and usage result types
//!
//! License validation never raises for ordinary denials; it returns a
//! [`ValidationResult`] describing why, so callers can render a specific
//! message.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::license::EnterpriseLicense;

/// Why a validation failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailure {
    /// No license with that key
    NotFound,
    /// License revoked
    Revoked,
    /// License suspended
    Suspended,
    /// Expired past the grace period
    Expired,
    /// Requesting domain not in the authorized list
    DomainNotAuthorized,
    /// Current usage above one or more limits
    UsageLimitsExceeded,
    /// Backend failure during validation
    SystemError,
}

/// A single usage limit breach.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageViolation {
    /// Limit key as written on the license
    pub resource: String,
    /// Current usage
    pub current: u64,
    /// Configured limit
    pub limit: u64,
}

impl std::fmt::Display for UsageViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}/{})", self.resource, self.current, self.limit)
    }
}

/// Outcome of the validation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    /// Whether the license may be used
    pub is_valid: bool,

    /// Human-readable outcome
    pub message: String,

    /// The license, when one was found
    pub license: Option<EnterpriseLicense>,

    /// Usage limit breaches
    #[serde(default)]
    pub violations: Vec<UsageViolation>,

    /// Extra context (offending domain, grace-period counters, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Failure reason for invalid results
    pub failure: Option<ValidationFailure>,
}

impl ValidationResult {
    /// A passing result.
    pub fn valid(license: EnterpriseLicense) -> Self {
        Self {
            is_valid: true,
            message: "License is valid".to_string(),
            license: Some(license),
            violations: Vec::new(),
            metadata: Map::new(),
            failure: None,
        }
    }

    /// A failing result.
    pub fn invalid(
        failure: ValidationFailure,
        message: impl Into<String>,
        license: Option<EnterpriseLicense>,
    ) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
            license,
            violations: Vec::new(),
            metadata: Map::new(),
            failure: Some(failure),
        }
    }

    /// Generic failure used when a backend error interrupted validation.
    pub fn system_error() -> Self {
        Self::invalid(
            ValidationFailure::SystemError,
            "License validation failed due to a system error",
            None,
        )
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach usage violations.
    pub fn with_violations(mut self, violations: Vec<UsageViolation>) -> Self {
        self.violations = violations;
        self
    }
}

/// Pass/fail view of a license's usage limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageCheck {
    /// No limit is exceeded
    pub within_limits: bool,

    /// Breached limits
    pub violations: Vec<UsageViolation>,

    /// Current usage per limit key
    pub usage: BTreeMap<String, u64>,

    /// Limits as configured on the license
    pub limits: BTreeMap<String, Option<u64>>,
}

/// Usage breakdown for one limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceUsage {
    /// Current usage
    pub current: u64,

    /// Configured limit (None = unlimited)
    pub limit: Option<u64>,

    /// Share of the limit in use, 0 when unlimited
    pub percentage: f64,

    /// Headroom left (None = unlimited)
    pub remaining: Option<u64>,

    /// No cap applies
    pub unlimited: bool,
}

impl ResourceUsage {
    /// Compute the breakdown for `current` against `limit`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tenancy_license::ResourceUsage;
    ///
    /// let usage = ResourceUsage::compute(3, Some(4));
    /// assert_eq!(usage.percentage, 75.0);
    /// assert_eq!(usage.remaining, Some(1));
    ///
    /// let unlimited = ResourceUsage::compute(3, None);
    /// assert!(unlimited.unlimited);
    /// assert_eq!(unlimited.percentage, 0.0);
    /// ```
    pub fn compute(current: u64, limit: Option<u64>) -> Self {
        match limit {
            Some(limit) => {
                let percentage = if limit > 0 {
                    ((current as f64 / limit as f64) * 10_000.0).round() / 100.0
                } else {
                    0.0
                };
                Self {
                    current,
                    limit: Some(limit),
                    percentage,
                    remaining: Some(limit.saturating_sub(current)),
                    unlimited: false,
                }
            }
            None => Self {
                current,
                limit: None,
                percentage: 0.0,
                remaining: None,
                unlimited: true,
            },
        }
    }
}
