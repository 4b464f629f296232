//! # Tenancy Licensing
//!
//! Enterprise license management for multi-tenant deployments.
//!
//! ## Overview
//!
//! The tenancy-license crate handles:
//! - **Licenses**: Keyed entitlements issued to an organization
//! - **Tiers**: Basic / Professional / Enterprise default features and limits
//! - **Keys**: Secret-salted, dash-grouped license key derivation
//! - **Validation**: Status, expiry with grace period, domain and usage checks
//! - **Lifecycle**: Activate, suspend, revoke and renew
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenancy_core::{MemoryCache, MemoryUsageProvider, SystemClock, TenancyConfig};
//! use tenancy_license::{LicenseConfig, LicenseEngine, LicenseTier, LicenseType, MemoryLicenseStore};
//! use uuid::Uuid;
//!
//! # async fn example() -> tenancy_core::TenancyResult<()> {
//! let engine = LicenseEngine::new(
//!     Arc::new(MemoryLicenseStore::new()),
//!     Arc::new(MemoryUsageProvider::new()),
//!     Arc::new(MemoryCache::new()),
//!     Arc::new(SystemClock),
//!     TenancyConfig::from_env(),
//! )?;
//!
//! let license = engine
//!     .issue_license(
//!         Uuid::now_v7(),
//!         LicenseConfig::new(LicenseType::Subscription, LicenseTier::Professional)
//!             .with_domains(["*.acme.com"]),
//!     )
//!     .await?;
//!
//! let result = engine.validate_license(&license.license_key, Some("app.acme.com")).await;
//! assert!(result.is_valid);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod key;
pub mod license;
pub mod store;
pub mod tiers;
pub mod validation;

// Re-export main types for convenience
pub use engine::LicenseEngine;
pub use key::LicenseKeyGenerator;
pub use license::{EnterpriseLicense, LicenseConfig, LicenseStatus};
pub use store::{LicenseStore, MemoryLicenseStore};
pub use tiers::{features, LicenseTier, LicenseType};
pub use validation::{
    ResourceUsage, UsageCheck, UsageViolation, ValidationFailure, ValidationResult,
};
