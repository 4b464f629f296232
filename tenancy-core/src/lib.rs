//! # Tenancy Core
//!
//! Shared collaborators for the tenancy crates: the error taxonomy, the cache
//! layer, the clock, usage metrics and configuration.
//!
//! ## Overview
//!
//! ```text
//! tenancy-rbac ──→ tenancy-org ──→ tenancy-license ──→ tenancy-core
//!       └──────────────────────────────↗
//! ```
//!
//! Every component reads time through [`Clock`], caches through
//! [`CacheStore`] and reads live resource counts through [`UsageProvider`].
//! In-memory implementations of all three ship with this crate.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenancy_core::{MemoryCache, MemoryUsageProvider, SystemClock, TenancyConfig};
//!
//! let config = TenancyConfig::from_env();
//! let clock = Arc::new(SystemClock);
//! let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
//! let usage = Arc::new(MemoryUsageProvider::new());
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod usage;

// Re-export main types for convenience
pub use cache::{CacheStore, MemoryCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheTtls, ConfigError, TenancyConfig};
pub use error::{TenancyError, TenancyResult};
pub use usage::{MemoryUsageProvider, ResourceType, UsageMetrics, UsageProvider};
