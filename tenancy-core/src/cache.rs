//! Cache layer
//!
//! A generic TTL key/value store used by every tenancy component for
//! read-heavy, short-lived results. Values are stored as JSON so any backend
//! (in-memory, Redis, memcached) can implement [`CacheStore`].
//!
//! Backends are not assumed to support wildcard or tag invalidation. Families
//! of entries that must be dropped together (all permission decisions of one
//! organization, all validation results of one license) are keyed through a
//! *generation token*: rotating the token makes every older key unreachable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{TenancyError, TenancyResult};

/// How long a generation token lives. Must outlive every TTL keyed by it.
pub const GENERATION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Cache backend trait.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live value.
    async fn get(&self, key: &str) -> TenancyResult<Option<Value>>;

    /// Store a value for `ttl`.
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> TenancyResult<()>;

    /// Drop a value. Forgetting a missing key is not an error.
    async fn forget(&self, key: &str) -> TenancyResult<()>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// In-memory cache implementation.
///
/// Suitable for single-process deployments and tests. Expiry is evaluated
/// lazily against the injected [`Clock`].
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache").finish_non_exhaustive()
    }
}

impl MemoryCache {
    /// Create a cache that uses wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache that reads time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Number of stored entries, including ones that have expired but were
    /// not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove expired entries.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> TenancyResult<Option<Value>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> TenancyResult<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| TenancyError::Cache(format!("TTL out of range: {}", e)))?;
        let entry = CacheEntry {
            value,
            expires_at: self.clock.now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn forget(&self, key: &str) -> TenancyResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Read and deserialize a cached value.
///
/// Backend and decoding errors are logged and reported as a miss.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn CacheStore, key: &str) -> Option<T> {
    match cache.get(key).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(key = %key, error = %e, "Cache read failed");
            None
        }
    }
}

/// Serialize and store a value. Failures are logged and swallowed.
pub async fn put_json<T: Serialize>(cache: &dyn CacheStore, key: &str, value: &T, ttl: Duration) {
    let value = match serde_json::to_value(value) {
        Ok(value) => value,
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to encode cache entry");
            return;
        }
    };
    if let Err(e) = cache.put(key, value, ttl).await {
        warn!(key = %key, error = %e, "Cache write failed");
    }
}

/// Forget a key. Failures are logged and swallowed so they never fail the
/// write that triggered the invalidation.
pub async fn forget_logged(cache: &dyn CacheStore, key: &str) {
    if let Err(e) = cache.forget(key).await {
        warn!(key = %key, error = %e, "Cache invalidation failed");
    }
}

/// Current generation token for a scope ("0" when none was ever issued).
pub async fn generation(cache: &dyn CacheStore, scope: &str) -> String {
    get_json::<String>(cache, &keys::generation(scope))
        .await
        .unwrap_or_else(|| "0".to_string())
}

/// Rotate the generation token for a scope, orphaning every key built from
/// the previous token.
pub async fn rotate_generation(cache: &dyn CacheStore, scope: &str) {
    let token = Uuid::now_v7().simple().to_string();
    put_json(cache, &keys::generation(scope), &token, GENERATION_TTL).await;
}

/// Drop every cached permission decision for an organization.
pub async fn invalidate_permissions(cache: &dyn CacheStore, organization_id: Uuid) {
    rotate_generation(cache, &keys::permission_scope(organization_id)).await;
}

/// Drop every cached validation result for a license key.
pub async fn invalidate_license_validation(cache: &dyn CacheStore, license_key: &str) {
    rotate_generation(cache, &keys::license_scope(license_key)).await;
}

/// Cache key builders.
///
/// Keys are namespaced per cached value so backends shared with other
/// applications do not collide.
pub mod keys {
    use uuid::Uuid;

    /// Generation token key for a scope.
    pub fn generation(scope: &str) -> String {
        format!("tenancy:gen:{}", scope)
    }

    /// Validation result for (license key, domain).
    ///
    /// A check without a domain and a check for any literal domain never
    /// share a key.
    pub fn license_validation(license_key: &str, generation: &str, domain: Option<&str>) -> String {
        let scope = domain.map_or_else(|| "nodomain".to_string(), |d| format!("d:{}", d));
        format!(
            "tenancy:license_validation:{}:{}:{}",
            license_key, generation, scope
        )
    }

    /// Materialized hierarchy tree rooted at an organization.
    pub fn hierarchy_tree(organization_id: Uuid) -> String {
        format!("tenancy:hierarchy_tree:{}", organization_id)
    }

    /// Usage metrics of an organization.
    pub fn organization_usage(organization_id: Uuid) -> String {
        format!("tenancy:org_usage:{}", organization_id)
    }

    /// Organizations a user belongs to.
    pub fn user_organizations(user_id: Uuid) -> String {
        format!("tenancy:user_orgs:{}", user_id)
    }

    /// A single permission decision.
    pub fn permission(organization_id: Uuid, generation: &str, user_id: Uuid, action: &str) -> String {
        format!(
            "tenancy:permission:{}:{}:{}:{}",
            organization_id, generation, user_id, action
        )
    }

    /// Generation scope covering all permission decisions of an organization.
    pub fn permission_scope(organization_id: Uuid) -> String {
        format!("permissions:{}", organization_id)
    }

    /// Generation scope covering all validation results of a license key.
    pub fn license_scope(license_key: &str) -> String {
        format!("license:{}", license_key)
    }
}
