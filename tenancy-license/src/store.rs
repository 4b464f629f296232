//! License persistence
//!
//! The [`LicenseStore`] trait is the durable-store seam of the license engine.
//! [`MemoryLicenseStore`] backs single-process deployments and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tenancy_core::{TenancyError, TenancyResult};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::license::{EnterpriseLicense, LicenseStatus};

/// License store trait.
#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// Persist a new license. Fails with `Conflict` on a duplicate key.
    async fn insert(&self, license: EnterpriseLicense) -> TenancyResult<()>;

    /// Replace a stored license.
    async fn update(&self, license: &EnterpriseLicense) -> TenancyResult<()>;

    /// Look up by ID.
    async fn find(&self, id: Uuid) -> TenancyResult<Option<EnterpriseLicense>>;

    /// Look up by license key.
    async fn find_by_key(&self, license_key: &str) -> TenancyResult<Option<EnterpriseLicense>>;

    /// All licenses of an organization, oldest first.
    async fn for_organization(&self, organization_id: Uuid) -> TenancyResult<Vec<EnterpriseLicense>>;

    /// Set the lifecycle status.
    async fn set_status(&self, id: Uuid, status: LicenseStatus) -> TenancyResult<()>;

    /// Record a successful validation.
    async fn touch_validated(&self, id: Uuid, at: DateTime<Utc>) -> TenancyResult<()>;
}

/// In-memory license store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLicenseStore {
    licenses: Arc<RwLock<HashMap<Uuid, EnterpriseLicense>>>,
}

impl MemoryLicenseStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LicenseStore for MemoryLicenseStore {
    async fn insert(&self, license: EnterpriseLicense) -> TenancyResult<()> {
        let mut licenses = self.licenses.write().await;
        if licenses.values().any(|l| l.license_key == license.license_key) {
            return Err(TenancyError::Conflict(format!(
                "license key {} already exists",
                license.license_key
            )));
        }
        licenses.insert(license.id, license);
        Ok(())
    }

    async fn update(&self, license: &EnterpriseLicense) -> TenancyResult<()> {
        let mut licenses = self.licenses.write().await;
        match licenses.get_mut(&license.id) {
            Some(stored) => {
                *stored = license.clone();
                Ok(())
            }
            None => Err(TenancyError::not_found("license", license.id)),
        }
    }

    async fn find(&self, id: Uuid) -> TenancyResult<Option<EnterpriseLicense>> {
        Ok(self.licenses.read().await.get(&id).cloned())
    }

    async fn find_by_key(&self, license_key: &str) -> TenancyResult<Option<EnterpriseLicense>> {
        Ok(self
            .licenses
            .read()
            .await
            .values()
            .find(|l| l.license_key == license_key)
            .cloned())
    }

    async fn for_organization(&self, organization_id: Uuid) -> TenancyResult<Vec<EnterpriseLicense>> {
        let mut found: Vec<EnterpriseLicense> = self
            .licenses
            .read()
            .await
            .values()
            .filter(|l| l.organization_id == organization_id)
            .cloned()
            .collect();
        found.sort_by_key(|l| (l.issued_at, l.id));
        Ok(found)
    }

    async fn set_status(&self, id: Uuid, status: LicenseStatus) -> TenancyResult<()> {
        let mut licenses = self.licenses.write().await;
        let license = licenses
            .get_mut(&id)
            .ok_or_else(|| TenancyError::not_found("license", id))?;
        license.status = status;
        Ok(())
    }

    async fn touch_validated(&self, id: Uuid, at: DateTime<Utc>) -> TenancyResult<()> {
        let mut licenses = self.licenses.write().await;
        let license = licenses
            .get_mut(&id)
            .ok_or_else(|| TenancyError::not_found("license", id))?;
        license.last_validated_at = Some(at);
        Ok(())
    }
}
