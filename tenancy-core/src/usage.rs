//! Usage metrics
//!
//! Live resource counts for an organization. The counts are produced by an
//! external collaborator (inventory, deployment tracking, ...) and consumed by
//! the license engine for limit enforcement and by the hierarchy manager when
//! deciding whether an organization still owns live resources.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::TenancyResult;

/// Resource types with usage counts and license limits.
///
/// # Examples
///
/// ```
/// use tenancy_core::ResourceType;
///
/// assert_eq!(ResourceType::parse("max_users"), Some(ResourceType::Users));
/// assert_eq!(ResourceType::parse("cloudProviders"), Some(ResourceType::CloudProviders));
/// assert_eq!(ResourceType::parse("bananas"), None);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Active organization members
    Users,
    /// Managed servers
    Servers,
    /// Deployed applications
    Applications,
    /// Attached domains
    Domains,
    /// Configured cloud provider credentials
    CloudProviders,
    /// Direct child organizations
    ChildOrganizations,
}

impl ResourceType {
    /// All resource types.
    pub fn all() -> [ResourceType; 6] {
        [
            ResourceType::Users,
            ResourceType::Servers,
            ResourceType::Applications,
            ResourceType::Domains,
            ResourceType::CloudProviders,
            ResourceType::ChildOrganizations,
        ]
    }

    /// Get string representation of the resource type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Users => "users",
            ResourceType::Servers => "servers",
            ResourceType::Applications => "applications",
            ResourceType::Domains => "domains",
            ResourceType::CloudProviders => "cloud_providers",
            ResourceType::ChildOrganizations => "child_organizations",
        }
    }

    /// Parse a resource type from a limit or usage key.
    ///
    /// Accepts the canonical name, a `max_` prefixed limit name and the
    /// camelCase spelling (`cloudProviders`).
    pub fn parse(s: &str) -> Option<Self> {
        let lowered = s.to_lowercase().replace(['-', '_'], "");
        let name = lowered.strip_prefix("max").unwrap_or(&lowered);
        match name {
            "users" => Some(ResourceType::Users),
            "servers" => Some(ResourceType::Servers),
            "applications" => Some(ResourceType::Applications),
            "domains" => Some(ResourceType::Domains),
            "cloudproviders" => Some(ResourceType::CloudProviders),
            "childorganizations" => Some(ResourceType::ChildOrganizations),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource counts for one organization.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageMetrics {
    /// Active members
    pub users: u64,
    /// Servers
    pub servers: u64,
    /// Applications
    pub applications: u64,
    /// Domains
    pub domains: u64,
    /// Cloud provider credentials
    pub cloud_providers: u64,
    /// Direct child organizations
    pub child_organizations: u64,
}

impl UsageMetrics {
    /// Count for one resource type.
    pub fn get(&self, resource: ResourceType) -> u64 {
        match resource {
            ResourceType::Users => self.users,
            ResourceType::Servers => self.servers,
            ResourceType::Applications => self.applications,
            ResourceType::Domains => self.domains,
            ResourceType::CloudProviders => self.cloud_providers,
            ResourceType::ChildOrganizations => self.child_organizations,
        }
    }

    /// Set the count for one resource type.
    pub fn set(&mut self, resource: ResourceType, count: u64) {
        let slot = match resource {
            ResourceType::Users => &mut self.users,
            ResourceType::Servers => &mut self.servers,
            ResourceType::Applications => &mut self.applications,
            ResourceType::Domains => &mut self.domains,
            ResourceType::CloudProviders => &mut self.cloud_providers,
            ResourceType::ChildOrganizations => &mut self.child_organizations,
        };
        *slot = count;
    }

    /// Builder-style [`UsageMetrics::set`].
    pub fn with(mut self, resource: ResourceType, count: u64) -> Self {
        self.set(resource, count);
        self
    }

    /// Resources that block a non-forced deletion: everything except members
    /// and child organizations, which are handled separately.
    pub fn active_resources(&self) -> u64 {
        self.servers + self.applications + self.domains + self.cloud_providers
    }
}

/// Usage metrics provider trait.
#[async_trait]
pub trait UsageProvider: Send + Sync {
    /// Current usage of an organization.
    async fn usage(&self, organization_id: Uuid) -> TenancyResult<UsageMetrics>;
}

/// In-memory usage provider.
///
/// Organizations without recorded usage report all-zero counts.
#[derive(Debug, Clone, Default)]
pub struct MemoryUsageProvider {
    usage: Arc<RwLock<HashMap<Uuid, UsageMetrics>>>,
}

impl MemoryUsageProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all counts for an organization.
    pub async fn set_metrics(&self, organization_id: Uuid, metrics: UsageMetrics) {
        self.usage.write().await.insert(organization_id, metrics);
    }

    /// Set a single count for an organization.
    pub async fn set(&self, organization_id: Uuid, resource: ResourceType, count: u64) {
        self.usage
            .write()
            .await
            .entry(organization_id)
            .or_default()
            .set(resource, count);
    }
}

#[async_trait]
impl UsageProvider for MemoryUsageProvider {
    async fn usage(&self, organization_id: Uuid) -> TenancyResult<UsageMetrics> {
        Ok(self
            .usage
            .read()
            .await
            .get(&organization_id)
            .copied()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_parse() {
        assert_eq!(ResourceType::parse("users"), Some(ResourceType::Users));
        assert_eq!(ResourceType::parse("max_child_organizations"), Some(ResourceType::ChildOrganizations));
        assert_eq!(ResourceType::parse("cloud_providers"), Some(ResourceType::CloudProviders));
        assert_eq!(ResourceType::parse("storage"), None);
    }

    #[test]
    fn test_resource_type_round_trip_names() {
        for resource in ResourceType::all() {
            assert_eq!(ResourceType::parse(resource.as_str()), Some(resource));
        }
    }

    #[test]
    fn test_active_resources_excludes_members() {
        let metrics = UsageMetrics::default()
            .with(ResourceType::Users, 10)
            .with(ResourceType::ChildOrganizations, 2)
            .with(ResourceType::Servers, 1);
        assert_eq!(metrics.active_resources(), 1);
    }

    #[tokio::test]
    async fn test_memory_provider_defaults_to_zero() {
        let provider = MemoryUsageProvider::new();
        let org = Uuid::now_v7();
        assert_eq!(provider.usage(org).await.unwrap(), UsageMetrics::default());

        provider.set(org, ResourceType::Servers, 3).await;
        assert_eq!(provider.usage(org).await.unwrap().servers, 3);
    }
}
