//! # Tenancy Organizations
//!
//! Structural management of the four-tier organization hierarchy and of
//! organization memberships.
//!
//! ## Overview
//!
//! The tenancy-org crate handles:
//! - **Organizations**: Tenants at one of four hierarchy tiers
//! - **Hierarchy**: Adjacency rules, level bookkeeping, cycle prevention
//! - **Memberships**: User-organization links with a role and permission set
//! - **Roles**: Closed role enumeration (owner, admin, member, viewer, custom)
//! - **Trees**: Cached read-only materializations of a subtree
//!
//! ## Architecture
//!
//! ```text
//! top_branch (level 0)
//!   └─ master_branch (level 1)
//!        └─ sub_user (level 2)
//!             └─ end_user (level 3)
//! ```
//!
//! Organizations reference their parent by ID. The [`HierarchyManager`]
//! validates every structural change, then commits it as one [`ChangeSet`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use tenancy_core::{Clock, MemoryCache, MemoryUsageProvider, SystemClock, TenancyConfig};
//! use tenancy_license::{LicenseEngine, MemoryLicenseStore};
//! use tenancy_org::{HierarchyManager, MemoryOrganizationStore, NewOrganization, Role};
//! use uuid::Uuid;
//!
//! # async fn example() -> tenancy_core::TenancyResult<()> {
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//! let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
//! let usage = Arc::new(MemoryUsageProvider::new());
//! let licenses = Arc::new(LicenseEngine::new(
//!     Arc::new(MemoryLicenseStore::new()),
//!     usage.clone(),
//!     cache.clone(),
//!     clock.clone(),
//!     TenancyConfig::from_env(),
//! )?);
//! let manager = HierarchyManager::new(
//!     Arc::new(MemoryOrganizationStore::new()),
//!     licenses,
//!     usage,
//!     cache,
//!     clock,
//! );
//!
//! let owner = Uuid::now_v7();
//! let root = manager
//!     .create_organization(NewOrganization::new("Acme", "acme", "top_branch").with_owner(owner), None)
//!     .await?;
//! let branch = manager
//!     .create_organization(NewOrganization::new("Acme EU", "acme-eu", "master_branch"), Some(root.id))
//!     .await?;
//! manager
//!     .attach_user(root.id, Uuid::now_v7(), Role::Member, BTreeSet::new())
//!     .await?;
//! assert_eq!(branch.hierarchy_level, 1);
//! # Ok(())
//! # }
//! ```

pub mod hierarchy;
pub mod manager;
pub mod membership;
pub mod organization;
pub mod roles;
pub mod store;
pub mod tree;

// Re-export main types for convenience
pub use hierarchy::HierarchyType;
pub use manager::HierarchyManager;
pub use membership::Membership;
pub use organization::{NewOrganization, Organization, OrganizationUpdate};
pub use roles::Role;
pub use store::{ChangeSet, MemoryOrganizationStore, OrganizationStore};
pub use tree::TreeNode;
