//! Membership domain model
//!
//! A membership links a user to an organization with a role and an explicit
//! permission set. There is at most one membership per (organization, user).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::roles::Role;

/// Organization membership linking a user to an organization.
///
/// # Examples
///
/// ```
/// use uuid::Uuid;
/// use tenancy_org::{Membership, Role};
///
/// let membership = Membership::new(Uuid::now_v7(), Uuid::now_v7(), Role::Custom)
///     .with_permissions(["deploy_applications"]);
/// assert!(membership.has_permission("deploy_applications"));
/// assert!(!membership.is_active_owner());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Membership {
    /// Unique membership ID
    pub id: Uuid,

    /// Organization ID
    pub organization_id: Uuid,

    /// User ID
    pub user_id: Uuid,

    /// Role within the organization
    pub role: Role,

    /// Explicit permission strings
    #[serde(default)]
    pub permissions: BTreeSet<String>,

    /// Whether the membership is active
    pub is_active: bool,

    /// When the user joined
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    /// Creates an active membership with no explicit permissions.
    pub fn new(organization_id: Uuid, user_id: Uuid, role: Role) -> Self {
        Self {
            id: Uuid::now_v7(),
            organization_id,
            user_id,
            role,
            permissions: BTreeSet::new(),
            is_active: true,
            joined_at: Utc::now(),
        }
    }

    /// Replace the explicit permission set.
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Check if this membership counts towards the owner invariant.
    pub fn is_active_owner(&self) -> bool {
        self.is_active && self.role.is_owner()
    }

    /// Check if an explicit permission is granted.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_owner() {
        let mut membership = Membership::new(Uuid::now_v7(), Uuid::now_v7(), Role::Owner);
        assert!(membership.is_active_owner());

        membership.is_active = false;
        assert!(!membership.is_active_owner());
    }

    #[test]
    fn test_permissions_deduplicate() {
        let membership = Membership::new(Uuid::now_v7(), Uuid::now_v7(), Role::Custom)
            .with_permissions(["view_servers", "view_servers", "manage_domains"]);
        assert_eq!(membership.permissions.len(), 2);
        assert!(membership.has_permission("manage_domains"));
    }
}
