//! Membership roles
//!
//! The role enumeration is closed. `Custom` memberships carry no default
//! grants; they are resolved purely from their explicit permission set.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tenancy_core::TenancyError;

/// User role within an organization.
///
/// # Examples
///
/// ```
/// use tenancy_org::Role;
///
/// assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
/// assert!("superuser".parse::<Role>().is_err());
/// assert!(Role::Owner.is_owner());
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full control of the organization
    Owner,
    /// Everything except ownership-level operations
    Admin,
    /// Day-to-day application work
    Member,
    /// Read-only
    Viewer,
    /// Explicit permission set only
    Custom,
}

impl Role {
    /// All roles.
    pub fn all() -> [Role; 5] {
        [Role::Owner, Role::Admin, Role::Member, Role::Viewer, Role::Custom]
    }

    /// Check if this is the owner role.
    pub fn is_owner(&self) -> bool {
        matches!(self, Role::Owner)
    }

    /// Parse role from string representation (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            "viewer" => Some(Self::Viewer),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// Get string representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Viewer => "viewer",
            Self::Custom => "custom",
        }
    }

    /// Get a human-readable display name for the role.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Owner => "Owner",
            Self::Admin => "Admin",
            Self::Member => "Member",
            Self::Viewer => "Viewer",
            Self::Custom => "Custom",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Viewer
    }
}

impl FromStr for Role {
    type Err = TenancyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| TenancyError::InvalidRole(s.to_string()))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
