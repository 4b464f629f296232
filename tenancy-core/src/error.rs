//! Error types for tenancy operations
//!
//! This module defines the error taxonomy shared by the hierarchy manager,
//! the access control resolver and the license engine.

use thiserror::Error;
use uuid::Uuid;

/// Tenancy error types.
///
/// Structural checks (adjacency, cycles, limits, last owner) run before any
/// write, so returning one of these never leaves partially applied state.
#[derive(Debug, Error)]
pub enum TenancyError {
    /// Malformed input or unrecognized enumeration value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parent/child hierarchy types are not an allowed pair
    #[error("Hierarchy violation: {parent} cannot contain {child}")]
    HierarchyViolation {
        /// Parent hierarchy type (or "none")
        parent: String,
        /// Child hierarchy type
        child: String,
    },

    /// Requested parent is the organization itself or one of its descendants
    #[error("Circular dependency: organization {organization_id} cannot be placed under {parent_id}")]
    CircularDependency {
        /// Organization being moved
        organization_id: Uuid,
        /// Requested parent
        parent_id: Uuid,
    },

    /// A license-driven resource cap would be exceeded
    #[error("Limit exceeded for {resource}: {current} of {limit}")]
    LimitExceeded {
        /// Resource type key (e.g. "child_organizations")
        resource: String,
        /// Configured limit
        limit: u64,
        /// Current count
        current: u64,
    },

    /// The organization's user limit has been reached
    #[error("User limit exceeded: organization allows {limit} active users")]
    UserLimitExceeded {
        /// Configured user limit
        limit: u64,
    },

    /// Attempt to detach or demote the sole active owner
    #[error("Cannot remove the last active owner of organization {0}")]
    LastOwner(Uuid),

    /// The user is already a member of the organization
    #[error("User {user_id} is already a member of organization {organization_id}")]
    DuplicateMembership {
        /// Organization ID
        organization_id: Uuid,
        /// User ID
        user_id: Uuid,
    },

    /// Role name is not recognized
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Organization still has child organizations
    #[error("Organization {0} has child organizations")]
    HasChildren(Uuid),

    /// Organization still owns live resources
    #[error("Organization {0} has active resources")]
    HasActiveResources(Uuid),

    /// Permission, feature or domain check failed
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Uniqueness or single-active constraint violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// License lifecycle transition is not allowed
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cache backend failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for tenancy operations.
pub type TenancyResult<T> = Result<T, TenancyError>;

impl TenancyError {
    /// Shorthand for a [`TenancyError::NotFound`] keyed by a UUID.
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        TenancyError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Check if this error should be logged at error level.
    ///
    /// Rule violations are expected outcomes and are not server errors.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            TenancyError::Storage(_) | TenancyError::Cache(_) | TenancyError::Config(_)
        )
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            TenancyError::Validation(_) | TenancyError::InvalidRole(_) => 422,

            TenancyError::HierarchyViolation { .. }
            | TenancyError::CircularDependency { .. }
            | TenancyError::LastOwner(_)
            | TenancyError::DuplicateMembership { .. }
            | TenancyError::HasChildren(_)
            | TenancyError::HasActiveResources(_)
            | TenancyError::Conflict(_)
            | TenancyError::InvalidTransition { .. } => 409,

            TenancyError::LimitExceeded { .. } | TenancyError::UserLimitExceeded { .. } => 403,
            TenancyError::AuthorizationDenied(_) => 403,
            TenancyError::NotFound { .. } => 404,

            TenancyError::Storage(_) | TenancyError::Cache(_) | TenancyError::Config(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            TenancyError::Validation(_) => "INVALID_DATA",
            TenancyError::HierarchyViolation { .. } => "HIERARCHY_VIOLATION",
            TenancyError::CircularDependency { .. } => "CIRCULAR_DEPENDENCY",
            TenancyError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            TenancyError::UserLimitExceeded { .. } => "USER_LIMIT_EXCEEDED",
            TenancyError::LastOwner(_) => "LAST_OWNER",
            TenancyError::DuplicateMembership { .. } => "DUPLICATE_MEMBERSHIP",
            TenancyError::InvalidRole(_) => "INVALID_ROLE",
            TenancyError::HasChildren(_) => "HAS_CHILDREN",
            TenancyError::HasActiveResources(_) => "HAS_ACTIVE_RESOURCES",
            TenancyError::AuthorizationDenied(_) => "AUTHORIZATION_DENIED",
            TenancyError::NotFound { .. } => "NOT_FOUND",
            TenancyError::Conflict(_) => "CONFLICT",
            TenancyError::InvalidTransition { .. } => "INVALID_TRANSITION",
            TenancyError::Storage(_) => "STORAGE_ERROR",
            TenancyError::Cache(_) => "CACHE_ERROR",
            TenancyError::Config(_) => "CONFIG_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(TenancyError::Validation("x".into()).status_code(), 422);
        assert_eq!(TenancyError::LastOwner(Uuid::nil()).status_code(), 409);
        assert_eq!(TenancyError::UserLimitExceeded { limit: 1 }.status_code(), 403);
        assert_eq!(TenancyError::not_found("organization", Uuid::nil()).status_code(), 404);
        assert_eq!(TenancyError::Storage("down".into()).status_code(), 500);
    }

    #[test]
    fn test_server_errors() {
        assert!(TenancyError::Storage("down".into()).is_server_error());
        assert!(!TenancyError::HasChildren(Uuid::nil()).is_server_error());
    }

    #[test]
    fn test_display() {
        let err = TenancyError::HierarchyViolation {
            parent: "top_branch".into(),
            child: "sub_user".into(),
        };
        assert_eq!(err.to_string(), "Hierarchy violation: top_branch cannot contain sub_user");
        assert_eq!(err.error_code(), "HIERARCHY_VIOLATION");
    }
}
