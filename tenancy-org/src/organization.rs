//! Organization domain models
//!
//! This module provides the Organization entity and the inputs used to create
//! and update one. Organizations reference their parent by ID only; the tree is
//! materialized on demand by the hierarchy manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tenancy_core::{TenancyError, TenancyResult};
use uuid::Uuid;

use crate::hierarchy::HierarchyType;

/// An organization is a tenant at one tier of the hierarchy.
///
/// # Examples
///
/// ```
/// use tenancy_org::{HierarchyType, Organization};
///
/// let org = Organization::new("Acme Corp", "acme-corp", HierarchyType::TopBranch);
/// assert!(org.is_root());
/// assert_eq!(org.hierarchy_level, 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    /// Unique identifier for the organization
    pub id: Uuid,

    /// Human-readable name
    pub name: String,

    /// URL-friendly slug (unique across the platform)
    pub slug: String,

    /// Tier in the hierarchy
    pub hierarchy_type: HierarchyType,

    /// Depth from the root (root = 0)
    pub hierarchy_level: u32,

    /// Parent organization, if any
    pub parent_id: Option<Uuid>,

    /// Whether the organization is active
    pub is_active: bool,

    /// Branding configuration, owned by the white-label subsystem
    #[serde(default)]
    pub branding: serde_json::Value,

    /// Feature flag overrides, owned by the feature-flag subsystem
    #[serde(default)]
    pub feature_flags: serde_json::Value,

    /// When the organization was created
    pub created_at: DateTime<Utc>,

    /// When the organization was last updated
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Organization {
    /// Creates an active root organization.
    pub fn new(name: impl Into<String>, slug: impl Into<String>, hierarchy_type: HierarchyType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            slug: slug.into(),
            hierarchy_type,
            hierarchy_level: 0,
            parent_id: None,
            is_active: true,
            branding: serde_json::Value::Null,
            feature_flags: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Check if the organization has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Check if the organization has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for creating an organization.
///
/// The hierarchy type is kept as a string until validation so that an
/// unrecognized value surfaces as a validation error rather than a
/// deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrganization {
    /// Organization name
    pub name: String,

    /// Unique slug
    pub slug: String,

    /// Hierarchy type name (`top_branch`, `master_branch`, ...)
    pub hierarchy_type: String,

    /// User attached as owner in the same commit
    pub owner_id: Option<Uuid>,

    /// Initial branding blob
    #[serde(default)]
    pub branding: serde_json::Value,

    /// Initial feature flag blob
    #[serde(default)]
    pub feature_flags: serde_json::Value,
}

impl NewOrganization {
    /// Creates the input for an organization without an owner.
    pub fn new(
        name: impl Into<String>,
        slug: impl Into<String>,
        hierarchy_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            hierarchy_type: hierarchy_type.into(),
            owner_id: None,
            branding: serde_json::Value::Null,
            feature_flags: serde_json::Value::Null,
        }
    }

    /// Attach `owner_id` as owner on creation.
    pub fn with_owner(mut self, owner_id: Uuid) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Validate required fields and resolve the hierarchy type.
    pub fn validate(&self) -> TenancyResult<HierarchyType> {
        validate_name(&self.name)?;
        if self.slug.is_empty()
            || !self
                .slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            || self.slug.starts_with('-')
            || self.slug.ends_with('-')
        {
            return Err(TenancyError::Validation(format!(
                "invalid slug: {:?} (lowercase letters, digits and inner dashes only)",
                self.slug
            )));
        }
        self.hierarchy_type.parse()
    }
}

/// Partial update of an organization's mutable attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizationUpdate {
    /// New name
    pub name: Option<String>,

    /// New active flag
    pub is_active: Option<bool>,

    /// Replacement branding blob
    pub branding: Option<serde_json::Value>,

    /// Replacement feature flag blob
    pub feature_flags: Option<serde_json::Value>,
}

impl OrganizationUpdate {
    /// Apply the update in place.
    pub(crate) fn apply(self, org: &mut Organization) -> TenancyResult<()> {
        if let Some(name) = self.name {
            validate_name(&name)?;
            org.name = name;
        }
        if let Some(is_active) = self.is_active {
            org.is_active = is_active;
        }
        if let Some(branding) = self.branding {
            org.branding = branding;
        }
        if let Some(feature_flags) = self.feature_flags {
            org.feature_flags = feature_flags;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> TenancyResult<()> {
    if name.trim().is_empty() {
        return Err(TenancyError::Validation(
            "organization name is required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_organization_validation() {
        let input = NewOrganization::new("Acme", "acme", "top_branch");
        assert_eq!(input.validate().unwrap(), HierarchyType::TopBranch);

        let input = NewOrganization::new("  ", "acme", "top_branch");
        assert!(matches!(input.validate(), Err(TenancyError::Validation(_))));

        let input = NewOrganization::new("Acme", "Acme Corp", "top_branch");
        assert!(matches!(input.validate(), Err(TenancyError::Validation(_))));

        let input = NewOrganization::new("Acme", "acme", "region");
        assert!(matches!(input.validate(), Err(TenancyError::Validation(_))));
    }

    #[test]
    fn test_update_apply() {
        let mut org = Organization::new("Acme", "acme", HierarchyType::TopBranch);
        OrganizationUpdate {
            name: Some("Acme Holdings".into()),
            is_active: Some(false),
            ..Default::default()
        }
        .apply(&mut org)
        .unwrap();

        assert_eq!(org.name, "Acme Holdings");
        assert!(!org.is_active);
        assert_eq!(org.slug, "acme");

        let err = OrganizationUpdate {
            name: Some(String::new()),
            ..Default::default()
        }
        .apply(&mut org);
        assert!(err.is_err());
    }
}
