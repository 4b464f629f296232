//! Hierarchy types and the adjacency table
//!
//! Organizations form a strict four-tier tree:
//!
//! ```text
//! top_branch ─→ master_branch ─→ sub_user ─→ end_user
//! ```
//!
//! A parent may only contain organizations of the next tier down, and
//! end_user organizations never have children.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tenancy_core::TenancyError;

/// Tier of an organization in the hierarchy.
///
/// # Examples
///
/// ```
/// use tenancy_org::HierarchyType;
///
/// assert!(HierarchyType::TopBranch.can_contain(HierarchyType::MasterBranch));
/// assert!(!HierarchyType::TopBranch.can_contain(HierarchyType::SubUser));
/// assert_eq!(HierarchyType::EndUser.allowed_child(), None);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyType {
    /// Root tier
    TopBranch,
    /// Second tier, under a top branch
    MasterBranch,
    /// Third tier, under a master branch
    SubUser,
    /// Leaf tier
    EndUser,
}

impl HierarchyType {
    /// All hierarchy types, top to bottom.
    pub fn all() -> [HierarchyType; 4] {
        [
            HierarchyType::TopBranch,
            HierarchyType::MasterBranch,
            HierarchyType::SubUser,
            HierarchyType::EndUser,
        ]
    }

    /// The only type this type may contain.
    pub fn allowed_child(&self) -> Option<HierarchyType> {
        match self {
            HierarchyType::TopBranch => Some(HierarchyType::MasterBranch),
            HierarchyType::MasterBranch => Some(HierarchyType::SubUser),
            HierarchyType::SubUser => Some(HierarchyType::EndUser),
            HierarchyType::EndUser => None,
        }
    }

    /// Check if `child` may be placed directly under this type.
    pub fn can_contain(&self, child: HierarchyType) -> bool {
        self.allowed_child() == Some(child)
    }

    /// Check if this type may have children at all.
    pub fn can_have_children(&self) -> bool {
        self.allowed_child().is_some()
    }

    /// Parse a hierarchy type, accepting `snake_case`, `kebab-case` and
    /// spaced spellings in any case.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "top_branch" => Some(Self::TopBranch),
            "master_branch" => Some(Self::MasterBranch),
            "sub_user" => Some(Self::SubUser),
            "end_user" => Some(Self::EndUser),
            _ => None,
        }
    }

    /// Get string representation of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopBranch => "top_branch",
            Self::MasterBranch => "master_branch",
            Self::SubUser => "sub_user",
            Self::EndUser => "end_user",
        }
    }
}

impl FromStr for HierarchyType {
    type Err = TenancyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| TenancyError::Validation(format!("unrecognized hierarchy type: {:?}", s)))
    }
}

impl std::fmt::Display for HierarchyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that `child` may sit under `parent`, or at the root when `parent`
/// is `None`.
pub(crate) fn ensure_adjacent(
    parent: Option<HierarchyType>,
    child: HierarchyType,
) -> Result<(), TenancyError> {
    match parent {
        Some(parent) if !parent.can_contain(child) => Err(TenancyError::HierarchyViolation {
            parent: parent.to_string(),
            child: child.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacency_table_is_exhaustive() {
        let allowed = [
            (HierarchyType::TopBranch, HierarchyType::MasterBranch),
            (HierarchyType::MasterBranch, HierarchyType::SubUser),
            (HierarchyType::SubUser, HierarchyType::EndUser),
        ];
        for parent in HierarchyType::all() {
            for child in HierarchyType::all() {
                assert_eq!(
                    parent.can_contain(child),
                    allowed.contains(&(parent, child)),
                    "{} -> {}",
                    parent,
                    child
                );
            }
        }
    }

    #[test]
    fn test_end_user_is_a_leaf() {
        assert!(!HierarchyType::EndUser.can_have_children());
        assert!(HierarchyType::SubUser.can_have_children());
    }

    #[test]
    fn test_parse() {
        assert_eq!(HierarchyType::parse("top_branch"), Some(HierarchyType::TopBranch));
        assert_eq!(HierarchyType::parse("Master-Branch"), Some(HierarchyType::MasterBranch));
        assert_eq!(HierarchyType::parse("END USER"), Some(HierarchyType::EndUser));
        assert_eq!(HierarchyType::parse("branch"), None);
        assert!("middle".parse::<HierarchyType>().is_err());
    }

    #[test]
    fn test_ensure_adjacent() {
        assert!(ensure_adjacent(None, HierarchyType::SubUser).is_ok());
        assert!(ensure_adjacent(Some(HierarchyType::SubUser), HierarchyType::EndUser).is_ok());
        assert!(matches!(
            ensure_adjacent(Some(HierarchyType::TopBranch), HierarchyType::SubUser),
            Err(TenancyError::HierarchyViolation { .. })
        ));
    }
}
