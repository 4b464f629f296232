//! Materialized hierarchy trees

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::hierarchy::HierarchyType;
use crate::organization::Organization;

/// Read-only snapshot of an organization and its active descendants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeNode {
    /// Organization ID
    pub id: Uuid,

    /// Organization name
    pub name: String,

    /// Hierarchy tier
    #[serde(rename = "type")]
    pub hierarchy_type: HierarchyType,

    /// Depth from the root
    pub level: u32,

    /// Active memberships in this organization
    pub active_user_count: usize,

    /// Organization active flag
    pub is_active: bool,

    /// Active children, oldest first
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Build the node for `org` from pre-loaded child lists and member counts.
    pub(crate) fn assemble(
        org: &Organization,
        children_of: &HashMap<Uuid, Vec<Organization>>,
        active_users: &HashMap<Uuid, usize>,
    ) -> Self {
        let children = children_of
            .get(&org.id)
            .map(|children| {
                children
                    .iter()
                    .map(|child| Self::assemble(child, children_of, active_users))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: org.id,
            name: org.name.clone(),
            hierarchy_type: org.hierarchy_type,
            level: org.hierarchy_level,
            active_user_count: active_users.get(&org.id).copied().unwrap_or(0),
            is_active: org.is_active,
            children,
        }
    }

    /// Number of nodes in this subtree, including this one.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }

    /// Find a node by organization ID.
    pub fn find(&self, id: Uuid) -> Option<&TreeNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}
