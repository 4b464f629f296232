//! Role default table
//!
//! | Role   | Allowed                                                    |
//! |--------|------------------------------------------------------------|
//! | owner  | everything                                                 |
//! | admin  | everything except [`ADMIN_RESTRICTED`]                     |
//! | member | [`MEMBER_ACTIONS`]                                         |
//! | viewer | [`VIEWER_ACTIONS`]                                         |
//! | custom | only the membership's explicit permission set              |

use tenancy_org::{Membership, Role};

use crate::actions::Action;

/// Actions an admin may never perform.
pub const ADMIN_RESTRICTED: [Action; 3] = [
    Action::DeleteOrganization,
    Action::ManageBilling,
    Action::ManageLicenses,
];

/// Actions granted to members.
pub const MEMBER_ACTIONS: [Action; 4] = [
    Action::ViewServers,
    Action::ViewApplications,
    Action::DeployApplications,
    Action::ManageApplications,
];

/// Actions granted to viewers.
pub const VIEWER_ACTIONS: [Action; 2] = [Action::ViewServers, Action::ViewApplications];

fn listed(list: &[Action], action: &str) -> bool {
    list.iter().any(|a| a.as_str() == action)
}

/// Default decision for a role.
///
/// # Returns
///
/// `None` for [`Role::Custom`], which has no defaults
pub fn role_allows(role: Role, action: &str) -> Option<bool> {
    match role {
        Role::Owner => Some(true),
        Role::Admin => Some(!listed(&ADMIN_RESTRICTED, action)),
        Role::Member => Some(listed(&MEMBER_ACTIONS, action)),
        Role::Viewer => Some(listed(&VIEWER_ACTIONS, action)),
        Role::Custom => None,
    }
}

/// Role decision for a membership, falling back to its explicit permission
/// set when the role has no defaults.
pub fn membership_allows(membership: &Membership, action: &str) -> bool {
    role_allows(membership.role, action).unwrap_or_else(|| membership.has_permission(action))
}
