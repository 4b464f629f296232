//! # Actions
//!
//! The catalogue of organization-scoped actions, and the license feature each
//! gated action requires.
//!
//! Access checks take action names as strings so that custom permission sets
//! can name actions outside this catalogue; the catalogue only drives the
//! feature gate and the role default table.

use serde::{Deserialize, Serialize};
use tenancy_license::features;

/// Actions that can be performed within an organization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// View servers
    ViewServers,
    /// Add, change or remove servers
    ManageServers,
    /// View applications
    ViewApplications,
    /// Deploy applications
    DeployApplications,
    /// Configure applications
    ManageApplications,
    /// Provision cloud infrastructure
    ProvisionInfrastructure,
    /// Attach and configure domains
    ManageDomains,
    /// Edit white-label branding
    ManageWhiteLabel,
    /// Use the public API
    UseApi,
    /// Run Terraform integrations
    ManageTerraform,
    /// Configure payment processing
    ManagePayments,
    /// View advanced analytics
    ViewAnalytics,
    /// Configure single sign-on
    ConfigureSso,
    /// Create child organizations
    CreateChildOrganization,
    /// Read audit logs
    ViewAuditLogs,
    /// Invite, remove and re-role members
    ManageMembers,
    /// Change organization settings
    ManageOrganization,
    /// Delete the organization
    DeleteOrganization,
    /// Manage billing
    ManageBilling,
    /// Manage licenses
    ManageLicenses,
}

/// Actions permitted when the organization has no valid license.
pub const BASIC_ACTIONS: [Action; 2] = [Action::ViewServers, Action::ViewApplications];

impl Action {
    /// Get the string representation of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ViewServers => "view_servers",
            Action::ManageServers => "manage_servers",
            Action::ViewApplications => "view_applications",
            Action::DeployApplications => "deploy_applications",
            Action::ManageApplications => "manage_applications",
            Action::ProvisionInfrastructure => "provision_infrastructure",
            Action::ManageDomains => "manage_domains",
            Action::ManageWhiteLabel => "manage_white_label",
            Action::UseApi => "use_api",
            Action::ManageTerraform => "manage_terraform",
            Action::ManagePayments => "manage_payments",
            Action::ViewAnalytics => "view_analytics",
            Action::ConfigureSso => "configure_sso",
            Action::CreateChildOrganization => "create_child_organization",
            Action::ViewAuditLogs => "view_audit_logs",
            Action::ManageMembers => "manage_members",
            Action::ManageOrganization => "manage_organization",
            Action::DeleteOrganization => "delete_organization",
            Action::ManageBilling => "manage_billing",
            Action::ManageLicenses => "manage_licenses",
        }
    }

    /// Parse an action name (case-insensitive).
    ///
    /// # Example
    ///
    /// ```
    /// use tenancy_rbac::Action;
    ///
    /// assert_eq!(Action::parse("view_servers"), Some(Action::ViewServers));
    /// assert_eq!(Action::parse("Use_Api"), Some(Action::UseApi));
    /// assert_eq!(Action::parse("fly"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let lowered = s.trim().to_lowercase();
        Self::all().into_iter().find(|a| a.as_str() == lowered)
    }

    /// Get all actions.
    pub fn all() -> Vec<Self> {
        vec![
            Action::ViewServers,
            Action::ManageServers,
            Action::ViewApplications,
            Action::DeployApplications,
            Action::ManageApplications,
            Action::ProvisionInfrastructure,
            Action::ManageDomains,
            Action::ManageWhiteLabel,
            Action::UseApi,
            Action::ManageTerraform,
            Action::ManagePayments,
            Action::ViewAnalytics,
            Action::ConfigureSso,
            Action::CreateChildOrganization,
            Action::ViewAuditLogs,
            Action::ManageMembers,
            Action::ManageOrganization,
            Action::DeleteOrganization,
            Action::ManageBilling,
            Action::ManageLicenses,
        ]
    }

    /// License feature this action requires, if it is feature-gated.
    ///
    /// # Example
    ///
    /// ```
    /// use tenancy_rbac::Action;
    ///
    /// assert_eq!(
    ///     Action::ProvisionInfrastructure.required_feature(),
    ///     Some("infrastructure_provisioning")
    /// );
    /// assert_eq!(Action::ViewServers.required_feature(), None);
    /// ```
    pub fn required_feature(&self) -> Option<&'static str> {
        match self {
            Action::ProvisionInfrastructure => Some(features::INFRASTRUCTURE_PROVISIONING),
            Action::ManageDomains => Some(features::DOMAIN_MANAGEMENT),
            Action::ManageWhiteLabel => Some(features::WHITE_LABEL),
            Action::UseApi => Some(features::API_ACCESS),
            Action::ManageTerraform => Some(features::TERRAFORM_INTEGRATION),
            Action::ManagePayments => Some(features::PAYMENT_PROCESSING),
            Action::ViewAnalytics => Some(features::ADVANCED_ANALYTICS),
            Action::ConfigureSso => Some(features::SSO),
            Action::CreateChildOrganization => Some(features::MULTI_TENANCY),
            Action::ViewAuditLogs => Some(features::AUDIT_LOGS),
            _ => None,
        }
    }

    /// Check if the action is allowed without a valid license.
    pub fn is_basic(&self) -> bool {
        BASIC_ACTIONS.contains(self)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature required by an action name, if the name is a gated catalogue
/// action.
pub fn required_feature(action: &str) -> Option<&'static str> {
    Action::parse(action).and_then(|a| a.required_feature())
}

/// Check if an action name is in the basic set.
pub fn is_basic_action(action: &str) -> bool {
    Action::parse(action).is_some_and(|a| a.is_basic())
}
