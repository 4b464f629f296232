//! Access control resolver
//!
//! Decisions are evaluated in a fixed order, each step short-circuiting:
//!
//! ```text
//! membership ─→ license feature gate ─→ role defaults ─→ custom permissions
//! ```
//!
//! Boolean decisions are cached per (organization, user, action) under the
//! organization's permission generation, which membership changes and license
//! status changes rotate.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tenancy_core::cache::{self, keys};
use tenancy_core::{CacheStore, CacheTtls, TenancyError, TenancyResult};
use tenancy_license::LicenseEngine;
use tenancy_org::HierarchyManager;
use tracing::{debug, error};
use uuid::Uuid;

use crate::actions::{self, Action};
use crate::policy;

/// Outcome of an access check, with the reason for a denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Access granted
    Allowed,
    /// The user has no active membership in the organization
    NotMember,
    /// No valid license; only basic actions are available
    Unlicensed,
    /// The license lacks the feature the action requires
    FeatureNotLicensed {
        /// Missing feature flag
        feature: String,
    },
    /// The membership's role does not grant the action
    RoleDenied,
}

impl Decision {
    /// Check if access was granted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    /// Human-readable reason for a denial.
    pub fn reason(&self) -> String {
        match self {
            Decision::Allowed => "allowed".to_string(),
            Decision::NotMember => "not an active member of the organization".to_string(),
            Decision::Unlicensed => "organization has no valid license".to_string(),
            Decision::FeatureNotLicensed { feature } => {
                format!("license does not include feature {}", feature)
            }
            Decision::RoleDenied => "role does not permit this action".to_string(),
        }
    }
}

/// Access control resolver.
pub struct AccessResolver {
    hierarchy: Arc<HierarchyManager>,
    licenses: Arc<LicenseEngine>,
    cache: Arc<dyn CacheStore>,
    ttls: CacheTtls,
}

impl AccessResolver {
    /// Create a resolver.
    pub fn new(
        hierarchy: Arc<HierarchyManager>,
        licenses: Arc<LicenseEngine>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        let ttls = licenses.config().cache.clone();
        Self {
            hierarchy,
            licenses,
            cache,
            ttls,
        }
    }

    /// Check whether a user may perform an action in an organization.
    ///
    /// `resource` names the target of the action for logging; it does not
    /// change the decision. Backend failures deny without caching.
    pub async fn can_perform(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        action: &str,
        resource: Option<&str>,
    ) -> bool {
        let generation = cache::generation(
            self.cache.as_ref(),
            &keys::permission_scope(organization_id),
        )
        .await;
        let key = keys::permission(organization_id, &generation, user_id, action);
        if let Some(allowed) = cache::get_json::<bool>(self.cache.as_ref(), &key).await {
            return allowed;
        }

        let decision = match self.decide(user_id, organization_id, action).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(
                    user_id = %user_id,
                    organization_id = %organization_id,
                    action,
                    error = %e,
                    "Permission check failed"
                );
                return false;
            }
        };

        debug!(
            user_id = %user_id,
            organization_id = %organization_id,
            action,
            resource = ?resource,
            decision = ?decision,
            "Permission evaluated"
        );

        let allowed = decision.is_allowed();
        cache::put_json(self.cache.as_ref(), &key, &allowed, self.ttls.permission()).await;
        allowed
    }

    /// Like [`can_perform`](Self::can_perform), but returns an
    /// `AuthorizationDenied` error carrying the reason on denial.
    pub async fn authorize(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        action: &str,
    ) -> TenancyResult<()> {
        match self.decide(user_id, organization_id, action).await? {
            Decision::Allowed => Ok(()),
            denied => Err(TenancyError::AuthorizationDenied(format!(
                "{}: {}",
                action,
                denied.reason()
            ))),
        }
    }

    /// Evaluate an access check without the decision cache.
    pub async fn decide(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        action: &str,
    ) -> TenancyResult<Decision> {
        let Some(membership) = self
            .hierarchy
            .active_membership(organization_id, user_id)
            .await?
        else {
            return Ok(Decision::NotMember);
        };

        match self.licenses.valid_license(organization_id).await? {
            None if !actions::is_basic_action(action) => return Ok(Decision::Unlicensed),
            None => {}
            Some(license) => {
                if let Some(feature) = actions::required_feature(action) {
                    if !license.has_feature(feature) {
                        return Ok(Decision::FeatureNotLicensed {
                            feature: feature.to_string(),
                        });
                    }
                }
            }
        }

        if policy::membership_allows(&membership, action) {
            Ok(Decision::Allowed)
        } else {
            Ok(Decision::RoleDenied)
        }
    }

    /// Catalogue actions the user may currently perform in an organization.
    pub async fn allowed_actions(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> TenancyResult<Vec<Action>> {
        let mut allowed = Vec::new();
        for action in Action::all() {
            if self
                .decide(user_id, organization_id, action.as_str())
                .await?
                .is_allowed()
            {
                allowed.push(action);
            }
        }
        Ok(allowed)
    }
}
