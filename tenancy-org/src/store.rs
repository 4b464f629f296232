//! Organization and membership persistence
//!
//! Writes go through a [`ChangeSet`] that the store commits as a single unit:
//! either every change in the set becomes visible or none does. The hierarchy
//! manager builds a change set only after all structural checks passed.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tenancy_core::{TenancyError, TenancyResult};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::membership::Membership;
use crate::organization::Organization;

/// A batch of writes committed atomically.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    organizations: Vec<Organization>,
    memberships: Vec<Membership>,
    removed_memberships: Vec<Uuid>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an organization.
    pub fn put_organization(&mut self, organization: Organization) -> &mut Self {
        self.organizations.push(organization);
        self
    }

    /// Insert or replace a membership.
    pub fn put_membership(&mut self, membership: Membership) -> &mut Self {
        self.memberships.push(membership);
        self
    }

    /// Remove a membership by ID.
    pub fn remove_membership(&mut self, membership_id: Uuid) -> &mut Self {
        self.removed_memberships.push(membership_id);
        self
    }

    /// Organizations written by this change set.
    pub fn organizations(&self) -> &[Organization] {
        &self.organizations
    }

    /// Memberships written by this change set.
    pub fn memberships(&self) -> &[Membership] {
        &self.memberships
    }

    /// Membership IDs removed by this change set.
    pub fn removed_memberships(&self) -> &[Uuid] {
        &self.removed_memberships
    }

    /// Check if the change set writes nothing.
    pub fn is_empty(&self) -> bool {
        self.organizations.is_empty()
            && self.memberships.is_empty()
            && self.removed_memberships.is_empty()
    }
}

/// Organization store trait.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Look up an organization by ID, including soft-deleted ones.
    async fn organization(&self, id: Uuid) -> TenancyResult<Option<Organization>>;

    /// Look up an organization by slug, including soft-deleted ones.
    async fn organization_by_slug(&self, slug: &str) -> TenancyResult<Option<Organization>>;

    /// Non-deleted direct children of an organization, oldest first.
    async fn children(&self, parent_id: Uuid) -> TenancyResult<Vec<Organization>>;

    /// All memberships of an organization.
    async fn memberships(&self, organization_id: Uuid) -> TenancyResult<Vec<Membership>>;

    /// Membership of a user in an organization.
    async fn membership(&self, organization_id: Uuid, user_id: Uuid) -> TenancyResult<Option<Membership>>;

    /// All memberships of a user.
    async fn memberships_for_user(&self, user_id: Uuid) -> TenancyResult<Vec<Membership>>;

    /// Apply a change set atomically.
    ///
    /// # Errors
    ///
    /// - `Conflict` when a slug would no longer be unique
    /// - `DuplicateMembership` when a second membership for the same
    ///   (organization, user) would exist
    /// - `NotFound` when a membership references a missing organization or a
    ///   removed membership does not exist
    async fn commit(&self, changes: ChangeSet) -> TenancyResult<()>;
}

#[derive(Debug, Default)]
struct StoreState {
    organizations: HashMap<Uuid, Organization>,
    memberships: HashMap<Uuid, Membership>,
}

impl StoreState {
    fn check(&self, changes: &ChangeSet) -> TenancyResult<()> {
        let written: HashSet<Uuid> = changes.organizations.iter().map(|o| o.id).collect();

        let mut slugs: HashMap<&str, Uuid> = self
            .organizations
            .values()
            .filter(|o| !written.contains(&o.id))
            .map(|o| (o.slug.as_str(), o.id))
            .collect();
        for org in &changes.organizations {
            if let Some(existing) = slugs.insert(org.slug.as_str(), org.id) {
                if existing != org.id {
                    return Err(TenancyError::Conflict(format!(
                        "organization slug {:?} already exists",
                        org.slug
                    )));
                }
            }
        }

        let removed: HashSet<Uuid> = changes.removed_memberships.iter().copied().collect();
        for id in &removed {
            if !self.memberships.contains_key(id) {
                return Err(TenancyError::not_found("membership", *id));
            }
        }

        let replaced: HashSet<Uuid> = changes.memberships.iter().map(|m| m.id).collect();
        let mut pairs: HashMap<(Uuid, Uuid), Uuid> = self
            .memberships
            .values()
            .filter(|m| !removed.contains(&m.id) && !replaced.contains(&m.id))
            .map(|m| ((m.organization_id, m.user_id), m.id))
            .collect();
        for membership in &changes.memberships {
            if !written.contains(&membership.organization_id)
                && !self.organizations.contains_key(&membership.organization_id)
            {
                return Err(TenancyError::not_found("organization", membership.organization_id));
            }
            let pair = (membership.organization_id, membership.user_id);
            if let Some(existing) = pairs.insert(pair, membership.id) {
                if existing != membership.id {
                    return Err(TenancyError::DuplicateMembership {
                        organization_id: membership.organization_id,
                        user_id: membership.user_id,
                    });
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) {
        for id in changes.removed_memberships {
            self.memberships.remove(&id);
        }
        for org in changes.organizations {
            self.organizations.insert(org.id, org);
        }
        for membership in changes.memberships {
            self.memberships.insert(membership.id, membership);
        }
    }
}

/// In-memory organization store.
#[derive(Debug, Clone, Default)]
pub struct MemoryOrganizationStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryOrganizationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrganizationStore for MemoryOrganizationStore {
    async fn organization(&self, id: Uuid) -> TenancyResult<Option<Organization>> {
        Ok(self.state.read().await.organizations.get(&id).cloned())
    }

    async fn organization_by_slug(&self, slug: &str) -> TenancyResult<Option<Organization>> {
        Ok(self
            .state
            .read()
            .await
            .organizations
            .values()
            .find(|o| o.slug == slug)
            .cloned())
    }

    async fn children(&self, parent_id: Uuid) -> TenancyResult<Vec<Organization>> {
        let mut children: Vec<Organization> = self
            .state
            .read()
            .await
            .organizations
            .values()
            .filter(|o| o.parent_id == Some(parent_id) && !o.is_deleted())
            .cloned()
            .collect();
        children.sort_by_key(|o| (o.created_at, o.id));
        Ok(children)
    }

    async fn memberships(&self, organization_id: Uuid) -> TenancyResult<Vec<Membership>> {
        let mut memberships: Vec<Membership> = self
            .state
            .read()
            .await
            .memberships
            .values()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect();
        memberships.sort_by_key(|m| (m.joined_at, m.id));
        Ok(memberships)
    }

    async fn membership(&self, organization_id: Uuid, user_id: Uuid) -> TenancyResult<Option<Membership>> {
        Ok(self
            .state
            .read()
            .await
            .memberships
            .values()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .cloned())
    }

    async fn memberships_for_user(&self, user_id: Uuid) -> TenancyResult<Vec<Membership>> {
        let mut memberships: Vec<Membership> = self
            .state
            .read()
            .await
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        memberships.sort_by_key(|m| (m.joined_at, m.id));
        Ok(memberships)
    }

    async fn commit(&self, changes: ChangeSet) -> TenancyResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        state.check(&changes)?;
        state.apply(changes);
        Ok(())
    }
}
