//! Organization hierarchy manager
//!
//! Owns structural changes to the organization tree and to memberships.
//! Every mutation follows the same shape:
//!
//! 1. take the structure lock (mutations are serialized)
//! 2. load and validate: adjacency, cycles, license limits, last owner
//! 3. build a [`ChangeSet`] and commit it atomically
//! 4. invalidate cached trees, usage, user organization lists and
//!    permission decisions touched by the change
//!
//! Validation failures happen before step 3, so a rejected call never leaves
//! partially applied state behind.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tenancy_core::cache::{self, keys};
use tenancy_core::{
    CacheStore, CacheTtls, Clock, ResourceType, TenancyError, TenancyResult, UsageProvider,
};
use tenancy_license::LicenseEngine;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::hierarchy::ensure_adjacent;
use crate::membership::Membership;
use crate::organization::{NewOrganization, Organization, OrganizationUpdate};
use crate::roles::Role;
use crate::store::{ChangeSet, OrganizationStore};
use crate::tree::TreeNode;

/// Organization hierarchy manager.
pub struct HierarchyManager {
    store: Arc<dyn OrganizationStore>,
    licenses: Arc<LicenseEngine>,
    usage: Arc<dyn UsageProvider>,
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttls: CacheTtls,
    structure: Mutex<()>,
}

impl HierarchyManager {
    /// Create a hierarchy manager.
    ///
    /// # Arguments
    ///
    /// * `store` - Organization and membership store
    /// * `licenses` - License engine consulted for user and child limits
    /// * `usage` - Live usage counts, used to detect active resources on delete
    /// * `cache` - Cache for trees and user organization lists
    /// * `clock` - Time source for timestamps
    pub fn new(
        store: Arc<dyn OrganizationStore>,
        licenses: Arc<LicenseEngine>,
        usage: Arc<dyn UsageProvider>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttls = licenses.config().cache.clone();
        Self {
            store,
            licenses,
            usage,
            cache,
            clock,
            ttls,
            structure: Mutex::new(()),
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Look up a live (not soft-deleted) organization.
    pub async fn organization(&self, organization_id: Uuid) -> TenancyResult<Organization> {
        match self.store.organization(organization_id).await? {
            Some(org) if !org.is_deleted() => Ok(org),
            _ => Err(TenancyError::not_found("organization", organization_id)),
        }
    }

    /// Ancestors of an organization, nearest first.
    pub async fn ancestors(&self, organization_id: Uuid) -> TenancyResult<Vec<Organization>> {
        let org = self.organization(organization_id).await?;
        self.ancestors_of(&org).await
    }

    /// Live direct children of an organization, oldest first.
    pub async fn children(&self, organization_id: Uuid) -> TenancyResult<Vec<Organization>> {
        self.organization(organization_id).await?;
        self.store.children(organization_id).await
    }

    /// All live descendants of an organization, breadth first.
    pub async fn descendants(&self, organization_id: Uuid) -> TenancyResult<Vec<Organization>> {
        self.organization(organization_id).await?;

        let mut found = Vec::new();
        let mut seen = HashSet::from([organization_id]);
        let mut queue = VecDeque::from([organization_id]);
        while let Some(parent_id) = queue.pop_front() {
            for child in self.store.children(parent_id).await? {
                if seen.insert(child.id) {
                    queue.push_back(child.id);
                    found.push(child);
                }
            }
        }
        Ok(found)
    }

    /// Membership of a user in an organization, active or not.
    pub async fn membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> TenancyResult<Option<Membership>> {
        self.store.membership(organization_id, user_id).await
    }

    /// Active membership of a user in a live organization.
    pub async fn active_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> TenancyResult<Option<Membership>> {
        match self.store.organization(organization_id).await? {
            Some(org) if !org.is_deleted() => {}
            _ => return Ok(None),
        }
        Ok(self
            .store
            .membership(organization_id, user_id)
            .await?
            .filter(|m| m.is_active))
    }

    /// Live organizations in which a user holds an active membership.
    pub async fn organizations_for_user(&self, user_id: Uuid) -> TenancyResult<Vec<Organization>> {
        let key = keys::user_organizations(user_id);
        if let Some(orgs) = cache::get_json::<Vec<Organization>>(self.cache.as_ref(), &key).await {
            return Ok(orgs);
        }

        let mut orgs = Vec::new();
        for membership in self.store.memberships_for_user(user_id).await? {
            if !membership.is_active {
                continue;
            }
            if let Some(org) = self.store.organization(membership.organization_id).await? {
                if !org.is_deleted() {
                    orgs.push(org);
                }
            }
        }

        cache::put_json(self.cache.as_ref(), &key, &orgs, self.ttls.user_organizations()).await;
        Ok(orgs)
    }

    /// Materialize the tree of active organizations rooted at `root_id`.
    ///
    /// Inactive children are omitted along with their subtrees. The result is
    /// cached and dropped whenever a change touches the subtree.
    pub async fn build_hierarchy_tree(&self, root_id: Uuid) -> TenancyResult<TreeNode> {
        let key = keys::hierarchy_tree(root_id);
        if let Some(tree) = cache::get_json::<TreeNode>(self.cache.as_ref(), &key).await {
            debug!(organization_id = %root_id, "Hierarchy tree served from cache");
            return Ok(tree);
        }

        let root = self.organization(root_id).await?;
        let mut children_of = HashMap::new();
        let mut active_users = HashMap::new();
        let mut queue = VecDeque::from([root.clone()]);
        while let Some(org) = queue.pop_front() {
            let members = self.store.memberships(org.id).await?;
            active_users.insert(org.id, members.iter().filter(|m| m.is_active).count());

            let children: Vec<Organization> = self
                .store
                .children(org.id)
                .await?
                .into_iter()
                .filter(|child| child.is_active)
                .collect();
            queue.extend(children.iter().cloned());
            children_of.insert(org.id, children);
        }

        let tree = TreeNode::assemble(&root, &children_of, &active_users);
        cache::put_json(self.cache.as_ref(), &key, &tree, self.ttls.hierarchy_tree()).await;
        Ok(tree)
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Create an organization, optionally under `parent_id`.
    ///
    /// When the input names an owner, the owner membership is written in the
    /// same commit as the organization.
    ///
    /// # Errors
    ///
    /// - `Validation` for a missing name, a malformed slug or an unknown type
    /// - `NotFound` when the parent does not exist
    /// - `HierarchyViolation` when the parent may not contain this type
    /// - `LimitExceeded` when the parent's license caps child organizations
    /// - `Conflict` when the slug is taken
    #[instrument(skip(self, data), fields(slug = %data.slug))]
    pub async fn create_organization(
        &self,
        data: NewOrganization,
        parent_id: Option<Uuid>,
    ) -> TenancyResult<Organization> {
        let hierarchy_type = data.validate()?;
        let _guard = self.structure.lock().await;

        let parent = match parent_id {
            Some(id) => Some(self.organization(id).await?),
            None => None,
        };
        ensure_adjacent(parent.as_ref().map(|p| p.hierarchy_type), hierarchy_type)?;
        if let Some(parent) = &parent {
            self.ensure_child_capacity(parent, 1, 0).await?;
        }

        let now = self.clock.now();
        let mut org = Organization::new(data.name, data.slug, hierarchy_type);
        org.parent_id = parent.as_ref().map(|p| p.id);
        org.hierarchy_level = parent.as_ref().map_or(0, |p| p.hierarchy_level + 1);
        org.branding = data.branding;
        org.feature_flags = data.feature_flags;
        org.created_at = now;
        org.updated_at = now;

        let mut changes = ChangeSet::new();
        changes.put_organization(org.clone());
        if let Some(owner_id) = data.owner_id {
            let mut owner = Membership::new(org.id, owner_id, Role::Owner);
            owner.joined_at = now;
            changes.put_membership(owner);
        }

        let lineage = match &parent {
            Some(parent) => self.lineage(parent).await?,
            None => Vec::new(),
        };
        self.store.commit(changes).await?;

        self.forget_trees(&lineage).await;
        if let Some(parent) = &parent {
            self.forget_usage(&[parent.id]).await;
        }
        if let Some(owner_id) = data.owner_id {
            self.forget_user_organizations(&[owner_id]).await;
        }

        info!(
            organization_id = %org.id,
            hierarchy_type = %org.hierarchy_type,
            level = org.hierarchy_level,
            "Organization created"
        );
        Ok(org)
    }

    /// Move an organization under `new_parent_id`, or to the root when `None`.
    ///
    /// Levels of the whole subtree are rewritten in the same commit.
    ///
    /// # Errors
    ///
    /// - `CircularDependency` when the new parent is the organization itself
    ///   or one of its descendants
    /// - `HierarchyViolation` when the new parent may not contain this type
    /// - `LimitExceeded` when the new parent's license caps child organizations
    #[instrument(skip(self))]
    pub async fn move_organization(
        &self,
        organization_id: Uuid,
        new_parent_id: Option<Uuid>,
    ) -> TenancyResult<Organization> {
        let _guard = self.structure.lock().await;
        let mut org = self.organization(organization_id).await?;

        if org.parent_id == new_parent_id {
            debug!("Organization already under requested parent");
            return Ok(org);
        }

        let new_parent = match new_parent_id {
            Some(parent_id) => {
                let parent = self.organization(parent_id).await?;
                let parent_lineage = self.lineage(&parent).await?;
                if parent_lineage.contains(&org.id) {
                    return Err(TenancyError::CircularDependency {
                        organization_id: org.id,
                        parent_id,
                    });
                }
                Some((parent, parent_lineage))
            }
            None => None,
        };
        ensure_adjacent(
            new_parent.as_ref().map(|(p, _)| p.hierarchy_type),
            org.hierarchy_type,
        )?;
        if let Some((parent, _)) = &new_parent {
            self.ensure_child_capacity(parent, 1, 0).await?;
        }

        let old_parent_id = org.parent_id;
        let old_lineage = self.lineage(&org).await?;
        let old_level = org.hierarchy_level;
        let now = self.clock.now();

        org.parent_id = new_parent_id;
        org.hierarchy_level = new_parent
            .as_ref()
            .map_or(0, |(p, _)| p.hierarchy_level + 1);
        org.updated_at = now;
        let level_delta = i64::from(org.hierarchy_level) - i64::from(old_level);

        let mut changes = ChangeSet::new();
        changes.put_organization(org.clone());
        let mut subtree = vec![org.id];
        subtree.extend(self.relevel_subtree(&org, &mut changes, now).await?);
        let members = self.member_ids(&subtree).await?;

        self.store.commit(changes).await?;

        let mut stale_trees = old_lineage;
        if let Some((_, lineage)) = &new_parent {
            stale_trees.extend(lineage.iter().copied());
        }
        stale_trees.extend(subtree.iter().copied());
        self.forget_trees(&stale_trees).await;
        let stale_usage: Vec<Uuid> = [Some(org.id), old_parent_id, new_parent_id]
            .into_iter()
            .flatten()
            .collect();
        self.forget_usage(&stale_usage).await;
        self.forget_user_organizations(&members).await;

        info!(
            organization_id = %org.id,
            new_parent_id = ?new_parent_id,
            level_delta,
            descendants = subtree.len() - 1,
            "Organization moved"
        );
        Ok(org)
    }

    /// Soft-delete an organization.
    ///
    /// Without `force`, organizations with children or active resources are
    /// refused. With `force`, children are moved to the deleted organization's
    /// parent (or made roots). Every such move is validated first; if any child
    /// could not legally sit under the new parent, nothing is written.
    ///
    /// # Returns
    ///
    /// `true` if the organization was deleted, `false` if it was already deleted
    #[instrument(skip(self))]
    pub async fn delete_organization(&self, organization_id: Uuid, force: bool) -> TenancyResult<bool> {
        let _guard = self.structure.lock().await;
        let mut org = self
            .store
            .organization(organization_id)
            .await?
            .ok_or_else(|| TenancyError::not_found("organization", organization_id))?;
        if org.is_deleted() {
            return Ok(false);
        }

        let children = self.store.children(org.id).await?;
        if !force {
            if !children.is_empty() {
                return Err(TenancyError::HasChildren(org.id));
            }
            if self.usage.usage(org.id).await?.active_resources() > 0 {
                return Err(TenancyError::HasActiveResources(org.id));
            }
        }

        let new_parent = match org.parent_id {
            Some(parent_id) => Some(self.organization(parent_id).await?),
            None => None,
        };
        for child in &children {
            ensure_adjacent(new_parent.as_ref().map(|p| p.hierarchy_type), child.hierarchy_type)?;
        }
        if let Some(parent) = &new_parent {
            if !children.is_empty() {
                self.ensure_child_capacity(parent, children.len(), 1).await?;
            }
        }

        let lineage = self.lineage(&org).await?;
        let now = self.clock.now();
        let reparented = children.len();

        let mut changes = ChangeSet::new();
        let mut subtree = vec![org.id];
        for mut child in children {
            child.parent_id = org.parent_id;
            child.hierarchy_level = new_parent.as_ref().map_or(0, |p| p.hierarchy_level + 1);
            child.updated_at = now;
            subtree.push(child.id);
            changes.put_organization(child.clone());
            subtree.extend(self.relevel_subtree(&child, &mut changes, now).await?);
        }
        org.deleted_at = Some(now);
        org.updated_at = now;
        changes.put_organization(org.clone());
        let members = self.member_ids(&subtree).await?;

        self.store.commit(changes).await?;

        let mut stale_trees = lineage;
        stale_trees.extend(subtree.iter().copied());
        self.forget_trees(&stale_trees).await;
        let stale_usage: Vec<Uuid> = [Some(org.id), org.parent_id].into_iter().flatten().collect();
        self.forget_usage(&stale_usage).await;
        self.forget_user_organizations(&members).await;
        cache::invalidate_permissions(self.cache.as_ref(), org.id).await;

        info!(organization_id = %org.id, force, reparented, "Organization deleted");
        Ok(true)
    }

    /// Reverse a soft delete.
    ///
    /// The organization returns under its former parent, which must still be
    /// live and still able to contain it.
    #[instrument(skip(self))]
    pub async fn restore_organization(&self, organization_id: Uuid) -> TenancyResult<Organization> {
        let _guard = self.structure.lock().await;
        let mut org = self
            .store
            .organization(organization_id)
            .await?
            .ok_or_else(|| TenancyError::not_found("organization", organization_id))?;
        if !org.is_deleted() {
            return Ok(org);
        }

        let parent = match org.parent_id {
            Some(parent_id) => Some(self.organization(parent_id).await?),
            None => None,
        };
        ensure_adjacent(parent.as_ref().map(|p| p.hierarchy_type), org.hierarchy_type)?;
        if let Some(parent) = &parent {
            self.ensure_child_capacity(parent, 1, 0).await?;
        }

        let now = self.clock.now();
        org.deleted_at = None;
        org.hierarchy_level = parent.as_ref().map_or(0, |p| p.hierarchy_level + 1);
        org.updated_at = now;

        let mut changes = ChangeSet::new();
        changes.put_organization(org.clone());
        let lineage = self.lineage(&org).await?;
        let members = self.member_ids(&[org.id]).await?;

        self.store.commit(changes).await?;

        self.forget_trees(&lineage).await;
        if let Some(parent) = &parent {
            self.forget_usage(&[parent.id]).await;
        }
        self.forget_user_organizations(&members).await;
        cache::invalidate_permissions(self.cache.as_ref(), org.id).await;

        info!(organization_id = %org.id, "Organization restored");
        Ok(org)
    }

    /// Update name, active flag or the opaque blobs of an organization.
    #[instrument(skip(self, update))]
    pub async fn update_organization(
        &self,
        organization_id: Uuid,
        update: OrganizationUpdate,
    ) -> TenancyResult<Organization> {
        let _guard = self.structure.lock().await;
        let mut org = self.organization(organization_id).await?;
        update.apply(&mut org)?;
        org.updated_at = self.clock.now();

        let mut changes = ChangeSet::new();
        changes.put_organization(org.clone());
        let lineage = self.lineage(&org).await?;
        let members = self.member_ids(&[org.id]).await?;

        self.store.commit(changes).await?;

        self.forget_trees(&lineage).await;
        self.forget_user_organizations(&members).await;

        info!(organization_id = %org.id, "Organization updated");
        Ok(org)
    }

    // ------------------------------------------------------------------
    // Memberships
    // ------------------------------------------------------------------

    /// Add a user to an organization.
    ///
    /// # Errors
    ///
    /// - `DuplicateMembership` when the user already has a membership
    /// - `UserLimitExceeded` when active members already reach the license's
    ///   user limit
    /// - `Validation` when the organization has no active owner and `role` is
    ///   not owner
    #[instrument(skip(self, permissions))]
    pub async fn attach_user(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
        permissions: BTreeSet<String>,
    ) -> TenancyResult<Membership> {
        let _guard = self.structure.lock().await;
        let org = self.organization(organization_id).await?;

        if self.store.membership(org.id, user_id).await?.is_some() {
            return Err(TenancyError::DuplicateMembership {
                organization_id: org.id,
                user_id,
            });
        }

        let memberships = self.store.memberships(org.id).await?;
        let active = memberships.iter().filter(|m| m.is_active).count() as u64;
        if let Some(limit) = self.licenses.limit_for(org.id, ResourceType::Users).await? {
            if active >= limit {
                return Err(TenancyError::UserLimitExceeded { limit });
            }
        }
        if !role.is_owner() && !memberships.iter().any(Membership::is_active_owner) {
            return Err(TenancyError::Validation(format!(
                "organization {} has no active owner; the first member must be an owner",
                org.id
            )));
        }

        let mut membership = Membership::new(org.id, user_id, role);
        membership.permissions = permissions;
        membership.joined_at = self.clock.now();

        let mut changes = ChangeSet::new();
        changes.put_membership(membership.clone());
        let lineage = self.lineage(&org).await?;

        self.store.commit(changes).await?;

        self.forget_membership_caches(org.id, user_id, &lineage).await;
        info!(organization_id = %org.id, user_id = %user_id, role = %role, "User attached");
        Ok(membership)
    }

    /// Remove a user from an organization.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the user is not a member
    /// - `LastOwner` when the user is the sole active owner
    #[instrument(skip(self))]
    pub async fn detach_user(&self, organization_id: Uuid, user_id: Uuid) -> TenancyResult<()> {
        let _guard = self.structure.lock().await;
        let org = self.organization(organization_id).await?;
        let membership = self.existing_membership(org.id, user_id).await?;

        if membership.is_active_owner() && self.active_owner_count(org.id).await? <= 1 {
            return Err(TenancyError::LastOwner(org.id));
        }

        let mut changes = ChangeSet::new();
        changes.remove_membership(membership.id);
        let lineage = self.lineage(&org).await?;

        self.store.commit(changes).await?;

        self.forget_membership_caches(org.id, user_id, &lineage).await;
        info!(organization_id = %org.id, user_id = %user_id, "User detached");
        Ok(())
    }

    /// Replace a member's role and permission set in one write.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the user is not a member
    /// - `LastOwner` when this would demote the sole active owner
    #[instrument(skip(self, permissions))]
    pub async fn update_user_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
        permissions: BTreeSet<String>,
    ) -> TenancyResult<Membership> {
        let _guard = self.structure.lock().await;
        let org = self.organization(organization_id).await?;
        let mut membership = self.existing_membership(org.id, user_id).await?;

        if membership.is_active_owner()
            && !role.is_owner()
            && self.active_owner_count(org.id).await? <= 1
        {
            return Err(TenancyError::LastOwner(org.id));
        }

        let previous = membership.role;
        membership.role = role;
        membership.permissions = permissions;

        let mut changes = ChangeSet::new();
        changes.put_membership(membership.clone());
        let lineage = self.lineage(&org).await?;

        self.store.commit(changes).await?;

        self.forget_membership_caches(org.id, user_id, &lineage).await;
        info!(
            organization_id = %org.id,
            user_id = %user_id,
            from = %previous,
            to = %role,
            "User role updated"
        );
        Ok(membership)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn ancestors_of(&self, org: &Organization) -> TenancyResult<Vec<Organization>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([org.id]);
        let mut next = org.parent_id;
        while let Some(parent_id) = next {
            if !seen.insert(parent_id) {
                return Err(TenancyError::Storage(format!(
                    "stored hierarchy contains a cycle at {}",
                    parent_id
                )));
            }
            let parent = self
                .store
                .organization(parent_id)
                .await?
                .ok_or_else(|| TenancyError::not_found("organization", parent_id))?;
            next = parent.parent_id;
            chain.push(parent);
        }
        Ok(chain)
    }

    /// The organization's own ID followed by its ancestors' IDs.
    async fn lineage(&self, org: &Organization) -> TenancyResult<Vec<Uuid>> {
        let mut ids = vec![org.id];
        ids.extend(self.ancestors_of(org).await?.into_iter().map(|a| a.id));
        Ok(ids)
    }

    /// Rewrite the levels of every live descendant of `root` from `root`'s
    /// (already updated) level, returning the descendant IDs.
    async fn relevel_subtree(
        &self,
        root: &Organization,
        changes: &mut ChangeSet,
        now: chrono::DateTime<chrono::Utc>,
    ) -> TenancyResult<Vec<Uuid>> {
        let mut touched = Vec::new();
        let mut seen = HashSet::from([root.id]);
        let mut queue = VecDeque::from([(root.id, root.hierarchy_level)]);
        while let Some((parent_id, parent_level)) = queue.pop_front() {
            for mut child in self.store.children(parent_id).await? {
                if !seen.insert(child.id) {
                    continue;
                }
                let level = parent_level + 1;
                queue.push_back((child.id, level));
                touched.push(child.id);
                if child.hierarchy_level != level {
                    child.hierarchy_level = level;
                    child.updated_at = now;
                    changes.put_organization(child);
                }
            }
        }
        Ok(touched)
    }

    /// Reject when adding `incoming` children (while `departing` leave) would
    /// push `parent` past its licensed child-organization limit.
    async fn ensure_child_capacity(
        &self,
        parent: &Organization,
        incoming: usize,
        departing: usize,
    ) -> TenancyResult<()> {
        let Some(limit) = self
            .licenses
            .limit_for(parent.id, ResourceType::ChildOrganizations)
            .await?
        else {
            return Ok(());
        };
        let current = self.store.children(parent.id).await?.len() as u64;
        let after = (current + incoming as u64).saturating_sub(departing as u64);
        if after > limit {
            return Err(TenancyError::LimitExceeded {
                resource: ResourceType::ChildOrganizations.to_string(),
                limit,
                current,
            });
        }
        Ok(())
    }

    async fn existing_membership(&self, organization_id: Uuid, user_id: Uuid) -> TenancyResult<Membership> {
        self.store
            .membership(organization_id, user_id)
            .await?
            .ok_or_else(|| TenancyError::NotFound {
                entity: "membership",
                id: format!("{}:{}", organization_id, user_id),
            })
    }

    async fn active_owner_count(&self, organization_id: Uuid) -> TenancyResult<usize> {
        Ok(self
            .store
            .memberships(organization_id)
            .await?
            .iter()
            .filter(|m| m.is_active_owner())
            .count())
    }

    async fn member_ids(&self, organization_ids: &[Uuid]) -> TenancyResult<Vec<Uuid>> {
        let mut users = BTreeSet::new();
        for id in organization_ids {
            users.extend(self.store.memberships(*id).await?.into_iter().map(|m| m.user_id));
        }
        Ok(users.into_iter().collect())
    }

    async fn forget_trees(&self, organization_ids: &[Uuid]) {
        for id in organization_ids {
            cache::forget_logged(self.cache.as_ref(), &keys::hierarchy_tree(*id)).await;
        }
    }

    async fn forget_usage(&self, organization_ids: &[Uuid]) {
        for id in organization_ids {
            self.licenses.forget_organization_usage(*id).await;
        }
    }

    async fn forget_user_organizations(&self, user_ids: &[Uuid]) {
        for id in user_ids {
            cache::forget_logged(self.cache.as_ref(), &keys::user_organizations(*id)).await;
        }
    }

    async fn forget_membership_caches(&self, organization_id: Uuid, user_id: Uuid, lineage: &[Uuid]) {
        self.forget_trees(lineage).await;
        self.forget_user_organizations(&[user_id]).await;
        cache::invalidate_permissions(self.cache.as_ref(), organization_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyType;
    use crate::store::MemoryOrganizationStore;
    use chrono::Utc;
    use tenancy_core::{ManualClock, MemoryCache, MemoryUsageProvider, TenancyConfig};
    use tenancy_license::{LicenseConfig, LicenseTier, LicenseType, MemoryLicenseStore};

    struct Harness {
        manager: HierarchyManager,
        licenses: Arc<LicenseEngine>,
        usage: Arc<MemoryUsageProvider>,
        cache: Arc<dyn CacheStore>,
    }

    fn harness() -> Harness {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::with_clock(clock.clone()));
        let usage = Arc::new(MemoryUsageProvider::new());
        let licenses = Arc::new(
            LicenseEngine::new(
                Arc::new(MemoryLicenseStore::new()),
                usage.clone(),
                cache.clone(),
                clock.clone(),
                TenancyConfig::default().with_secret("test-secret"),
            )
            .unwrap(),
        );
        let manager = HierarchyManager::new(
            Arc::new(MemoryOrganizationStore::new()),
            licenses.clone(),
            usage.clone(),
            cache.clone(),
            clock,
        );
        Harness {
            manager,
            licenses,
            usage,
            cache,
        }
    }

    async fn create(h: &Harness, slug: &str, kind: &str, parent: Option<Uuid>) -> Organization {
        h.manager
            .create_organization(NewOrganization::new(slug.to_uppercase(), slug, kind), parent)
            .await
            .unwrap()
    }

    async fn license_with_limits(h: &Harness, org: Uuid, limits: &[(&str, Option<u64>)]) {
        h.licenses
            .issue_license(
                org,
                LicenseConfig::new(LicenseType::Perpetual, LicenseTier::Enterprise)
                    .with_limits(limits.iter().map(|(k, v)| (*k, *v))),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_computes_levels() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let b = create(&h, "b", "master_branch", Some(a.id)).await;
        let c = create(&h, "c", "sub_user", Some(b.id)).await;
        let d = create(&h, "d", "end_user", Some(c.id)).await;

        assert_eq!(a.hierarchy_level, 0);
        assert_eq!(b.hierarchy_level, 1);
        assert_eq!(c.hierarchy_level, 2);
        assert_eq!(d.hierarchy_level, 3);
        assert_eq!(d.parent_id, Some(c.id));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_adjacency() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let err = h
            .manager
            .create_organization(NewOrganization::new("X", "x", "sub_user"), Some(a.id))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::HierarchyViolation { .. }));

        let b = create(&h, "b", "master_branch", Some(a.id)).await;
        let c = create(&h, "c", "sub_user", Some(b.id)).await;
        let d = create(&h, "d", "end_user", Some(c.id)).await;
        for kind in ["top_branch", "master_branch", "sub_user", "end_user"] {
            let err = h
                .manager
                .create_organization(NewOrganization::new("Y", "y", kind), Some(d.id))
                .await
                .unwrap_err();
            assert!(matches!(err, TenancyError::HierarchyViolation { .. }));
        }
        // The rejected "x" never landed, so its slug is still free.
        create(&h, "x", "master_branch", Some(a.id)).await;
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let h = harness();
        let err = h
            .manager
            .create_organization(NewOrganization::new("X", "x", "galaxy"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::Validation(_)));

        let err = h
            .manager
            .create_organization(NewOrganization::new("X", "x", "master_branch"), Some(Uuid::now_v7()))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_with_owner_is_atomic() {
        let h = harness();
        let owner = Uuid::now_v7();
        let org = h
            .manager
            .create_organization(NewOrganization::new("A", "a", "top_branch").with_owner(owner), None)
            .await
            .unwrap();
        let membership = h.manager.membership(org.id, owner).await.unwrap().unwrap();
        assert_eq!(membership.role, Role::Owner);

        // Slug clash: neither the organization nor its owner membership lands.
        let other = Uuid::now_v7();
        let err = h
            .manager
            .create_organization(NewOrganization::new("A2", "a", "top_branch").with_owner(other), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::Conflict(_)));
        assert!(h.manager.organizations_for_user(other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_child_limit_on_create() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        license_with_limits(&h, a.id, &[("max_child_organizations", Some(1))]).await;

        create(&h, "b", "master_branch", Some(a.id)).await;
        let err = h
            .manager
            .create_organization(NewOrganization::new("C", "c", "master_branch"), Some(a.id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TenancyError::LimitExceeded { limit: 1, current: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_move_preserves_levels_across_subtree() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let b = create(&h, "b", "master_branch", Some(a.id)).await;
        let c = create(&h, "c", "sub_user", Some(b.id)).await;
        let d = create(&h, "d", "top_branch", None).await;

        let moved = h.manager.move_organization(b.id, Some(d.id)).await.unwrap();
        assert_eq!(moved.parent_id, Some(d.id));
        assert_eq!(moved.hierarchy_level, 1);
        assert_eq!(h.manager.organization(c.id).await.unwrap().hierarchy_level, 2);

        // Promote B to a root: the whole subtree shifts up one level.
        let moved = h.manager.move_organization(b.id, None).await.unwrap();
        assert_eq!(moved.hierarchy_level, 0);
        assert_eq!(h.manager.organization(c.id).await.unwrap().hierarchy_level, 1);
        assert!(h.manager.children(d.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_rejects_cycles() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let b = create(&h, "b", "master_branch", Some(a.id)).await;
        let c = create(&h, "c", "sub_user", Some(b.id)).await;

        for target in [b.id, c.id] {
            let err = h.manager.move_organization(b.id, Some(target)).await.unwrap_err();
            assert!(matches!(err, TenancyError::CircularDependency { .. }), "{:?}", err);
        }
        let err = h.manager.move_organization(a.id, Some(c.id)).await.unwrap_err();
        assert!(matches!(err, TenancyError::CircularDependency { .. }));
    }

    #[tokio::test]
    async fn test_move_rejects_bad_adjacency_and_limits() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let b = create(&h, "b", "master_branch", Some(a.id)).await;
        let c = create(&h, "c", "sub_user", Some(b.id)).await;
        let d = create(&h, "d", "top_branch", None).await;
        create(&h, "e", "master_branch", Some(d.id)).await;

        let err = h.manager.move_organization(c.id, Some(d.id)).await.unwrap_err();
        assert!(matches!(err, TenancyError::HierarchyViolation { .. }));

        license_with_limits(&h, d.id, &[("child_organizations", Some(1))]).await;
        let err = h.manager.move_organization(b.id, Some(d.id)).await.unwrap_err();
        assert!(matches!(err, TenancyError::LimitExceeded { .. }));
        assert_eq!(h.manager.organization(b.id).await.unwrap().parent_id, Some(a.id));
    }

    #[tokio::test]
    async fn test_delete_guards() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let b = create(&h, "b", "master_branch", Some(a.id)).await;

        let err = h.manager.delete_organization(a.id, false).await.unwrap_err();
        assert!(matches!(err, TenancyError::HasChildren(id) if id == a.id));

        h.usage.set(b.id, ResourceType::Servers, 2).await;
        let err = h.manager.delete_organization(b.id, false).await.unwrap_err();
        assert!(matches!(err, TenancyError::HasActiveResources(_)));

        h.usage.set(b.id, ResourceType::Servers, 0).await;
        h.usage.set(b.id, ResourceType::Users, 3).await;
        assert!(h.manager.delete_organization(b.id, false).await.unwrap());
        assert!(!h.manager.delete_organization(b.id, false).await.unwrap());
        assert!(matches!(
            h.manager.organization(b.id).await,
            Err(TenancyError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_forced_delete_of_root_promotes_children() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let b = create(&h, "b", "master_branch", Some(a.id)).await;
        let c = create(&h, "c", "sub_user", Some(b.id)).await;

        assert!(h.manager.delete_organization(a.id, true).await.unwrap());
        let b = h.manager.organization(b.id).await.unwrap();
        assert!(b.is_root());
        assert_eq!(b.hierarchy_level, 0);
        assert_eq!(h.manager.organization(c.id).await.unwrap().hierarchy_level, 1);
    }

    #[tokio::test]
    async fn test_forced_delete_rejects_tier_skipping_reparent() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let b = create(&h, "b", "master_branch", Some(a.id)).await;
        let c = create(&h, "c", "sub_user", Some(b.id)).await;

        let err = h.manager.delete_organization(b.id, true).await.unwrap_err();
        assert!(matches!(err, TenancyError::HierarchyViolation { .. }));
        assert_eq!(h.manager.organization(b.id).await.unwrap().id, b.id);
        assert_eq!(h.manager.organization(c.id).await.unwrap().parent_id, Some(b.id));
    }

    #[tokio::test]
    async fn test_restore() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let b = create(&h, "b", "master_branch", Some(a.id)).await;
        h.manager.delete_organization(b.id, false).await.unwrap();

        let restored = h.manager.restore_organization(b.id).await.unwrap();
        assert!(!restored.is_deleted());
        assert_eq!(restored.hierarchy_level, 1);
        assert_eq!(h.manager.children(a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_organization() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let updated = h
            .manager
            .update_organization(
                a.id,
                OrganizationUpdate {
                    name: Some("Acme".into()),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Acme");
        assert!(!updated.is_active);
    }

    #[tokio::test]
    async fn test_hierarchy_tree() {
        let h = harness();
        let owner = Uuid::now_v7();
        let a = h
            .manager
            .create_organization(NewOrganization::new("A", "a", "top_branch").with_owner(owner), None)
            .await
            .unwrap();
        let b = create(&h, "b", "master_branch", Some(a.id)).await;
        let hidden = create(&h, "h", "master_branch", Some(a.id)).await;
        create(&h, "c", "sub_user", Some(b.id)).await;
        h.manager
            .update_organization(
                hidden.id,
                OrganizationUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let tree = h.manager.build_hierarchy_tree(a.id).await.unwrap();
        assert_eq!(tree.size(), 3);
        assert_eq!(tree.active_user_count, 1);
        assert!(tree.find(hidden.id).is_none());
        assert_eq!(tree.find(b.id).unwrap().children[0].level, 2);

        // Creating under B drops the cached tree of every ancestor.
        create(&h, "c2", "sub_user", Some(b.id)).await;
        assert_eq!(h.manager.build_hierarchy_tree(a.id).await.unwrap().size(), 4);
    }

    #[tokio::test]
    async fn test_descendants_and_ancestors() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let b = create(&h, "b", "master_branch", Some(a.id)).await;
        let c = create(&h, "c", "sub_user", Some(b.id)).await;

        let ids: Vec<Uuid> = h.manager.descendants(a.id).await.unwrap().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![b.id, c.id]);
        let ids: Vec<Uuid> = h.manager.ancestors(c.id).await.unwrap().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_attach_rules() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let owner = Uuid::now_v7();

        let err = h
            .manager
            .attach_user(a.id, Uuid::now_v7(), Role::Member, BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::Validation(_)));

        h.manager.attach_user(a.id, owner, Role::Owner, BTreeSet::new()).await.unwrap();
        let err = h
            .manager
            .attach_user(a.id, owner, Role::Viewer, BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::DuplicateMembership { .. }));
    }

    #[tokio::test]
    async fn test_user_limit() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        license_with_limits(&h, a.id, &[("users", Some(1))]).await;

        h.manager
            .attach_user(a.id, Uuid::now_v7(), Role::Owner, BTreeSet::new())
            .await
            .unwrap();
        let err = h
            .manager
            .attach_user(a.id, Uuid::now_v7(), Role::Member, BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::UserLimitExceeded { limit: 1 }));
    }

    #[tokio::test]
    async fn test_last_owner_protection() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();
        h.manager.attach_user(a.id, first, Role::Owner, BTreeSet::new()).await.unwrap();

        assert!(matches!(
            h.manager.detach_user(a.id, first).await,
            Err(TenancyError::LastOwner(_))
        ));
        assert!(matches!(
            h.manager.update_user_role(a.id, first, Role::Admin, BTreeSet::new()).await,
            Err(TenancyError::LastOwner(_))
        ));

        h.manager.attach_user(a.id, second, Role::Owner, BTreeSet::new()).await.unwrap();
        let demoted = h
            .manager
            .update_user_role(a.id, first, Role::Custom, BTreeSet::from(["view_servers".to_string()]))
            .await
            .unwrap();
        assert_eq!(demoted.role, Role::Custom);
        assert!(demoted.has_permission("view_servers"));

        h.manager.detach_user(a.id, first).await.unwrap();
        assert!(h.manager.membership(a.id, first).await.unwrap().is_none());
        assert!(matches!(
            h.manager.detach_user(a.id, second).await,
            Err(TenancyError::LastOwner(_))
        ));
    }

    #[tokio::test]
    async fn test_move_refreshes_cached_trees() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let b = create(&h, "b", "master_branch", Some(a.id)).await;
        let c = create(&h, "c", "sub_user", Some(b.id)).await;
        let d = create(&h, "d", "top_branch", None).await;

        assert_eq!(h.manager.build_hierarchy_tree(a.id).await.unwrap().size(), 3);
        assert_eq!(h.manager.build_hierarchy_tree(d.id).await.unwrap().size(), 1);
        assert_eq!(h.manager.build_hierarchy_tree(b.id).await.unwrap().level, 1);

        h.manager.move_organization(b.id, Some(d.id)).await.unwrap();

        let old_root = h.manager.build_hierarchy_tree(a.id).await.unwrap();
        assert_eq!(old_root.size(), 1);
        assert!(old_root.find(b.id).is_none());

        let new_root = h.manager.build_hierarchy_tree(d.id).await.unwrap();
        assert_eq!(new_root.size(), 3);
        assert_eq!(new_root.find(b.id).unwrap().level, 1);
        assert_eq!(new_root.find(c.id).unwrap().level, 2);
    }

    #[tokio::test]
    async fn test_move_drops_cached_user_organizations() {
        let h = harness();
        let user = Uuid::now_v7();
        let a = create(&h, "a", "top_branch", None).await;
        let b = h
            .manager
            .create_organization(
                NewOrganization::new("B", "b", "master_branch").with_owner(user),
                Some(a.id),
            )
            .await
            .unwrap();
        let d = create(&h, "d", "top_branch", None).await;

        let cached = h.manager.organizations_for_user(user).await.unwrap();
        assert_eq!(cached[0].parent_id, Some(a.id));
        let key = keys::user_organizations(user);
        assert!(h.cache.get(&key).await.unwrap().is_some());

        h.manager.move_organization(b.id, Some(d.id)).await.unwrap();
        assert!(h.cache.get(&key).await.unwrap().is_none());

        let fresh = h.manager.organizations_for_user(user).await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].parent_id, Some(d.id));
    }

    #[tokio::test]
    async fn test_forced_delete_refreshes_cached_trees() {
        let h = harness();
        let a = create(&h, "a", "top_branch", None).await;
        let b = create(&h, "b", "master_branch", Some(a.id)).await;
        let c = create(&h, "c", "sub_user", Some(b.id)).await;

        assert_eq!(h.manager.build_hierarchy_tree(a.id).await.unwrap().size(), 3);
        assert_eq!(h.manager.build_hierarchy_tree(b.id).await.unwrap().level, 1);

        assert!(h.manager.delete_organization(a.id, true).await.unwrap());

        let err = h.manager.build_hierarchy_tree(a.id).await.unwrap_err();
        assert!(matches!(err, TenancyError::NotFound { .. }));
        let promoted = h.manager.build_hierarchy_tree(b.id).await.unwrap();
        assert_eq!(promoted.level, 0);
        assert_eq!(promoted.find(c.id).unwrap().level, 1);
        assert!(h.manager.delete_organization(a.id, true).await.is_ok_and(|deleted| !deleted));
    }

    #[tokio::test]
    async fn test_organizations_for_user_tracks_membership() {
        let h = harness();
        let user = Uuid::now_v7();
        let a = h
            .manager
            .create_organization(NewOrganization::new("A", "a", "top_branch").with_owner(user), None)
            .await
            .unwrap();
        assert_eq!(h.manager.organizations_for_user(user).await.unwrap().len(), 1);

        let b = h
            .manager
            .create_organization(NewOrganization::new("B", "b", "top_branch"), None)
            .await
            .unwrap();
        h.manager.attach_user(b.id, user, Role::Owner, BTreeSet::new()).await.unwrap();
        let orgs: HashSet<Uuid> = h
            .manager
            .organizations_for_user(user)
            .await
            .unwrap()
            .iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(orgs, HashSet::from([a.id, b.id]));

        h.manager.delete_organization(b.id, false).await.unwrap();
        assert_eq!(h.manager.organizations_for_user(user).await.unwrap().len(), 1);
        assert!(h.manager.active_membership(b.id, user).await.unwrap().is_none());
        assert!(h.manager.active_membership(a.id, user).await.unwrap().is_some());
    }

    #[test]
    fn test_hierarchy_type_roundtrip_in_manager_inputs() {
        assert_eq!(
            NewOrganization::new("A", "a", "sub-user").validate().unwrap(),
            HierarchyType::SubUser
        );
    }
}
