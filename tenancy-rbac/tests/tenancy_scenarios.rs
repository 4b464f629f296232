//! End-to-end tenancy scenarios.
//!
//! These tests wire the hierarchy manager, the license engine and the access
//! resolver together over the in-memory collaborators and a manual clock, and
//! walk through the behaviours callers depend on:
//!
//! 1. Hierarchy levels across creates and moves
//! 2. Cycle and adjacency rejection
//! 3. Last-owner protection and user limits
//! 4. Role-based decisions
//! 5. License status, grace period, domains and usage limits

use chrono::Duration;
use std::collections::BTreeSet;
use std::sync::Arc;
use tenancy_core::{
    CacheStore, Clock, ManualClock, MemoryCache, MemoryUsageProvider, ResourceType, TenancyConfig,
    TenancyError,
};
use tenancy_license::{
    EnterpriseLicense, LicenseConfig, LicenseEngine, LicenseStatus, LicenseTier, LicenseType,
    MemoryLicenseStore,
};
use tenancy_org::{HierarchyManager, MemoryOrganizationStore, NewOrganization, Organization, Role};
use tenancy_rbac::AccessResolver;
use uuid::Uuid;

/// Test fixture wiring every component over shared collaborators.
struct TestFixture {
    /// Controllable time source.
    clock: ManualClock,
    /// Usage counts reported to the license engine.
    usage: Arc<MemoryUsageProvider>,
    /// License engine.
    licenses: Arc<LicenseEngine>,
    /// Hierarchy manager.
    hierarchy: Arc<HierarchyManager>,
    /// Access resolver.
    resolver: AccessResolver,
}

impl TestFixture {
    /// Create a fixture with default configuration.
    fn new() -> Self {
        let clock = ManualClock::new(chrono::Utc::now());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::with_clock(shared_clock.clone()));
        let usage = Arc::new(MemoryUsageProvider::new());

        let licenses = Arc::new(
            LicenseEngine::new(
                Arc::new(MemoryLicenseStore::new()),
                usage.clone(),
                cache.clone(),
                shared_clock.clone(),
                TenancyConfig::default().with_secret("scenario-secret"),
            )
            .expect("engine config is valid"),
        );
        let hierarchy = Arc::new(HierarchyManager::new(
            Arc::new(MemoryOrganizationStore::new()),
            licenses.clone(),
            usage.clone(),
            cache.clone(),
            shared_clock,
        ));
        let resolver = AccessResolver::new(hierarchy.clone(), licenses.clone(), cache);

        Self {
            clock,
            usage,
            licenses,
            hierarchy,
            resolver,
        }
    }

    /// Create an organization, optionally owned and optionally under a parent.
    async fn org(&self, slug: &str, kind: &str, parent: Option<Uuid>) -> Organization {
        self.hierarchy
            .create_organization(NewOrganization::new(slug.to_uppercase(), slug, kind), parent)
            .await
            .expect("organization is valid")
    }

    /// Create a root organization owned by `owner`.
    async fn owned_root(&self, slug: &str, owner: Uuid) -> Organization {
        self.hierarchy
            .create_organization(
                NewOrganization::new(slug.to_uppercase(), slug, "top_branch").with_owner(owner),
                None,
            )
            .await
            .expect("organization is valid")
    }

    /// Issue an enterprise license to an organization.
    async fn enterprise_license(&self, org: Uuid, config: LicenseConfig) -> EnterpriseLicense {
        self.licenses
            .issue_license(org, config)
            .await
            .expect("license issues")
    }

    async fn level(&self, id: Uuid) -> u32 {
        self.hierarchy
            .organization(id)
            .await
            .expect("organization exists")
            .hierarchy_level
    }
}

fn enterprise() -> LicenseConfig {
    LicenseConfig::new(LicenseType::Perpetual, LicenseTier::Enterprise)
}

// ============================================================================
// Hierarchy
// ============================================================================

#[tokio::test]
async fn test_move_subtree_keeps_levels_consistent() {
    let fx = TestFixture::new();
    let a = fx.org("a", "top_branch", None).await;
    let b = fx.org("b", "master_branch", Some(a.id)).await;
    let c = fx.org("c", "sub_user", Some(b.id)).await;
    assert_eq!(b.hierarchy_level, 1);
    assert_eq!(c.hierarchy_level, 2);

    let d = fx.org("d", "top_branch", None).await;
    let moved = fx.hierarchy.move_organization(b.id, Some(d.id)).await.unwrap();

    assert_eq!(moved.parent_id, Some(d.id));
    assert_eq!(fx.level(b.id).await, 1);
    assert_eq!(fx.level(c.id).await, 2);

    let tree = fx.hierarchy.build_hierarchy_tree(d.id).await.unwrap();
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].id, b.id);
    assert_eq!(tree.children[0].children[0].id, c.id);
    assert!(fx.hierarchy.build_hierarchy_tree(a.id).await.unwrap().children.is_empty());
}

#[tokio::test]
async fn test_every_level_matches_its_parent() {
    let fx = TestFixture::new();
    let a = fx.org("a", "top_branch", None).await;
    let b1 = fx.org("b1", "master_branch", Some(a.id)).await;
    let b2 = fx.org("b2", "master_branch", Some(a.id)).await;
    let c = fx.org("c", "sub_user", Some(b1.id)).await;
    fx.org("e", "end_user", Some(c.id)).await;

    fx.hierarchy.move_organization(c.id, Some(b2.id)).await.unwrap();
    fx.hierarchy.move_organization(b1.id, None).await.unwrap();

    let mut all = vec![
        fx.hierarchy.organization(a.id).await.unwrap(),
        fx.hierarchy.organization(b1.id).await.unwrap(),
    ];
    all.extend(fx.hierarchy.descendants(a.id).await.unwrap());
    for org in all {
        match org.parent_id {
            None => assert_eq!(org.hierarchy_level, 0, "{}", org.slug),
            Some(parent) => assert_eq!(org.hierarchy_level, fx.level(parent).await + 1, "{}", org.slug),
        }
    }
}

#[tokio::test]
async fn test_move_into_own_subtree_is_rejected() {
    let fx = TestFixture::new();
    let a = fx.org("a", "top_branch", None).await;
    let b = fx.org("b", "master_branch", Some(a.id)).await;
    let c = fx.org("c", "sub_user", Some(b.id)).await;
    let e = fx.org("e", "end_user", Some(c.id)).await;

    for (org, target) in [(b.id, b.id), (b.id, c.id), (b.id, e.id), (a.id, e.id)] {
        let err = fx.hierarchy.move_organization(org, Some(target)).await.unwrap_err();
        assert!(
            matches!(err, TenancyError::CircularDependency { .. }),
            "moving {} under {} gave {:?}",
            org,
            target,
            err
        );
    }
}

#[tokio::test]
async fn test_adjacency_table_on_create() {
    let fx = TestFixture::new();
    let top = fx.org("top", "top_branch", None).await;

    let err = fx
        .hierarchy
        .create_organization(NewOrganization::new("S", "s", "sub_user"), Some(top.id))
        .await
        .unwrap_err();
    assert!(matches!(err, TenancyError::HierarchyViolation { .. }));

    let master = fx.org("m", "master_branch", Some(top.id)).await;
    let sub = fx.org("s", "sub_user", Some(master.id)).await;
    let leaf = fx.org("l", "end_user", Some(sub.id)).await;
    let err = fx
        .hierarchy
        .create_organization(NewOrganization::new("X", "x", "end_user"), Some(leaf.id))
        .await
        .unwrap_err();
    assert!(matches!(err, TenancyError::HierarchyViolation { .. }));
}

// ============================================================================
// Memberships
// ============================================================================

#[tokio::test]
async fn test_user_limit_blocks_second_member() {
    let fx = TestFixture::new();
    let org = fx.org("solo", "top_branch", None).await;
    fx.enterprise_license(org.id, enterprise().with_limits([("users", Some(1))]))
        .await;

    fx.hierarchy
        .attach_user(org.id, Uuid::now_v7(), Role::Owner, BTreeSet::new())
        .await
        .unwrap();
    let err = fx
        .hierarchy
        .attach_user(org.id, Uuid::now_v7(), Role::Member, BTreeSet::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TenancyError::UserLimitExceeded { limit: 1 }));
}

#[tokio::test]
async fn test_sole_owner_cannot_leave() {
    let fx = TestFixture::new();
    let owner = Uuid::now_v7();
    let org = fx.owned_root("acme", owner).await;
    let member = Uuid::now_v7();
    fx.hierarchy
        .attach_user(org.id, member, Role::Member, BTreeSet::new())
        .await
        .unwrap();

    assert!(matches!(
        fx.hierarchy.detach_user(org.id, owner).await,
        Err(TenancyError::LastOwner(_))
    ));
    fx.hierarchy.detach_user(org.id, member).await.unwrap();

    fx.hierarchy
        .attach_user(org.id, member, Role::Owner, BTreeSet::new())
        .await
        .unwrap();
    fx.hierarchy.detach_user(org.id, owner).await.unwrap();
}

#[tokio::test]
async fn test_unknown_role_name_is_rejected() {
    let err = "superuser".parse::<Role>().unwrap_err();
    assert!(matches!(err, TenancyError::InvalidRole(_)));
}

// ============================================================================
// Access control
// ============================================================================

#[tokio::test]
async fn test_role_defaults() {
    let fx = TestFixture::new();
    let owner = Uuid::now_v7();
    let org = fx.owned_root("acme", owner).await;
    fx.enterprise_license(org.id, enterprise()).await;

    let admin = Uuid::now_v7();
    let member = Uuid::now_v7();
    let viewer = Uuid::now_v7();
    for (user, role) in [(admin, Role::Admin), (member, Role::Member), (viewer, Role::Viewer)] {
        fx.hierarchy
            .attach_user(org.id, user, role, BTreeSet::new())
            .await
            .unwrap();
    }

    assert!(fx.resolver.can_perform(owner, org.id, "delete_organization", None).await);
    assert!(!fx.resolver.can_perform(admin, org.id, "delete_organization", None).await);
    assert!(fx.resolver.can_perform(admin, org.id, "manage_domains", None).await);
    assert!(fx.resolver.can_perform(member, org.id, "view_servers", None).await);
    assert!(!fx.resolver.can_perform(member, org.id, "manage_members", None).await);
    assert!(!fx.resolver.can_perform(viewer, org.id, "deploy_applications", None).await);
    assert!(fx.resolver.can_perform(viewer, org.id, "view_applications", None).await);
}

#[tokio::test]
async fn test_custom_role_uses_explicit_permissions() {
    let fx = TestFixture::new();
    let owner = Uuid::now_v7();
    let org = fx.owned_root("acme", owner).await;
    fx.enterprise_license(org.id, enterprise()).await;

    let operator = Uuid::now_v7();
    fx.hierarchy
        .attach_user(
            org.id,
            operator,
            Role::Custom,
            BTreeSet::from(["manage_servers".to_string()]),
        )
        .await
        .unwrap();

    assert!(fx.resolver.can_perform(operator, org.id, "manage_servers", None).await);
    assert!(!fx.resolver.can_perform(operator, org.id, "view_servers", None).await);
}

#[tokio::test]
async fn test_feature_gate_follows_tier() {
    let fx = TestFixture::new();
    let owner = Uuid::now_v7();
    let org = fx.owned_root("acme", owner).await;
    fx.enterprise_license(
        org.id,
        LicenseConfig::new(LicenseType::Subscription, LicenseTier::Professional),
    )
    .await;

    assert!(fx.resolver.can_perform(owner, org.id, "provision_infrastructure", None).await);
    assert!(!fx.resolver.can_perform(owner, org.id, "manage_white_label", None).await);
    assert!(!fx.resolver.can_perform(owner, org.id, "configure_sso", None).await);
}

// ============================================================================
// Licensing
// ============================================================================

#[tokio::test]
async fn test_revoked_and_suspended_licenses_are_invalid() {
    let fx = TestFixture::new();
    let org = fx.org("acme", "top_branch", None).await;
    let license = fx
        .enterprise_license(org.id, enterprise().with_expiry(fx.clock.now() + Duration::days(30)))
        .await;

    fx.licenses.suspend(license.id).await.unwrap();
    let result = fx.licenses.validate_license(&license.license_key, None).await;
    assert!(!result.is_valid);
    assert_eq!(result.message, "License is suspended");

    fx.licenses.revoke(license.id).await.unwrap();
    let result = fx.licenses.validate_license(&license.license_key, None).await;
    assert!(!result.is_valid);
    assert_eq!(result.message, "License has been revoked");
    assert!(fx.licenses.activate(license.id).await.is_err());
}

#[tokio::test]
async fn test_grace_period_then_expiry_revokes_access() {
    let fx = TestFixture::new();
    let owner = Uuid::now_v7();
    let org = fx.owned_root("acme", owner).await;
    let expires_at = fx.clock.now() + Duration::days(10);
    let license = fx
        .enterprise_license(org.id, enterprise().with_expiry(expires_at))
        .await;

    fx.clock.set(expires_at + Duration::days(3));
    let result = fx.licenses.validate_license(&license.license_key, None).await;
    assert!(result.is_valid);
    assert_eq!(result.metadata["grace_period"], true);
    assert!(fx.resolver.can_perform(owner, org.id, "manage_billing", None).await);

    fx.clock.set(expires_at + Duration::days(8));
    let result = fx.licenses.validate_license(&license.license_key, None).await;
    assert!(!result.is_valid);
    assert_eq!(result.message, "License expired");
    assert_eq!(
        fx.licenses.find(license.id).await.unwrap().status,
        LicenseStatus::Expired
    );

    assert!(!fx.resolver.can_perform(owner, org.id, "manage_billing", None).await);
    assert!(fx.resolver.can_perform(owner, org.id, "view_servers", None).await);
}

#[tokio::test]
async fn test_domain_restrictions() {
    let fx = TestFixture::new();
    let open = fx.org("open", "top_branch", None).await;
    let open_license = fx.enterprise_license(open.id, enterprise()).await;
    assert!(
        fx.licenses
            .validate_license(&open_license.license_key, Some("anything.example"))
            .await
            .is_valid
    );

    let scoped = fx.org("scoped", "top_branch", None).await;
    let scoped_license = fx
        .enterprise_license(scoped.id, enterprise().with_domains(["*.acme.com"]))
        .await;
    assert!(
        fx.licenses
            .validate_license(&scoped_license.license_key, Some("app.acme.com"))
            .await
            .is_valid
    );
    let denied = fx
        .licenses
        .validate_license(&scoped_license.license_key, Some("acme.org"))
        .await;
    assert!(!denied.is_valid);
    assert_eq!(denied.metadata["domain"], "acme.org");
}

#[tokio::test]
async fn test_usage_limit_is_strict() {
    let fx = TestFixture::new();
    let org = fx.org("acme", "top_branch", None).await;
    let license = fx
        .enterprise_license(org.id, enterprise().with_limits([("servers", Some(5))]))
        .await;

    fx.usage.set(org.id, ResourceType::Servers, 5).await;
    let check = fx.licenses.check_usage_limits(&license).await.unwrap();
    assert!(check.within_limits);

    fx.licenses.forget_organization_usage(org.id).await;
    fx.usage.set(org.id, ResourceType::Servers, 6).await;
    let check = fx.licenses.check_usage_limits(&license).await.unwrap();
    assert!(!check.within_limits);
    assert_eq!(check.violations[0].current, 6);
    assert_eq!(check.violations[0].limit, 5);

    let stats = fx.licenses.usage_statistics(&license).await.unwrap();
    assert_eq!(stats["servers"].percentage, 120.0);
    assert_eq!(stats["servers"].remaining, Some(0));
}
