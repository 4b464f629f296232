//! License engine
//!
//! Owns the license lifecycle state machine and the validation pipeline:
//!
//! ```text
//! lookup ─→ status ─→ expiry/grace ─→ domain ─→ usage limits ─→ valid
//!   │         │            │            │            │
//!   ▼         ▼            ▼            ▼            ▼
//! not found  revoked/   expired      domain not   usage limits
//!            suspended  (persisted)  authorized   exceeded
//! ```
//!
//! The pipeline short-circuits on the first failure. Results are cached per
//! (key, domain): 300s on success, 60s on ordinary failure, 30s on usage
//! failure. Backend errors are logged and turned into a "system error"
//! result; they are never propagated to the caller and never cached.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tenancy_core::cache::{self, keys};
use tenancy_core::{
    CacheStore, Clock, ResourceType, TenancyConfig, TenancyError, TenancyResult, UsageMetrics,
    UsageProvider,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::key::LicenseKeyGenerator;
use crate::license::{EnterpriseLicense, LicenseConfig, LicenseStatus};
use crate::store::LicenseStore;
use crate::validation::{
    ResourceUsage, UsageCheck, UsageViolation, ValidationFailure, ValidationResult,
};

/// License engine.
pub struct LicenseEngine {
    store: Arc<dyn LicenseStore>,
    usage: Arc<dyn UsageProvider>,
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    config: TenancyConfig,
    keys: LicenseKeyGenerator,
}

impl std::fmt::Debug for LicenseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseEngine")
            .field("keys", &self.keys)
            .field("grace_period_days", &self.config.grace_period_days)
            .finish_non_exhaustive()
    }
}

impl LicenseEngine {
    /// Create a license engine.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no application secret is set.
    pub fn new(
        store: Arc<dyn LicenseStore>,
        usage: Arc<dyn UsageProvider>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        config: TenancyConfig,
    ) -> TenancyResult<Self> {
        let keys = LicenseKeyGenerator::from_config(&config)?;
        Ok(Self {
            store,
            usage,
            cache,
            clock,
            config,
            keys,
        })
    }

    /// Engine configuration.
    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Issuance and lookup
    // ------------------------------------------------------------------

    /// Issue a new active license to an organization.
    ///
    /// Features and limits default to the tier's; expiry defaults to the
    /// license type's term.
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed domain patterns or an expiry in the past
    /// - `Conflict` when the organization already has an active license and
    ///   single-active enforcement is on
    #[instrument(skip(self, config), fields(tier = config.license_tier.as_str()))]
    pub async fn issue_license(
        &self,
        organization_id: Uuid,
        config: LicenseConfig,
    ) -> TenancyResult<EnterpriseLicense> {
        config.validate()?;

        if self.config.enforce_single_active_license {
            if let Some(existing) = self.current_license(organization_id).await? {
                return Err(TenancyError::Conflict(format!(
                    "organization {} already has active license {}",
                    organization_id, existing.id
                )));
            }
        }

        let issued_at = self.clock.now();
        let expires_at = config
            .expires_at
            .or_else(|| config.license_type.default_term().map(|term| issued_at + term));
        if matches!(expires_at, Some(at) if at <= issued_at) {
            return Err(TenancyError::Validation(
                "license expiry must be in the future".to_string(),
            ));
        }

        let license_key = self.keys.generate(
            organization_id,
            issued_at,
            config.license_tier,
            config.license_type,
        );
        let license = EnterpriseLicense {
            id: Uuid::now_v7(),
            organization_id,
            license_key,
            license_type: config.license_type,
            license_tier: config.license_tier,
            features: config
                .features
                .unwrap_or_else(|| config.license_tier.default_features()),
            limits: config
                .limits
                .unwrap_or_else(|| config.license_tier.default_limits()),
            issued_at,
            expires_at,
            authorized_domains: config.authorized_domains,
            status: LicenseStatus::Active,
            last_validated_at: None,
        };

        self.store.insert(license.clone()).await?;
        cache::invalidate_permissions(self.cache.as_ref(), organization_id).await;

        info!(license_id = %license.id, "License issued");
        Ok(license)
    }

    /// Look up a license by ID.
    pub async fn find(&self, license_id: Uuid) -> TenancyResult<EnterpriseLicense> {
        self.store
            .find(license_id)
            .await?
            .ok_or_else(|| TenancyError::not_found("license", license_id))
    }

    /// Look up a license by key.
    pub async fn find_by_key(&self, license_key: &str) -> TenancyResult<EnterpriseLicense> {
        self.store
            .find_by_key(license_key)
            .await?
            .ok_or_else(|| TenancyError::NotFound {
                entity: "license",
                id: license_key.to_string(),
            })
    }

    /// All licenses of an organization, oldest first.
    pub async fn licenses_for(&self, organization_id: Uuid) -> TenancyResult<Vec<EnterpriseLicense>> {
        self.store.for_organization(organization_id).await
    }

    /// The organization's current license: its most recently issued license
    /// with active status, whether or not it currently validates.
    pub async fn current_license(
        &self,
        organization_id: Uuid,
    ) -> TenancyResult<Option<EnterpriseLicense>> {
        Ok(self.active_licenses(organization_id).await?.pop())
    }

    /// Licenses of an organization with active status, oldest first.
    ///
    /// Active licenses already past their grace period are persisted as
    /// expired on the way and left out, so a lapsed license that was never
    /// validated does not keep holding the organization's active slot.
    async fn active_licenses(&self, organization_id: Uuid) -> TenancyResult<Vec<EnterpriseLicense>> {
        let now = self.clock.now();
        let mut active = Vec::new();
        for license in self.store.for_organization(organization_id).await? {
            if license.status != LicenseStatus::Active {
                continue;
            }
            if self.past_grace(&license, now) {
                self.mark_expired(&license).await;
                continue;
            }
            active.push(license);
        }
        Ok(active)
    }

    fn past_grace(&self, license: &EnterpriseLicense, now: DateTime<Utc>) -> bool {
        license
            .days_expired(now)
            .is_some_and(|days| days > self.config.grace_period_days)
    }

    /// The organization's current license if it passes validation.
    pub async fn valid_license(
        &self,
        organization_id: Uuid,
    ) -> TenancyResult<Option<EnterpriseLicense>> {
        let Some(license) = self.current_license(organization_id).await? else {
            return Ok(None);
        };
        let result = self.validate_license(&license.license_key, None).await;
        Ok(result.is_valid.then(|| result.license.unwrap_or(license)))
    }

    /// Check if the organization's currently valid license enables a feature.
    pub async fn has_feature(&self, organization_id: Uuid, feature: &str) -> TenancyResult<bool> {
        Ok(self
            .valid_license(organization_id)
            .await?
            .is_some_and(|license| license.has_feature(feature)))
    }

    /// Finite limit on the organization's current license.
    ///
    /// # Returns
    ///
    /// `None` when there is no current license, or it does not cap `resource`
    pub async fn limit_for(
        &self,
        organization_id: Uuid,
        resource: ResourceType,
    ) -> TenancyResult<Option<u64>> {
        Ok(self
            .current_license(organization_id)
            .await?
            .and_then(|license| license.limit(resource)))
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Run the validation pipeline for a key, optionally for a domain.
    ///
    /// Never fails: backend errors produce a "system error" result.
    pub async fn validate_license(&self, license_key: &str, domain: Option<&str>) -> ValidationResult {
        let generation =
            cache::generation(self.cache.as_ref(), &keys::license_scope(license_key)).await;
        let cache_key = keys::license_validation(license_key, &generation, domain);

        if let Some(cached) = cache::get_json::<ValidationResult>(self.cache.as_ref(), &cache_key).await {
            debug!(license_key = %license_key, "License validation served from cache");
            return cached;
        }

        let result = match self.run_validation(license_key, domain).await {
            Ok(result) => result,
            Err(e) => {
                error!(license_key = %license_key, error = %e, "License validation failed");
                return ValidationResult::system_error();
            }
        };

        let ttl = match result.failure {
            None => self.config.cache.license_valid(),
            Some(ValidationFailure::UsageLimitsExceeded) => self.config.cache.license_usage_invalid(),
            Some(_) => self.config.cache.license_invalid(),
        };
        cache::put_json(self.cache.as_ref(), &cache_key, &result, ttl).await;

        result
    }

    async fn run_validation(
        &self,
        license_key: &str,
        domain: Option<&str>,
    ) -> TenancyResult<ValidationResult> {
        let Some(mut license) = self.store.find_by_key(license_key).await? else {
            return Ok(ValidationResult::invalid(
                ValidationFailure::NotFound,
                "License not found",
                None,
            ));
        };

        match license.status {
            LicenseStatus::Revoked => {
                return Ok(ValidationResult::invalid(
                    ValidationFailure::Revoked,
                    "License has been revoked",
                    Some(license),
                ))
            }
            LicenseStatus::Suspended => {
                return Ok(ValidationResult::invalid(
                    ValidationFailure::Suspended,
                    "License is suspended",
                    Some(license),
                ))
            }
            LicenseStatus::Expired => {
                return Ok(ValidationResult::invalid(
                    ValidationFailure::Expired,
                    "License expired",
                    Some(license),
                ))
            }
            LicenseStatus::Active => {}
        }

        let now = self.clock.now();
        let grace_days = self.config.grace_period_days;
        let days_in_grace = match license.days_expired(now) {
            Some(days_expired) if days_expired > grace_days => {
                self.mark_expired(&license).await;
                license.status = LicenseStatus::Expired;
                return Ok(ValidationResult::invalid(
                    ValidationFailure::Expired,
                    "License expired",
                    Some(license),
                )
                .with_metadata("days_expired", days_expired));
            }
            Some(days_expired) => {
                warn!(
                    license_id = %license.id,
                    days_expired,
                    grace_days,
                    "License expired, validating within grace period"
                );
                Some(days_expired)
            }
            None => None,
        };

        if let Some(domain) = domain {
            if !license.is_domain_authorized(domain) {
                return Ok(ValidationResult::invalid(
                    ValidationFailure::DomainNotAuthorized,
                    "Domain not authorized",
                    Some(license),
                )
                .with_metadata("domain", domain));
            }
        }

        let check = self.check_usage_limits(&license).await?;
        if !check.within_limits {
            let summary = check
                .violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Ok(ValidationResult::invalid(
                ValidationFailure::UsageLimitsExceeded,
                format!("Usage limits exceeded: {}", summary),
                Some(license),
            )
            .with_violations(check.violations));
        }

        match self.store.touch_validated(license.id, now).await {
            Ok(()) => license.last_validated_at = Some(now),
            Err(e) => warn!(license_id = %license.id, error = %e, "Failed to record validation time"),
        }

        let mut result = ValidationResult::valid(license);
        if let Some(days_expired) = days_in_grace {
            result.message = "License is valid (grace period)".to_string();
            result = result
                .with_metadata("grace_period", true)
                .with_metadata("days_expired", days_expired)
                .with_metadata("grace_days_remaining", grace_days - days_expired);
        }
        Ok(result)
    }

    async fn mark_expired(&self, license: &EnterpriseLicense) {
        match self.store.set_status(license.id, LicenseStatus::Expired).await {
            Ok(()) => {
                info!(license_id = %license.id, "License marked expired");
                cache::invalidate_license_validation(self.cache.as_ref(), &license.license_key)
                    .await;
                cache::invalidate_permissions(self.cache.as_ref(), license.organization_id).await;
            }
            Err(e) => warn!(license_id = %license.id, error = %e, "Failed to mark license expired"),
        }
    }

    // ------------------------------------------------------------------
    // Usage
    // ------------------------------------------------------------------

    /// Current usage of an organization, cached for the usage TTL.
    pub async fn organization_usage(&self, organization_id: Uuid) -> TenancyResult<UsageMetrics> {
        let key = keys::organization_usage(organization_id);
        if let Some(metrics) = cache::get_json::<UsageMetrics>(self.cache.as_ref(), &key).await {
            return Ok(metrics);
        }
        let metrics = self.usage.usage(organization_id).await?;
        cache::put_json(
            self.cache.as_ref(),
            &key,
            &metrics,
            self.config.cache.organization_usage(),
        )
        .await;
        Ok(metrics)
    }

    /// Drop cached usage of an organization.
    pub async fn forget_organization_usage(&self, organization_id: Uuid) {
        cache::forget_logged(self.cache.as_ref(), &keys::organization_usage(organization_id)).await;
    }

    /// Compare current usage against every limit on the license.
    ///
    /// A limit is violated only when usage strictly exceeds it. Limit keys
    /// that name no known resource count as zero usage.
    pub async fn check_usage_limits(&self, license: &EnterpriseLicense) -> TenancyResult<UsageCheck> {
        let metrics = self.organization_usage(license.organization_id).await?;

        let mut usage = BTreeMap::new();
        let mut violations = Vec::new();
        for (resource, limit) in &license.limits {
            let current = ResourceType::parse(resource)
                .map(|r| metrics.get(r))
                .unwrap_or(0);
            usage.insert(resource.clone(), current);
            if let Some(limit) = *limit {
                if current > limit {
                    violations.push(UsageViolation {
                        resource: resource.clone(),
                        current,
                        limit,
                    });
                }
            }
        }

        Ok(UsageCheck {
            within_limits: violations.is_empty(),
            violations,
            usage,
            limits: license.limits.clone(),
        })
    }

    /// Per-limit usage breakdown of a license.
    pub async fn usage_statistics(
        &self,
        license: &EnterpriseLicense,
    ) -> TenancyResult<BTreeMap<String, ResourceUsage>> {
        let metrics = self.organization_usage(license.organization_id).await?;
        Ok(license
            .limits
            .iter()
            .map(|(resource, limit)| {
                let current = ResourceType::parse(resource)
                    .map(|r| metrics.get(r))
                    .unwrap_or(0);
                (resource.clone(), ResourceUsage::compute(current, *limit))
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Reactivate a suspended license.
    ///
    /// # Returns
    ///
    /// `true` if the status changed, `false` if it was already active
    pub async fn activate(&self, license_id: Uuid) -> TenancyResult<bool> {
        let license = self.find(license_id).await?;
        match license.status {
            LicenseStatus::Active => return Ok(false),
            LicenseStatus::Suspended => {}
            LicenseStatus::Revoked | LicenseStatus::Expired => {
                return Err(invalid_transition(license.status, LicenseStatus::Active))
            }
        }
        self.ensure_no_other_active(&license).await?;
        self.transition(&license, LicenseStatus::Active).await?;
        Ok(true)
    }

    /// Suspend an active license.
    ///
    /// # Returns
    ///
    /// `true` if the status changed, `false` if it was already suspended
    pub async fn suspend(&self, license_id: Uuid) -> TenancyResult<bool> {
        let license = self.find(license_id).await?;
        match license.status {
            LicenseStatus::Suspended => return Ok(false),
            LicenseStatus::Active => {}
            LicenseStatus::Revoked | LicenseStatus::Expired => {
                return Err(invalid_transition(license.status, LicenseStatus::Suspended))
            }
        }
        self.transition(&license, LicenseStatus::Suspended).await?;
        Ok(true)
    }

    /// Permanently revoke an active or suspended license.
    ///
    /// # Returns
    ///
    /// `true` if the status changed, `false` if it was already revoked
    pub async fn revoke(&self, license_id: Uuid) -> TenancyResult<bool> {
        let license = self.find(license_id).await?;
        match license.status {
            LicenseStatus::Revoked => return Ok(false),
            LicenseStatus::Active | LicenseStatus::Suspended => {}
            LicenseStatus::Expired => {
                return Err(invalid_transition(license.status, LicenseStatus::Revoked))
            }
        }
        self.transition(&license, LicenseStatus::Revoked).await?;
        Ok(true)
    }

    /// Extend a license to a new expiry, returning an expired license to
    /// active.
    pub async fn renew_license(
        &self,
        license_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> TenancyResult<EnterpriseLicense> {
        let mut license = self.find(license_id).await?;
        if license.status == LicenseStatus::Revoked {
            return Err(invalid_transition(license.status, LicenseStatus::Active));
        }
        if expires_at <= self.clock.now() {
            return Err(TenancyError::Validation(
                "renewal expiry must be in the future".to_string(),
            ));
        }
        if license.status == LicenseStatus::Expired {
            self.ensure_no_other_active(&license).await?;
            license.status = LicenseStatus::Active;
        }
        license.expires_at = Some(expires_at);

        self.store.update(&license).await?;
        self.invalidate(&license).await;

        info!(license_id = %license.id, expires_at = %expires_at, "License renewed");
        Ok(license)
    }

    async fn transition(&self, license: &EnterpriseLicense, to: LicenseStatus) -> TenancyResult<()> {
        self.store.set_status(license.id, to).await?;
        self.invalidate(license).await;
        info!(
            license_id = %license.id,
            from = %license.status,
            to = %to,
            "License status changed"
        );
        Ok(())
    }

    async fn ensure_no_other_active(&self, license: &EnterpriseLicense) -> TenancyResult<()> {
        if !self.config.enforce_single_active_license {
            return Ok(());
        }
        let other = self
            .active_licenses(license.organization_id)
            .await?
            .into_iter()
            .find(|l| l.id != license.id);
        match other {
            Some(other) => Err(TenancyError::Conflict(format!(
                "organization {} already has active license {}",
                license.organization_id, other.id
            ))),
            None => Ok(()),
        }
    }

    async fn invalidate(&self, license: &EnterpriseLicense) {
        cache::invalidate_license_validation(self.cache.as_ref(), &license.license_key).await;
        cache::invalidate_permissions(self.cache.as_ref(), license.organization_id).await;
    }
}

fn invalid_transition(from: LicenseStatus, to: LicenseStatus) -> TenancyError {
    TenancyError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}
