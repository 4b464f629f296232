//! License key derivation
//!
//! Keys are derived by hashing the issuance parameters together with a random
//! nonce and the application secret, then formatting a prefix of the digest
//! as dash-separated uppercase blocks (`9F3A-01BC-...`).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tenancy_core::{TenancyConfig, TenancyError, TenancyResult};
use uuid::Uuid;

use crate::tiers::{LicenseTier, LicenseType};

/// Generates license keys.
#[derive(Clone)]
pub struct LicenseKeyGenerator {
    secret: String,
    length: usize,
    group_size: usize,
}

impl std::fmt::Debug for LicenseKeyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseKeyGenerator")
            .field("secret", &"[REDACTED]")
            .field("length", &self.length)
            .field("group_size", &self.group_size)
            .finish()
    }
}

impl LicenseKeyGenerator {
    /// Create a generator from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no application secret is set or the
    /// key shape is invalid.
    pub fn from_config(config: &TenancyConfig) -> TenancyResult<Self> {
        config.validate_for_production()?;
        let secret = config
            .app_secret
            .clone()
            .ok_or_else(|| TenancyError::Config("application secret required".to_string()))?;
        Ok(Self {
            secret,
            length: config.license_key_length,
            group_size: config.license_key_group_size,
        })
    }

    /// Derive a fresh license key.
    ///
    /// # Arguments
    ///
    /// * `organization_id` - Organization the license is issued to
    /// * `issued_at` - Issuance timestamp
    /// * `tier` - License tier
    /// * `license_type` - License term type
    pub fn generate(
        &self,
        organization_id: Uuid,
        issued_at: DateTime<Utc>,
        tier: LicenseTier,
        license_type: LicenseType,
    ) -> String {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        let payload = serde_json::json!({
            "organization_id": organization_id,
            "timestamp": issued_at.timestamp_micros(),
            "tier": tier.as_str(),
            "type": license_type.as_str(),
            "nonce": STANDARD.encode(nonce),
        });

        let mut hasher = Sha256::new();
        hasher.update(payload.to_string().as_bytes());
        hasher.update(self.secret.as_bytes());
        let digest = hasher.finalize();

        let mut raw = hex::encode_upper(digest);
        raw.truncate(self.length);

        self.group(&raw)
    }

    /// Check that a key has the shape this generator produces.
    pub fn is_well_formed(&self, key: &str) -> bool {
        let raw: String = key.chars().filter(|c| *c != '-').collect();
        raw.len() == self.length
            && raw.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
            && self.group(&raw) == key
    }

    fn group(&self, raw: &str) -> String {
        raw.as_bytes()
            .chunks(self.group_size)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join("-")
    }
}
