//! Profile entity.
//!
//! A [`Profile`] owns exactly one [`AttributeBag`] and one [`HostRegistry`].
//! Nothing is shared between profiles; two profiles never see each other's
//! attributes or hosts.
//!
//! Password protection is layered on the attribute bag by [`PasswordGuard`]:
//! the password is stored as a PBKDF2-HMAC-SHA256 record under
//! [`PASSWORD_KEY`], never in clear text.

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use chrono::{DateTime, Utc};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attributes::AttributeBag;
use crate::error::{StoreError, StoreResult};
use crate::hosts::{HostEntry, HostRegistry};

/// Attribute holding the password record.
pub const PASSWORD_KEY: &str = "PASSWORD";

/// PBKDF2 iteration count for new password records.
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 600_000;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const RECORD_SCHEME: &str = "pbkdf2-sha256";

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

// ═══════════════════════════════════════════════════════════════════════
//  Profile
// ═══════════════════════════════════════════════════════════════════════

/// A user profile backed by its own attribute bag and host registry.
#[derive(Debug)]
pub struct Profile {
    id: String,
    created_at: DateTime<Utc>,
    attributes: AttributeBag,
    hosts: HostRegistry,
}

/// Serializable snapshot of a [`Profile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attributes: AttributeBag,
    #[serde(default)]
    pub hosts: BTreeMap<String, Vec<HostEntry>>,
}

impl Profile {
    /// Create an empty profile with a fresh time-ordered id.
    pub fn new() -> Self {
        Self::with_id(Uuid::now_v7().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let id = id.into();
        tracing::debug!(profile_id = %id, "profile created");
        Self {
            id,
            created_at: Utc::now(),
            attributes: AttributeBag::new(),
            hosts: HostRegistry::new(),
        }
    }

    /// Rebuild a profile from a snapshot.
    pub fn restore(data: ProfileData) -> Self {
        let hosts = HostRegistry::new();
        hosts.fill(data.hosts);
        Self {
            id: data.id,
            created_at: data.created_at,
            attributes: data.attributes,
            hosts,
        }
    }

    /// Snapshot the profile for persistence.
    pub fn to_data(&self) -> ProfileData {
        ProfileData {
            id: self.id.clone(),
            created_at: self.created_at,
            attributes: self.attributes.clone(),
            hosts: self.hosts.all(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn attributes(&self) -> &AttributeBag {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeBag {
        &mut self.attributes
    }

    pub fn hosts(&self) -> &HostRegistry {
        &self.hosts
    }

    /// Password operations over this profile's attributes.
    pub fn auth(&mut self) -> PasswordGuard<'_> {
        PasswordGuard::new(&mut self.attributes)
    }

    /// `true` when the profile is password protected.
    pub fn uses_password(&self) -> bool {
        self.attributes.has_strict(PASSWORD_KEY)
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Password guard
// ═══════════════════════════════════════════════════════════════════════

/// Sets, verifies, changes and removes the password stored in an
/// [`AttributeBag`].
///
/// Records have the form `pbkdf2-sha256$<iterations>$<salt>$<hash>`, so
/// verification always uses the iteration count the record was created with.
pub struct PasswordGuard<'a> {
    attributes: &'a mut AttributeBag,
    iterations: NonZeroU32,
}

impl<'a> PasswordGuard<'a> {
    pub fn new(attributes: &'a mut AttributeBag) -> Self {
        Self {
            attributes,
            iterations: NonZeroU32::new(DEFAULT_PASSWORD_ITERATIONS).unwrap_or(NonZeroU32::MIN),
        }
    }

    /// Iteration count used for records written by this guard.
    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN);
        self
    }

    pub fn has_password(&self) -> bool {
        self.attributes.has_strict(PASSWORD_KEY)
    }

    /// Store a new password, replacing any existing one.
    pub fn set_password(&mut self, password: &str) -> StoreResult<()> {
        let mut salt = [0u8; SALT_LEN];
        SystemRandom::new()
            .fill(&mut salt)
            .map_err(|_| StoreError::Crypto {
                reason: "failed to generate random salt".into(),
            })?;

        let mut hash = [0u8; HASH_LEN];
        pbkdf2::derive(PBKDF2_ALG, self.iterations, &salt, password.as_bytes(), &mut hash);

        let record = format!(
            "{RECORD_SCHEME}${}${}${}",
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(hash),
        );
        self.attributes.set(PASSWORD_KEY, record);
        tracing::debug!("profile password set");
        Ok(())
    }

    /// Check `password` against the stored record.
    ///
    /// Fails with [`StoreError::NoPasswordSet`] if no password was set.
    pub fn verify_password(&self, password: &str) -> StoreResult<bool> {
        let record = self
            .attributes
            .get_as::<String>(PASSWORD_KEY)?
            .ok_or(StoreError::NoPasswordSet)?;
        let (iterations, salt, hash) = parse_record(&record)?;
        Ok(pbkdf2::verify(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &hash).is_ok())
    }

    /// Replace the password after verifying the current one.
    pub fn change_password(&mut self, old: &str, new: &str) -> StoreResult<()> {
        if !self.verify_password(old)? {
            tracing::warn!("password change rejected: current password mismatch");
            return Err(StoreError::PasswordMismatch);
        }
        self.set_password(new)
    }

    /// Remove password protection after verifying the current password.
    pub fn forget_password(&mut self, current: &str) -> StoreResult<()> {
        if !self.verify_password(current)? {
            tracing::warn!("password removal rejected: current password mismatch");
            return Err(StoreError::PasswordMismatch);
        }
        self.attributes.forget(PASSWORD_KEY);
        tracing::debug!("profile password removed");
        Ok(())
    }
}

fn parse_record(record: &str) -> StoreResult<(NonZeroU32, Vec<u8>, Vec<u8>)> {
    let malformed = || StoreError::Crypto {
        reason: "malformed password record".into(),
    };

    let mut parts = record.split('$');
    if parts.next() != Some(RECORD_SCHEME) {
        return Err(malformed());
    }
    let iterations = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .and_then(NonZeroU32::new)
        .ok_or_else(malformed)?;
    let salt = parts
        .next()
        .and_then(|s| STANDARD_NO_PAD.decode(s).ok())
        .ok_or_else(malformed)?;
    let hash = parts
        .next()
        .and_then(|s| STANDARD_NO_PAD.decode(s).ok())
        .ok_or_else(malformed)?;
    if parts.next().is_some() {
        return Err(malformed());
    }
    Ok((iterations, salt, hash))
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
