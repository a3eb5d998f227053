pub mod registry;

pub use registry::{Customer, CustomerRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::store::StoreError;

/// Longest sanitized slug accepted; keeps `<slug>_<collection>` inside
/// Postgres' 63-byte identifier limit for every entity name we ship.
const MAX_SLUG_LEN: usize = 40;

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Invalid tenant slug: {0}")]
    InvalidSlug(String),

    #[error("Tenant slug '{slug}' maps to collection prefix '{prefix}' already owned by '{existing}'")]
    SlugCollision {
        slug: String,
        existing: String,
        prefix: String,
    },

    #[error("Tenant already exists: {0}")]
    AlreadyExists(String),

    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Tenant is inactive: {0}")]
    Inactive(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A sanitized tenant slug, safe to use as a collection-name prefix.
///
/// Only constructible through [`TenantId::sanitize`], so every value in the
/// ambient context has already been normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Lowercase the raw slug and replace path, quote and whitespace
    /// characters with `_`.
    pub fn sanitize(raw: &str) -> Result<Self, TenantError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TenantError::InvalidSlug("Tenant slug cannot be empty".to_string()));
        }

        let sanitized: String = trimmed
            .chars()
            .map(|c| match c {
                '/' | '\\' | '.' | '"' | '\'' | '$' => '_',
                c if c.is_whitespace() => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        if sanitized.len() > MAX_SLUG_LEN {
            return Err(TenantError::InvalidSlug(format!(
                "Tenant slug '{}' exceeds {} characters",
                raw, MAX_SLUG_LEN
            )));
        }
        if !sanitized.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(TenantError::InvalidSlug(format!(
                "Tenant slug '{}' contains unsupported characters",
                raw
            )));
        }
        if sanitized.chars().all(|c| c == '_' || c == '-') {
            return Err(TenantError::InvalidSlug(format!(
                "Tenant slug '{}' has no usable characters",
                raw
            )));
        }

        Ok(Self(sanitized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
