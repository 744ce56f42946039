//! Unseal material and the places it can come from.
//!
//! Freshly generated material lives in memory for the rest of the run. When
//! initialization was skipped the durable store is the only source, and a
//! missing entry there is fatal.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

/// Separator used when the key shares are stored as one string.
pub const KEY_DELIMITER: &str = ";";

#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("secret {0} not found")]
    NotFound(String),
    #[error("secret {0} already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Durable key-value store that never overwrites.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// # Errors
    /// Returns `NotFound` if no entry exists under `name`.
    async fn get(&self, name: &str) -> Result<String, SecretStoreError>;

    /// # Errors
    /// Returns `AlreadyExists` if an entry exists under `name`.
    async fn create_if_absent(&self, name: &str, value: &str) -> Result<(), SecretStoreError>;
}

/// Root token and key shares produced by one initialization.
#[derive(Clone, PartialEq, Eq)]
pub struct UnsealMaterial {
    pub root_token: String,
    pub keys: Vec<String>,
    pub shares: u32,
    pub threshold: u32,
}

impl std::fmt::Debug for UnsealMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsealMaterial")
            .field("root_token", &"<redacted>")
            .field("keys", &format_args!("<{} redacted>", self.keys.len()))
            .field("shares", &self.shares)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl UnsealMaterial {
    #[must_use]
    pub fn joined_keys(&self) -> String {
        self.keys.join(KEY_DELIMITER)
    }
}

#[must_use]
pub fn split_keys(joined: &str) -> Vec<String> {
    joined
        .split(KEY_DELIMITER)
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

/// Names of the two store entries holding the material.
#[derive(Debug, Clone)]
pub struct MaterialKeys {
    pub root_token: String,
    pub unseal_keys: String,
}

/// Uniform access to unseal material regardless of where it lives.
#[async_trait]
pub trait MaterialSource: Send + Sync {
    /// # Errors
    /// Returns an error if the token is unavailable.
    async fn root_token(&self) -> Result<String>;

    /// # Errors
    /// Returns an error if the keys are unavailable or empty.
    async fn unseal_keys(&self) -> Result<Vec<String>>;
}

/// Material captured during this run.
#[derive(Debug, Clone)]
pub struct InMemoryMaterial(pub UnsealMaterial);

#[async_trait]
impl MaterialSource for InMemoryMaterial {
    async fn root_token(&self) -> Result<String> {
        Ok(self.0.root_token.clone())
    }

    async fn unseal_keys(&self) -> Result<Vec<String>> {
        if self.0.keys.is_empty() {
            anyhow::bail!("Generated unseal material contains no keys");
        }
        Ok(self.0.keys.clone())
    }
}

/// Material persisted by an earlier run.
pub struct StoredMaterial {
    store: Arc<dyn SecretStore>,
    keys: MaterialKeys,
}

impl StoredMaterial {
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, keys: MaterialKeys) -> Self {
        Self { store, keys }
    }
}

#[async_trait]
impl MaterialSource for StoredMaterial {
    async fn root_token(&self) -> Result<String> {
        let token = self
            .store
            .get(&self.keys.root_token)
            .await
            .with_context(|| format!("Cannot load root token from {}", self.keys.root_token))?;
        if token.trim().is_empty() {
            anyhow::bail!("Stored root token {} is empty", self.keys.root_token);
        }
        info!("Root token loaded from {}", self.keys.root_token);
        Ok(token.trim().to_string())
    }

    async fn unseal_keys(&self) -> Result<Vec<String>> {
        let joined = self
            .store
            .get(&self.keys.unseal_keys)
            .await
            .with_context(|| format!("Cannot load unseal keys from {}", self.keys.unseal_keys))?;
        let keys = split_keys(&joined);
        if keys.is_empty() {
            anyhow::bail!("Stored unseal keys {} are empty", self.keys.unseal_keys);
        }
        info!("Unseal keys loaded from {}", self.keys.unseal_keys);
        Ok(keys)
    }
}

/// Persists freshly generated material without overwriting anything.
///
/// Returns the material that is authoritative afterwards: where an entry
/// already existed, the stored value wins over the generated one.
///
/// # Errors
/// Returns an error if the store fails for any reason other than the entry
/// already existing.
pub async fn persist_material(
    store: &dyn SecretStore,
    keys: &MaterialKeys,
    generated: &UnsealMaterial,
) -> Result<UnsealMaterial> {
    let root_token = get_or_create(store, &keys.root_token, &generated.root_token).await?;
    let joined = get_or_create(store, &keys.unseal_keys, &generated.joined_keys()).await?;
    let stored_keys = split_keys(&joined);
    if root_token != generated.root_token || stored_keys != generated.keys {
        warn!("Stored unseal material differs from the material generated in this run; using the stored copy");
    }
    Ok(UnsealMaterial {
        root_token,
        keys: stored_keys,
        shares: generated.shares,
        threshold: generated.threshold,
    })
}

async fn get_or_create(store: &dyn SecretStore, name: &str, value: &str) -> Result<String> {
    match store.get(name).await {
        Ok(existing) => {
            info!("Secret {name} already exists; keeping it");
            return Ok(existing);
        }
        Err(SecretStoreError::NotFound(_)) => {}
        Err(err) => return Err(err).with_context(|| format!("Failed to read secret {name}")),
    }
    match store.create_if_absent(name, value).await {
        Ok(()) => {
            info!("Secret {name} created");
            Ok(value.to_string())
        }
        Err(SecretStoreError::AlreadyExists(_)) => {
            info!("Secret {name} was created concurrently; keeping the stored value");
            store
                .get(name)
                .await
                .with_context(|| format!("Failed to read secret {name}"))
        }
        Err(err) => Err(err).with_context(|| format!("Failed to create secret {name}")),
    }
}

/// Prints the material in cleartext. Only reachable through the explicit
/// `log_secrets` setting.
pub fn log_material(material: &UnsealMaterial) {
    info!("Root Token: {}", material.root_token);
    info!("Unseal Key(s): {}", material.joined_keys());
}
