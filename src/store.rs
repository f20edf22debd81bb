//! Container manager persistence.
//!
//! The manager keeps two things in its management store: the admin
//! password (single slot) and one persisted SLA per installed component,
//! replayed across restarts by `reload`. The store's wire protocol is out
//! of scope; [`KeyValueStore`] abstracts the key-value surface it offers.
//!
//! ## Key Layout
//!
//! ```text
//! password      admin password (plain string)
//! sla/{name}    installed SLA (JSON)
//! ```
//!
//! Individual writes are atomic; there are no ordering guarantees across
//! keys.

use crate::constants::{PASSWORD_KEY, SLA_KEY_PREFIX};
use crate::error::{Error, Result};
use crate::sla::Sla;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// Key-Value Seam
// =============================================================================

/// Key-value surface of the management store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Writes a value. Atomic per key.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Reads a value, `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deletes a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Lists keys under a prefix.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

// =============================================================================
// CM Store
// =============================================================================

/// Typed access to the container manager's persisted state.
pub struct CmStore {
    kv: Arc<dyn KeyValueStore>,
}

impl CmStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Loads the admin password, `None` when never saved.
    pub async fn load_password(&self) -> Result<Option<String>> {
        let bytes = self
            .kv
            .get(PASSWORD_KEY)
            .await
            .map_err(persistence)?;
        Ok(bytes
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .filter(|p| !p.is_empty()))
    }

    /// Saves the admin password.
    pub async fn save_password(&self, password: &str) -> Result<()> {
        self.kv
            .put(PASSWORD_KEY, password.as_bytes())
            .await
            .map_err(persistence)
    }

    /// Persists an SLA under `sla/{name}`.
    pub async fn save_sla(&self, sla: &Sla) -> Result<()> {
        let key = sla_key(&sla.name);
        let json = serde_json::to_vec(sla)?;
        debug!("saving {}", key);
        self.kv.put(&key, &json).await.map_err(persistence)
    }

    /// Deletes a persisted SLA. Idempotent.
    pub async fn delete_sla(&self, name: &str) -> Result<()> {
        self.kv.delete(&sla_key(name)).await.map_err(persistence)
    }

    /// Reads every persisted SLA. Entries that no longer parse are
    /// skipped with a warning rather than blocking reload.
    pub async fn get_all_slas(&self) -> Result<Vec<Sla>> {
        let keys = self
            .kv
            .list_keys(SLA_KEY_PREFIX)
            .await
            .map_err(persistence)?;

        let mut slas = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(bytes) = self.kv.get(&key).await.map_err(persistence)? else {
                continue;
            };
            match serde_json::from_slice::<Sla>(&bytes) {
                Ok(sla) => slas.push(sla),
                Err(e) => warn!("skipping unparseable SLA at {}: {}", key, e),
            }
        }
        Ok(slas)
    }

    /// Drops every persisted SLA.
    pub async fn clear_all(&self) -> Result<()> {
        let keys = self
            .kv
            .list_keys(SLA_KEY_PREFIX)
            .await
            .map_err(persistence)?;
        for key in keys {
            self.kv.delete(&key).await.map_err(persistence)?;
        }
        Ok(())
    }
}

fn sla_key(name: &str) -> String {
    format!("{}{}", SLA_KEY_PREFIX, name)
}

fn persistence(e: Error) -> Error {
    match e {
        already @ Error::PersistenceFailure(_) => already,
        other => Error::PersistenceFailure(other.to_string()),
    }
}
