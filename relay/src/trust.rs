//! Decide which identity key a client identifier is bound to.
//!
//! [TrustOnFirstUse] binds an identifier to the first key presented for it and never changes
//! the binding afterwards. An attacker who reaches the relay before the legitimate owner of an
//! identifier can therefore claim it. A policy backed by an external authority can be substituted
//! by implementing [TrustPolicy].

use shield_cryptography::{pem, PublicKey};
use std::{
    collections::BTreeMap,
    fs,
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tokio::task::spawn_blocking;
use tracing::{debug, info};

/// Errors that can occur when reading or writing pinned keys.
#[derive(Error, Debug)]
pub enum TrustError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pin store: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid pinned key for {0}")]
    InvalidKey(String),
    #[error("pin task failed")]
    Interrupted,
}

/// Persistence for pinned keys, stored as identifier to PEM.
pub trait PinStore: Send + 'static {
    /// Load all pins.
    fn load(&self) -> Result<BTreeMap<String, String>, TrustError>;

    /// Replace all pins with `pins`.
    fn save(&self, pins: &BTreeMap<String, String>) -> Result<(), TrustError>;
}

/// Pins kept in a JSON object on disk.
#[derive(Clone, Debug)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PinStore for JsonFile {
    fn load(&self) -> Result<BTreeMap<String, String>, TrustError> {
        match fs::read(&self.path) {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, pins: &BTreeMap<String, String>) -> Result<(), TrustError> {
        // Write a sibling file and rename it over the old one
        let raw = serde_json::to_vec_pretty(pins)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Pins kept in memory only.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    pins: Arc<Mutex<BTreeMap<String, String>>>,
}

impl PinStore for Memory {
    fn load(&self) -> Result<BTreeMap<String, String>, TrustError> {
        Ok(self.pins.lock().unwrap().clone())
    }

    fn save(&self, pins: &BTreeMap<String, String>) -> Result<(), TrustError> {
        *self.pins.lock().unwrap() = pins.clone();
        Ok(())
    }
}

/// Resolves the key a claimed identifier must prove possession of.
pub trait TrustPolicy: Clone + Send + Sync + 'static {
    /// Returns the key bound to `client_id`, if any.
    fn pinned(&self, client_id: &str) -> Option<PublicKey>;

    /// Bind `presented` to `client_id` unless a key is already bound, returning whichever key
    /// is bound afterwards.
    fn pin(
        &self,
        client_id: &str,
        presented: PublicKey,
    ) -> impl Future<Output = Result<PublicKey, TrustError>> + Send;
}

struct Pins<S: PinStore> {
    store: S,
    keys: BTreeMap<String, PublicKey>,
}

/// Binds each identifier to the first key presented for it.
pub struct TrustOnFirstUse<S: PinStore> {
    inner: Arc<Mutex<Pins<S>>>,
}

impl<S: PinStore> Clone for TrustOnFirstUse<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: PinStore> TrustOnFirstUse<S> {
    /// Load all existing pins from `store`.
    pub fn new(store: S) -> Result<Self, TrustError> {
        let mut keys = BTreeMap::new();
        for (client_id, encoded) in store.load()? {
            let key = pem::decode_public_key(&encoded)
                .map_err(|_| TrustError::InvalidKey(client_id.clone()))?;
            keys.insert(client_id, key);
        }
        debug!(pins = keys.len(), "loaded pinned keys");
        Ok(Self {
            inner: Arc::new(Mutex::new(Pins { store, keys })),
        })
    }

    /// Number of pinned identifiers.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().keys.len()
    }

    /// Returns whether no identifier is pinned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: PinStore> TrustPolicy for TrustOnFirstUse<S> {
    fn pinned(&self, client_id: &str) -> Option<PublicKey> {
        self.inner.lock().unwrap().keys.get(client_id).cloned()
    }

    async fn pin(&self, client_id: &str, presented: PublicKey) -> Result<PublicKey, TrustError> {
        // Saving blocks on the store, so run it off the async workers
        let inner = self.inner.clone();
        let client_id = client_id.to_string();
        spawn_blocking(move || -> Result<PublicKey, TrustError> {
            let mut pins = inner.lock().unwrap();
            if let Some(pinned) = pins.keys.get(&client_id) {
                debug!(%client_id, "identifier pinned concurrently");
                return Ok(pinned.clone());
            }

            // Persist before the pin takes effect
            let mut encoded: BTreeMap<String, String> = pins
                .keys
                .iter()
                .map(|(id, key)| (id.clone(), pem::encode_public_key(key)))
                .collect();
            encoded.insert(client_id.clone(), pem::encode_public_key(&presented));
            pins.store.save(&encoded)?;
            info!(%client_id, key = %presented, "pinned new identity");
            pins.keys.insert(client_id, presented.clone());
            Ok(presented)
        })
        .await
        .map_err(|_| TrustError::Interrupted)?
    }
}
