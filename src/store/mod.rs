use crate::{
    error::AppResult,
    types::{Host, SerializedCertificate},
};
use std::{collections::BTreeMap, sync::Arc};

mod backend;
mod legacy;

#[cfg(test)]
pub use backend::{MemoryBackend, ReadOnlyBackend};
pub use backend::{JsonFileBackend, TrustStoreBackend};
pub use legacy::LegacyCertificateFile;

pub type TrustMap = BTreeMap<Host, SerializedCertificate>;

/// Host to trusted certificate mapping. At most one certificate per host.
///
/// Every mutation rewrites the whole mapping through the backend. Write
/// failures are logged and never undo the in-memory change.
#[derive(Clone, Debug)]
pub struct TrustStore {
    entries: TrustMap,
    backend: Arc<dyn TrustStoreBackend>,
}

impl TrustStore {
    /// Loads the current-format mapping, then folds in the legacy file if
    /// one is given. A backend that cannot be read starts the store empty.
    pub async fn load(
        backend: Arc<dyn TrustStoreBackend>,
        legacy: Option<LegacyCertificateFile>,
    ) -> Self {
        let reader = backend.clone();
        let entries = match tokio::task::spawn_blocking(move || reader.read()).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                error!("Failed to read the trusted certificates: {}", e);
                TrustMap::new()
            }
            Err(e) => {
                error!("Trusted certificates reader panicked: {}", e);
                TrustMap::new()
            }
        };

        let mut store = Self { entries, backend };
        if let Some(legacy) = legacy {
            if legacy.migrate_into(&mut store.entries).await > 0 {
                store.persist().await;
            }
        }

        debug!("Loaded {} trusted certificate(s)", store.entries.len());
        store
    }

    #[cfg(test)]
    pub fn with_backend(backend: Arc<dyn TrustStoreBackend>) -> Self {
        Self {
            entries: TrustMap::new(),
            backend,
        }
    }

    pub fn is_trusted(&self, host: &Host, serialized: &SerializedCertificate) -> bool {
        self.entries
            .get(host)
            .map_or(false, |trusted| trusted == serialized)
    }

    pub fn will_replace(&self, host: &Host) -> bool {
        self.entries.contains_key(host)
    }

    /// Replaces whatever was trusted for `host` and persists the mapping.
    pub async fn set(&mut self, host: Host, serialized: SerializedCertificate) {
        if self.entries.insert(host.clone(), serialized).is_some() {
            debug!("Replaced the trusted certificate of {}", host);
        }
        self.persist().await;
    }

    /// Forgets every host and persists the empty mapping.
    pub async fn clear(&mut self) {
        self.entries.clear();
        self.persist().await;
    }

    #[cfg(test)]
    pub fn get(&self, host: &Host) -> Option<&SerializedCertificate> {
        self.entries.get(host)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the mapping through the backend on the blocking pool.
    async fn persist(&self) {
        if let Err(e) = self.try_persist().await {
            error!("Failed to persist the trusted certificates: {}", e);
        }
    }

    async fn try_persist(&self) -> AppResult<()> {
        let snapshot = self.entries.clone();
        let backend = self.backend.clone();

        match tokio::task::spawn_blocking(move || backend.write(&snapshot)).await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e).into()),
        }
    }
}
