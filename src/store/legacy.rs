use super::TrustMap;
use crate::{
    error::AppResult,
    types::{Host, SerializedCertificate},
};
use serde_json::{Map, Value};
#[cfg(test)]
use std::path::Path;
use std::path::PathBuf;
use tokio::fs;

/// The single-file JSON mapping older releases kept under the user data
/// directory.
///
/// Migration consumes the handle, so one handle can only ever be migrated
/// once.
#[derive(Clone, Debug)]
pub struct LegacyCertificateFile {
    path: PathBuf,
}

impl LegacyCertificateFile {
    pub const FILE_NAME: &'static str = "certificate.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(Self::FILE_NAME))
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merges the legacy entries into `map` and deletes the legacy file.
    ///
    /// Entries already in `map` win on conflict. Failures are logged and
    /// swallowed. The returned count is the number of entries inserted into
    /// `map`, whether or not the file could be deleted afterwards.
    pub async fn migrate_into(self, map: &mut TrustMap) -> usize {
        let inserted = match self.merge_into(map).await {
            Ok(Some(inserted)) => inserted,
            Ok(None) => return 0,
            Err(e) => {
                warn!(
                    "Failed to migrate legacy certificates from {}: {}",
                    self.path.display(),
                    e
                );
                return 0;
            }
        };

        if let Err(e) = fs::remove_file(&self.path).await {
            warn!(
                "Failed to delete the legacy certificate file {}: {}",
                self.path.display(),
                e
            );
        }
        if inserted > 0 {
            info!(
                "Migrated {} trusted certificate(s) from {}",
                inserted,
                self.path.display()
            );
        }
        inserted
    }

    /// `None` when there is no legacy file.
    async fn merge_into(&self, map: &mut TrustMap) -> AppResult<Option<usize>> {
        let is_file = fs::metadata(&self.path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).await?;
        let mapping: Map<String, Value> = serde_json::from_str(&content)?;

        let mut inserted = 0;
        for (host, value) in mapping {
            let host = Host::new(host);
            if map.contains_key(&host) {
                debug!("Keeping current trusted certificate for {}", host);
                continue;
            }
            map.insert(host, SerializedCertificate(coerce_to_string(value)));
            inserted += 1;
        }

        Ok(Some(inserted))
    }
}

fn coerce_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
