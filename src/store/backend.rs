use super::TrustMap;
use crate::error::AppResult;
#[cfg(test)]
use std::{
    path::Path,
    sync::{Arc, Mutex},
};
use std::{
    fmt::Debug,
    fs::{self, File},
    io::{BufReader, BufWriter, ErrorKind as IoErrorKind, Write},
    path::PathBuf,
};

/// Where the trust store keeps its current-format mapping.
///
/// Implementations are called from the blocking pool, never from the
/// broker's worker directly.
pub trait TrustStoreBackend: Debug + Send + Sync {
    fn read(&self) -> AppResult<TrustMap>;

    fn write(&self, map: &TrustMap) -> AppResult<()>;
}

/// A JSON object keyed by host with string values.
#[derive(Clone, Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrustStoreBackend for JsonFileBackend {
    fn read(&self) -> AppResult<TrustMap> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(TrustMap::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    fn write(&self, map: &TrustMap) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write next to the target and rename over it so a crash never
        // leaves a truncated store behind.
        let staging = self.path.with_extension("json.tmp");
        let mut writer = BufWriter::new(File::create(&staging)?);
        serde_json::to_writer_pretty(&mut writer, map)?;
        writer.flush()?;
        drop(writer);
        fs::rename(&staging, &self.path)?;

        Ok(())
    }
}

/// Keeps the persisted mapping in memory. Clones share the same contents.
#[cfg(test)]
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    data: Arc<Mutex<TrustMap>>,
}

#[cfg(test)]
impl MemoryBackend {
    pub fn with_entries(map: TrustMap) -> Self {
        Self {
            data: Arc::new(Mutex::new(map)),
        }
    }

    pub fn snapshot(&self) -> TrustMap {
        self.data.lock().map(|map| map.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl TrustStoreBackend for MemoryBackend {
    fn read(&self) -> AppResult<TrustMap> {
        Ok(self.snapshot())
    }

    fn write(&self, map: &TrustMap) -> AppResult<()> {
        if let Ok(mut data) = self.data.lock() {
            *data = map.clone();
        }
        Ok(())
    }
}

/// Reads as empty and refuses every write.
#[cfg(test)]
#[derive(Clone, Debug, Default)]
pub struct ReadOnlyBackend;

#[cfg(test)]
impl TrustStoreBackend for ReadOnlyBackend {
    fn read(&self) -> AppResult<TrustMap> {
        Ok(TrustMap::new())
    }

    fn write(&self, _map: &TrustMap) -> AppResult<()> {
        Err(std::io::Error::new(IoErrorKind::Other, "disk full").into())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{Host, SerializedCertificate};

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("trusted_certificates.json"));

        assert!(backend.read().unwrap().is_empty());
    }

    #[test]
    fn written_mapping_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("nested/trusted_certificates.json"));

        let mut map = TrustMap::new();
        map.insert(
            Host::new("chat.example.com"),
            SerializedCertificate::from("Example CA\nDATA".to_owned()),
        );
        backend.write(&map).unwrap();

        assert_eq!(backend.read().unwrap(), map);

        let raw = fs::read_to_string(backend.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["chat.example.com"], "Example CA\nDATA");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trusted_certificates.json");
        fs::write(&path, "{not json").unwrap();

        assert!(JsonFileBackend::new(path).read().is_err());
    }
}
