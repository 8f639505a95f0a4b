use crate::store::LegacyCertificateFile;
use anyhow::Result as AnyResult;
use config::{Config, Environment as ConfigEnv, File as ConfigFile};
use duration_str::deserialize_duration;
use serde::{Deserialize, Serialize};
use std::{default::Default, path::PathBuf, time::Duration};

mod anchors;
mod file_content;

pub use anchors::load_root_store;
pub use file_content::FileContent;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TRUST_STORE_FILE: &str = "trusted_certificates.json";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GlobalConfig {
    pub workers: Option<usize>,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_trust_store_file")]
    pub trust_store_file: String,

    #[serde(default = "default_legacy_certificate_file")]
    pub legacy_certificate_file: String,

    #[serde(
        default = "default_connect_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub connect_timeout: Duration,

    #[serde(default = "default_true")]
    pub native_roots: bool,

    #[serde(default)]
    pub trusted_anchors: Vec<FileContent>,

    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    #[serde(default)]
    pub clear_trusted_certificates: bool,
}

impl GlobalConfig {
    pub fn load_config() -> AnyResult<Self> {
        let cfg = Config::builder()
            .add_source(ConfigFile::with_name("/etc/trust-broker/config").required(false))
            .add_source(ConfigFile::with_name("config").required(false))
            .add_source(ConfigEnv::with_prefix("TRUSTBROKER").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(cfg)
    }

    pub fn trust_store_path(&self) -> PathBuf {
        self.data_dir.join(&self.trust_store_file)
    }

    pub fn legacy_certificate_path(&self) -> PathBuf {
        self.data_dir.join(&self.legacy_certificate_file)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            workers: Default::default(),
            data_dir: default_data_dir(),
            trust_store_file: default_trust_store_file(),
            legacy_certificate_file: default_legacy_certificate_file(),
            connect_timeout: default_connect_timeout(),
            native_roots: true,
            trusted_anchors: Default::default(),
            servers: Default::default(),
            clear_trusted_certificates: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_trust_store_file() -> String {
    DEFAULT_TRUST_STORE_FILE.to_owned()
}

fn default_legacy_certificate_file() -> String {
    LegacyCertificateFile::FILE_NAME.to_owned()
}

const fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

const fn default_true() -> bool {
    true
}

/// A chat server session to open at startup.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub url: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use config::FileFormat;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: GlobalConfig = Config::builder()
            .add_source(ConfigFile::from_str(
                r#"servers = [{ url = "https://chat.example.com" }]"#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(cfg.native_roots);
        assert!(!cfg.clear_trusted_certificates);
        assert_eq!(cfg.servers.len(), 1);
        assert_eq!(
            cfg.trust_store_path(),
            PathBuf::from("data").join(DEFAULT_TRUST_STORE_FILE)
        );
        assert_eq!(
            cfg.legacy_certificate_path(),
            PathBuf::from("data").join(LegacyCertificateFile::FILE_NAME)
        );
    }

    #[test]
    fn durations_are_human_readable() {
        let cfg: GlobalConfig = Config::builder()
            .add_source(ConfigFile::from_str(
                "connect_timeout: 90s\ndata_dir: /var/lib/chat\n",
                FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.connect_timeout, Duration::from_secs(90));
        assert_eq!(
            cfg.trust_store_path(),
            PathBuf::from("/var/lib/chat/trusted_certificates.json")
        );
    }
}
