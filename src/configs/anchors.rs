use super::{FileContent, GlobalConfig};
use crate::error::AppResult;
use rustls_pki_types::CertificateDer;
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Result as IoResult};
use tokio_rustls::rustls::RootCertStore;

/// Roots the networking layer validates against before the broker is
/// consulted: the bundled WebPKI roots, optionally the platform roots, and
/// the configured anchors.
pub async fn load_root_store(config: &GlobalConfig) -> AppResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if config.native_roots {
        match rustls_native_certs::load_native_certs() {
            Ok(certs) => {
                let (added, ignored) = roots.add_parsable_certificates(certs);
                debug!("Loaded {} native root(s), ignored {}", added, ignored);
            }
            Err(e) => warn!("Failed to load the native roots: {}", e),
        }
    }

    for anchors in &config.trusted_anchors {
        let certs = load_anchor_certificates(anchors).await?;
        let (added, ignored) = roots.add_parsable_certificates(certs);
        debug!(
            "Loaded {} trusted anchor(s) from {}, ignored {}",
            added,
            anchors.describe(),
            ignored
        );
    }

    Ok(roots)
}

async fn load_anchor_certificates(file: &FileContent) -> IoResult<Vec<CertificateDer<'static>>> {
    let data = file.load_file().await?;
    let certs = rustls_pemfile::certs(&mut data.as_slice()).collect::<IoResult<Vec<_>>>()?;
    if certs.is_empty() {
        return Err(IoError::new(
            IoErrorKind::InvalidData,
            format!("no certificates found in {}", file.describe()),
        ));
    }
    Ok(certs)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn bundled_roots_are_always_present() {
        let config = GlobalConfig {
            native_roots: false,
            ..Default::default()
        };

        let roots = load_root_store(&config).await.unwrap();
        assert_eq!(roots.len(), webpki_roots::TLS_SERVER_ROOTS.len());
    }

    #[tokio::test]
    async fn anchors_without_certificates_are_rejected() {
        let config = GlobalConfig {
            native_roots: false,
            trusted_anchors: vec![FileContent::from(b"no pem here".to_vec())],
            ..Default::default()
        };

        assert!(load_root_store(&config).await.is_err());
    }
}
