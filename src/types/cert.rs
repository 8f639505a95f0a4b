use crate::error::AppResult;
use base64::{engine::general_purpose::STANDARD, Engine};
use pem::Pem;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Borrow,
    fmt::{Display, Formatter},
};
use x509_certificate::X509Certificate;

/// The certificate as the networking layer reports it alongside a
/// validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub issuer_name: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub fingerprint: Fingerprint,
}

impl CertificateRecord {
    #[cfg(test)]
    pub fn new(
        issuer_name: impl Into<String>,
        data: impl Into<Vec<u8>>,
        fingerprint: impl Into<Fingerprint>,
    ) -> Self {
        Self {
            issuer_name: issuer_name.into(),
            data: data.into(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Builds a record from a DER encoded end-entity certificate.
    ///
    /// The data is kept as PEM text and the fingerprint takes the
    /// `sha256/<base64>` form.
    pub fn from_der(der: &[u8]) -> AppResult<Self> {
        let cert = X509Certificate::from_der(der)?;
        let digest = cert.sha256_fingerprint()?;

        Ok(Self {
            issuer_name: cert.issuer_common_name().unwrap_or_default(),
            data: pem::encode(&Pem::new("CERTIFICATE", der.to_vec())).into_bytes(),
            fingerprint: Fingerprint(format!("sha256/{}", STANDARD.encode(digest.as_ref()))),
        })
    }

    /// The comparable form of the certificate. Only the issuer and the raw
    /// data take part, the fingerprint never does.
    pub fn serialize(&self) -> SerializedCertificate {
        SerializedCertificate(format!(
            "{}\n{}",
            self.issuer_name,
            String::from_utf8_lossy(&self.data)
        ))
    }
}

/// Per-occurrence deduplication key of a certificate error. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedCertificate(pub String);

impl SerializedCertificate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SerializedCertificate {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl From<String> for SerializedCertificate {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for SerializedCertificate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
