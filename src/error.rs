#[cfg(feature = "backtrace")]
use backtrace::Backtrace;
use crate::types::Fingerprint;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    reason: ErrorReason,
    #[cfg(feature = "backtrace")]
    bt: Backtrace,
}

impl AppError {
    pub(crate) fn new(reason: ErrorReason) -> Self {
        Self {
            reason,
            #[cfg(feature = "backtrace")]
            bt: Backtrace::new(),
        }
    }

    #[cfg(test)]
    pub fn reason(&self) -> &ErrorReason {
        &self.reason
    }
}

impl<E> From<E> for AppError
where
    E: Into<ErrorReason>,
{
    fn from(reason: E) -> Self {
        Self::new(reason.into())
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.reason)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.reason.source()
    }
}

#[derive(Debug, Error)]
pub enum ErrorReason {
    #[error("failed to load the configuration")]
    Config(#[from] config::ConfigError),
    #[error("IO error")]
    Io(#[from] std::io::Error),
    #[error("JSON error")]
    Json(#[from] serde_json::Error),
    #[error("X509 certificate parsing error")]
    X509(#[from] x509_certificate::X509CertificateError),
    #[error("failed to build the certificate verifier")]
    Verifier(#[from] tokio_rustls::rustls::client::VerifierBuilderError),
    #[error("invalid URL")]
    InvalidUrl(#[from] url::ParseError),
    #[error("URL has no host: {0}")]
    MissingHost(String),
    #[error("invalid server name")]
    InvalidServerName(#[from] rustls_pki_types::InvalidDnsNameError),
    #[error("no pending trust request for fingerprint {0}")]
    UnknownFingerprint(Fingerprint),
    #[error("the certificate trust broker has shut down")]
    BrokerClosed,
    #[error("the certificate error listener is unsubscribed")]
    Unsubscribed,
    #[error("the trust decision was abandoned")]
    DecisionAbandoned,
    #[error("the certificate was rejected: {0}")]
    CertificateRejected(String),
    #[error("the handshake failed without presenting certificates")]
    NoCertificates,
}
