use super::{ClientCertificateContinuation, TrustContinuation};
use crate::{
    error::AppResult,
    types::{CertificateRecord, Fingerprint},
};
use serde::Serialize;
use tokio::sync::oneshot;

pub type ConnectionId = u64;

/// A certificate the networking layer refused to validate.
#[derive(Debug)]
pub struct CertificateError {
    pub connection_id: ConnectionId,
    pub requested_url: String,
    pub error: String,
    pub certificate: CertificateRecord,
    pub continuation: TrustContinuation,
}

/// A server asked the client to present a certificate.
#[derive(Debug)]
pub struct ClientCertificateSelection {
    pub connection_id: ConnectionId,
    pub requested_url: String,
    pub certificates: Vec<CertificateRecord>,
    pub continuation: ClientCertificateContinuation,
}

/// Payload of [`BrokerEvent::CertificateTrustRequested`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrustRequest {
    pub connection_id: ConnectionId,
    pub requested_url: String,
    pub error: String,
    pub fingerprint: Fingerprint,
    pub issuer_name: String,
    /// The host already trusts a certificate that accepting this one
    /// would overwrite.
    pub will_be_replaced: bool,
}

/// Events the broker emits for the UI layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerEvent {
    CertificatesCleared,
    CertificatesUpdated,
    CertificateTrustRequested(TrustRequest),
    ClientCertificateRequested {
        connection_id: ConnectionId,
        requested_url: String,
        candidates: usize,
    },
}

/// Actions the UI layer sends to the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    ClearTrustedCertificates,
    CertificateTrusted { fingerprint: Fingerprint },
    CertificateDenied { fingerprint: Fingerprint },
}

#[derive(Debug)]
pub(crate) enum BrokerMessage {
    CertificateError(CertificateError),
    SelectClientCertificate(ClientCertificateSelection),
    Action {
        action: Action,
        ack: oneshot::Sender<AppResult<()>>,
    },
    Shutdown,
}
