use super::{events::BrokerMessage, Action, CertificateErrorListener};
use crate::{
    error::{AppResult, ErrorReason},
    types::Fingerprint,
};
use tokio::sync::{mpsc, oneshot};

/// Sends user decisions to a running broker.
#[derive(Clone, Debug)]
pub struct BrokerHandle {
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

impl BrokerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<BrokerMessage>) -> Self {
        Self { tx }
    }

    /// Opens a new subscription for native certificate notifications.
    pub fn listener(&self) -> CertificateErrorListener {
        CertificateErrorListener::subscribe(self.tx.clone())
    }

    pub async fn certificate_trusted(&self, fingerprint: Fingerprint) -> AppResult<()> {
        self.dispatch(Action::CertificateTrusted { fingerprint }).await
    }

    pub async fn certificate_denied(&self, fingerprint: Fingerprint) -> AppResult<()> {
        self.dispatch(Action::CertificateDenied { fingerprint }).await
    }

    pub async fn clear_trusted_certificates(&self) -> AppResult<()> {
        self.dispatch(Action::ClearTrustedCertificates).await
    }

    /// Sends `action` and waits until the broker has applied it.
    pub async fn dispatch(&self, action: Action) -> AppResult<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(BrokerMessage::Action { action, ack })
            .map_err(|_| ErrorReason::BrokerClosed)?;
        done.await.map_err(|_| ErrorReason::BrokerClosed)?
    }

    /// Stops the worker after the messages already queued. Requests still
    /// pending at that point are abandoned.
    pub fn shutdown(&self) {
        self.tx.send(BrokerMessage::Shutdown).ok();
    }
}
