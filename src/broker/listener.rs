use super::{
    events::BrokerMessage, CertificateError, ClientCertificateSelection, ConnectionId, Decision,
    TrustContinuation,
};
use crate::{
    error::{AppResult, ErrorReason},
    types::CertificateRecord,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc;

/// The entry point of native certificate notifications.
///
/// Calls may come from any thread; they are only enqueued here and handled
/// in order by the broker's worker. Clones share one subscription.
#[derive(Clone, Debug)]
pub struct CertificateErrorListener {
    tx: mpsc::UnboundedSender<BrokerMessage>,
    subscribed: Arc<AtomicBool>,
}

impl CertificateErrorListener {
    pub(crate) fn subscribe(tx: mpsc::UnboundedSender<BrokerMessage>) -> Self {
        Self {
            tx,
            subscribed: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Forwards a certificate-validation failure to the broker.
    ///
    /// After [`CertificateErrorListener::unsubscribe`] the event is refused
    /// and its continuation is dropped without being invoked.
    pub fn certificate_error(&self, event: CertificateError) -> AppResult<()> {
        self.forward(BrokerMessage::CertificateError(event))
    }

    pub fn select_client_certificate(&self, selection: ClientCertificateSelection) -> AppResult<()> {
        self.forward(BrokerMessage::SelectClientCertificate(selection))
    }

    /// Raises a certificate error and waits for the decision.
    pub async fn request_trust(
        &self,
        connection_id: ConnectionId,
        requested_url: impl Into<String>,
        error: impl Into<String>,
        certificate: CertificateRecord,
    ) -> AppResult<Decision> {
        let (continuation, decision) = TrustContinuation::channel();
        self.certificate_error(CertificateError {
            connection_id,
            requested_url: requested_url.into(),
            error: error.into(),
            certificate,
            continuation,
        })?;

        decision
            .await
            .map_err(|_| ErrorReason::DecisionAbandoned.into())
    }

    pub fn unsubscribe(&self) {
        if self.subscribed.swap(false, Ordering::AcqRel) {
            debug!("Certificate error listener unsubscribed");
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }

    fn forward(&self, message: BrokerMessage) -> AppResult<()> {
        if !self.is_subscribed() {
            warn!("Dropping a certificate notification received after unsubscription");
            return Err(ErrorReason::Unsubscribed.into());
        }
        self.tx
            .send(message)
            .map_err(|_| ErrorReason::BrokerClosed.into())
    }
}
