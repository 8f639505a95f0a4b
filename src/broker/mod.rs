use crate::{
    error::AppResult,
    store::TrustStore,
    types::{Fingerprint, Host},
};
use chrono::Utc;
use tokio::{sync::mpsc, task::JoinHandle};

mod continuation;
mod events;
mod handle;
mod listener;
mod pending;

pub use continuation::*;
pub(crate) use events::BrokerMessage;
pub use events::*;
pub use handle::BrokerHandle;
pub use listener::CertificateErrorListener;
pub use pending::{Admission, CommitAction, PendingRequest, PendingRequests};

/// How a certificate error was handled on arrival.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustOutcome {
    /// The host already trusts this exact certificate.
    Accepted,
    /// A request for the same fingerprint is outstanding.
    Queued,
    /// A trust request was emitted.
    Requested,
    /// The requested URL has no host to key the decision on.
    Rejected,
}

/// Owns the trust store and the outstanding requests, and applies every
/// state transition from a single task.
#[derive(Debug)]
pub struct TrustBroker {
    store: TrustStore,
    pending: PendingRequests,
    events: mpsc::UnboundedSender<BrokerEvent>,
}

impl TrustBroker {
    pub fn new(store: TrustStore, events: mpsc::UnboundedSender<BrokerEvent>) -> Self {
        Self {
            store,
            pending: PendingRequests::default(),
            events,
        }
    }

    /// Starts the worker on the current runtime.
    pub fn spawn(
        store: TrustStore,
    ) -> (
        BrokerHandle,
        mpsc::UnboundedReceiver<BrokerEvent>,
        JoinHandle<()>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::unbounded_channel();

        let broker = Self::new(store, event_tx);
        let task = tokio::spawn(broker.run(rx));

        (BrokerHandle::new(tx), event_rx, task)
    }

    #[cfg(test)]
    pub fn store(&self) -> &TrustStore {
        &self.store
    }

    #[cfg(test)]
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BrokerMessage>) {
        debug!("Trust broker started");

        while let Some(message) = rx.recv().await {
            match message {
                BrokerMessage::CertificateError(event) => {
                    let outcome = self.handle_certificate_error(event);
                    trace!("handle_certificate_error() = {:?}", outcome);
                }
                BrokerMessage::SelectClientCertificate(selection) => {
                    self.handle_client_certificate_selection(selection);
                }
                BrokerMessage::Action { action, ack } => {
                    let result = self.apply(action).await;
                    if let Err(e) = &result {
                        error!("Broker invariant violated: {}", e);
                    }
                    ack.send(result).ok();
                }
                BrokerMessage::Shutdown => break,
            }
        }

        if !self.pending.is_empty() {
            warn!(
                "Trust broker stopped with {} pending trust request(s) abandoned",
                self.pending.len()
            );
        }
        debug!("Trust broker stopped");
    }

    pub fn handle_certificate_error(&mut self, event: CertificateError) -> TrustOutcome {
        let CertificateError {
            connection_id,
            requested_url,
            error,
            certificate,
            continuation,
        } = event;

        let host = match Host::from_url(&requested_url) {
            Ok(host) => host,
            Err(e) => {
                warn!(
                    "Rejecting certificate for {} of connection {}: {}",
                    requested_url, connection_id, e
                );
                continuation.resolve(Decision::Reject);
                return TrustOutcome::Rejected;
            }
        };
        let serialized = certificate.serialize();

        if self.store.is_trusted(&host, &serialized) {
            debug!("Certificate of {} is already trusted", host);
            continuation.resolve(Decision::Accept);
            return TrustOutcome::Accepted;
        }

        let will_be_replaced = self.store.will_replace(&host);
        let commit = CommitAction {
            host: host.clone(),
            serialized,
        };
        match self
            .pending
            .admit(certificate.fingerprint.clone(), commit, continuation)
        {
            Admission::Queued => return TrustOutcome::Queued,
            Admission::Opened => {}
        }

        info!(
            "Requesting trust for {} presented by {} (replaces existing: {})",
            certificate.fingerprint, host, will_be_replaced
        );
        self.emit(BrokerEvent::CertificateTrustRequested(TrustRequest {
            connection_id,
            requested_url,
            error,
            fingerprint: certificate.fingerprint,
            issuer_name: certificate.issuer_name,
            will_be_replaced,
        }));

        TrustOutcome::Requested
    }

    pub fn handle_client_certificate_selection(&mut self, selection: ClientCertificateSelection) {
        let ClientCertificateSelection {
            connection_id,
            requested_url,
            certificates,
            continuation,
        } = selection;

        warn!(
            "No client certificate policy, continuing {} without one ({} candidate(s))",
            requested_url,
            certificates.len()
        );
        self.emit(BrokerEvent::ClientCertificateRequested {
            connection_id,
            requested_url,
            candidates: certificates.len(),
        });
        continuation.resolve(None);
    }

    pub async fn apply(&mut self, action: Action) -> AppResult<()> {
        match action {
            Action::ClearTrustedCertificates => {
                self.clear_trusted_certificates().await;
                Ok(())
            }
            Action::CertificateTrusted { fingerprint } => {
                self.resolve(&fingerprint, Decision::Accept).await
            }
            Action::CertificateDenied { fingerprint } => {
                self.resolve(&fingerprint, Decision::Reject).await
            }
        }
    }

    /// Fans `decision` out to every continuation queued for `fingerprint`.
    ///
    /// Continuations are resolved before the store is written, so a failing
    /// write never holds back or revokes a grant.
    pub async fn resolve(&mut self, fingerprint: &Fingerprint, decision: Decision) -> AppResult<()> {
        let PendingRequest {
            commit,
            continuations,
            opened_at,
        } = self.pending.take(fingerprint)?;

        let waiting = continuations.len();
        for continuation in continuations {
            continuation.resolve(decision);
        }

        let elapsed = Utc::now() - opened_at;
        info!(
            "Certificate {} for {}: {:?} after {}ms, {} connection(s) resumed",
            fingerprint,
            commit.host,
            decision,
            elapsed.num_milliseconds(),
            waiting
        );

        if decision.is_accept() {
            commit.apply(&mut self.store).await;
            self.emit(BrokerEvent::CertificatesUpdated);
        }

        Ok(())
    }

    /// Empties the trust store. Outstanding requests are not affected.
    pub async fn clear_trusted_certificates(&mut self) {
        info!("Clearing {} trusted certificate(s)", self.store.len());
        self.store.clear().await;
        self.emit(BrokerEvent::CertificatesCleared);
    }

    fn emit(&self, event: BrokerEvent) {
        if self.events.send(event).is_err() {
            debug!("No consumer for broker events");
        }
    }
}
