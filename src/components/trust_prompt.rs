use crate::broker::{BrokerEvent, BrokerHandle, TrustRequest};
use anyhow::Result as AnyResult;
use tokio::{
    io::{stdin, stdout, AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
};

/// Answers trust requests on the terminal.
#[derive(Debug)]
pub struct TrustPrompt {
    handle: BrokerHandle,
    events: mpsc::UnboundedReceiver<BrokerEvent>,
}

impl TrustPrompt {
    pub fn new(handle: BrokerHandle, events: mpsc::UnboundedReceiver<BrokerEvent>) -> Self {
        Self { handle, events }
    }

    pub async fn run(mut self) -> AnyResult<()> {
        let mut lines = BufReader::new(stdin()).lines();
        let mut out = stdout();

        while let Some(event) = self.events.recv().await {
            match event {
                BrokerEvent::CertificateTrustRequested(request) => {
                    out.write_all(describe(&request).as_bytes()).await?;
                    out.flush().await?;

                    let answer = lines.next_line().await?;
                    let result = if answer.as_deref().map_or(false, is_affirmative) {
                        self.handle.certificate_trusted(request.fingerprint).await
                    } else {
                        self.handle.certificate_denied(request.fingerprint).await
                    };
                    if let Err(e) = result {
                        error!("Failed to submit the trust decision: {}", e);
                    }
                }
                BrokerEvent::CertificatesUpdated => info!("Trusted certificates updated"),
                BrokerEvent::CertificatesCleared => info!("Trusted certificates cleared"),
                BrokerEvent::ClientCertificateRequested {
                    requested_url,
                    candidates,
                    ..
                } => {
                    info!(
                        "{} asked for a client certificate ({} candidate(s))",
                        requested_url, candidates
                    );
                }
            }
        }

        Ok(())
    }
}

fn describe(request: &TrustRequest) -> String {
    let mut text = format!(
        "\nThe certificate of {} could not be verified: {}\n  issuer: {}\n  fingerprint: {}\n",
        request.requested_url, request.error, request.issuer_name, request.fingerprint
    );
    if request.will_be_replaced {
        text.push_str("  WARNING: this replaces the certificate you trusted before for this host\n");
    }
    text.push_str("Trust this certificate? [y/N] ");
    text
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::Fingerprint;

    fn request(will_be_replaced: bool) -> TrustRequest {
        TrustRequest {
            connection_id: 1,
            requested_url: "https://chat.example.com/".to_owned(),
            error: "invalid peer certificate: UnknownIssuer".to_owned(),
            fingerprint: Fingerprint::from("sha256/abc"),
            issuer_name: "Example CA".to_owned(),
            will_be_replaced,
        }
    }

    #[test]
    fn replacement_is_called_out() {
        assert!(describe(&request(true)).contains("replaces"));
        assert!(!describe(&request(false)).contains("replaces"));
        assert!(describe(&request(false)).contains("sha256/abc"));
    }

    #[test]
    fn only_yes_trusts() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative(" YES \n"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative("yep"));
    }
}
