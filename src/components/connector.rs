use crate::{
    broker::{
        CertificateErrorListener, ClientCertificateContinuation, ClientCertificateSelection,
        ConnectionId,
    },
    certificate_interceptor::CertificateInterceptor,
    error::{AppResult, ErrorReason},
    types::CertificateRecord,
};
use rustls_pki_types::ServerName;
use std::{
    io::{Error as IoError, ErrorKind as IoErrorKind},
    net::IpAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{net::TcpStream, time::timeout};
use tokio_rustls::{
    client::TlsStream,
    rustls::{
        client::ResolvesClientCert, sign::CertifiedKey, ClientConfig, RootCertStore,
        SignatureScheme,
    },
    TlsConnector,
};
use url::{Host as UrlHost, Url};

/// Opens TLS connections for chat server sessions. Certificates the roots
/// reject are handed to the trust broker; an accepted certificate is pinned
/// for the retry.
#[derive(Debug)]
pub struct SessionConnector {
    roots: Arc<RootCertStore>,
    listener: CertificateErrorListener,
    timeout: Duration,
    next_connection: AtomicU64,
}

impl SessionConnector {
    pub fn new(
        roots: Arc<RootCertStore>,
        listener: CertificateErrorListener,
        timeout: Duration,
    ) -> Self {
        Self {
            roots,
            listener,
            timeout,
            next_connection: AtomicU64::new(1),
        }
    }

    pub async fn connect(&self, requested_url: &str) -> AppResult<TlsStream<TcpStream>> {
        let connection_id: ConnectionId = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let url = Url::parse(requested_url)?;
        let (server_name, address) = server_address(&url)?;
        let port = url.port_or_known_default().unwrap_or(443);

        let interceptor = Arc::new(CertificateInterceptor::new(self.roots.clone())?);
        let client_auth = Arc::new(ClientCertificateForwarder::new(
            self.listener.clone(),
            connection_id,
            requested_url,
        ));
        let conn_result = self
            .handshake(&server_name, &address, port, interceptor.clone(), client_auth.clone())
            .await;

        let conn_err = match conn_result {
            Ok(tls_stream) => return Ok(tls_stream),
            Err(e) => e,
        };
        let Some(rejection) = interceptor.rejection().map(ToString::to_string) else {
            // Not a certificate problem
            return Err(conn_err);
        };
        let Some(end_entity) = interceptor.end_entity().cloned() else {
            return Err(ErrorReason::NoCertificates.into());
        };

        debug!(
            "Connection {} to {} rejected the certificate: {}",
            connection_id, requested_url, rejection
        );
        let certificate = CertificateRecord::from_der(end_entity.as_ref())?;
        let decision = self
            .listener
            .request_trust(connection_id, requested_url, rejection.clone(), certificate)
            .await?;

        if !decision.is_accept() {
            return Err(ErrorReason::CertificateRejected(rejection).into());
        }

        let pinned = Arc::new(CertificateInterceptor::new(self.roots.clone())?.pinned_to(end_entity));
        self.handshake(&server_name, &address, port, pinned, client_auth).await
    }

    async fn handshake(
        &self,
        server_name: &ServerName<'static>,
        address: &str,
        port: u16,
        interceptor: Arc<CertificateInterceptor>,
        client_auth: Arc<ClientCertificateForwarder>,
    ) -> AppResult<TlsStream<TcpStream>> {
        let tls_config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(interceptor)
            .with_client_cert_resolver(client_auth);
        let connector = TlsConnector::from(Arc::new(tls_config));

        let stream = timeout(self.timeout, TcpStream::connect((address, port)))
            .await
            .map_err(|elapsed| IoError::new(IoErrorKind::TimedOut, elapsed))??;

        let tls_stream = timeout(self.timeout, connector.connect(server_name.clone(), stream))
            .await
            .map_err(|elapsed| IoError::new(IoErrorKind::TimedOut, elapsed))??;

        Ok(tls_stream)
    }
}

/// Reports a server's client certificate request to the broker.
///
/// No client certificates are configured, so the handshake always goes on
/// without one. The broker's answer is only logged.
#[derive(Debug)]
struct ClientCertificateForwarder {
    listener: CertificateErrorListener,
    connection_id: ConnectionId,
    requested_url: String,
}

impl ClientCertificateForwarder {
    fn new(
        listener: CertificateErrorListener,
        connection_id: ConnectionId,
        requested_url: impl Into<String>,
    ) -> Self {
        Self {
            listener,
            connection_id,
            requested_url: requested_url.into(),
        }
    }
}

impl ResolvesClientCert for ClientCertificateForwarder {
    fn resolve(
        &self,
        root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        debug!(
            "Connection {} to {} requested a client certificate ({} acceptable issuer(s))",
            self.connection_id,
            self.requested_url,
            root_hint_subjects.len()
        );

        let connection_id = self.connection_id;
        let continuation = ClientCertificateContinuation::from_fn(move |selected| {
            debug!(
                "Client certificate selection for connection {}: {:?}",
                connection_id,
                selected.map(|cert| cert.fingerprint)
            );
        });
        let forwarded = self.listener.select_client_certificate(ClientCertificateSelection {
            connection_id,
            requested_url: self.requested_url.clone(),
            certificates: Vec::new(),
            continuation,
        });
        if let Err(e) = forwarded {
            debug!("Client certificate request not forwarded: {}", e);
        }

        None
    }

    fn has_certs(&self) -> bool {
        false
    }
}

fn server_address(url: &Url) -> AppResult<(ServerName<'static>, String)> {
    match url.host() {
        Some(UrlHost::Domain(domain)) => Ok((
            ServerName::try_from(domain.to_owned())?,
            domain.to_owned(),
        )),
        Some(UrlHost::Ipv4(ip)) => Ok((ServerName::from(IpAddr::V4(ip)), ip.to_string())),
        Some(UrlHost::Ipv6(ip)) => Ok((ServerName::from(IpAddr::V6(ip)), ip.to_string())),
        None => Err(ErrorReason::MissingHost(url.to_string()).into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::broker::BrokerMessage;

    #[test]
    fn server_address_from_url() {
        let url = Url::parse("https://chat.example.com:8443/").unwrap();
        let (name, address) = server_address(&url).unwrap();
        assert_eq!(name, ServerName::try_from("chat.example.com").unwrap());
        assert_eq!(address, "chat.example.com");

        let url = Url::parse("https://[::1]:3000/").unwrap();
        let (name, address) = server_address(&url).unwrap();
        assert!(matches!(name, ServerName::IpAddress(_)));
        assert_eq!(address, "::1");
    }

    #[test]
    fn client_certificate_request_is_forwarded() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let forwarder = ClientCertificateForwarder::new(
            CertificateErrorListener::subscribe(tx),
            3,
            "https://chat.example.com/",
        );

        assert!(forwarder.resolve(&[b"issuer".as_slice()], &[]).is_none());

        match rx.try_recv() {
            Ok(BrokerMessage::SelectClientCertificate(selection)) => {
                assert_eq!(selection.connection_id, 3);
                assert_eq!(selection.requested_url, "https://chat.example.com/");
                assert!(selection.certificates.is_empty());
                selection.continuation.resolve(None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn client_certificate_request_after_unsubscribe_is_dropped() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let listener = CertificateErrorListener::subscribe(tx);
        let forwarder =
            ClientCertificateForwarder::new(listener.clone(), 3, "https://chat.example.com/");

        listener.unsubscribe();
        assert!(forwarder.resolve(&[], &[]).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn url_without_host_has_no_address() {
        let url = Url::parse("data:text/plain,chat").unwrap();
        let err = server_address(&url).unwrap_err();
        assert!(matches!(err.reason(), ErrorReason::MissingHost(_)));
    }
}
