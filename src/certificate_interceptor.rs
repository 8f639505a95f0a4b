use crate::error::AppResult;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_rustls::rustls::{
    client::{
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        WebPkiServerVerifier,
    },
    DigitallySignedStruct, Error as RustlsError, RootCertStore, SignatureScheme,
};

/// Verifies server certificates against the configured roots and keeps the
/// presented chain and any rejection, so a failed handshake can be turned
/// into a trust request.
///
/// A pinned interceptor accepts exactly one end-entity certificate, the one
/// the user chose to trust.
#[derive(Debug)]
pub struct CertificateInterceptor {
    certificates: OnceCell<Vec<CertificateDer<'static>>>,
    rejection: OnceCell<RustlsError>,
    verifier: Arc<WebPkiServerVerifier>,
    pinned: Option<CertificateDer<'static>>,
}

impl CertificateInterceptor {
    pub fn new(roots: Arc<RootCertStore>) -> AppResult<Self> {
        Ok(Self::with_verifier(WebPkiServerVerifier::builder(roots).build()?))
    }

    pub fn with_verifier(verifier: Arc<WebPkiServerVerifier>) -> Self {
        Self {
            certificates: Default::default(),
            rejection: Default::default(),
            verifier,
            pinned: None,
        }
    }

    pub fn pinned_to(mut self, end_entity: CertificateDer<'static>) -> Self {
        self.pinned = Some(end_entity);
        self
    }

    pub fn presented_chain(&self) -> Option<&[CertificateDer<'static>]> {
        self.certificates.get().map(Vec::as_slice)
    }

    pub fn end_entity(&self) -> Option<&CertificateDer<'static>> {
        self.presented_chain().and_then(|chain| chain.first())
    }

    pub fn rejection(&self) -> Option<&RustlsError> {
        self.rejection.get()
    }
}

impl ServerCertVerifier for CertificateInterceptor {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        let mut certs = vec![end_entity.clone().into_owned()];
        certs.extend(intermediates.iter().map(|cert| cert.clone().into_owned()));

        self.certificates.set(certs).ok();

        if let Some(pinned) = &self.pinned {
            return if pinned.as_ref() == end_entity.as_ref() {
                Ok(ServerCertVerified::assertion())
            } else {
                let e = RustlsError::General("server presented a different certificate".into());
                self.rejection.set(e.clone()).ok();
                Err(e)
            };
        }

        self.verifier
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            .map_err(|e| {
                self.rejection.set(e.clone()).ok();
                e
            })
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        self.verifier.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        self.verifier.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.verifier.supported_verify_schemes()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn webpki_interceptor() -> CertificateInterceptor {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        CertificateInterceptor::new(Arc::new(roots)).unwrap()
    }

    #[test]
    fn rejection_and_chain_are_captured() {
        let interceptor = webpki_interceptor();
        let bogus = CertificateDer::from(vec![0x30, 0x03, 0x02, 0x01, 0x01]);
        let name = ServerName::try_from("chat.example.com").unwrap();

        let result = interceptor.verify_server_cert(
            &bogus,
            &[],
            &name,
            &[],
            UnixTime::since_unix_epoch(Duration::from_secs(1_700_000_000)),
        );

        assert!(result.is_err());
        assert!(interceptor.rejection().is_some());
        assert_eq!(interceptor.end_entity(), Some(&bogus));
    }

    #[test]
    fn pinned_certificate_is_accepted_verbatim() {
        let pinned = CertificateDer::from(vec![0x30, 0x03, 0x02, 0x01, 0x01]);
        let interceptor = webpki_interceptor().pinned_to(pinned.clone());
        let name = ServerName::try_from("chat.example.com").unwrap();
        let now = UnixTime::since_unix_epoch(Duration::from_secs(1_700_000_000));

        assert!(interceptor
            .verify_server_cert(&pinned, &[], &name, &[], now)
            .is_ok());
        assert!(interceptor.rejection().is_none());

        let other = webpki_interceptor();
        let other = other.pinned_to(pinned);
        let different = CertificateDer::from(vec![0x30, 0x03, 0x02, 0x01, 0x02]);
        assert!(other
            .verify_server_cert(&different, &[], &name, &[], now)
            .is_err());
        assert!(other.rejection().is_some());
    }
}
