//! rustls backend.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use crate::client::Transport;
use crate::error::{Error, Result};

pub(crate) async fn connect(verify: bool, host: &str, stream: TcpStream) -> Result<Transport> {
    let connector = TlsConnector::from(client_config(verify)?);

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| Error::Tls(format!("invalid SNI host name: {host}")))?;

    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;

    Ok(Transport::Rustls(Box::new(tls_stream)))
}

/// TLS 1.2/1.3 client configuration with webpki trust anchors, or with the
/// no-op verifier when certificate verification is opted out. The provider
/// is passed explicitly so the build never depends on a process-level
/// default being installed.
fn client_config(verify: bool) -> Result<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?;

    let config = if verify {
        let root_store =
            RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder
            .with_root_certificates(root_store)
            .with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoVerification::new(provider)))
            .with_no_client_auth()
    };

    Ok(Arc::new(config))
}

mod danger {
    use std::sync::Arc;

    use rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use rustls::crypto::CryptoProvider;
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, SignatureScheme};

    /// Accepts any server certificate. Handshake signatures are still
    /// verified so the session is well-formed; the peer's identity is not.
    #[derive(Debug)]
    pub(super) struct NoVerification {
        provider: Arc<CryptoProvider>,
    }

    impl NoVerification {
        pub(super) fn new(provider: Arc<CryptoProvider>) -> Self {
            Self { provider }
        }
    }

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> std::result::Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls12_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls13_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.provider
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}
