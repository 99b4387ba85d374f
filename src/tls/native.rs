//! native-tls backend.

use native_tls::Protocol;
use tokio::net::TcpStream;

use crate::client::Transport;
use crate::error::{Error, Result};

pub(crate) async fn connect(verify: bool, host: &str, stream: TcpStream) -> Result<Transport> {
    let mut builder = native_tls::TlsConnector::builder();

    // TLS 1.1 floor, no ceiling: the platform negotiates up to 1.3. The
    // platform's default cipher set already excludes NULL-auth, MD5 and
    // RC4 suites.
    builder.min_protocol_version(Some(Protocol::Tlsv11));
    builder.max_protocol_version(None);

    if !verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }

    let connector = builder.build().map_err(|e| Error::Tls(e.to_string()))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let tls_stream = connector
        .connect(host, stream)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;

    Ok(Transport::NativeTls(Box::new(tls_stream)))
}
