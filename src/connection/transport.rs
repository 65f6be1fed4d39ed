//! Transport abstraction (header-framed socket vs HTTP/2 POST)

use super::conn::{ServerAddress, TransportConfig};
use super::header_transport::HeaderTransport;
use super::http2::Http2Transport;
use super::tls::parse_server_name;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// TCP stream variant: plain or TLS-encrypted
#[allow(clippy::large_enum_variant)]
pub enum TcpVariant {
    /// Plain TCP connection
    Plain(TcpStream),
    /// TLS-encrypted TCP connection
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl std::fmt::Debug for TcpVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TcpVariant::Plain(_) => f.write_str("TcpVariant::Plain(TcpStream)"),
            TcpVariant::Tls(_) => f.write_str("TcpVariant::Tls(TlsStream)"),
        }
    }
}

impl TcpVariant {
    /// Connect to `address`, performing a TLS handshake when `tls` is set.
    ///
    /// The whole dial, including the TLS handshake, is bounded by `timeout`
    /// (zero means no bound).
    pub async fn connect(
        address: &ServerAddress,
        timeout: Duration,
        tls: Option<(Arc<ClientConfig>, ServerName<'static>)>,
    ) -> Result<Self> {
        with_timeout(timeout, async {
            let stream = TcpStream::connect((address.host.as_str(), address.port)).await?;
            stream.set_nodelay(true)?;

            match tls {
                None => Ok(TcpVariant::Plain(stream)),
                Some((client_config, server_name)) => {
                    let connector = tokio_rustls::TlsConnector::from(client_config);
                    let stream = connector
                        .connect(server_name, stream)
                        .await
                        .map_err(|e| Error::Transport(format!("TLS handshake failed: {}", e)))?;
                    Ok(TcpVariant::Tls(stream))
                }
            }
        })
        .await
    }

    /// Whether the stream is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        matches!(self, TcpVariant::Tls(_))
    }
}

impl AsyncRead for TcpVariant {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TcpVariant::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            TcpVariant::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TcpVariant {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TcpVariant::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            TcpVariant::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TcpVariant::Plain(stream) => Pin::new(stream).poll_flush(cx),
            TcpVariant::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TcpVariant::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            TcpVariant::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// A bidirectional RPC transport to one graph server.
///
/// Implementations carry one encoded thrift message per call and hand back the
/// reply message bytes. Framing (THeader or HTTP/2) is the transport's business;
/// the caller never sees it.
#[async_trait]
pub trait Transport: Send + std::fmt::Debug {
    /// Establish the underlying connection
    async fn open(&mut self) -> Result<()>;

    /// Whether the underlying connection is established
    fn is_open(&self) -> bool;

    /// Release the underlying connection; closing twice is a no-op
    async fn close(&mut self) -> Result<()>;

    /// Send one request message and wait for its reply message
    async fn call(&mut self, seq_id: i32, request: Bytes) -> Result<Bytes>;

    /// Send one request message that has no reply
    async fn send_oneway(&mut self, seq_id: i32, request: Bytes) -> Result<()>;
}

/// Builds transports for a connection.
///
/// Called once per open, so a reopen goes through the same factory with the
/// same address and configuration as the original open.
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Construct an unopened transport for `address` configured by `config`
    fn transport(
        &self,
        address: &ServerAddress,
        config: &TransportConfig,
    ) -> Result<Box<dyn Transport>>;
}

/// Default connector: header-framed socket, or HTTP/2 POST when `use_http2` is set
#[derive(Debug, Clone, Copy, Default)]
pub struct NetConnector;

impl Connector for NetConnector {
    fn transport(
        &self,
        address: &ServerAddress,
        config: &TransportConfig,
    ) -> Result<Box<dyn Transport>> {
        if config.use_http2 {
            tracing::debug!(%address, tls = config.tls.is_some(), "creating HTTP/2 transport");
            Ok(Box::new(Http2Transport::new(address, config)?))
        } else {
            tracing::debug!(%address, tls = config.tls.is_some(), "creating header transport");
            Ok(Box::new(HeaderTransport::new(address, config)?))
        }
    }
}

/// Resolve the TLS server name for `address`, if TLS is configured
pub(crate) fn server_name_for(
    address: &ServerAddress,
    config: &TransportConfig,
) -> Result<Option<ServerName<'static>>> {
    match &config.tls {
        Some(_) => parse_server_name(&address.host).map(Some),
        None => Ok(None),
    }
}

/// Run `fut` bounded by `timeout`; a zero timeout means no bound
pub(crate) async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if timeout.is_zero() {
        return fut.await;
    }
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TlsConfig;

    #[tokio::test]
    async fn test_tcp_connect_failure() {
        let address = ServerAddress::new("127.0.0.1", 1);
        let result = TcpVariant::connect(&address, Duration::from_secs(1), None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let result: Result<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_with_timeout_zero_is_unbounded() {
        let result = with_timeout(Duration::ZERO, async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_server_name_only_with_tls() {
        let address = ServerAddress::new("graphd", 9669);
        let plain = TransportConfig::default();
        assert!(server_name_for(&address, &plain).unwrap().is_none());

        let tls = TransportConfig::builder()
            .tls(TlsConfig::builder().build().unwrap())
            .build();
        assert!(server_name_for(&address, &tls).unwrap().is_some());

        let bad = ServerAddress::new("bad host", 9669);
        assert!(server_name_for(&bad, &tls).is_err());
    }

    #[test]
    fn test_net_connector_selects_variant() {
        let address = ServerAddress::new("127.0.0.1", 9669);

        let header = NetConnector
            .transport(&address, &TransportConfig::default())
            .unwrap();
        assert!(format!("{:?}", header).contains("HeaderTransport"));
        assert!(!header.is_open());

        let config = TransportConfig::builder().use_http2(true).build();
        let http2 = NetConnector.transport(&address, &config).unwrap();
        assert!(format!("{:?}", http2).contains("Http2Transport"));
        assert!(!http2.is_open());
    }
}
