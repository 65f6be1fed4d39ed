//! HTTP/2 POST transport
//!
//! Each thrift message is POSTed as the body of one request; the reply message
//! is the response body. HTTP/2 is spoken with prior knowledge on cleartext
//! connections and negotiated through ALPN on TLS ones.

use super::conn::{ServerAddress, TransportConfig};
use super::tls::TlsConfig;
use super::transport::{server_name_for, with_timeout, TcpVariant, Transport};
use crate::protocol::constants::THRIFT_CONTENT_TYPE;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http2::SendRequest;
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls_pki_types::ServerName;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Transport POSTing thrift messages over one HTTP/2 connection
pub struct Http2Transport {
    address: ServerAddress,
    timeout: Duration,
    tls: Option<TlsConfig>,
    server_name: Option<ServerName<'static>>,
    uri: Uri,
    headers: HeaderMap,
    sender: Option<SendRequest<Full<Bytes>>>,
    connection: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Http2Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http2Transport")
            .field("uri", &self.uri)
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Http2Transport {
    /// Create an unopened transport
    ///
    /// The target is `https://host:port/` when TLS is configured, else
    /// `http://host:port/`. Extra headers are copied value by value, except
    /// `Content-Type`, which is always the thrift content type.
    pub fn new(address: &ServerAddress, config: &TransportConfig) -> Result<Self> {
        let scheme = if config.tls.is_some() { "https" } else { "http" };
        let uri: Uri = format!("{}://{}/", scheme, address)
            .parse()
            .map_err(|e| Error::Config(format!("invalid server URI for {}: {}", address, e)))?;

        let mut headers = HeaderMap::new();
        if let Some(extra) = &config.http_headers {
            for (name, value) in extra {
                if name == CONTENT_TYPE {
                    continue;
                }
                headers.append(name.clone(), value.clone());
            }
        }

        Ok(Self {
            address: address.clone(),
            timeout: config.timeout,
            tls: config.tls.clone(),
            server_name: server_name_for(address, config)?,
            uri,
            headers,
            sender: None,
            connection: None,
        })
    }

    /// Target URI of every request
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Headers added to every request (besides `Content-Type`)
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn build_request(&self, body: Bytes) -> Result<Request<Full<Bytes>>> {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(self.uri.clone())
            .body(Full::new(body))
            .map_err(|e| Error::Transport(format!("failed to build request: {}", e)))?;

        let request_headers = request.headers_mut();
        request_headers.insert(CONTENT_TYPE, HeaderValue::from_static(THRIFT_CONTENT_TYPE));
        for (name, value) in &self.headers {
            request_headers.append(name.clone(), value.clone());
        }
        Ok(request)
    }
}

#[async_trait]
impl Transport for Http2Transport {
    async fn open(&mut self) -> Result<()> {
        let tls = match (&self.tls, &self.server_name) {
            (Some(tls), Some(name)) => Some((tls.h2_client_config(), name.clone())),
            _ => None,
        };
        let stream = TcpVariant::connect(&self.address, self.timeout, tls).await?;

        let builder = hyper::client::conn::http2::Builder::new(TokioExecutor::new());
        let (sender, connection): (SendRequest<Full<Bytes>>, _) = with_timeout(self.timeout, async {
            builder
                .handshake(TokioIo::new(stream))
                .await
                .map_err(|e| Error::Transport(format!("HTTP/2 handshake failed: {}", e)))
        })
        .await?;

        let address = self.address.clone();
        self.connection = Some(tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(%address, error = %e, "HTTP/2 connection ended with error");
            }
        }));
        self.sender = Some(sender);
        tracing::debug!(uri = %self.uri, "HTTP/2 transport connected");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.sender
            .as_ref()
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }

    async fn close(&mut self) -> Result<()> {
        self.sender = None;
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
        Ok(())
    }

    async fn call(&mut self, _seq_id: i32, request: Bytes) -> Result<Bytes> {
        let request = self.build_request(request)?;
        let timeout = self.timeout;
        let sender = self.sender.as_mut().ok_or(Error::ConnectionClosed)?;

        with_timeout(timeout, async {
            sender
                .ready()
                .await
                .map_err(|e| Error::Transport(format!("HTTP/2 connection not ready: {}", e)))?;
            let response = sender
                .send_request(request)
                .await
                .map_err(|e| Error::Transport(format!("HTTP/2 request failed: {}", e)))?;

            let status = response.status();
            if status != StatusCode::OK {
                return Err(Error::Transport(format!("HTTP response code: {}", status)));
            }

            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| Error::Transport(format!("failed to read response body: {}", e)))?;
            Ok(body.to_bytes())
        })
        .await
    }

    /// Still one POST per message; the (empty) response body is discarded.
    async fn send_oneway(&mut self, seq_id: i32, request: Bytes) -> Result<()> {
        self.call(seq_id, request).await.map(|_| ())
    }
}

impl Drop for Http2Transport {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
    }
}
