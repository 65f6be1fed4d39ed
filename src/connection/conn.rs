//! Core connection type

use super::graph::GraphClient;
use super::state::ConnectionState;
use super::tls::TlsConfig;
use super::transport::{Connector, NetConnector};
use crate::metrics::labels::{OUTCOME_ERROR, OUTCOME_REJECTED, OUTCOME_SUCCESS};
use crate::protocol::constants::{PING_SESSION_ID, PING_STATEMENT};
use crate::protocol::{
    AuthResponse, ExecutionResponse, ParameterMap, VerifyClientVersionReq,
};
use crate::{Error, Result};
use bytes::Bytes;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Graph server endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    /// Hostname or IP address (IPv6 without brackets)
    pub host: String,
    /// Port
    pub port: u16,
}

impl ServerAddress {
    /// Create a new address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ServerAddress {
    type Err = Error;

    /// Parse `host:port` or `[ipv6]:port`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Config(format!("invalid server address '{}'", s));

        let (host, port) = match s.strip_prefix('[') {
            Some(rest) => rest.split_once("]:").ok_or_else(invalid)?,
            None => {
                let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
                if host.contains(':') {
                    return Err(invalid());
                }
                (host, port)
            }
        };
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| Error::Config(format!("invalid port in '{}': {}", s, e)))?;

        Ok(Self::new(host, port))
    }
}

/// Transport configuration captured at open time
///
/// A reopen reuses this value unchanged, so the replacement transport talks to
/// the same target the same way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportConfig {
    /// Bound on dialing and on every request round trip (zero = no bound)
    pub timeout: Duration,
    /// TLS settings; plain TCP when `None`
    pub tls: Option<TlsConfig>,
    /// Use the HTTP/2 POST transport instead of the header-framed socket
    pub use_http2: bool,
    /// Extra headers sent with every HTTP/2 request
    pub http_headers: Option<HeaderMap>,
    /// Handshake key presented during version verification
    pub handshake_key: Option<Bytes>,
}

impl TransportConfig {
    /// Create a builder for the transport configuration
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = TransportConfig::builder()
    ///     .timeout(Duration::from_secs(3))
    ///     .handshake_key("3.0.0")
    ///     .build();
    /// ```
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }
}

/// Builder for [`TransportConfig`]
#[derive(Debug, Clone, Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Set the transport timeout
    ///
    /// Default: zero (no timeout)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Enable TLS
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = Some(tls);
        self
    }

    /// Select the HTTP/2 POST transport
    pub fn use_http2(mut self, use_http2: bool) -> Self {
        self.config.use_http2 = use_http2;
        self
    }

    /// Set extra HTTP/2 request headers
    ///
    /// Multi-valued headers are sent one value at a time. `Content-Type` is
    /// ignored.
    pub fn http_headers(mut self, headers: HeaderMap) -> Self {
        self.config.http_headers = Some(headers);
        self
    }

    /// Set the handshake key
    pub fn handshake_key(mut self, key: impl Into<Bytes>) -> Self {
        self.config.handshake_key = Some(key.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

/// One connection to one graph server
///
/// A connection is either closed or open with a verified handshake; requests
/// are refused in every other state. Methods take `&mut self`, so at most one
/// request is in flight at a time.
#[derive(Debug)]
pub struct Connection<C: Connector = NetConnector> {
    address: ServerAddress,
    config: TransportConfig,
    connector: C,
    client: Option<GraphClient>,
    state: ConnectionState,
    returned_at: Instant,
}

impl Connection<NetConnector> {
    /// Create a closed connection using the network transports
    pub fn new(address: ServerAddress, config: TransportConfig) -> Self {
        Self::with_connector(address, config, NetConnector)
    }

    /// Create and open a connection
    pub async fn connect(address: ServerAddress, config: TransportConfig) -> Result<Self> {
        let mut conn = Self::new(address, config);
        conn.open().await?;
        Ok(conn)
    }
}

impl<C: Connector> Connection<C> {
    /// Create a closed connection whose transports come from `connector`
    pub fn with_connector(address: ServerAddress, config: TransportConfig, connector: C) -> Self {
        Self {
            address,
            config,
            connector,
            client: None,
            state: ConnectionState::Closed,
            returned_at: Instant::now(),
        }
    }

    /// Server endpoint
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Transport configuration
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the connection is open and verified
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Ready
            && self.client.as_ref().map(|c| c.is_open()).unwrap_or(false)
    }

    /// When the connection was created or last released
    pub fn returned_at(&self) -> Instant {
        self.returned_at
    }

    /// Time since the connection was created or last released
    pub fn idle_time(&self) -> Duration {
        self.returned_at.elapsed()
    }

    /// Open the transport and verify the handshake key
    ///
    /// # Errors
    ///
    /// - [`Error::TransportConstruction`]: the transport could not be built
    /// - [`Error::TransportOpen`]: the transport could not be opened
    /// - [`Error::Handshake`]: the verification RPC failed; the connection is closed
    /// - [`Error::HandshakeRejected`]: the server refused the key; the connection
    ///   is left in [`ConnectionState::Rejected`] and must be closed by the caller
    pub async fn open(&mut self) -> Result<()> {
        let span = tracing::info_span!(
            "open",
            host = %self.address.host,
            port = self.address.port,
            http2 = self.config.use_http2
        );
        self.open_and_verify().instrument(span).await
    }

    async fn open_and_verify(&mut self) -> Result<()> {
        self.state.transition(ConnectionState::Opening)?;

        let transport = match self.connector.transport(&self.address, &self.config) {
            Ok(transport) => transport,
            Err(e) => {
                self.state = ConnectionState::Closed;
                return Err(Error::TransportConstruction(Box::new(e)));
            }
        };

        let mut client = GraphClient::new(transport);
        if let Err(e) = client.open().await {
            self.state = ConnectionState::Closed;
            return Err(Error::TransportOpen(Box::new(e)));
        }
        if !client.is_open() {
            self.state = ConnectionState::Closed;
            return Err(Error::TransportOpen(Box::new(Error::Transport(
                "transport is not open after open".into(),
            ))));
        }

        self.state.transition(ConnectionState::Verifying)?;
        let req = VerifyClientVersionReq {
            version: self.config.handshake_key.clone().unwrap_or_default(),
        };

        match client.verify_client_version(req).await {
            Err(e) => {
                crate::metrics::counters::handshake(OUTCOME_ERROR);
                if let Err(close_err) = client.close().await {
                    tracing::warn!(error = %close_err, "failed to close transport after handshake failure");
                }
                self.state.transition(ConnectionState::Closed)?;
                Err(Error::Handshake(Box::new(e)))
            }
            Ok(resp) if !resp.error_code.is_success() => {
                crate::metrics::counters::handshake(OUTCOME_REJECTED);
                let message = resp
                    .error_msg
                    .map(|msg| String::from_utf8_lossy(&msg).into_owned())
                    .unwrap_or_default();
                tracing::warn!(code = %resp.error_code, %message, "server rejected handshake key");

                self.client = Some(client);
                self.state.transition(ConnectionState::Rejected)?;
                Err(Error::HandshakeRejected {
                    code: resp.error_code,
                    message,
                })
            }
            Ok(_) => {
                crate::metrics::counters::handshake(OUTCOME_SUCCESS);
                self.client = Some(client);
                self.state.transition(ConnectionState::Ready)?;
                tracing::debug!("handshake verified");
                Ok(())
            }
        }
    }

    /// Replace the transport with a fresh one built from the same address and config
    ///
    /// The old transport is closed first. Sessions live on the server, so no
    /// re-authentication happens.
    async fn reopen(&mut self) -> Result<()> {
        let span = tracing::info_span!(
            "reopen",
            host = %self.address.host,
            port = self.address.port
        );
        async {
            if let Err(e) = self.close().await {
                tracing::warn!(error = %e, "failed to close transport before reopen");
            }
            match self.open().await {
                Ok(()) => {
                    crate::metrics::counters::reopen(OUTCOME_SUCCESS);
                    Ok(())
                }
                Err(e) => {
                    crate::metrics::counters::reopen(OUTCOME_ERROR);
                    Err(Error::Reopen(Box::new(e)))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Authenticate and obtain a session
    ///
    /// A server-side refusal (bad credentials, too many connections, ...) is not
    /// an error: the response is returned for the caller to inspect. If the RPC
    /// itself fails, the transport is closed and the failure is returned as
    /// [`Error::Authentication`], with any close failure attached as a
    /// secondary cause.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<AuthResponse> {
        let span = tracing::info_span!(
            "authenticate",
            host = %self.address.host,
            port = self.address.port,
            username = %username
        );
        async {
            let result = self
                .client_mut()?
                .authenticate(username.as_bytes(), password.as_bytes())
                .await;

            match result {
                Ok(resp) => {
                    let outcome = if resp.error_code.is_success() {
                        OUTCOME_SUCCESS
                    } else {
                        OUTCOME_REJECTED
                    };
                    crate::metrics::counters::auth(outcome);
                    tracing::debug!(code = %resp.error_code, session_id = ?resp.session_id, "authenticate replied");
                    Ok(resp)
                }
                Err(e) => {
                    crate::metrics::counters::auth(OUTCOME_ERROR);
                    let close_error = match self.close().await {
                        Ok(()) => None,
                        Err(close_err) => {
                            tracing::warn!(error = %close_err, "failed to close transport after authentication failure");
                            Some(Box::new(close_err))
                        }
                    };
                    Err(Error::Authentication {
                        source: Box::new(e),
                        close_error,
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Execute a statement without parameters
    pub async fn execute(&mut self, session_id: i64, stmt: &str) -> Result<ExecutionResponse> {
        self.execute_with_parameter(session_id, stmt, &ParameterMap::new())
            .await
    }

    /// Execute a statement with named parameters
    ///
    /// Errors are returned as-is; the connection stays open.
    pub async fn execute_with_parameter(
        &mut self,
        session_id: i64,
        stmt: &str,
        params: &ParameterMap,
    ) -> Result<ExecutionResponse> {
        self.client_mut()?
            .execute_with_parameter(session_id, stmt.as_bytes(), params)
            .await
    }

    /// Execute a statement with named parameters, asking the server to give up
    /// after `timeout_ms` milliseconds
    ///
    /// The transport timeout is unaffected.
    pub async fn execute_with_parameter_timeout(
        &mut self,
        session_id: i64,
        stmt: &str,
        params: &ParameterMap,
        timeout_ms: i64,
    ) -> Result<ExecutionResponse> {
        self.client_mut()?
            .execute_with_timeout(session_id, stmt.as_bytes(), params, timeout_ms)
            .await
    }

    /// Execute a statement without parameters, returning the JSON document
    pub async fn execute_json(&mut self, session_id: i64, stmt: &str) -> Result<Bytes> {
        self.execute_json_with_parameter(session_id, stmt, &ParameterMap::new())
            .await
    }

    /// Execute a statement with named parameters, returning the JSON document
    ///
    /// After a timeout the reply may still arrive and would be read as the
    /// answer to the next request, so the transport is replaced and the
    /// request sent once more. A failed reopen is returned instead of the
    /// timeout.
    pub async fn execute_json_with_parameter(
        &mut self,
        session_id: i64,
        stmt: &str,
        params: &ParameterMap,
    ) -> Result<Bytes> {
        let result = self
            .client_mut()?
            .execute_json_with_parameter(session_id, stmt.as_bytes(), params)
            .await;

        match result {
            Err(e) if e.is_timeout() => {
                tracing::debug!(error = %e, "request timed out, reopening transport");
                self.reopen().await?;
                self.client_mut()?
                    .execute_json_with_parameter(session_id, stmt.as_bytes(), params)
                    .await
            }
            other => other,
        }
    }

    /// Execute a statement and deserialize the JSON document into `T`
    pub async fn execute_json_as<T: DeserializeOwned>(
        &mut self,
        session_id: i64,
        stmt: &str,
        params: &ParameterMap,
    ) -> Result<T> {
        let payload = self
            .execute_json_with_parameter(session_id, stmt, params)
            .await?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Check that the server answers `YIELD 1`
    ///
    /// Never fails; any error means `false`.
    pub async fn ping(&mut self) -> bool {
        match self.execute(PING_SESSION_ID, PING_STATEMENT).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(address = %self.address, error = %e, "ping failed");
                false
            }
        }
    }

    /// Release a session on the server
    ///
    /// The connection stays open.
    pub async fn sign_out(&mut self, session_id: i64) -> Result<()> {
        self.client_mut()?.signout(session_id).await
    }

    /// Mark the connection as returned to its pool
    ///
    /// Only updates [`returned_at`](Self::returned_at); performs no I/O.
    pub fn release(&mut self) {
        self.returned_at = Instant::now();
    }

    /// Close the transport
    ///
    /// Closing an already closed connection is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let result = match self.client.take() {
            Some(mut client) => client.close().await,
            None => Ok(()),
        };
        self.state = ConnectionState::Closed;
        result
    }

    fn client_mut(&mut self) -> Result<&mut GraphClient> {
        match (self.state, self.client.as_mut()) {
            (ConnectionState::Ready, Some(client)) => Ok(client),
            (state, _) => Err(Error::InvalidState {
                expected: ConnectionState::Ready.to_string(),
                actual: state.to_string(),
            }),
        }
    }
}
