//! nebula-wire: a single-connection client for the Nebula Graph RPC protocol
//!
//! This crate manages exactly one transport to one graph server endpoint:
//!
//! * transport construction over a header-framed socket or HTTP/2 POST, optionally TLS-wrapped
//! * the mandatory client version handshake before any query traffic
//! * authenticated query execution (native and structured/JSON payloads)
//! * transparent reopen after a timeout desynchronizes request/response correlation
//!
//! Pooling, load balancing and session management live outside this crate and
//! drive a [`Connection`](connection::Connection) one request at a time.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> nebula_wire::Result<()> {
//! use nebula_wire::connection::{Connection, ServerAddress, TransportConfig};
//! use std::time::Duration;
//!
//! let address = ServerAddress::new("127.0.0.1", 9669);
//! let config = TransportConfig::builder()
//!     .timeout(Duration::from_secs(3))
//!     .build();
//!
//! let mut conn = Connection::connect(address, config).await?;
//! let auth = conn.authenticate("root", "nebula").await?;
//! if let Some(session_id) = auth.session_id {
//!     let resp = conn.execute(session_id, "SHOW HOSTS").await?;
//!     println!("latency: {}us", resp.latency_in_us);
//!     conn.sign_out(session_id).await?;
//! }
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;

pub use client::ConnectionInfo;
pub use connection::{Connection, ServerAddress, TlsConfig, TransportConfig};
pub use error::{Error, Result};
pub use protocol::{ErrorCode, ParameterMap, Value};
