//! Connection management
//!
//! This module handles:
//! * Transport abstraction (header-framed socket vs HTTP/2 POST)
//! * Connection lifecycle (open, handshake, authenticate, execute, close)
//! * Timeout recovery by transport replacement
//! * State machine enforcement
//! * TLS configuration and support

mod conn;
mod graph;
mod header_transport;
mod http2;
mod state;
mod tls;
mod transport;

pub use conn::{Connection, ServerAddress, TransportConfig, TransportConfigBuilder};
pub use graph::GraphClient;
pub use header_transport::HeaderTransport;
pub use http2::Http2Transport;
pub use state::ConnectionState;
pub use tls::{parse_server_name, TlsConfig, TlsConfigBuilder};
pub use transport::{Connector, NetConnector, TcpVariant, Transport};
