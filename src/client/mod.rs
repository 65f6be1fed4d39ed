//! Client configuration helpers

mod connection_string;

pub use connection_string::ConnectionInfo;
