//! Connection string parsing
//!
//! Supports the format:
//! * nebula://[user[:password]@]host[:port][?params]
//!
//! Query parameters:
//! * `timeout_ms` - transport timeout in milliseconds (0 = none)
//! * `http2` - `true` selects the HTTP/2 transport
//! * `handshake_key` - key presented during version verification
//! * `tls` - `true` enables TLS
//! * `ca_cert` - path to a custom CA certificate (implies TLS)
//! * `tls_insecure` - `true` disables certificate verification (implies TLS)
//! * `header.<name>` - extra HTTP/2 request header, may repeat

use crate::connection::{ServerAddress, TlsConfig, TransportConfig};
use crate::protocol::constants::DEFAULT_PORT;
use crate::{Error, Result};
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::time::Duration;

/// Parsed connection info
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    /// Server endpoint
    pub address: ServerAddress,
    /// Username
    pub user: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Transport timeout
    pub timeout: Duration,
    /// Use the HTTP/2 transport
    pub use_http2: bool,
    /// Handshake key
    pub handshake_key: Option<String>,
    /// TLS enabled
    pub tls: bool,
    /// Path to custom CA certificate
    pub ca_cert: Option<String>,
    /// Accept invalid certificates (development only)
    pub tls_insecure: bool,
    /// Extra HTTP/2 request headers, in order of appearance
    pub headers: Vec<(String, String)>,
}

/// Split a query string into key/value pairs
fn parse_query(query_string: &str) -> Vec<(&str, &str)> {
    query_string
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(Error::Config(format!(
            "invalid value '{}' for {}: expected true or false",
            other, key
        ))),
    }
}

impl ConnectionInfo {
    /// Parse connection string
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s.strip_prefix("nebula://").ok_or_else(|| {
            Error::Config("connection string must start with nebula://".into())
        })?;

        let (rest, query_string) = rest.split_once('?').unwrap_or((rest, ""));
        let rest = rest.trim_end_matches('/');

        let (auth, host_port) = match rest.rsplit_once('@') {
            Some((auth, host_port)) => (Some(auth), host_port),
            None => (None, rest),
        };

        let (user, password) = match auth {
            Some(auth) => match auth.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(auth.to_string()), None),
            },
            None => (None, None),
        };

        let address = Self::parse_address(host_port)?;

        let mut info = Self {
            address,
            user,
            password,
            timeout: Duration::ZERO,
            use_http2: false,
            handshake_key: None,
            tls: false,
            ca_cert: None,
            tls_insecure: false,
            headers: Vec::new(),
        };

        for (key, value) in parse_query(query_string) {
            match key {
                "timeout_ms" => {
                    let ms = value
                        .parse::<u64>()
                        .map_err(|_| Error::Config(format!("invalid timeout_ms '{}'", value)))?;
                    info.timeout = Duration::from_millis(ms);
                }
                "http2" => info.use_http2 = parse_bool(key, value)?,
                "handshake_key" => info.handshake_key = Some(value.to_string()),
                "tls" => info.tls = parse_bool(key, value)?,
                "ca_cert" => {
                    info.ca_cert = Some(value.to_string());
                    info.tls = true;
                }
                "tls_insecure" => {
                    info.tls_insecure = parse_bool(key, value)?;
                    info.tls |= info.tls_insecure;
                }
                _ => match key.strip_prefix("header.") {
                    Some(name) if !name.is_empty() => {
                        info.headers.push((name.to_string(), value.to_string()))
                    }
                    _ => {
                        return Err(Error::Config(format!(
                            "unknown connection parameter '{}'",
                            key
                        )))
                    }
                },
            }
        }

        Ok(info)
    }

    fn parse_address(host_port: &str) -> Result<ServerAddress> {
        if host_port.is_empty() {
            return Err(Error::Config("connection string has no host".into()));
        }

        // bare IPv6 literals need brackets to carry a port
        let has_port = match host_port.strip_prefix('[') {
            Some(rest) => rest.contains("]:"),
            None => host_port.matches(':').count() == 1,
        };
        if has_port {
            return host_port.parse();
        }

        let host = host_port.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() || (host_port.starts_with('[') != host_port.ends_with(']')) {
            return Err(Error::Config(format!("invalid host '{}'", host_port)));
        }
        Ok(ServerAddress::new(host, DEFAULT_PORT))
    }

    /// Build a `TlsConfig` from parsed connection parameters.
    ///
    /// Returns `None` unless TLS is enabled.
    pub fn to_tls_config(&self) -> Result<Option<TlsConfig>> {
        if !self.tls {
            return Ok(None);
        }

        let mut builder = TlsConfig::builder();
        if let Some(ref ca_path) = self.ca_cert {
            builder = builder.ca_cert_path(ca_path);
        }
        if self.tls_insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Some(builder.build()?))
    }

    /// Build the header map for the HTTP/2 transport
    pub fn to_header_map(&self) -> Result<Option<HeaderMap>> {
        if self.headers.is_empty() {
            return Ok(None);
        }

        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::Config(format!("invalid header name '{}'", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::Config(format!("invalid value for header '{}'", name)))?;
            map.append(name, value);
        }
        Ok(Some(map))
    }

    /// Convert to an address and transport configuration
    pub fn to_parts(&self) -> Result<(ServerAddress, TransportConfig)> {
        let config = TransportConfig {
            timeout: self.timeout,
            tls: self.to_tls_config()?,
            use_http2: self.use_http2,
            http_headers: self.to_header_map()?,
            handshake_key: self
                .handshake_key
                .as_ref()
                .map(|key| bytes::Bytes::from(key.clone().into_bytes())),
        };
        Ok((self.address.clone(), config))
    }
}
