//! Header-framed socket transport
//!
//! One thrift message per THeader frame over a buffered TCP (or TLS) stream.

use super::conn::{ServerAddress, TransportConfig};
use super::tls::TlsConfig;
use super::transport::{server_name_for, with_timeout, TcpVariant, Transport};
use crate::protocol::constants::{header, BUFFER_SIZE};
use crate::protocol::{decode_frame, encode_frame, Frame};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use rustls_pki_types::ServerName;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};

/// Transport sending THeader frames over a raw socket
#[derive(Debug)]
pub struct HeaderTransport {
    address: ServerAddress,
    timeout: Duration,
    tls: Option<TlsConfig>,
    server_name: Option<ServerName<'static>>,
    stream: Option<BufStream<TcpVariant>>,
    read_buf: BytesMut,
}

impl HeaderTransport {
    /// Create an unopened transport
    ///
    /// Fails if TLS is configured and the host is not a valid server name.
    pub fn new(address: &ServerAddress, config: &TransportConfig) -> Result<Self> {
        Ok(Self {
            address: address.clone(),
            timeout: config.timeout,
            tls: config.tls.clone(),
            server_name: server_name_for(address, config)?,
            stream: None,
            read_buf: BytesMut::new(),
        })
    }
}

#[async_trait]
impl Transport for HeaderTransport {
    async fn open(&mut self) -> Result<()> {
        let tls = match (&self.tls, &self.server_name) {
            (Some(tls), Some(name)) => Some((tls.client_config(), name.clone())),
            _ => None,
        };
        let stream = TcpVariant::connect(&self.address, self.timeout, tls).await?;
        tracing::debug!(address = %self.address, tls = stream.is_tls(), "header transport connected");

        self.stream = Some(BufStream::with_capacity(BUFFER_SIZE, BUFFER_SIZE, stream));
        self.read_buf = BytesMut::with_capacity(BUFFER_SIZE);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        self.read_buf.clear();
        match self.stream.take() {
            Some(mut stream) => {
                stream.shutdown().await?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn call(&mut self, seq_id: i32, request: Bytes) -> Result<Bytes> {
        let timeout = self.timeout;
        let read_buf = &mut self.read_buf;
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;

        let mut written = false;
        let result = with_timeout(timeout, async {
            write_frame(stream, seq_id, &request).await?;
            written = true;
            let frame = read_reply(stream, read_buf, seq_id).await?;
            Ok(frame.payload)
        })
        .await;

        // A timeout after the request went out leaves the stream usable: the
        // late reply is skipped by the next call. Anything else may leave half
        // a frame on the wire.
        match &result {
            Err(Error::Timeout(_)) if written => {}
            Err(e) => self.discard_stream(e),
            Ok(_) => {}
        }
        result
    }

    async fn send_oneway(&mut self, seq_id: i32, request: Bytes) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        let result = with_timeout(self.timeout, write_frame(stream, seq_id, &request)).await;
        if let Err(e) = &result {
            self.discard_stream(e);
        }
        result
    }
}

impl HeaderTransport {
    fn discard_stream(&mut self, error: &Error) {
        tracing::debug!(address = %self.address, %error, "dropping stream in unknown state");
        self.stream = None;
        self.read_buf.clear();
    }
}

/// Write one framed message and flush it
pub(crate) async fn write_frame<W>(writer: &mut W, seq_id: i32, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(seq_id as u32, &[], payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message, buffering any bytes that belong to the next frame
pub(crate) async fn read_frame<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some((frame, consumed)) = decode_frame(buf)? {
            buf.advance(consumed);
            if frame.protocol_id != header::PROTOCOL_BINARY {
                return Err(Error::Protocol(format!(
                    "unsupported frame protocol id {}",
                    frame.protocol_id
                )));
            }
            return Ok(frame);
        }

        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
    }
}

/// Read frames until the reply to `seq_id` arrives
///
/// Replies to earlier requests, abandoned after a timeout, are discarded. A
/// reply to a later request is a [`Error::SequenceMismatch`].
pub(crate) async fn read_reply<R>(reader: &mut R, buf: &mut BytesMut, seq_id: i32) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let expected = seq_id as u32;
    loop {
        let frame = read_frame(reader, buf).await?;
        if frame.seq_id == expected {
            return Ok(frame);
        }
        if (expected.wrapping_sub(frame.seq_id) as i32) > 0 {
            tracing::debug!(expected, stale = frame.seq_id, "discarding reply to abandoned request");
            continue;
        }
        return Err(Error::SequenceMismatch {
            expected: seq_id,
            actual: frame.seq_id as i32,
        });
    }
}
