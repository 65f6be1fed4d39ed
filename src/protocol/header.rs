//! THeader framing
//!
//! Frame layout (all integers big-endian):
//!
//! ```text
//! u32 length          bytes that follow this field
//! u16 magic           0x0FFF
//! u16 flags
//! u32 sequence id
//! u16 header words    variable header size / 4
//! ... variable header varint protocol id, varint transform count, info blocks, zero padding
//! ... payload         one thrift message
//! ```

use super::constants::{header, MAX_MESSAGE_LENGTH};
use bytes::{BufMut, Bytes, BytesMut};
use std::io;

/// Decoded header frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame flags
    pub flags: u16,
    /// Sequence id used for request/response correlation
    pub seq_id: u32,
    /// Protocol id of the payload
    pub protocol_id: u32,
    /// Key/value info headers
    pub headers: Vec<(String, String)>,
    /// Thrift message
    pub payload: Bytes,
}

/// Wrap a thrift message in a header frame using the binary protocol
pub fn encode_frame(seq_id: u32, headers: &[(&str, &str)], payload: &[u8]) -> io::Result<BytesMut> {
    let mut var_header = BytesMut::new();
    write_varint(&mut var_header, header::PROTOCOL_BINARY);
    write_varint(&mut var_header, 0); // no transforms
    if !headers.is_empty() {
        write_varint(&mut var_header, header::INFO_KEYVALUE);
        write_varint(&mut var_header, varint_len(headers.len())?);
        for (key, value) in headers {
            write_varstr(&mut var_header, key)?;
            write_varstr(&mut var_header, value)?;
        }
    }
    while var_header.len() % 4 != 0 {
        var_header.put_u8(0);
    }

    let header_words = u16::try_from(var_header.len() / 4).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "frame header too large")
    })?;
    let length = header::FIXED_SIZE + var_header.len() + payload.len();
    if length > MAX_MESSAGE_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame length {} exceeds maximum allowed {}", length, MAX_MESSAGE_LENGTH),
        ));
    }

    let mut buf = BytesMut::with_capacity(4 + length);
    buf.put_u32(length as u32);
    buf.put_u16(header::MAGIC);
    buf.put_u16(0);
    buf.put_u32(seq_id);
    buf.put_u16(header_words);
    buf.put(var_header);
    buf.put_slice(payload);
    Ok(buf)
}

/// Decode one header frame from the front of `data` without consuming it
///
/// # Returns
/// `Ok(Some((frame, consumed)))` - A complete frame and its total size in bytes
/// `Ok(None)` - More data is needed
/// `Err(e)` - The data is not a valid header frame
pub fn decode_frame(data: &BytesMut) -> io::Result<Option<(Frame, usize)>> {
    if data.len() < 4 {
        return Ok(None);
    }

    let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if len > MAX_MESSAGE_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {} exceeds maximum allowed {}", len, MAX_MESSAGE_LENGTH),
        ));
    }
    if len < header::FIXED_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {} is shorter than the fixed header", len),
        ));
    }
    if data.len() < 4 + len {
        return Ok(None);
    }

    let body = &data[4..4 + len];
    let magic = u16::from_be_bytes([body[0], body[1]]);
    if magic != header::MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("not a header frame (magic 0x{:04X})", magic),
        ));
    }
    let flags = u16::from_be_bytes([body[2], body[3]]);
    let seq_id = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
    let header_len = u16::from_be_bytes([body[8], body[9]]) as usize * 4;

    let payload_start = header::FIXED_SIZE + header_len;
    if payload_start > len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("header size {} exceeds frame length {}", header_len, len),
        ));
    }

    let mut var_header = &body[header::FIXED_SIZE..payload_start];
    let protocol_id = read_varint(&mut var_header)?;
    let transforms = read_varint(&mut var_header)?;
    if transforms != 0 {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{} frame transforms requested, none supported", transforms),
        ));
    }

    let mut headers = Vec::new();
    while !var_header.is_empty() {
        match read_varint(&mut var_header)? {
            // padding
            0 => break,
            header::INFO_KEYVALUE => {
                let count = read_varint(&mut var_header)?;
                for _ in 0..count {
                    let key = read_varstr(&mut var_header)?;
                    let value = read_varstr(&mut var_header)?;
                    headers.push((key, value));
                }
            }
            // unknown info block; its length is not self-describing
            _ => break,
        }
    }

    let frame = Frame {
        flags,
        seq_id,
        protocol_id,
        headers,
        payload: Bytes::copy_from_slice(&body[payload_start..]),
    };
    Ok(Some((frame, 4 + len)))
}

fn varint_len(len: usize) -> io::Result<u32> {
    u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "header value too long"))
}

fn write_varint(buf: &mut BytesMut, mut value: u32) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

fn write_varstr(buf: &mut BytesMut, s: &str) -> io::Result<()> {
    write_varint(buf, varint_len(s.len())?);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn read_varint(data: &mut &[u8]) -> io::Result<u32> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let (&byte, rest) = data
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "truncated varint"))?;
        *data = rest;
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "varint too long"))
}

fn read_varstr(data: &mut &[u8]) -> io::Result<String> {
    let len = read_varint(data)? as usize;
    if data.len() < len {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated header string"));
    }
    let (s, rest) = data.split_at(len);
    *data = rest;
    Ok(String::from_utf8_lossy(s).into_owned())
}
