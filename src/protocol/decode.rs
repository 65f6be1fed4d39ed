//! Protocol message decoding (thrift binary protocol)

use super::constants::{message_type, ttype, MAX_NESTING_DEPTH, TYPE_MASK, VERSION_1, VERSION_MASK};
use super::message::{
    ApplicationErrorKind, AuthResponse, ErrorCode, ExecutionResponse, Reply,
    VerifyClientVersionResp,
};
use super::value::{field, DataSet, NullType, Row, Value};
use crate::{Error, Result};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io;

/// Bounds-checked cursor over a thrift binary message
///
/// Byte strings are returned as zero-copy slices of the underlying buffer.
#[derive(Debug, Clone)]
pub struct Reader {
    data: Bytes,
    pos: usize,
}

impl Reader {
    /// Create a reader positioned at the start of `data`
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> io::Result<&[u8]> {
        if self.remaining() < n {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, what.to_string()));
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..start + n])
    }

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1, "byte")?[0])
    }

    /// Read a signed byte
    pub fn read_i8(&mut self) -> io::Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a boolean
    pub fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a big-endian i16
    pub fn read_i16(&mut self) -> io::Result<i16> {
        let b = self.take(2, "i16")?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian i32
    pub fn read_i32(&mut self) -> io::Result<i32> {
        let b = self.take(4, "i32")?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian i64
    pub fn read_i64(&mut self) -> io::Result<i64> {
        let b = self.take(8, "i64")?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(i64::from_be_bytes(raw))
    }

    /// Read a big-endian double
    pub fn read_f64(&mut self) -> io::Result<f64> {
        Ok(f64::from_bits(self.read_i64()? as u64))
    }

    /// Read a length-prefixed byte string
    pub fn read_binary(&mut self) -> io::Result<Bytes> {
        let len = self.read_len("binary length")?;
        if self.remaining() < len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "binary data"));
        }
        let data = self.data.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(data)
    }

    /// Read a length-prefixed string, replacing invalid UTF-8
    pub fn read_string(&mut self) -> io::Result<String> {
        let data = self.read_binary()?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    fn read_len(&mut self, what: &str) -> io::Result<usize> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, format!("negative {}: {}", what, len))
        })
    }

    /// Read a strict message header: `(name, message type, sequence id)`
    pub fn read_message_begin(&mut self) -> io::Result<(String, u8, i32)> {
        let word = self.read_i32()? as u32;
        if word & VERSION_MASK != VERSION_1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad message version word: 0x{:08X}", word),
            ));
        }
        let msg_type = (word & TYPE_MASK) as u8;
        let name = self.read_string()?;
        let seq_id = self.read_i32()?;
        Ok((name, msg_type, seq_id))
    }

    /// Read a field header: `(field type, field id)`; the id is 0 at STOP
    pub fn read_field_begin(&mut self) -> io::Result<(u8, i16)> {
        let field_type = self.read_u8()?;
        if field_type == ttype::STOP {
            return Ok((ttype::STOP, 0));
        }
        let id = self.read_i16()?;
        Ok((field_type, id))
    }

    /// Read a list or set header: `(element type, size)`
    pub fn read_list_begin(&mut self) -> io::Result<(u8, usize)> {
        let elem_type = self.read_u8()?;
        let size = self.read_len("container size")?;
        // every element occupies at least one byte
        if size > self.remaining() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("container size {} exceeds remaining {} bytes", size, self.remaining()),
            ));
        }
        Ok((elem_type, size))
    }

    /// Read a map header: `(key type, value type, size)`
    pub fn read_map_begin(&mut self) -> io::Result<(u8, u8, usize)> {
        let key_type = self.read_u8()?;
        let (value_type, size) = self.read_list_begin()?;
        Ok((key_type, value_type, size))
    }

    /// Skip one value of the given type
    pub fn skip(&mut self, field_type: u8) -> io::Result<()> {
        self.skip_nested(field_type, 0)
    }

    /// Skip one value of the given type and return its raw encoding
    pub fn skip_raw(&mut self, field_type: u8) -> io::Result<Bytes> {
        let start = self.pos;
        self.skip(field_type)?;
        Ok(self.data.slice(start..self.pos))
    }

    fn skip_nested(&mut self, field_type: u8, depth: usize) -> io::Result<()> {
        check_depth(depth)?;
        match field_type {
            ttype::BOOL | ttype::BYTE => {
                self.take(1, "byte")?;
            }
            ttype::I16 => {
                self.take(2, "i16")?;
            }
            ttype::I32 | ttype::FLOAT => {
                self.take(4, "i32")?;
            }
            ttype::I64 | ttype::DOUBLE => {
                self.take(8, "i64")?;
            }
            ttype::STRING => {
                self.read_binary()?;
            }
            ttype::STRUCT => loop {
                let (t, _) = self.read_field_begin()?;
                if t == ttype::STOP {
                    break;
                }
                self.skip_nested(t, depth + 1)?;
            },
            ttype::MAP => {
                let (k, v, size) = self.read_map_begin()?;
                for _ in 0..size {
                    self.skip_nested(k, depth + 1)?;
                    self.skip_nested(v, depth + 1)?;
                }
            }
            ttype::SET | ttype::LIST => {
                let (e, size) = self.read_list_begin()?;
                for _ in 0..size {
                    self.skip_nested(e, depth + 1)?;
                }
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("cannot skip field type {}", other),
                ))
            }
        }
        Ok(())
    }
}

fn check_depth(depth: usize) -> io::Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("nesting depth exceeds {}", MAX_NESTING_DEPTH),
        ));
    }
    Ok(())
}

fn expect_elem(actual: u8, expected: u8, size: usize, what: &str) -> io::Result<()> {
    if size > 0 && actual != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: expected element type {}, got {}", what, expected, actual),
        ));
    }
    Ok(())
}

/// Decode a reply to `method` sent with `seq_id`
///
/// `decode_result` is handed the reader positioned at result field 0 together
/// with that field's wire type. Replies for a different sequence id are
/// rejected with [`Error::SequenceMismatch`].
pub fn decode_reply<T>(
    data: Bytes,
    method: &str,
    seq_id: i32,
    decode_result: impl FnOnce(&mut Reader, u8) -> io::Result<T>,
) -> Result<Reply<T>> {
    let mut reader = Reader::new(data);
    let (name, msg_type, actual_seq) = reader.read_message_begin()?;

    if actual_seq != seq_id {
        return Err(Error::SequenceMismatch {
            expected: seq_id,
            actual: actual_seq,
        });
    }
    if name != method {
        return Err(Error::Protocol(format!(
            "reply names method '{}', expected '{}'",
            name, method
        )));
    }

    match msg_type {
        message_type::EXCEPTION => {
            let (kind, message) = decode_application_exception(&mut reader)?;
            Ok(Reply::Exception { kind, message })
        }
        message_type::REPLY => {
            let mut decode_result = Some(decode_result);
            let mut result = None;
            loop {
                let (field_type, id) = reader.read_field_begin()?;
                if field_type == ttype::STOP {
                    break;
                }
                match (id, decode_result.take()) {
                    (0, Some(decode)) => result = Some(decode(&mut reader, field_type)?),
                    (_, pending) => {
                        decode_result = pending;
                        reader.skip(field_type)?;
                    }
                }
            }
            match result {
                Some(value) => Ok(Reply::Success(value)),
                None => Ok(Reply::Exception {
                    kind: ApplicationErrorKind::MissingResult,
                    message: format!("{} failed: unknown result", method),
                }),
            }
        }
        other => Err(Error::Protocol(format!(
            "unexpected message type {} in reply",
            other
        ))),
    }
}

fn decode_application_exception(reader: &mut Reader) -> io::Result<(ApplicationErrorKind, String)> {
    let mut message = String::new();
    let mut kind = ApplicationErrorKind::Unknown;
    loop {
        match reader.read_field_begin()? {
            (ttype::STOP, _) => break,
            (ttype::STRING, 1) => message = reader.read_string()?,
            (ttype::I32, 2) => kind = ApplicationErrorKind::from(reader.read_i32()?),
            (t, _) => reader.skip(t)?,
        }
    }
    Ok((kind, message))
}

fn expect_struct(field_type: u8) -> io::Result<()> {
    if field_type != ttype::STRUCT {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected struct result, got field type {}", field_type),
        ));
    }
    Ok(())
}

/// Decode a `VerifyClientVersionResp` result
pub fn decode_verify_client_version_resp(
    reader: &mut Reader,
    field_type: u8,
) -> io::Result<VerifyClientVersionResp> {
    expect_struct(field_type)?;
    let mut resp = VerifyClientVersionResp::default();
    loop {
        match reader.read_field_begin()? {
            (ttype::STOP, _) => break,
            (ttype::I32, 1) => resp.error_code = ErrorCode(reader.read_i32()?),
            (ttype::STRING, 2) => resp.error_msg = Some(reader.read_binary()?),
            (t, _) => reader.skip(t)?,
        }
    }
    Ok(resp)
}

/// Decode an `AuthResponse` result
pub fn decode_auth_response(reader: &mut Reader, field_type: u8) -> io::Result<AuthResponse> {
    expect_struct(field_type)?;
    let mut resp = AuthResponse::default();
    loop {
        match reader.read_field_begin()? {
            (ttype::STOP, _) => break,
            (ttype::I32, 1) => resp.error_code = ErrorCode(reader.read_i32()?),
            (ttype::STRING, 2) => resp.error_msg = Some(reader.read_binary()?),
            (ttype::I64, 3) => resp.session_id = Some(reader.read_i64()?),
            (ttype::I32, 4) => resp.time_zone_offset_seconds = Some(reader.read_i32()?),
            (ttype::STRING, 5) => resp.time_zone_name = Some(reader.read_binary()?),
            (t, _) => reader.skip(t)?,
        }
    }
    Ok(resp)
}

/// Decode an `ExecutionResponse` result
pub fn decode_execution_response(
    reader: &mut Reader,
    field_type: u8,
) -> io::Result<ExecutionResponse> {
    expect_struct(field_type)?;
    let mut resp = ExecutionResponse::default();
    loop {
        match reader.read_field_begin()? {
            (ttype::STOP, _) => break,
            (ttype::I32, 1) => resp.error_code = ErrorCode(reader.read_i32()?),
            (ttype::I64, 2) => resp.latency_in_us = reader.read_i64()?,
            (ttype::STRUCT, 3) => resp.data = Some(decode_dataset(reader, 1)?),
            (ttype::STRING, 4) => resp.space_name = Some(reader.read_binary()?),
            (ttype::STRING, 5) => resp.error_msg = Some(reader.read_binary()?),
            (ttype::STRUCT, 6) => resp.plan_desc = Some(reader.skip_raw(ttype::STRUCT)?),
            (ttype::STRING, 7) => resp.comment = Some(reader.read_binary()?),
            (t, _) => reader.skip(t)?,
        }
    }
    Ok(resp)
}

/// Decode a binary (JSON document) result
pub fn decode_binary_result(reader: &mut Reader, field_type: u8) -> io::Result<Bytes> {
    if field_type != ttype::STRING {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected binary result, got field type {}", field_type),
        ));
    }
    reader.read_binary()
}

/// Decode a value union
pub fn decode_value(reader: &mut Reader) -> io::Result<Value> {
    decode_value_nested(reader, 0)
}

fn decode_value_nested(reader: &mut Reader, depth: usize) -> io::Result<Value> {
    check_depth(depth)?;
    let mut value = Value::Empty;
    loop {
        let (t, id) = reader.read_field_begin()?;
        value = match (t, id) {
            (ttype::STOP, _) => break,
            (ttype::I32, field::NULL) => Value::Null(NullType::from(reader.read_i32()?)),
            (ttype::BOOL, field::BOOL) => Value::Bool(reader.read_bool()?),
            (ttype::I64, field::INT) => Value::Int(reader.read_i64()?),
            (ttype::DOUBLE, field::FLOAT) => Value::Float(reader.read_f64()?),
            (ttype::STRING, field::STRING) => Value::String(reader.read_binary()?),
            (ttype::STRUCT, field::DATE) => decode_date(reader)?,
            (ttype::STRUCT, field::TIME) => decode_time(reader)?,
            (ttype::STRUCT, field::DATETIME) => decode_datetime(reader)?,
            (ttype::STRUCT, field::LIST) => Value::List(decode_value_list(reader, depth + 1)?),
            (ttype::STRUCT, field::SET) => Value::Set(decode_value_list(reader, depth + 1)?),
            (ttype::STRUCT, field::MAP) => Value::Map(decode_value_map(reader, depth + 1)?),
            (ttype::STRUCT, field::DATASET) => Value::DataSet(decode_dataset(reader, depth + 1)?),
            (ttype::STRUCT, field::DURATION) => decode_duration(reader)?,
            (ttype::STRUCT, field::VERTEX | field::EDGE | field::PATH | field::GEOGRAPHY) => {
                Value::Opaque {
                    field_id: id,
                    raw: reader.skip_raw(ttype::STRUCT)?,
                }
            }
            (t, _) => {
                reader.skip(t)?;
                continue;
            }
        };
    }
    Ok(value)
}

fn decode_date(reader: &mut Reader) -> io::Result<Value> {
    let (mut year, mut month, mut day) = (0, 0, 0);
    loop {
        match reader.read_field_begin()? {
            (ttype::STOP, _) => break,
            (ttype::I16, 1) => year = reader.read_i16()?,
            (ttype::BYTE, 2) => month = reader.read_i8()?,
            (ttype::BYTE, 3) => day = reader.read_i8()?,
            (t, _) => reader.skip(t)?,
        }
    }
    Ok(Value::Date { year, month, day })
}

fn decode_time(reader: &mut Reader) -> io::Result<Value> {
    let (mut hour, mut minute, mut sec, mut microsec) = (0, 0, 0, 0);
    loop {
        match reader.read_field_begin()? {
            (ttype::STOP, _) => break,
            (ttype::BYTE, 1) => hour = reader.read_i8()?,
            (ttype::BYTE, 2) => minute = reader.read_i8()?,
            (ttype::BYTE, 3) => sec = reader.read_i8()?,
            (ttype::I32, 4) => microsec = reader.read_i32()?,
            (t, _) => reader.skip(t)?,
        }
    }
    Ok(Value::Time {
        hour,
        minute,
        sec,
        microsec,
    })
}

fn decode_datetime(reader: &mut Reader) -> io::Result<Value> {
    let mut year = 0;
    let mut parts = [0i8; 5];
    let mut microsec = 0;
    loop {
        match reader.read_field_begin()? {
            (ttype::STOP, _) => break,
            (ttype::I16, 1) => year = reader.read_i16()?,
            (ttype::BYTE, id @ 2..=6) => parts[(id - 2) as usize] = reader.read_i8()?,
            (ttype::I32, 7) => microsec = reader.read_i32()?,
            (t, _) => reader.skip(t)?,
        }
    }
    let [month, day, hour, minute, sec] = parts;
    Ok(Value::DateTime {
        year,
        month,
        day,
        hour,
        minute,
        sec,
        microsec,
    })
}

fn decode_duration(reader: &mut Reader) -> io::Result<Value> {
    let (mut seconds, mut microseconds, mut months) = (0, 0, 0);
    loop {
        match reader.read_field_begin()? {
            (ttype::STOP, _) => break,
            (ttype::I64, 1) => seconds = reader.read_i64()?,
            (ttype::I32, 2) => microseconds = reader.read_i32()?,
            (ttype::I32, 3) => months = reader.read_i32()?,
            (t, _) => reader.skip(t)?,
        }
    }
    Ok(Value::Duration {
        seconds,
        microseconds,
        months,
    })
}

// NList / NSet / Row: struct with the element list in field 1
fn decode_value_list(reader: &mut Reader, depth: usize) -> io::Result<Vec<Value>> {
    check_depth(depth)?;
    let mut values = Vec::new();
    loop {
        match reader.read_field_begin()? {
            (ttype::STOP, _) => break,
            (ttype::LIST | ttype::SET, 1) => {
                let (elem, size) = reader.read_list_begin()?;
                expect_elem(elem, ttype::STRUCT, size, "value list")?;
                values.reserve(size);
                for _ in 0..size {
                    values.push(decode_value_nested(reader, depth + 1)?);
                }
            }
            (t, _) => reader.skip(t)?,
        }
    }
    Ok(values)
}

fn decode_value_map(reader: &mut Reader, depth: usize) -> io::Result<BTreeMap<String, Value>> {
    check_depth(depth)?;
    let mut kvs = BTreeMap::new();
    loop {
        match reader.read_field_begin()? {
            (ttype::STOP, _) => break,
            (ttype::MAP, 1) => {
                let (k, v, size) = reader.read_map_begin()?;
                expect_elem(k, ttype::STRING, size, "value map key")?;
                expect_elem(v, ttype::STRUCT, size, "value map value")?;
                for _ in 0..size {
                    let key = reader.read_string()?;
                    let value = decode_value_nested(reader, depth + 1)?;
                    kvs.insert(key, value);
                }
            }
            (t, _) => reader.skip(t)?,
        }
    }
    Ok(kvs)
}

fn decode_dataset(reader: &mut Reader, depth: usize) -> io::Result<DataSet> {
    check_depth(depth)?;
    let mut data = DataSet::default();
    loop {
        match reader.read_field_begin()? {
            (ttype::STOP, _) => break,
            (ttype::LIST, 1) => {
                let (elem, size) = reader.read_list_begin()?;
                expect_elem(elem, ttype::STRING, size, "column names")?;
                data.column_names.reserve(size);
                for _ in 0..size {
                    data.column_names.push(reader.read_binary()?);
                }
            }
            (ttype::LIST, 2) => {
                let (elem, size) = reader.read_list_begin()?;
                expect_elem(elem, ttype::STRUCT, size, "rows")?;
                data.rows.reserve(size);
                for _ in 0..size {
                    let values = decode_value_list(reader, depth + 1)?;
                    data.rows.push(Row { values });
                }
            }
            (t, _) => reader.skip(t)?,
        }
    }
    Ok(data)
}
