//! Protocol message encoding (thrift binary protocol)

use super::constants::{message_type, ttype, VERSION_1};
use super::message::{
    ApplicationErrorKind, AuthResponse, ExecutionResponse, GraphRequest, ServerReply,
    VerifyClientVersionReq, VerifyClientVersionResp,
};
use super::value::{field, DataSet, ParameterMap, Value};
use bytes::{BufMut, BytesMut};
use std::io;

/// Encode a graph service call into a thrift binary message
pub fn encode_call(request: &GraphRequest<'_>, seq_id: i32) -> io::Result<BytesMut> {
    let mut buf = BytesMut::new();

    let msg_type = if request.is_oneway() {
        message_type::ONEWAY
    } else {
        message_type::CALL
    };
    write_message_begin(&mut buf, request.method(), msg_type, seq_id)?;

    match request {
        GraphRequest::VerifyClientVersion(req) => {
            write_field_begin(&mut buf, ttype::STRUCT, 1);
            encode_verify_client_version_req(&mut buf, req)?;
        }
        GraphRequest::Authenticate { username, password } => {
            write_field_begin(&mut buf, ttype::STRING, 1);
            write_binary(&mut buf, username)?;
            write_field_begin(&mut buf, ttype::STRING, 2);
            write_binary(&mut buf, password)?;
        }
        GraphRequest::Signout { session_id } => {
            write_field_begin(&mut buf, ttype::I64, 1);
            buf.put_i64(*session_id);
        }
        GraphRequest::ExecuteWithParameter {
            session_id,
            stmt,
            params,
        }
        | GraphRequest::ExecuteJsonWithParameter {
            session_id,
            stmt,
            params,
        } => {
            encode_execute_args(&mut buf, *session_id, stmt, params)?;
        }
        GraphRequest::ExecuteWithTimeout {
            session_id,
            stmt,
            params,
            timeout_ms,
        } => {
            encode_execute_args(&mut buf, *session_id, stmt, params)?;
            write_field_begin(&mut buf, ttype::I64, 4);
            buf.put_i64(*timeout_ms);
        }
    }

    write_field_stop(&mut buf);
    Ok(buf)
}

/// Encode a server reply
///
/// The client never sends these; they are used by test servers and tooling
/// that stand in for the graph service.
pub fn encode_reply(method: &str, seq_id: i32, reply: &ServerReply<'_>) -> io::Result<BytesMut> {
    let mut buf = BytesMut::new();
    write_message_begin(&mut buf, method, message_type::REPLY, seq_id)?;

    // Result struct: field 0 carries the declared return value
    match reply {
        ServerReply::VerifyClientVersion(resp) => {
            write_field_begin(&mut buf, ttype::STRUCT, 0);
            encode_verify_client_version_resp(&mut buf, resp)?;
        }
        ServerReply::Authenticate(resp) => {
            write_field_begin(&mut buf, ttype::STRUCT, 0);
            encode_auth_response(&mut buf, resp)?;
        }
        ServerReply::Execution(resp) => {
            write_field_begin(&mut buf, ttype::STRUCT, 0);
            encode_execution_response(&mut buf, resp)?;
        }
        ServerReply::Json(payload) => {
            write_field_begin(&mut buf, ttype::STRING, 0);
            write_binary(&mut buf, payload)?;
        }
    }

    write_field_stop(&mut buf);
    Ok(buf)
}

/// Encode a thrift application exception reply
pub fn encode_exception(
    method: &str,
    seq_id: i32,
    kind: ApplicationErrorKind,
    message: &str,
) -> io::Result<BytesMut> {
    let mut buf = BytesMut::new();
    write_message_begin(&mut buf, method, message_type::EXCEPTION, seq_id)?;
    write_field_begin(&mut buf, ttype::STRING, 1);
    write_binary(&mut buf, message.as_bytes())?;
    write_field_begin(&mut buf, ttype::I32, 2);
    buf.put_i32(application_error_id(kind));
    write_field_stop(&mut buf);
    Ok(buf)
}

fn application_error_id(kind: ApplicationErrorKind) -> i32 {
    match kind {
        ApplicationErrorKind::Unknown => 0,
        ApplicationErrorKind::UnknownMethod => 1,
        ApplicationErrorKind::InvalidMessageType => 2,
        ApplicationErrorKind::WrongMethodName => 3,
        ApplicationErrorKind::BadSequenceId => 4,
        ApplicationErrorKind::MissingResult => 5,
        ApplicationErrorKind::InternalError => 6,
        ApplicationErrorKind::ProtocolError => 7,
        ApplicationErrorKind::Other(id) => id,
    }
}

/// Write a strict message header
pub fn write_message_begin(
    buf: &mut BytesMut,
    name: &str,
    msg_type: u8,
    seq_id: i32,
) -> io::Result<()> {
    buf.put_u32(VERSION_1 | u32::from(msg_type));
    write_binary(buf, name.as_bytes())?;
    buf.put_i32(seq_id);
    Ok(())
}

/// Write a field header
pub fn write_field_begin(buf: &mut BytesMut, field_type: u8, id: i16) {
    buf.put_u8(field_type);
    buf.put_i16(id);
}

/// Terminate a struct
pub fn write_field_stop(buf: &mut BytesMut) {
    buf.put_u8(ttype::STOP);
}

/// Write a length-prefixed byte string
pub fn write_binary(buf: &mut BytesMut, data: &[u8]) -> io::Result<()> {
    buf.put_i32(checked_len(data.len())?);
    buf.put_slice(data);
    Ok(())
}

/// Write a list or set header
pub fn write_list_begin(buf: &mut BytesMut, elem_type: u8, size: usize) -> io::Result<()> {
    buf.put_u8(elem_type);
    buf.put_i32(checked_len(size)?);
    Ok(())
}

/// Write a map header
pub fn write_map_begin(
    buf: &mut BytesMut,
    key_type: u8,
    value_type: u8,
    size: usize,
) -> io::Result<()> {
    buf.put_u8(key_type);
    buf.put_u8(value_type);
    buf.put_i32(checked_len(size)?);
    Ok(())
}

fn checked_len(len: usize) -> io::Result<i32> {
    i32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("length {} does not fit the wire format", len),
        )
    })
}

fn encode_execute_args(
    buf: &mut BytesMut,
    session_id: i64,
    stmt: &[u8],
    params: &ParameterMap,
) -> io::Result<()> {
    write_field_begin(buf, ttype::I64, 1);
    buf.put_i64(session_id);

    write_field_begin(buf, ttype::STRING, 2);
    write_binary(buf, stmt)?;

    write_field_begin(buf, ttype::MAP, 3);
    write_map_begin(buf, ttype::STRING, ttype::STRUCT, params.len())?;
    for (name, value) in params {
        write_binary(buf, name.as_bytes())?;
        encode_value(buf, value)?;
    }
    Ok(())
}

fn encode_verify_client_version_req(
    buf: &mut BytesMut,
    req: &VerifyClientVersionReq,
) -> io::Result<()> {
    write_field_begin(buf, ttype::STRING, 1);
    write_binary(buf, &req.version)?;
    write_field_stop(buf);
    Ok(())
}

fn encode_verify_client_version_resp(
    buf: &mut BytesMut,
    resp: &VerifyClientVersionResp,
) -> io::Result<()> {
    write_field_begin(buf, ttype::I32, 1);
    buf.put_i32(resp.error_code.0);
    if let Some(msg) = &resp.error_msg {
        write_field_begin(buf, ttype::STRING, 2);
        write_binary(buf, msg)?;
    }
    write_field_stop(buf);
    Ok(())
}

fn encode_auth_response(buf: &mut BytesMut, resp: &AuthResponse) -> io::Result<()> {
    write_field_begin(buf, ttype::I32, 1);
    buf.put_i32(resp.error_code.0);
    if let Some(msg) = &resp.error_msg {
        write_field_begin(buf, ttype::STRING, 2);
        write_binary(buf, msg)?;
    }
    if let Some(session_id) = resp.session_id {
        write_field_begin(buf, ttype::I64, 3);
        buf.put_i64(session_id);
    }
    if let Some(offset) = resp.time_zone_offset_seconds {
        write_field_begin(buf, ttype::I32, 4);
        buf.put_i32(offset);
    }
    if let Some(name) = &resp.time_zone_name {
        write_field_begin(buf, ttype::STRING, 5);
        write_binary(buf, name)?;
    }
    write_field_stop(buf);
    Ok(())
}

fn encode_execution_response(buf: &mut BytesMut, resp: &ExecutionResponse) -> io::Result<()> {
    write_field_begin(buf, ttype::I32, 1);
    buf.put_i32(resp.error_code.0);
    write_field_begin(buf, ttype::I64, 2);
    buf.put_i64(resp.latency_in_us);
    if let Some(data) = &resp.data {
        write_field_begin(buf, ttype::STRUCT, 3);
        encode_dataset(buf, data)?;
    }
    let optional_strings = [
        (4, &resp.space_name),
        (5, &resp.error_msg),
        (7, &resp.comment),
    ];
    for (id, value) in optional_strings {
        if let Some(value) = value {
            write_field_begin(buf, ttype::STRING, id);
            write_binary(buf, value)?;
        }
    }
    if let Some(plan) = &resp.plan_desc {
        write_field_begin(buf, ttype::STRUCT, 6);
        buf.put_slice(plan);
    }
    write_field_stop(buf);
    Ok(())
}

/// Encode a value as a thrift union
pub fn encode_value(buf: &mut BytesMut, value: &Value) -> io::Result<()> {
    match value {
        Value::Empty => {}
        Value::Null(null) => {
            write_field_begin(buf, ttype::I32, field::NULL);
            buf.put_i32(i32::from(*null));
        }
        Value::Bool(v) => {
            write_field_begin(buf, ttype::BOOL, field::BOOL);
            buf.put_u8(u8::from(*v));
        }
        Value::Int(v) => {
            write_field_begin(buf, ttype::I64, field::INT);
            buf.put_i64(*v);
        }
        Value::Float(v) => {
            write_field_begin(buf, ttype::DOUBLE, field::FLOAT);
            buf.put_f64(*v);
        }
        Value::String(v) => {
            write_field_begin(buf, ttype::STRING, field::STRING);
            write_binary(buf, v)?;
        }
        Value::Date { year, month, day } => {
            write_field_begin(buf, ttype::STRUCT, field::DATE);
            write_field_begin(buf, ttype::I16, 1);
            buf.put_i16(*year);
            write_field_begin(buf, ttype::BYTE, 2);
            buf.put_i8(*month);
            write_field_begin(buf, ttype::BYTE, 3);
            buf.put_i8(*day);
            write_field_stop(buf);
        }
        Value::Time {
            hour,
            minute,
            sec,
            microsec,
        } => {
            write_field_begin(buf, ttype::STRUCT, field::TIME);
            write_field_begin(buf, ttype::BYTE, 1);
            buf.put_i8(*hour);
            write_field_begin(buf, ttype::BYTE, 2);
            buf.put_i8(*minute);
            write_field_begin(buf, ttype::BYTE, 3);
            buf.put_i8(*sec);
            write_field_begin(buf, ttype::I32, 4);
            buf.put_i32(*microsec);
            write_field_stop(buf);
        }
        Value::DateTime {
            year,
            month,
            day,
            hour,
            minute,
            sec,
            microsec,
        } => {
            write_field_begin(buf, ttype::STRUCT, field::DATETIME);
            write_field_begin(buf, ttype::I16, 1);
            buf.put_i16(*year);
            for (id, v) in [(2, month), (3, day), (4, hour), (5, minute), (6, sec)] {
                write_field_begin(buf, ttype::BYTE, id);
                buf.put_i8(*v);
            }
            write_field_begin(buf, ttype::I32, 7);
            buf.put_i32(*microsec);
            write_field_stop(buf);
        }
        Value::List(values) => {
            write_field_begin(buf, ttype::STRUCT, field::LIST);
            encode_value_list(buf, ttype::LIST, values)?;
        }
        Value::Set(values) => {
            write_field_begin(buf, ttype::STRUCT, field::SET);
            encode_value_list(buf, ttype::SET, values)?;
        }
        Value::Map(kvs) => {
            write_field_begin(buf, ttype::STRUCT, field::MAP);
            write_field_begin(buf, ttype::MAP, 1);
            write_map_begin(buf, ttype::STRING, ttype::STRUCT, kvs.len())?;
            for (k, v) in kvs {
                write_binary(buf, k.as_bytes())?;
                encode_value(buf, v)?;
            }
            write_field_stop(buf);
        }
        Value::DataSet(data) => {
            write_field_begin(buf, ttype::STRUCT, field::DATASET);
            encode_dataset(buf, data)?;
        }
        Value::Duration {
            seconds,
            microseconds,
            months,
        } => {
            write_field_begin(buf, ttype::STRUCT, field::DURATION);
            write_field_begin(buf, ttype::I64, 1);
            buf.put_i64(*seconds);
            write_field_begin(buf, ttype::I32, 2);
            buf.put_i32(*microseconds);
            write_field_begin(buf, ttype::I32, 3);
            buf.put_i32(*months);
            write_field_stop(buf);
        }
        Value::Opaque { field_id, raw } => {
            // raw already holds the struct body including its stop byte
            write_field_begin(buf, ttype::STRUCT, *field_id);
            buf.put_slice(raw);
        }
    }
    write_field_stop(buf);
    Ok(())
}

// NList / NSet: a struct whose field 1 is the element list
fn encode_value_list(buf: &mut BytesMut, container: u8, values: &[Value]) -> io::Result<()> {
    write_field_begin(buf, container, 1);
    write_list_begin(buf, ttype::STRUCT, values.len())?;
    for v in values {
        encode_value(buf, v)?;
    }
    write_field_stop(buf);
    Ok(())
}

/// Encode a data set struct
pub fn encode_dataset(buf: &mut BytesMut, data: &DataSet) -> io::Result<()> {
    write_field_begin(buf, ttype::LIST, 1);
    write_list_begin(buf, ttype::STRING, data.column_names.len())?;
    for name in &data.column_names {
        write_binary(buf, name)?;
    }

    write_field_begin(buf, ttype::LIST, 2);
    write_list_begin(buf, ttype::STRUCT, data.rows.len())?;
    for row in &data.rows {
        encode_value_list(buf, ttype::LIST, &row.values)?;
    }

    write_field_stop(buf);
    Ok(())
}
