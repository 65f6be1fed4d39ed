//! Nebula Graph wire protocol
//!
//! This module handles:
//! * Thrift binary protocol encoding and decoding of graph service calls
//! * The graph value union used for query parameters and result sets
//! * THeader framing for the socket transport

pub mod constants;
pub mod decode;
pub mod encode;
pub mod header;
pub mod message;
pub mod value;

pub use decode::{decode_reply, Reader};
pub use encode::{encode_call, encode_exception, encode_reply};
pub use header::{decode_frame, encode_frame, Frame};
pub use message::{
    ApplicationErrorKind, AuthResponse, ErrorCode, ExecutionResponse, GraphRequest, Reply,
    ServerReply, VerifyClientVersionReq, VerifyClientVersionResp,
};
pub use value::{DataSet, NullType, ParameterMap, Row, Value};
