//! Nebula Graph protocol constants

/// Strict binary protocol version word (high 16 bits of the message header)
pub const VERSION_1: u32 = 0x8001_0000;

/// Mask selecting the version bits of the message header
pub const VERSION_MASK: u32 = 0xffff_0000;

/// Mask selecting the message type bits of the message header
pub const TYPE_MASK: u32 = 0x0000_00ff;

/// Size of the read and write buffers wrapped around the socket (128 KiB)
pub const BUFFER_SIZE: usize = 128 << 10;

/// Maximum frame or message length (1 GiB)
///
/// Length fields above this are rejected before any allocation.
pub const MAX_MESSAGE_LENGTH: usize = 1_073_741_824;

/// Maximum nesting depth accepted when decoding containers and structs
pub const MAX_NESTING_DEPTH: usize = 64;

/// Default graph service port
pub const DEFAULT_PORT: u16 = 9669;

/// Content type sent on every HTTP/2 request
pub const THRIFT_CONTENT_TYPE: &str = "application/x-thrift";

/// Session id used by health probes
pub const PING_SESSION_ID: i64 = 0;

/// Statement used by health probes
pub const PING_STATEMENT: &str = "YIELD 1";

/// Message types
pub mod message_type {
    /// Request expecting a reply
    pub const CALL: u8 = 1;

    /// Successful reply
    pub const REPLY: u8 = 2;

    /// Application exception
    pub const EXCEPTION: u8 = 3;

    /// Request without a reply
    pub const ONEWAY: u8 = 4;
}

/// Thrift field type ids
pub mod ttype {
    /// End of struct
    pub const STOP: u8 = 0;
    /// No value
    pub const VOID: u8 = 1;
    /// Boolean
    pub const BOOL: u8 = 2;
    /// Signed byte
    pub const BYTE: u8 = 3;
    /// 64-bit float
    pub const DOUBLE: u8 = 4;
    /// 16-bit integer
    pub const I16: u8 = 6;
    /// 32-bit integer
    pub const I32: u8 = 8;
    /// 64-bit integer
    pub const I64: u8 = 10;
    /// Binary / string
    pub const STRING: u8 = 11;
    /// Struct or union
    pub const STRUCT: u8 = 12;
    /// Map
    pub const MAP: u8 = 13;
    /// Set
    pub const SET: u8 = 14;
    /// List
    pub const LIST: u8 = 15;
    /// 32-bit float (fbthrift extension)
    pub const FLOAT: u8 = 19;
}

/// Graph service method names
pub mod method {
    /// Client version verification
    pub const VERIFY_CLIENT_VERSION: &str = "verifyClientVersion";
    /// Session authentication
    pub const AUTHENTICATE: &str = "authenticate";
    /// Session release
    pub const SIGNOUT: &str = "signout";
    /// Statement execution with parameters
    pub const EXECUTE_WITH_PARAMETER: &str = "executeWithParameter";
    /// Statement execution with parameters and a server-side time bound
    pub const EXECUTE_WITH_TIMEOUT: &str = "executeWithTimeout";
    /// Statement execution returning a JSON document
    pub const EXECUTE_JSON_WITH_PARAMETER: &str = "executeJsonWithParameter";
}

/// THeader framing
pub mod header {
    /// Magic identifying a header frame
    pub const MAGIC: u16 = 0x0FFF;

    /// Binary protocol id carried in the header
    pub const PROTOCOL_BINARY: u32 = 0;

    /// Compact protocol id carried in the header
    pub const PROTOCOL_COMPACT: u32 = 2;

    /// Key/value info header block
    pub const INFO_KEYVALUE: u32 = 1;

    /// Bytes between the length field and the variable header
    /// (magic, flags, sequence id, header size)
    pub const FIXED_SIZE: usize = 10;
}
