//! Runtime errors shared by the client, the server sessions and the codec.
//!
//! Every protocol failure has its own variant so callers (and tests) can
//! match on the exact kind instead of parsing a generic message.

use std::io;
use std::time::Duration;

/// Result alias for wire, client and server operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Send returned zero bytes or the peer closed mid-exchange
    #[error("socket connection broken")]
    ConnectionBroken,

    /// A previous connection-fatal error left the stream unusable
    #[error("connection unusable after a previous fatal error")]
    ConnectionUnusable,

    #[error("discovery table not received within {0:?} (after one retry)")]
    DiscoveryTimeout(Duration),

    #[error("malformed discovery table: {0}")]
    MalformedDiscovery(String),

    #[error("timed out after {timeout:?} waiting for {marker:?}")]
    Timeout { marker: String, timeout: Duration },

    #[error("device {0} unknown")]
    UnknownDevice(String),

    #[error("operation {operation} unknown for device {device}")]
    UnknownOperation { device: String, operation: String },

    #[error("no operation {operation_id} on device {device_id}")]
    UnknownCommand { device_id: u16, operation_id: u16 },

    #[error("invalid handshake: server ready for {acknowledged} elements, client buffer holds {expected}")]
    InvalidHandshake { acknowledged: u32, expected: usize },

    #[error("[{device} - {operation}] invalid payload size: expected {expected} bytes, received {received} bytes")]
    InvalidPayloadSize {
        device: String,
        operation: String,
        expected: usize,
        received: usize,
    },

    #[error("[{device} - {operation}] failed to load buffer of {size} bytes")]
    BufferReload {
        device: String,
        operation: String,
        size: usize,
    },

    #[error("[{device} - {operation}] failed to receive vector")]
    VectorReceive { device: String, operation: String },

    #[error("[{device} - {operation}] failed to extract array")]
    ArrayExtract { device: String, operation: String },

    #[error("type error in {operation}: expected bool, received {value}")]
    InvalidBool { operation: String, value: u32 },

    #[error("length mismatch in {operation}: expected {expected} elements, received {received}")]
    LengthMismatch {
        operation: String,
        expected: usize,
        received: usize,
    },

    #[error("dtype mismatch in {operation}: expected {expected}, received {received}")]
    DtypeMismatch {
        operation: String,
        expected: String,
        received: String,
    },

    #[error("type error in {operation}: call site expects {expected}, server declares {declared}")]
    ReturnType {
        operation: String,
        expected: String,
        declared: String,
    },

    #[error("argument {index} of {operation}: expected {expected}, found {found}")]
    ArgumentType {
        operation: String,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("reserved envelope field must be zero, found {0:#010x}")]
    ReservedField(u32),

    #[error("payload of {0} bytes exceeds the command buffer")]
    PayloadTooLarge(usize),

    #[error("invalid format character {0:?}")]
    InvalidFormat(char),

    #[error("type {0:?} has no wire encoding")]
    UnsupportedType(String),

    #[error("received string is not valid utf-8")]
    InvalidUtf8,

    #[error("json decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("argument {0} missing from the decoded call")]
    MissingArgument(String),

    #[error("device declaration rejected: {0}")]
    Declaration(#[from] crate::devgen::GenError),

    #[error("[{device} - {operation}] {reason}")]
    Device {
        device: String,
        operation: String,
        reason: String,
    },
}

impl Error {
    /// Errors after which the byte stream can no longer be trusted.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::ConnectionBroken
                | Error::ConnectionUnusable
                | Error::InvalidHandshake { .. }
                | Error::DiscoveryTimeout(_)
                | Error::ReturnType { .. }
                | Error::Timeout { .. }
        )
    }
}
