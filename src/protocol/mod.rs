//! Protocol layer: the wire contract shared by client and server.
//!
//! - `codec`: scalar types, format tags, payload readers/writers
//! - `command`: the 12-byte command envelope
//! - `discovery`: the text catalogue of devices and operations
//! - `signature`: the JSON signature catalogue emitted by the generator

pub mod codec;
pub mod command;
pub mod discovery;
pub mod signature;

pub use codec::{ByteOrder, Elements, Format, PayloadReader, PayloadWriter, Scalar, ScalarType, WireScalar};
pub use command::{encode_command, Command, CommandHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use discovery::{device_tag, DeviceEntry, DiscoveryTable, END_OF_CATALOGUE, END_OF_CATALOGUE_LINE};
pub use signature::{ArgSignature, Catalogue, DeviceSignature, FunctionSignature, ReturnShape};

/// Device id of the built-in control device.
pub const CONTROL_DEVICE_ID: u16 = 1;

/// First id handed to generated devices.
pub const FIRST_DEVICE_ID: u16 = 2;

/// Operation ids of the control device, fixed across builds.
pub mod control_ops {
    pub const GET_VERSION: u16 = 0;
    pub const GET_DISCOVERY_TABLE: u16 = 1;
    pub const GET_STATS: u16 = 2;
    pub const GET_DEV_STATUS: u16 = 3;
    pub const GET_RUNNING_SESSIONS: u16 = 4;
    pub const SUBSCRIBE_BROADCAST: u16 = 5;
    pub const BROADCAST_PING: u16 = 6;
}

/// Broadcast channel carrying server events.
pub const SERVER_CHANNEL: u32 = 0;

/// Event id sent by `broadcast_ping`.
pub const PING_EVENT: u32 = 0;
