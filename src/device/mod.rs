//! Server-side device runtime.
//!
//! A device publishes a C++-style declaration of its operations. The
//! declaration goes through the same parser and pack planner the code
//! generator uses, so the runtime decodes exactly the bytes generated
//! servers expect.

pub mod control;
pub mod dispatch;
pub mod manager;
pub mod registers;

use crate::devgen::OperationDescriptor;
use crate::error::{Error, Result};
use crate::protocol::codec::{Elements, Scalar, WireScalar};

pub use control::{ControlContext, VERSION};
pub use dispatch::{decode_arguments, encode_reply, CommandStream};
pub use manager::{DeviceManager, RegisteredDevice};
pub use registers::Registers;

/// A decoded argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Array(Elements),
    Vector(Elements),
    /// Buffer received through a write_array handshake
    Buffer(Elements),
}

/// Decoded arguments of one call, by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    entries: Vec<(String, Value)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.entries.push((name.into(), value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn get<T: WireScalar>(&self, name: &str) -> Result<T> {
        match self.value(name) {
            Some(Value::Scalar(s)) => T::from_scalar(*s).ok_or_else(|| Error::ArgumentType {
                operation: name.to_string(),
                index: self.index(name),
                expected: T::TYPE.to_string(),
                found: s.ty().to_string(),
            }),
            Some(_) => Err(Error::ArgumentType {
                operation: name.to_string(),
                index: self.index(name),
                expected: T::TYPE.to_string(),
                found: "buffer".to_string(),
            }),
            None => Err(Error::MissingArgument(name.to_string())),
        }
    }

    /// Elements of an array, vector or buffer argument.
    pub fn elements(&self, name: &str) -> Result<&Elements> {
        match self.value(name) {
            Some(Value::Array(e)) | Some(Value::Vector(e)) | Some(Value::Buffer(e)) => Ok(e),
            Some(Value::Scalar(s)) => Err(Error::ArgumentType {
                operation: name.to_string(),
                index: self.index(name),
                expected: "elements".to_string(),
                found: s.ty().to_string(),
            }),
            None => Err(Error::MissingArgument(name.to_string())),
        }
    }

    pub fn to_vec<T: WireScalar>(&self, name: &str) -> Result<Vec<T>> {
        let elements = self.elements(name)?;
        elements.to_vec().ok_or_else(|| Error::DtypeMismatch {
            operation: name.to_string(),
            expected: T::TYPE.dtype().to_string(),
            received: elements.ty().dtype().to_string(),
        })
    }

    fn index(&self, name: &str) -> usize {
        self.entries
            .iter()
            .position(|(n, _)| n == name)
            .unwrap_or(self.entries.len())
    }
}

/// Result of an operation, checked against the declared return type
/// before anything is sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    None,
    Scalar(Scalar),
    Str(String),
    Elements(Elements),
    Tuple(Vec<Scalar>),
}

impl Reply {
    pub fn scalar<T: WireScalar>(value: T) -> Self {
        Reply::Scalar(value.into_scalar())
    }

    pub fn string(text: impl Into<String>) -> Self {
        Reply::Str(text.into())
    }

    pub fn elements<T: WireScalar>(values: &[T]) -> Self {
        Reply::Elements(Elements::from_slice(values))
    }

    pub fn tuple(values: Vec<Scalar>) -> Self {
        Reply::Tuple(values)
    }
}

/// A device served over the wire.
///
/// Operations are executed with the device lock held, one call at a
/// time across all sessions.
pub trait Device: Send {
    /// Class declaration, in the header syntax the generator reads.
    fn declaration(&self) -> &str;

    fn execute(&mut self, op: &OperationDescriptor, args: &Arguments) -> Result<Reply>;

    /// Health check reported by the control device.
    fn is_failed(&self) -> bool {
        false
    }

    /// Number of elements the device takes for a write_array buffer.
    /// Anything but `requested` aborts the call after the handshake.
    fn accept_buffer(&self, _op: &OperationDescriptor, _args: &Arguments, requested: usize) -> usize {
        requested
    }
}

/// Error for an operation name a device does not implement.
pub fn unimplemented_operation(device: &str, op: &OperationDescriptor) -> Error {
    Error::Device {
        device: device.to_string(),
        operation: op.name.clone(),
        reason: "operation declared but not implemented".to_string(),
    }
}
