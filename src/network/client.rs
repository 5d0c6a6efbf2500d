//! Client runtime.
//!
//! One socket, one outstanding call. Connecting fetches the discovery
//! table; calls resolve device and operation ids from it before any byte
//! is sent. Replies are decoded by the call site, optionally checked
//! against the signature catalogue written by the generator.
//!
//! ```no_run
//! use devlink::network::Client;
//!
//! let mut client = Client::connect("127.0.0.1:36000")?;
//! let sum: u32 = client.call("Math", "add")?.arg(1u32).arg(1u32).send()?.recv()?;
//! assert_eq!(sum, 2);
//! # Ok::<(), devlink::Error>(())
//! ```

use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;

use super::connection::{Connection, Stream};
use crate::error::{Error, Result};
use crate::protocol::codec::{Elements, Format, PayloadWriter, Scalar, ScalarType, WireScalar};
use crate::protocol::{
    control_ops, encode_command, Catalogue, DiscoveryTable, FunctionSignature, ReturnShape,
    CONTROL_DEVICE_ID, END_OF_CATALOGUE_LINE,
};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Wait for the end-of-catalogue marker, per attempt
    pub discovery_timeout: Duration,
    /// Pause before the single discovery retry
    pub retry_backoff: Duration,
    /// Wait for a string terminator
    pub string_timeout: Duration,
    /// Wait for the server's handshake count
    pub handshake_timeout: Duration,
    pub recv_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            discovery_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(100),
            string_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            recv_buffer_size: 16384,
        }
    }
}

pub struct Client {
    conn: Connection,
    config: ClientConfig,
    table: DiscoveryTable,
    catalogue: Option<Catalogue>,
    usable: bool,
}

impl Client {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Self::connect_with(addr, ClientConfig::default())
    }

    pub fn connect_with<A: ToSocketAddrs>(addr: A, config: ClientConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Self::start(Stream::Tcp(stream), config)
    }

    #[cfg(unix)]
    pub fn connect_unix<P: AsRef<Path>>(path: P, config: ClientConfig) -> Result<Self> {
        let stream = UnixStream::connect(path)?;
        Self::start(Stream::Unix(stream), config)
    }

    fn start(stream: Stream, config: ClientConfig) -> Result<Self> {
        stream.set_recv_buffer_size(config.recv_buffer_size);
        let mut client = Self {
            conn: Connection::new(stream)?,
            config,
            table: DiscoveryTable::default(),
            catalogue: None,
            usable: true,
        };
        client.table = client.fetch_discovery()?;
        log::debug!("discovered {} devices", client.table.devices().len());
        Ok(client)
    }

    fn fetch_discovery(&mut self) -> Result<DiscoveryTable> {
        let request = encode_command(CONTROL_DEVICE_ID, control_ops::GET_DISCOVERY_TABLE, &[])?;
        self.conn.send_all(&request)?;

        let timeout = self.config.discovery_timeout;
        let text = match self.conn.recv_until(END_OF_CATALOGUE_LINE.as_bytes(), timeout) {
            Ok(text) => text,
            Err(Error::Timeout { .. }) => {
                log::warn!("no discovery table after {:?}, retrying", timeout);
                thread::sleep(self.config.retry_backoff);
                // A partial reply means the first request got through
                if self.conn.buffered() == 0 {
                    self.conn.send_all(&request)?;
                }
                match self.conn.recv_until(END_OF_CATALOGUE_LINE.as_bytes(), timeout) {
                    Ok(text) => text,
                    Err(Error::Timeout { .. }) => return Err(Error::DiscoveryTimeout(timeout)),
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };
        // String terminator
        self.conn.recv_until(b"\0", self.config.string_timeout)?;

        let mut text = String::from_utf8(text).map_err(|_| Error::InvalidUtf8)?;
        text.push_str(END_OF_CATALOGUE_LINE);
        DiscoveryTable::parse(&text)
    }

    pub fn discovery(&self) -> &DiscoveryTable {
        &self.table
    }

    /// Check replies against the generator's signature catalogue.
    pub fn load_signatures(&mut self, catalogue: Catalogue) {
        self.catalogue = Some(catalogue);
    }

    pub fn is_usable(&self) -> bool {
        self.usable
    }

    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_connection_fatal() && self.usable {
                log::error!("connection unusable: {}", e);
                self.usable = false;
            }
        }
        result
    }

    /// Start a call. Fails before sending anything if the device or the
    /// operation is not in the discovery table.
    pub fn call(&mut self, device: &str, operation: &str) -> Result<Call<'_>> {
        if !self.usable {
            return Err(Error::ConnectionUnusable);
        }
        let entry = self
            .table
            .device(device)
            .ok_or_else(|| Error::UnknownDevice(device.to_string()))?;
        let op_id = entry
            .get_op_ref(&operation.to_ascii_uppercase())
            .ok_or_else(|| Error::UnknownOperation {
                device: device.to_string(),
                operation: operation.to_string(),
            })?;
        let device_id = entry.id;
        let signature = self
            .catalogue
            .as_ref()
            .and_then(|c| c.find(device, operation))
            .cloned();

        Ok(Call {
            client: self,
            device_id,
            op_id,
            operation: operation.to_string(),
            signature,
            envelope: PayloadWriter::new(),
            steps: Vec::new(),
            pending: PayloadWriter::new(),
            streaming: false,
            buffer: None,
        })
    }

    pub fn get_version(&mut self) -> Result<String> {
        self.call("CONTROL", "GET_VERSION")?.send()?.recv_string()
    }

    pub fn get_discovery_table(&mut self) -> Result<DiscoveryTable> {
        let text = self.call("CONTROL", "GET_DISCOVERY_TABLE")?.send()?.recv_string()?;
        let table = DiscoveryTable::parse(&text);
        self.check(table)
    }

    pub fn get_stats(&mut self) -> Result<String> {
        self.call("CONTROL", "GET_STATS")?.send()?.recv_string()
    }

    pub fn get_dev_status(&mut self) -> Result<String> {
        self.call("CONTROL", "GET_DEV_STATUS")?.send()?.recv_string()
    }

    pub fn get_running_sessions(&mut self) -> Result<String> {
        self.call("CONTROL", "GET_RUNNING_SESSIONS")?.send()?.recv_string()
    }

    pub fn subscribe_broadcast(&mut self, channel: u32) -> Result<()> {
        self.call("CONTROL", "SUBSCRIBE_BROADCAST")?.arg(channel).exec()
    }

    pub fn broadcast_ping(&mut self) -> Result<()> {
        self.call("CONTROL", "BROADCAST_PING")?.exec()
    }

    /// Next broadcast event as `(channel, event)`. Blocks.
    pub fn recv_broadcast(&mut self) -> Result<(u32, u32)> {
        if !self.usable {
            return Err(Error::ConnectionUnusable);
        }
        let format = Format::new(crate::protocol::ByteOrder::Big, vec![ScalarType::U32; 2]);
        let raw = self.conn.recv_exact(format.size());
        let raw = self.check(raw)?;
        match format.unpack(&raw)?.as_slice() {
            [Scalar::U32(channel), Scalar::U32(event)] => Ok((*channel, *event)),
            _ => Err(Error::InvalidFormat('I')),
        }
    }
}

enum Step {
    /// Plain bytes following the envelope
    Bytes(Vec<u8>),
    /// Wait for the server count, then send the elements
    Vector(Elements),
}

/// A call being built. Arguments are added in declaration order.
pub struct Call<'c> {
    client: &'c mut Client,
    device_id: u16,
    op_id: u16,
    operation: String,
    signature: Option<FunctionSignature>,
    envelope: PayloadWriter,
    steps: Vec<Step>,
    pending: PayloadWriter,
    streaming: bool,
    buffer: Option<Elements>,
}

impl<'c> Call<'c> {
    fn region(&mut self) -> &mut PayloadWriter {
        if self.streaming {
            &mut self.pending
        } else {
            &mut self.envelope
        }
    }

    pub fn arg<T: WireScalar>(mut self, value: T) -> Self {
        self.region().put(value);
        self
    }

    pub fn scalar(mut self, value: Scalar) -> Self {
        self.region().put_scalar(&value);
        self
    }

    /// `std::array` argument.
    pub fn array<T: WireScalar>(mut self, values: &[T]) -> Self {
        self.region().put_elements(&Elements::from_slice(values));
        self
    }

    /// `std::vector` argument: count now, elements after the server
    /// acknowledged them.
    pub fn vector<T: WireScalar>(mut self, values: &[T]) -> Self {
        self.region().put(values.len() as u64);
        if self.streaming {
            let bytes = std::mem::take(&mut self.pending).into_inner();
            self.steps.push(Step::Bytes(bytes));
        }
        self.steps.push(Step::Vector(Elements::from_slice(values)));
        self.streaming = true;
        self
    }

    /// `write_array` pointer argument. Its length goes out as the trailing
    /// `uint32_t` parameter; the elements follow the server handshake.
    pub fn buffer<T: WireScalar>(mut self, values: &[T]) -> Self {
        self.region().put(values.len() as u32);
        self.buffer = Some(Elements::from_slice(values));
        self
    }

    fn transfer(&mut self, elements: &Elements) -> Result<()> {
        let timeout = self.client.config.handshake_timeout;
        let raw = self.client.conn.recv_exact_within(4, timeout)?;
        let acknowledged = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if acknowledged as usize != elements.len() {
            return Err(Error::InvalidHandshake {
                acknowledged,
                expected: elements.len(),
            });
        }
        self.client.conn.send_all(elements.as_bytes())
    }

    fn transmit(&mut self) -> Result<()> {
        let command = encode_command(self.device_id, self.op_id, self.envelope.as_bytes())?;
        log::debug!(
            "call {} ({}:{}) payload {} bytes",
            self.operation,
            self.device_id,
            self.op_id,
            self.envelope.len()
        );
        self.client.conn.send_all(&command)?;

        for step in std::mem::take(&mut self.steps) {
            match step {
                Step::Bytes(bytes) => self.client.conn.send_all(&bytes)?,
                Step::Vector(elements) => self.transfer(&elements)?,
            }
        }
        if !self.pending.is_empty() {
            let bytes = std::mem::take(&mut self.pending).into_inner();
            self.client.conn.send_all(&bytes)?;
        }
        if let Some(elements) = self.buffer.take() {
            self.transfer(&elements)?;
        }
        Ok(())
    }

    /// Send the call; the reply is read through the returned `Response`.
    pub fn send(mut self) -> Result<Response<'c>> {
        let sent = self.transmit();
        self.client.check(sent)?;
        Ok(Response {
            client: self.client,
            operation: self.operation,
            signature: self.signature,
        })
    }

    /// Send an operation that replies nothing.
    pub fn exec(self) -> Result<()> {
        self.send()?.expect_shape(|shape| *shape == ReturnShape::Void, "void")
    }
}

/// Reply of one call, decoded by the call site.
pub struct Response<'c> {
    client: &'c mut Client,
    operation: String,
    signature: Option<FunctionSignature>,
}

impl<'c> Response<'c> {
    /// Declared reply shape, if a catalogue is loaded.
    pub fn declared(&self) -> Option<&ReturnShape> {
        self.signature.as_ref().map(|s| &s.returns)
    }

    fn expect_shape(&mut self, accepts: impl Fn(&ReturnShape) -> bool, expected: &str) -> Result<()> {
        let mismatch = match self.declared() {
            Some(shape) if !accepts(shape) => Some(shape.to_string()),
            _ => None,
        };
        match mismatch {
            Some(declared) => {
                let err = Err(Error::ReturnType {
                    operation: self.operation.clone(),
                    expected: expected.to_string(),
                    declared,
                });
                self.client.check(err)
            }
            None => Ok(()),
        }
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let bytes = self.client.conn.recv_exact(n);
        self.client.check(bytes)
    }

    fn read_count(&mut self) -> Result<usize> {
        let count = self.client.conn.recv_u32_be();
        Ok(self.client.check(count)? as usize)
    }

    fn dtype_mismatch(&self, expected: ScalarType, received: &str) -> Error {
        Error::DtypeMismatch {
            operation: self.operation.clone(),
            expected: expected.dtype().to_string(),
            received: received.to_string(),
        }
    }

    /// Declared element type when it differs from `T`.
    fn other_dtype<T: WireScalar>(&self) -> Option<ScalarType> {
        let dtype = match self.declared()? {
            ReturnShape::Array { dtype, .. }
            | ReturnShape::Vector { dtype }
            | ReturnShape::Buffer { dtype } => dtype,
            _ => return None,
        };
        ScalarType::from_dtype(dtype).filter(|ty| *ty != T::TYPE)
    }

    fn into_values<T: WireScalar>(&self, raw: Vec<u8>) -> Result<Vec<T>> {
        Elements::from_le_bytes(T::TYPE, raw)
            .and_then(|e| e.to_vec::<T>())
            .ok_or_else(|| self.dtype_mismatch(T::TYPE, T::TYPE.dtype()))
    }

    pub fn recv<T: WireScalar>(mut self) -> Result<T> {
        if T::TYPE == ScalarType::Bool {
            let value = self.recv_bool()?;
            return T::from_scalar(Scalar::Bool(value))
                .ok_or_else(|| Error::UnsupportedType(T::TYPE.cpp_name().to_string()));
        }
        self.expect_shape(
            |shape| matches!(shape, ReturnShape::Scalar { dtype } if dtype == T::TYPE.dtype()),
            T::TYPE.dtype(),
        )?;
        let raw = self.read(T::TYPE.width())?;
        Ok(T::get_le(&raw))
    }

    /// `bool` travels as a 4-byte integer that must be 0 or 1.
    pub fn recv_bool(mut self) -> Result<bool> {
        self.expect_shape(
            |shape| matches!(shape, ReturnShape::Scalar { dtype } if dtype == "bool"),
            "bool",
        )?;
        let raw = self.read(4)?;
        match u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(Error::InvalidBool {
                operation: self.operation,
                value,
            }),
        }
    }

    /// `std::array<T, len>` reply.
    pub fn recv_array<T: WireScalar>(mut self, len: usize) -> Result<Vec<T>> {
        self.expect_shape(|shape| matches!(shape, ReturnShape::Array { .. }), "array")?;
        if let Some(ReturnShape::Array { dtype, len: declared }) = self.declared().cloned() {
            if let Some(ty) = self.other_dtype::<T>() {
                self.read(declared * ty.width())?;
                return Err(self.dtype_mismatch(T::TYPE, &dtype));
            }
            if declared != len {
                self.read(declared * T::TYPE.width())?;
                return Err(Error::LengthMismatch {
                    operation: self.operation,
                    expected: len,
                    received: declared,
                });
            }
        }
        let raw = self.read(len * T::TYPE.width())?;
        self.into_values(raw)
    }

    fn recv_counted<T: WireScalar>(&mut self) -> Result<Vec<T>> {
        let count = self.read_count()?;
        if let Some(ty) = self.other_dtype::<T>() {
            self.read(count * ty.width())?;
            return Err(self.dtype_mismatch(T::TYPE, ty.dtype()));
        }
        let raw = self.read(count * T::TYPE.width())?;
        self.into_values(raw)
    }

    /// `std::vector<T>` reply, any length.
    pub fn recv_vector<T: WireScalar>(mut self) -> Result<Vec<T>> {
        self.expect_shape(
            |shape| matches!(shape, ReturnShape::Vector { .. } | ReturnShape::Buffer { .. }),
            "vector",
        )?;
        self.recv_counted()
    }

    /// `read_array` reply of exactly `len` elements.
    pub fn recv_buffer<T: WireScalar>(mut self, len: usize) -> Result<Vec<T>> {
        self.expect_shape(
            |shape| matches!(shape, ReturnShape::Buffer { .. } | ReturnShape::Vector { .. }),
            "buffer",
        )?;
        let values = self.recv_counted::<T>()?;
        if values.len() != len {
            return Err(Error::LengthMismatch {
                operation: self.operation,
                expected: len,
                received: values.len(),
            });
        }
        Ok(values)
    }

    /// NUL-terminated text.
    pub fn recv_string(mut self) -> Result<String> {
        self.expect_shape(|shape| *shape == ReturnShape::String, "string")?;
        let timeout = self.client.config.string_timeout;
        let raw = self.client.conn.recv_until(b"\0", timeout);
        let raw = self.client.check(raw)?;
        String::from_utf8(raw).map_err(|_| Error::InvalidUtf8)
    }

    pub fn recv_json<T: DeserializeOwned>(self) -> Result<T> {
        let text = self.recv_string()?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Fields packed back to back as described by `format`, e.g. `"If?"`.
    pub fn recv_tuple(mut self, format: &str) -> Result<Vec<Scalar>> {
        let format: Format = format.parse()?;
        let expected = format.to_string();
        self.expect_shape(
            |shape| match shape {
                ReturnShape::Tuple { format: declared } => declared
                    .parse::<Format>()
                    .map(|d| d == format)
                    .unwrap_or(false),
                _ => false,
            },
            &format!("tuple<{}>", expected),
        )?;
        let raw = self.read(format.size())?;
        format.unpack(&raw)
    }
}
