//! Pack-plan interpreter.
//!
//! Decodes a command into typed arguments following the operation
//! layout, and encodes the device reply according to the io type.

use super::{Arguments, Reply, Value};
use crate::devgen::descriptor::IoType;
use crate::devgen::packs::{OperationLayout, PackFamily, Region};
use crate::devgen::types::WireType;
use crate::devgen::OperationDescriptor;
use crate::error::{Error, Result};
use crate::protocol::codec::{ByteOrder, Elements, Format, PayloadReader, Scalar, ScalarType};

/// Largest vector or buffer transfer accepted in one call, in bytes.
pub const MAX_TRANSFER_SIZE: usize = 64 * 1024 * 1024;

/// Stream operations a call needs beyond the envelope.
pub trait CommandStream {
    /// Read exactly `len` more bytes from the client.
    fn load_buffer(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Tell the client how many elements the server is ready to receive.
    fn handshake(&mut self, count: u32) -> Result<()>;

    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

fn transfer_limit(elem: ScalarType) -> u64 {
    (MAX_TRANSFER_SIZE / elem.width()) as u64
}

/// Rebuild the arguments of `op` from the envelope payload and the
/// stream. `accept` decides how many write_array elements to take.
pub fn decode_arguments<S, F>(
    device: &str,
    op: &OperationDescriptor,
    layout: &OperationLayout,
    payload: &[u8],
    stream: &mut S,
    accept: F,
) -> Result<Arguments>
where
    S: CommandStream + ?Sized,
    F: FnOnce(&Arguments, usize) -> usize,
{
    if payload.len() != layout.payload_size {
        return Err(Error::InvalidPayloadSize {
            device: device.to_string(),
            operation: op.name.clone(),
            expected: layout.payload_size,
            received: payload.len(),
        });
    }

    let mut args = Arguments::new();

    for pack in &layout.packs {
        let reloaded;
        let bytes: &[u8] = match pack.region {
            Region::Envelope { offset } => &payload[offset..offset + pack.size],
            Region::Reload => {
                reloaded = stream.load_buffer(pack.size).map_err(|e| {
                    log::debug!("[{} - {}] reload failed: {}", device, op.name, e);
                    Error::BufferReload {
                        device: device.to_string(),
                        operation: op.name.clone(),
                        size: pack.size,
                    }
                })?;
                &reloaded
            }
        };
        let mut reader = PayloadReader::new(bytes);

        match pack.family {
            PackFamily::Scalar => {
                for &idx in &pack.members {
                    let arg = &op.arguments[idx];
                    let value = reader
                        .read_scalar(arg.kind.element())
                        .ok_or_else(|| Error::InvalidPayloadSize {
                            device: device.to_string(),
                            operation: op.name.clone(),
                            expected: pack.size,
                            received: bytes.len(),
                        })?;
                    args.push(arg.name.clone(), Value::Scalar(value));
                }
            }
            PackFamily::Array => {
                let arg = &op.arguments[pack.members[0]];
                let elem = arg.kind.element();
                let len = pack.size / elem.width();
                let elements = reader
                    .read_elements(elem, len)
                    .ok_or_else(|| Error::ArrayExtract {
                        device: device.to_string(),
                        operation: op.name.clone(),
                    })?;
                args.push(arg.name.clone(), Value::Array(elements));
            }
            PackFamily::Vector => {
                let arg = &op.arguments[pack.members[0]];
                let elem = arg.kind.element();
                let receive_failed = || Error::VectorReceive {
                    device: device.to_string(),
                    operation: op.name.clone(),
                };

                let count = reader.read::<u64>().ok_or_else(receive_failed)?;
                let ack = count.min(transfer_limit(elem));
                stream.handshake(ack as u32)?;
                if ack != count {
                    return Err(receive_failed());
                }

                let raw = stream
                    .load_buffer(count as usize * elem.width())
                    .map_err(|_| receive_failed())?;
                let elements = Elements::from_le_bytes(elem, raw).ok_or_else(receive_failed)?;
                args.push(arg.name.clone(), Value::Vector(elements));
            }
        }
    }

    if let Some(wa) = &op.write_array {
        let requested = args.get::<u32>(&wa.length)? as usize;
        let limit = transfer_limit(wa.element) as usize;
        let ack = accept(&args, requested).min(limit).min(u32::MAX as usize);
        stream.handshake(ack as u32)?;
        if ack != requested {
            return Err(Error::Device {
                device: device.to_string(),
                operation: op.name.clone(),
                reason: format!("buffer of {} elements refused, {} accepted", requested, ack),
            });
        }

        let raw = stream
            .load_buffer(requested * wa.element.width())
            .map_err(|_| Error::ArrayExtract {
                device: device.to_string(),
                operation: op.name.clone(),
            })?;
        let elements = Elements::from_le_bytes(wa.element, raw).ok_or_else(|| Error::ArrayExtract {
            device: device.to_string(),
            operation: op.name.clone(),
        })?;
        args.push(wa.pointer.clone(), Value::Buffer(elements));
    }

    Ok(args)
}

/// Bytes to send for `reply`, `None` for operations that send nothing.
pub fn encode_reply(device: &str, op: &OperationDescriptor, reply: Reply) -> Result<Option<Vec<u8>>> {
    let mismatch = |reply: &Reply| Error::Device {
        device: device.to_string(),
        operation: op.name.clone(),
        reason: format!("reply {:?} does not match the declared {}", reply, op.return_type),
    };

    let bytes = match (op.io_type, &op.returns, reply) {
        (IoType::Write, _, Reply::None) => return Ok(None),

        (IoType::Read, WireType::Scalar(ScalarType::Bool), Reply::Scalar(Scalar::Bool(b))) => {
            (b as u32).to_le_bytes().to_vec()
        }
        (IoType::Read, WireType::Scalar(ty), Reply::Scalar(value)) if value.ty() == *ty => {
            let mut out = Vec::with_capacity(ty.width());
            value.put_le(&mut out);
            out
        }
        (IoType::Read, WireType::FixedArray { elem, len }, Reply::Elements(e))
            if e.ty() == *elem && e.len() == *len =>
        {
            e.as_bytes().to_vec()
        }
        (IoType::Read, WireType::Vector(elem), Reply::Elements(e)) if e.ty() == *elem => counted(&e)?,
        (IoType::Read, WireType::Tuple(fields), Reply::Tuple(values)) => {
            Format::new(ByteOrder::Big, fields.clone()).pack(&values)?
        }

        (IoType::ReadCstr, _, Reply::Str(text)) => {
            let mut out = Vec::with_capacity(text.len() + 1);
            out.extend_from_slice(text.as_bytes());
            out.push(0);
            out
        }

        (IoType::ReadArray, returns, Reply::Elements(e)) if returns.element() == Some(e.ty()) => {
            counted(&e)?
        }

        (_, _, reply) => return Err(mismatch(&reply)),
    };
    Ok(Some(bytes))
}

/// u32 big-endian element count followed by the raw elements.
fn counted(elements: &Elements) -> Result<Vec<u8>> {
    let count = u32::try_from(elements.len()).map_err(|_| Error::PayloadTooLarge(elements.as_bytes().len()))?;
    let mut out = Vec::with_capacity(4 + elements.as_bytes().len());
    out.extend_from_slice(&count.to_be_bytes());
    out.extend_from_slice(elements.as_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devgen::annotations::DEFAULT_NAMESPACE;
    use crate::devgen::{layout, parse_source, DeviceDescriptor};
    use std::collections::VecDeque;

    /// In-memory client side of a call.
    #[derive(Default)]
    struct Script {
        incoming: VecDeque<u8>,
        handshakes: Vec<u32>,
        sent: Vec<u8>,
    }

    impl CommandStream for Script {
        fn load_buffer(&mut self, len: usize) -> Result<Vec<u8>> {
            if self.incoming.len() < len {
                return Err(Error::ConnectionBroken);
            }
            Ok(self.incoming.drain(..len).collect())
        }

        fn handshake(&mut self, count: u32) -> Result<()> {
            self.handshakes.push(count);
            Ok(())
        }

        fn send(&mut self, bytes: &[u8]) -> Result<()> {
            self.sent.extend_from_slice(bytes);
            Ok(())
        }
    }

    fn device() -> DeviceDescriptor {
        parse_source(
            "class Math {
  public:
    uint32_t add(uint32_t a, uint32_t b);
    float mix(bool flag, const std::vector<uint16_t>& v, int8_t k, std::array<uint8_t, 2> tail);
    #pragma devlink write_array arg{data} arg{len}
    void load(const float* data, uint32_t len);
    std::tuple<uint32_t, float> pair();
    std::array<uint32_t, 2> two();
    std::vector<double> many();
    const char* name();
    bool ok();
};",
            "math.hpp",
            DEFAULT_NAMESPACE,
        )
        .unwrap()
        .remove(0)
    }

    fn decode(op: &str, payload: &[u8], stream: &mut Script) -> Result<Arguments> {
        let dev = device();
        let op = dev.operation_by_name(op).unwrap().clone();
        decode_arguments("Math", &op, &layout(&op.arguments), payload, stream, |_, n| n)
    }

    #[test]
    fn test_scalar_pack_big_endian() {
        let mut stream = Script::default();
        let args = decode("add", &[0, 0, 0, 1, 0, 0, 1, 0], &mut stream).unwrap();
        assert_eq!(args.get::<u32>("a").unwrap(), 1);
        assert_eq!(args.get::<u32>("b").unwrap(), 256);
    }

    #[test]
    fn test_payload_size_checked() {
        let mut stream = Script::default();
        let err = decode("add", &[0, 0, 0, 1], &mut stream).unwrap_err();
        assert_eq!(
            err.to_string(),
            "[Math - add] invalid payload size: expected 8 bytes, received 4 bytes"
        );
    }

    #[test]
    fn test_vector_then_reload() {
        let mut payload = vec![1u8];
        payload.extend_from_slice(&3u64.to_be_bytes());

        let mut stream = Script::default();
        for v in [10u16, 20, 30] {
            stream.incoming.extend(v.to_le_bytes());
        }
        stream.incoming.push_back(0xff); // k = -1
        stream.incoming.extend([7u8, 9]);

        let args = decode("mix", &payload, &mut stream).unwrap();
        assert_eq!(stream.handshakes, vec![3]);
        assert!(args.get::<bool>("flag").unwrap());
        assert_eq!(args.to_vec::<u16>("v").unwrap(), vec![10, 20, 30]);
        assert_eq!(args.get::<i8>("k").unwrap(), -1);
        assert_eq!(args.to_vec::<u8>("tail").unwrap(), vec![7, 9]);
        assert!(stream.incoming.is_empty());
    }

    #[test]
    fn test_reload_failure() {
        let mut payload = vec![0u8];
        payload.extend_from_slice(&0u64.to_be_bytes());
        let mut stream = Script::default();
        let err = decode("mix", &payload, &mut stream).unwrap_err();
        assert!(matches!(err, Error::BufferReload { size: 1, .. }));
    }

    #[test]
    fn test_write_array_handshake() {
        let mut stream = Script::default();
        stream.incoming.extend(1.0f32.to_le_bytes());
        stream.incoming.extend(2.0f32.to_le_bytes());
        let args = decode("load", &2u32.to_be_bytes(), &mut stream).unwrap();
        assert_eq!(stream.handshakes, vec![2]);
        assert_eq!(args.to_vec::<f32>("data").unwrap(), vec![1.0, 2.0]);

        let dev = device();
        let op = dev.operation_by_name("load").unwrap();
        let mut stream = Script::default();
        let err = decode_arguments("Math", op, &layout(&op.arguments), &5u32.to_be_bytes(), &mut stream, |_, _| 4)
            .unwrap_err();
        assert_eq!(stream.handshakes, vec![4]);
        assert!(matches!(err, Error::Device { .. }));
    }

    #[test]
    fn test_reply_encoding() {
        let dev = device();
        let op = |name: &str| dev.operation_by_name(name).unwrap();

        assert_eq!(
            encode_reply("Math", op("add"), Reply::scalar(2u32)).unwrap(),
            Some(vec![2, 0, 0, 0])
        );
        assert_eq!(
            encode_reply("Math", op("ok"), Reply::scalar(true)).unwrap(),
            Some(vec![1, 0, 0, 0])
        );
        assert_eq!(encode_reply("Math", op("load"), Reply::None).unwrap(), None);
        assert_eq!(
            encode_reply("Math", op("name"), Reply::string("math")).unwrap(),
            Some(b"math\0".to_vec())
        );
        assert_eq!(
            encode_reply("Math", op("pair"), Reply::tuple(vec![Scalar::U32(1), Scalar::F32(0.5)])).unwrap(),
            Some(vec![0, 0, 0, 1, 0x3f, 0, 0, 0])
        );
        assert_eq!(
            encode_reply("Math", op("two"), Reply::elements(&[1u32, 2])).unwrap(),
            Some(vec![1, 0, 0, 0, 2, 0, 0, 0])
        );

        let many = encode_reply("Math", op("many"), Reply::elements(&[1.0f64])).unwrap().unwrap();
        assert_eq!(&many[..4], &[0, 0, 0, 1]);
        assert_eq!(many.len(), 12);
    }

    #[test]
    fn test_reply_mismatch() {
        let dev = device();
        let add = dev.operation_by_name("add").unwrap();
        assert!(encode_reply("Math", add, Reply::scalar(2u16)).is_err());
        let two = dev.operation_by_name("two").unwrap();
        assert!(encode_reply("Math", two, Reply::elements(&[1u32])).is_err());
    }
}
