//! Scalar wire types and the byte-level encoding rules.
//!
//! Request payloads carry scalars big-endian and booleans as a single
//! byte. Element buffers (fixed arrays, vectors, handshake transfers) are
//! raw little-endian. Tuples use an explicit per-field format string.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Fixed-width types allowed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
}

impl ScalarType {
    pub const ALL: [ScalarType; 11] = [
        ScalarType::U8,
        ScalarType::I8,
        ScalarType::U16,
        ScalarType::I16,
        ScalarType::U32,
        ScalarType::I32,
        ScalarType::U64,
        ScalarType::I64,
        ScalarType::F32,
        ScalarType::F64,
        ScalarType::Bool,
    ];

    /// Encoded width in bytes.
    #[inline(always)]
    pub const fn width(self) -> usize {
        match self {
            ScalarType::U8 | ScalarType::I8 | ScalarType::Bool => 1,
            ScalarType::U16 | ScalarType::I16 => 2,
            ScalarType::U32 | ScalarType::I32 | ScalarType::F32 => 4,
            ScalarType::U64 | ScalarType::I64 | ScalarType::F64 => 8,
        }
    }

    /// Single-character tag used in format strings.
    pub const fn format_char(self) -> char {
        match self {
            ScalarType::U8 => 'B',
            ScalarType::I8 => 'b',
            ScalarType::U16 => 'H',
            ScalarType::I16 => 'h',
            ScalarType::U32 => 'I',
            ScalarType::I32 => 'i',
            ScalarType::U64 => 'Q',
            ScalarType::I64 => 'q',
            ScalarType::F32 => 'f',
            ScalarType::F64 => 'd',
            ScalarType::Bool => '?',
        }
    }

    pub fn from_format_char(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.format_char() == c)
    }

    /// Exact-width C++ spelling, as written in device headers.
    pub const fn cpp_name(self) -> &'static str {
        match self {
            ScalarType::U8 => "uint8_t",
            ScalarType::I8 => "int8_t",
            ScalarType::U16 => "uint16_t",
            ScalarType::I16 => "int16_t",
            ScalarType::U32 => "uint32_t",
            ScalarType::I32 => "int32_t",
            ScalarType::U64 => "uint64_t",
            ScalarType::I64 => "int64_t",
            ScalarType::F32 => "float",
            ScalarType::F64 => "double",
            ScalarType::Bool => "bool",
        }
    }

    /// Parse a C++ type name, with or without the `std::` prefix.
    pub fn from_cpp(name: &str) -> Option<Self> {
        let name = name.trim();
        let name = name.strip_prefix("std::").unwrap_or(name);
        Self::ALL.into_iter().find(|ty| ty.cpp_name() == name)
    }

    /// Element type name used in array type checks.
    pub const fn dtype(self) -> &'static str {
        match self {
            ScalarType::U8 => "uint8",
            ScalarType::I8 => "int8",
            ScalarType::U16 => "uint16",
            ScalarType::I16 => "int16",
            ScalarType::U32 => "uint32",
            ScalarType::I32 => "int32",
            ScalarType::U64 => "uint64",
            ScalarType::I64 => "int64",
            ScalarType::F32 => "float32",
            ScalarType::F64 => "float64",
            ScalarType::Bool => "bool",
        }
    }

    pub fn from_dtype(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.dtype() == name)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cpp_name())
    }
}

/// Rust types with a fixed wire representation.
///
/// `get_be`/`get_le` read the first `TYPE.width()` bytes of the slice.
///
/// # Panics
/// The getters panic when handed fewer than `TYPE.width()` bytes; every
/// reader in this crate checks lengths first.
pub trait WireScalar: Copy + PartialEq + fmt::Debug + Send + 'static {
    const TYPE: ScalarType;

    fn put_be(self, out: &mut Vec<u8>);
    fn put_le(self, out: &mut Vec<u8>);
    fn get_be(bytes: &[u8]) -> Self;
    fn get_le(bytes: &[u8]) -> Self;
    fn into_scalar(self) -> Scalar;
    fn from_scalar(value: Scalar) -> Option<Self>;
}

macro_rules! wire_scalar {
    ($t:ty, $variant:ident) => {
        impl WireScalar for $t {
            const TYPE: ScalarType = ScalarType::$variant;

            #[inline(always)]
            fn put_be(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_be_bytes());
            }

            #[inline(always)]
            fn put_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            #[inline(always)]
            fn get_be(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_be_bytes(raw)
            }

            #[inline(always)]
            fn get_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_le_bytes(raw)
            }

            fn into_scalar(self) -> Scalar {
                Scalar::$variant(self)
            }

            fn from_scalar(value: Scalar) -> Option<Self> {
                match value {
                    Scalar::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

wire_scalar!(u8, U8);
wire_scalar!(i8, I8);
wire_scalar!(u16, U16);
wire_scalar!(i16, I16);
wire_scalar!(u32, U32);
wire_scalar!(i32, I32);
wire_scalar!(u64, U64);
wire_scalar!(i64, I64);
wire_scalar!(f32, F32);
wire_scalar!(f64, F64);

impl WireScalar for bool {
    const TYPE: ScalarType = ScalarType::Bool;

    fn put_be(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn put_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn get_be(bytes: &[u8]) -> Self {
        bytes[0] == 1
    }

    fn get_le(bytes: &[u8]) -> Self {
        bytes[0] == 1
    }

    fn into_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }

    fn from_scalar(value: Scalar) -> Option<Self> {
        match value {
            Scalar::Bool(v) => Some(v),
            _ => None,
        }
    }
}

/// A dynamically typed scalar value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
}

macro_rules! each_scalar {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            Scalar::U8($v) => $body,
            Scalar::I8($v) => $body,
            Scalar::U16($v) => $body,
            Scalar::I16($v) => $body,
            Scalar::U32($v) => $body,
            Scalar::I32($v) => $body,
            Scalar::U64($v) => $body,
            Scalar::I64($v) => $body,
            Scalar::F32($v) => $body,
            Scalar::F64($v) => $body,
            Scalar::Bool($v) => $body,
        }
    };
}

macro_rules! each_type {
    ($ty:expr, $t:ident => $body:expr) => {
        match $ty {
            ScalarType::U8 => {
                type $t = u8;
                $body
            }
            ScalarType::I8 => {
                type $t = i8;
                $body
            }
            ScalarType::U16 => {
                type $t = u16;
                $body
            }
            ScalarType::I16 => {
                type $t = i16;
                $body
            }
            ScalarType::U32 => {
                type $t = u32;
                $body
            }
            ScalarType::I32 => {
                type $t = i32;
                $body
            }
            ScalarType::U64 => {
                type $t = u64;
                $body
            }
            ScalarType::I64 => {
                type $t = i64;
                $body
            }
            ScalarType::F32 => {
                type $t = f32;
                $body
            }
            ScalarType::F64 => {
                type $t = f64;
                $body
            }
            ScalarType::Bool => {
                type $t = bool;
                $body
            }
        }
    };
}

impl Scalar {
    pub fn ty(&self) -> ScalarType {
        match self {
            Scalar::U8(_) => ScalarType::U8,
            Scalar::I8(_) => ScalarType::I8,
            Scalar::U16(_) => ScalarType::U16,
            Scalar::I16(_) => ScalarType::I16,
            Scalar::U32(_) => ScalarType::U32,
            Scalar::I32(_) => ScalarType::I32,
            Scalar::U64(_) => ScalarType::U64,
            Scalar::I64(_) => ScalarType::I64,
            Scalar::F32(_) => ScalarType::F32,
            Scalar::F64(_) => ScalarType::F64,
            Scalar::Bool(_) => ScalarType::Bool,
        }
    }

    pub fn put_be(&self, out: &mut Vec<u8>) {
        each_scalar!(*self, v => v.put_be(out))
    }

    pub fn put_le(&self, out: &mut Vec<u8>) {
        each_scalar!(*self, v => v.put_le(out))
    }

    /// Decode one value; `None` when `bytes` is shorter than the type width.
    pub fn decode_be(ty: ScalarType, bytes: &[u8]) -> Option<Scalar> {
        if bytes.len() < ty.width() {
            return None;
        }
        Some(each_type!(ty, T => T::get_be(bytes).into_scalar()))
    }

    pub fn decode_le(ty: ScalarType, bytes: &[u8]) -> Option<Scalar> {
        if bytes.len() < ty.width() {
            return None;
        }
        Some(each_type!(ty, T => T::get_le(bytes).into_scalar()))
    }

    /// Widening view used for length arguments.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Scalar::U8(v) => Some(v as u64),
            Scalar::U16(v) => Some(v as u64),
            Scalar::U32(v) => Some(v as u64),
            Scalar::U64(v) => Some(v),
            Scalar::I8(v) => u64::try_from(v).ok(),
            Scalar::I16(v) => u64::try_from(v).ok(),
            Scalar::I32(v) => u64::try_from(v).ok(),
            Scalar::I64(v) => u64::try_from(v).ok(),
            Scalar::F32(_) | Scalar::F64(_) | Scalar::Bool(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        each_scalar!(*self, v => write!(f, "{}", v))
    }
}

/// Byte order of a tuple format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// Parsed tuple format, e.g. `"IIf?"` or `"<Qd"`.
///
/// Fields are consumed in declared order with no padding. Without an
/// explicit `<` or `>` prefix the format is big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    order: ByteOrder,
    types: Vec<ScalarType>,
}

impl Format {
    pub fn new(order: ByteOrder, types: Vec<ScalarType>) -> Self {
        Self { order, types }
    }

    pub fn types(&self) -> &[ScalarType] {
        &self.types
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Total encoded size in bytes.
    pub fn size(&self) -> usize {
        self.types.iter().map(|ty| ty.width()).sum()
    }

    pub fn unpack(&self, bytes: &[u8]) -> Result<Vec<Scalar>> {
        if bytes.len() < self.size() {
            return Err(Error::LengthMismatch {
                operation: format!("tuple {}", self),
                expected: self.size(),
                received: bytes.len(),
            });
        }
        let mut position = 0;
        let mut values = Vec::with_capacity(self.types.len());
        for &ty in &self.types {
            let field = &bytes[position..position + ty.width()];
            let value = match self.order {
                ByteOrder::Big => Scalar::decode_be(ty, field),
                ByteOrder::Little => Scalar::decode_le(ty, field),
            };
            // Length checked above
            values.extend(value);
            position += ty.width();
        }
        Ok(values)
    }

    pub fn pack(&self, values: &[Scalar]) -> Result<Vec<u8>> {
        if values.len() != self.types.len() {
            return Err(Error::ArgumentType {
                operation: self.to_string(),
                index: values.len().min(self.types.len()),
                expected: format!("{} fields", self.types.len()),
                found: format!("{} fields", values.len()),
            });
        }
        let mut out = Vec::with_capacity(self.size());
        for (index, (value, &ty)) in values.iter().zip(&self.types).enumerate() {
            if value.ty() != ty {
                return Err(Error::ArgumentType {
                    operation: self.to_string(),
                    index,
                    expected: ty.to_string(),
                    found: value.ty().to_string(),
                });
            }
            match self.order {
                ByteOrder::Big => value.put_be(&mut out),
                ByteOrder::Little => value.put_le(&mut out),
            }
        }
        Ok(out)
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(fmt: &str) -> Result<Self> {
        let (order, body) = match fmt.chars().next() {
            Some('>') | Some('!') => (ByteOrder::Big, &fmt[1..]),
            Some('<') => (ByteOrder::Little, &fmt[1..]),
            _ => (ByteOrder::Big, fmt),
        };
        let types = body
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| ScalarType::from_format_char(c).ok_or(Error::InvalidFormat(c)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { order, types })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.order == ByteOrder::Little {
            f.write_str("<")?;
        }
        for ty in &self.types {
            write!(f, "{}", ty.format_char())?;
        }
        Ok(())
    }
}

/// Homogeneous element buffer, stored little-endian as it travels.
#[derive(Debug, Clone, PartialEq)]
pub struct Elements {
    ty: ScalarType,
    raw: Vec<u8>,
}

impl Elements {
    pub fn from_slice<T: WireScalar>(values: &[T]) -> Self {
        let mut raw = Vec::with_capacity(values.len() * T::TYPE.width());
        for &v in values {
            v.put_le(&mut raw);
        }
        Self { ty: T::TYPE, raw }
    }

    /// Wrap raw little-endian bytes; `None` if not a whole number of elements.
    pub fn from_le_bytes(ty: ScalarType, raw: Vec<u8>) -> Option<Self> {
        if raw.len() % ty.width() != 0 {
            return None;
        }
        Some(Self { ty, raw })
    }

    pub fn ty(&self) -> ScalarType {
        self.ty
    }

    pub fn len(&self) -> usize {
        self.raw.len() / self.ty.width()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Typed copy, or `None` when `T` is not the element type.
    pub fn to_vec<T: WireScalar>(&self) -> Option<Vec<T>> {
        if T::TYPE != self.ty {
            return None;
        }
        Some(
            self.raw
                .chunks_exact(self.ty.width())
                .map(T::get_le)
                .collect(),
        )
    }
}

/// Growable request payload builder.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buffer: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    #[inline(always)]
    pub fn put<T: WireScalar>(&mut self, value: T) -> &mut Self {
        value.put_be(&mut self.buffer);
        self
    }

    pub fn put_scalar(&mut self, value: &Scalar) -> &mut Self {
        value.put_be(&mut self.buffer);
        self
    }

    /// Raw element bytes, no length prefix.
    pub fn put_elements(&mut self, elements: &Elements) -> &mut Self {
        self.buffer.extend_from_slice(elements.as_bytes());
        self
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

/// Cursor over a received payload.
pub struct PayloadReader<'a> {
    buffer: &'a [u8],
    read_pos: usize,
}

impl<'a> PayloadReader<'a> {
    #[inline(always)]
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            read_pos: 0,
        }
    }

    /// Reader positioned at a fixed offset.
    pub fn at(buffer: &'a [u8], offset: usize) -> Self {
        Self {
            buffer,
            read_pos: offset.min(buffer.len()),
        }
    }

    #[inline(always)]
    pub fn read<T: WireScalar>(&mut self) -> Option<T> {
        let bytes = self.take(T::TYPE.width())?;
        Some(T::get_be(bytes))
    }

    pub fn read_scalar(&mut self, ty: ScalarType) -> Option<Scalar> {
        let bytes = self.take(ty.width())?;
        Scalar::decode_be(ty, bytes)
    }

    pub fn read_elements(&mut self, ty: ScalarType, count: usize) -> Option<Elements> {
        let bytes = self.take(count.checked_mul(ty.width())?)?;
        Elements::from_le_bytes(ty, bytes.to_vec())
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.read_pos.checked_add(n)?;
        if end > self.buffer.len() {
            return None;
        }
        let bytes = &self.buffer[self.read_pos..end];
        self.read_pos = end;
        Some(bytes)
    }

    pub fn position(&self) -> usize {
        self.read_pos
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.read_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: WireScalar>(value: T) {
        let mut out = Vec::new();
        value.put_be(&mut out);
        assert_eq!(out.len(), T::TYPE.width());
        assert_eq!(T::get_be(&out), value);

        out.clear();
        value.put_le(&mut out);
        assert_eq!(T::get_le(&out), value);
    }

    #[test]
    fn test_scalar_boundaries() {
        roundtrip(0u8);
        roundtrip(u8::MAX);
        roundtrip(i8::MIN);
        roundtrip(i8::MAX);
        roundtrip(u16::MAX);
        roundtrip(i16::MIN);
        roundtrip(u32::MAX);
        roundtrip(i32::MIN);
        roundtrip(i32::MAX);
        roundtrip(u64::MAX);
        roundtrip(i64::MIN);
        roundtrip(i64::MAX);
        roundtrip(f32::MAX);
        roundtrip(f32::MIN_POSITIVE);
        roundtrip(f64::MAX);
        roundtrip(f64::MIN);
        roundtrip(true);
        roundtrip(false);
    }

    #[test]
    fn test_format_widths() {
        let format: Format = "BbHhIiQqfd?".parse().unwrap();
        let widths: Vec<usize> = format.types().iter().map(|ty| ty.width()).collect();
        assert_eq!(widths, vec![1, 1, 2, 2, 4, 4, 8, 8, 4, 8, 1]);
        assert_eq!(format.size(), 43);
    }

    #[test]
    fn test_format_rejects_unknown_tag() {
        let err = "IxI".parse::<Format>().unwrap_err();
        assert!(matches!(err, Error::InvalidFormat('x')));
    }

    #[test]
    fn test_tuple_is_big_endian_without_padding() {
        let format: Format = "I?H".parse().unwrap();
        let bytes = format
            .pack(&[Scalar::U32(1), Scalar::Bool(true), Scalar::U16(0x0203)])
            .unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 1, 1, 2, 3]);
        assert_eq!(
            format.unpack(&bytes).unwrap(),
            vec![Scalar::U32(1), Scalar::Bool(true), Scalar::U16(0x0203)]
        );
    }

    #[test]
    fn test_little_endian_format() {
        let format: Format = "<I".parse().unwrap();
        assert_eq!(format.pack(&[Scalar::U32(1)]).unwrap(), vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_elements_dtype_check() {
        let elements = Elements::from_slice(&[1.5f32, 2.5]);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements.as_bytes().len(), 8);
        assert!(elements.to_vec::<u32>().is_none());
        assert_eq!(elements.to_vec::<f32>().unwrap(), vec![1.5, 2.5]);
    }

    #[test]
    fn test_reader_stops_at_end() {
        let mut writer = PayloadWriter::new();
        writer.put(7u32).put(-2i16);
        let bytes = writer.into_inner();

        let mut reader = PayloadReader::new(&bytes);
        assert_eq!(reader.read::<u32>(), Some(7));
        assert_eq!(reader.read::<i16>(), Some(-2));
        assert_eq!(reader.read::<u8>(), None);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_cpp_names() {
        assert_eq!(ScalarType::from_cpp("std::uint32_t"), Some(ScalarType::U32));
        assert_eq!(ScalarType::from_cpp("double"), Some(ScalarType::F64));
        assert_eq!(ScalarType::from_cpp("int"), None);
    }
}
