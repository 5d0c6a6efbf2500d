//! Operation signature catalogue (`devices.json`).
//!
//! Written by the generator next to the marshalling sources. A client that
//! loads it can check what a call site expects to receive against what the
//! server declares, before reading a single reply byte.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::discovery::device_tag;

/// Reply shape of an operation as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReturnShape {
    /// WRITE: nothing is sent back
    Void,
    Scalar { dtype: String },
    /// Fixed-size array sent inline
    Array { dtype: String, len: usize },
    /// Count-prefixed vector sent inline
    Vector { dtype: String },
    /// READ_ARRAY transfer: count-prefixed elements
    Buffer { dtype: String },
    /// NUL-terminated text
    String,
    Tuple { format: String },
}

impl fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnShape::Void => f.write_str("void"),
            ReturnShape::Scalar { dtype } => f.write_str(dtype),
            ReturnShape::Array { dtype, len } => write!(f, "array<{}, {}>", dtype, len),
            ReturnShape::Vector { dtype } => write!(f, "vector<{}>", dtype),
            ReturnShape::Buffer { dtype } => write!(f, "buffer<{}>", dtype),
            ReturnShape::String => f.write_str("string"),
            ReturnShape::Tuple { format } => write!(f, "tuple<{}>", format),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSignature {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub id: u16,
    pub ret_type: String,
    pub io_type: String,
    pub returns: ReturnShape,
    pub args: Vec<ArgSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSignature {
    pub class: String,
    pub tag: String,
    pub id: u16,
    pub functions: Vec<FunctionSignature>,
}

/// All device signatures of one build, in device id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalogue {
    devices: Vec<DeviceSignature>,
}

impl Catalogue {
    pub fn new(devices: Vec<DeviceSignature>) -> Self {
        Self { devices }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    pub fn devices(&self) -> &[DeviceSignature] {
        &self.devices
    }

    /// Find an operation by device class or tag and operation name or tag.
    pub fn find(&self, device: &str, operation: &str) -> Option<&FunctionSignature> {
        let tag = device_tag(device);
        let dev = self
            .devices
            .iter()
            .find(|d| d.class == device || d.tag == device || d.tag == tag)?;
        dev.functions
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue() -> Catalogue {
        Catalogue::new(vec![DeviceSignature {
            class: "Math".into(),
            tag: "MATH".into(),
            id: 2,
            functions: vec![FunctionSignature {
                name: "add".into(),
                id: 0,
                ret_type: "uint32_t".into(),
                io_type: "READ".into(),
                returns: ReturnShape::Scalar {
                    dtype: "uint32".into(),
                },
                args: vec![
                    ArgSignature {
                        name: "a".into(),
                        ty: "uint32_t".into(),
                    },
                    ArgSignature {
                        name: "b".into(),
                        ty: "uint32_t".into(),
                    },
                ],
            }],
        }])
    }

    #[test]
    fn test_json_roundtrip() {
        let cat = catalogue();
        let text = cat.to_json().unwrap();
        assert!(text.contains("\"kind\": \"scalar\""));
        assert!(text.contains("\"type\": \"uint32_t\""));
        assert_eq!(Catalogue::from_json(&text).unwrap(), cat);
    }

    #[test]
    fn test_find() {
        let cat = catalogue();
        assert_eq!(cat.find("Math", "add").map(|f| f.id), Some(0));
        assert_eq!(cat.find("MATH", "ADD").map(|f| f.id), Some(0));
        assert!(cat.find("Math", "sub").is_none());
        assert!(cat.find("Adder", "add").is_none());
    }

    #[test]
    fn test_shape_display() {
        let shape = ReturnShape::Array {
            dtype: "float32".into(),
            len: 10,
        };
        assert_eq!(shape.to_string(), "array<float32, 10>");
    }
}
