//! Type classification of declared C++ types.

use std::fmt;

use crate::protocol::codec::ScalarType;
use crate::protocol::signature::ReturnShape;

/// Platform-width integer spellings. Their size differs between the
/// client and server platforms, so they never reach the wire.
pub const FORBIDDEN_INTS: &[&str] = &[
    "short",
    "int",
    "unsigned",
    "long",
    "unsigned short",
    "short unsigned",
    "unsigned int",
    "int unsigned",
    "unsigned long",
    "long unsigned",
    "long long",
    "unsigned long long",
    "long long unsigned",
    "signed",
    "signed int",
    "signed short",
    "signed long",
    "size_t",
    "std::size_t",
];

/// Types decoded as NUL-terminated text.
pub const CSTR_TYPES: &[&str] = &["char *", "const char *"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireType {
    Void,
    Scalar(ScalarType),
    FixedArray { elem: ScalarType, len: usize },
    Vector(ScalarType),
    CString,
    Str,
    Tuple(Vec<ScalarType>),
    /// Raw element pointer, only valid with an array annotation
    Pointer(ScalarType),
    Unsupported(String),
}

impl WireType {
    /// Element type of arrays, vectors and pointers.
    pub fn element(&self) -> Option<ScalarType> {
        match self {
            WireType::FixedArray { elem, .. } => Some(*elem),
            WireType::Vector(elem) | WireType::Pointer(elem) => Some(*elem),
            _ => None,
        }
    }

    /// Reply shape for a given io type.
    pub fn shape(&self, read_array: bool) -> ReturnShape {
        if read_array {
            if let Some(elem) = self.element() {
                return ReturnShape::Buffer {
                    dtype: elem.dtype().to_string(),
                };
            }
        }
        match self {
            WireType::Void | WireType::Unsupported(_) => ReturnShape::Void,
            WireType::Scalar(ty) => ReturnShape::Scalar {
                dtype: ty.dtype().to_string(),
            },
            WireType::FixedArray { elem, len } => ReturnShape::Array {
                dtype: elem.dtype().to_string(),
                len: *len,
            },
            WireType::Vector(elem) | WireType::Pointer(elem) => ReturnShape::Vector {
                dtype: elem.dtype().to_string(),
            },
            WireType::CString | WireType::Str => ReturnShape::String,
            WireType::Tuple(fields) => ReturnShape::Tuple {
                format: fields.iter().map(|ty| ty.format_char()).collect(),
            },
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireType::Void => f.write_str("void"),
            WireType::Scalar(ty) => write!(f, "{}", ty),
            WireType::FixedArray { elem, len } => write!(f, "std::array<{}, {}>", elem, len),
            WireType::Vector(elem) => write!(f, "std::vector<{}>", elem),
            WireType::CString => f.write_str("const char *"),
            WireType::Str => f.write_str("std::string"),
            WireType::Tuple(fields) => {
                f.write_str("std::tuple<")?;
                for (idx, ty) in fields.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                f.write_str(">")
            }
            WireType::Pointer(elem) => write!(f, "{} *", elem),
            WireType::Unsupported(reason) => write!(f, "unsupported ({})", reason),
        }
    }
}

/// Parameter type with its reference and const qualifiers removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedType {
    pub ty: String,
    pub by_reference: bool,
    pub is_const: bool,
}

pub fn strip_qualifiers(ty: &str) -> StrippedType {
    let mut ty = ty.trim();
    let mut by_reference = false;
    let mut is_const = false;

    while let Some(rest) = ty.strip_suffix('&') {
        by_reference = true;
        ty = rest.trim_end();
    }
    if let Some(rest) = ty.strip_prefix("const ") {
        is_const = true;
        ty = rest.trim_start();
    }
    // `T const` spelling
    if !ty.ends_with('*') {
        if let Some(rest) = ty.strip_suffix(" const") {
            is_const = true;
            ty = rest.trim_end();
        }
    }

    StrippedType {
        ty: ty.to_string(),
        by_reference,
        is_const,
    }
}

pub fn is_platform_int(ty: &str) -> bool {
    let ty = ty.trim();
    let ty = ty.strip_prefix("const ").unwrap_or(ty);
    FORBIDDEN_INTS.contains(&ty)
}

/// Classify a canonical type string (as produced by the header reader).
pub fn classify(ty: &str) -> WireType {
    let ty = ty.trim();

    if ty == "void" {
        return WireType::Void;
    }
    if CSTR_TYPES.contains(&ty) {
        return WireType::CString;
    }
    if matches!(ty, "std::string" | "string" | "const std::string") {
        return WireType::Str;
    }
    if is_platform_int(ty) {
        return WireType::Unsupported(format!("platform-width integer '{}', use an exact-width type", ty));
    }

    if let Some(inner) = ty.strip_suffix('*') {
        let inner = inner.trim();
        let inner = inner.strip_prefix("const ").unwrap_or(inner);
        return match ScalarType::from_cpp(inner) {
            Some(elem) if elem != ScalarType::Bool => WireType::Pointer(elem),
            _ => WireType::Unsupported(format!("pointer to '{}'", inner)),
        };
    }

    if let Some((outer, params)) = template(ty) {
        return match outer {
            "array" => match params.as_slice() {
                [elem, len] => match (scalar(elem), len.parse::<usize>()) {
                    (Some(elem), Ok(len)) if len > 0 => WireType::FixedArray { elem, len },
                    (None, _) => WireType::Unsupported(format!("array element '{}'", elem)),
                    _ => WireType::Unsupported(format!("array length '{}' must be a positive literal", len)),
                },
                _ => WireType::Unsupported("std::array takes two parameters".to_string()),
            },
            "vector" => match params.as_slice() {
                [elem] => match scalar(elem) {
                    Some(elem) => WireType::Vector(elem),
                    None => WireType::Unsupported(format!("vector element '{}'", elem)),
                },
                _ => WireType::Unsupported("std::vector takes one parameter".to_string()),
            },
            "tuple" => params
                .iter()
                .map(|p| scalar(p).ok_or_else(|| p.to_string()))
                .collect::<Result<Vec<_>, _>>()
                .map(WireType::Tuple)
                .unwrap_or_else(|field| WireType::Unsupported(format!("tuple field '{}'", field))),
            other => WireType::Unsupported(format!("template '{}'", other)),
        };
    }

    match ScalarType::from_cpp(ty) {
        Some(scalar) => WireType::Scalar(scalar),
        None => WireType::Unsupported(format!("unknown type '{}'", ty)),
    }
}

fn scalar(ty: &str) -> Option<ScalarType> {
    if is_platform_int(ty) {
        return None;
    }
    ScalarType::from_cpp(ty)
}

/// Split `std::name<a, b>` into `("name", ["a", "b"])`.
fn template(ty: &str) -> Option<(&str, Vec<&str>)> {
    let open = ty.find('<')?;
    let body = ty.strip_suffix('>')?;
    let outer = ty[..open].trim();
    let outer = outer.strip_prefix("std::").unwrap_or(outer);

    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut start = open + 1;
    for (idx, c) in body.char_indices().skip(open + 1) {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                params.push(body[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    params.push(body[start..].trim());
    Some((outer, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(classify("uint32_t"), WireType::Scalar(ScalarType::U32));
        assert_eq!(classify("std::int64_t"), WireType::Scalar(ScalarType::I64));
        assert_eq!(classify("bool"), WireType::Scalar(ScalarType::Bool));
        assert_eq!(classify("void"), WireType::Void);
    }

    #[test]
    fn test_platform_ints_rejected() {
        for ty in ["int", "unsigned long long", "long unsigned", "short"] {
            assert!(matches!(classify(ty), WireType::Unsupported(_)), "{}", ty);
        }
        assert!(matches!(classify("std::vector<int>"), WireType::Unsupported(_)));
    }

    #[test]
    fn test_containers() {
        assert_eq!(
            classify("std::array<float, 10>"),
            WireType::FixedArray {
                elem: ScalarType::F32,
                len: 10
            }
        );
        assert_eq!(classify("std::vector<uint32_t>"), WireType::Vector(ScalarType::U32));
        assert_eq!(
            classify("std::tuple<uint32_t, double, bool>"),
            WireType::Tuple(vec![ScalarType::U32, ScalarType::F64, ScalarType::Bool])
        );
        assert!(matches!(classify("std::array<float, N>"), WireType::Unsupported(_)));
        assert!(matches!(classify("std::map<uint32_t, float>"), WireType::Unsupported(_)));
    }

    #[test]
    fn test_strings_and_pointers() {
        assert_eq!(classify("const char *"), WireType::CString);
        assert_eq!(classify("char *"), WireType::CString);
        assert_eq!(classify("std::string"), WireType::Str);
        assert_eq!(classify("const uint32_t *"), WireType::Pointer(ScalarType::U32));
    }

    #[test]
    fn test_strip_qualifiers() {
        let stripped = strip_qualifiers("const std::vector<uint32_t> &");
        assert_eq!(stripped.ty, "std::vector<uint32_t>");
        assert!(stripped.by_reference);
        assert!(stripped.is_const);

        let plain = strip_qualifiers("uint32_t");
        assert_eq!(plain.ty, "uint32_t");
        assert!(!plain.by_reference && !plain.is_const);

        assert_eq!(strip_qualifiers("const uint32_t *").ty, "uint32_t *");
    }

    #[test]
    fn test_shapes() {
        assert_eq!(
            classify("std::array<uint32_t, 4>").shape(false),
            ReturnShape::Array {
                dtype: "uint32".into(),
                len: 4
            }
        );
        assert_eq!(
            classify("const float *").shape(true),
            ReturnShape::Buffer {
                dtype: "float32".into()
            }
        );
        assert_eq!(
            classify("std::tuple<uint32_t, float>").shape(false),
            ReturnShape::Tuple { format: "If".into() }
        );
    }
}
