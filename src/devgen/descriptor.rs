//! Declaration parser: class declarations plus pragmas become device
//! descriptors.

use std::fmt;

use super::annotations::{associate, Directive, Pragma};
use super::error::{GenError, GenResult};
use super::header::{ClassDecl, MethodDecl};
use super::types::{classify, strip_qualifiers, WireType};
use crate::protocol::codec::ScalarType;
use crate::protocol::discovery::device_tag;

/// How an operation delivers its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoType {
    Write,
    Read,
    ReadCstr,
    ReadArray,
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoType::Write => "WRITE",
            IoType::Read => "READ",
            IoType::ReadCstr => "READ_CSTR",
            IoType::ReadArray => "READ_ARRAY",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgCategory {
    Scalar,
    FixedArray,
    Vector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Scalar(ScalarType),
    FixedArray { elem: ScalarType, len: usize },
    Vector(ScalarType),
}

impl ArgKind {
    pub fn category(&self) -> ArgCategory {
        match self {
            ArgKind::Scalar(_) => ArgCategory::Scalar,
            ArgKind::FixedArray { .. } => ArgCategory::FixedArray,
            ArgKind::Vector(_) => ArgCategory::Vector,
        }
    }

    pub fn element(&self) -> ScalarType {
        match *self {
            ArgKind::Scalar(ty) | ArgKind::Vector(ty) => ty,
            ArgKind::FixedArray { elem, .. } => elem,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDescriptor {
    pub name: String,
    /// Declared type without `const` and `&`
    pub ty: String,
    pub by_reference: bool,
    pub is_const: bool,
    pub kind: ArgKind,
}

impl ArgumentDescriptor {
    pub fn category(&self) -> ArgCategory {
        self.kind.category()
    }
}

/// Input buffer received through the handshake after the packs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteArray {
    pub pointer: String,
    /// Position of the pointer in the declared parameter list
    pub pointer_index: usize,
    pub length: String,
    pub element: ScalarType,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub name: String,
    pub tag: String,
    pub id: u16,
    pub return_type: String,
    pub returns: WireType,
    pub io_type: IoType,
    /// Decoded arguments in declaration order, pointer excluded
    pub arguments: Vec<ArgumentDescriptor>,
    pub write_array: Option<WriteArray>,
    /// Length expression of a `read_array` result
    pub read_array_length: Option<String>,
    pub line: usize,
}

impl OperationDescriptor {
    pub fn argument(&self, name: &str) -> Option<&ArgumentDescriptor> {
        self.arguments.iter().find(|a| a.name == name)
    }

    /// Parameter names in call order, the write_array pointer included.
    pub fn call_order(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.arguments.iter().map(|a| a.name.as_str()).collect();
        if let Some(wa) = &self.write_array {
            names.insert(wa.pointer_index.min(names.len()), wa.pointer.as_str());
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub tag: String,
    /// 0 until the table builder assigns ids
    pub id: u16,
    pub operations: Vec<OperationDescriptor>,
    /// Name of the health-check method
    pub is_failed: Option<String>,
}

impl DeviceDescriptor {
    pub fn operation(&self, id: u16) -> Option<&OperationDescriptor> {
        self.operations.get(id as usize)
    }

    pub fn operation_by_name(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations
            .iter()
            .find(|op| op.name == name || op.tag == name)
    }
}

/// Build the descriptor of one class.
pub fn describe_class(class: &ClassDecl, pragmas: &[Pragma]) -> GenResult<DeviceDescriptor> {
    let destructor = format!("~{}", class.name);
    let mut operations: Vec<OperationDescriptor> = Vec::new();
    let mut is_failed = None;

    for method in &class.methods {
        if !method.is_public || method.name == class.name || method.name == destructor {
            continue;
        }

        let directive = match associate(pragmas, method.line) {
            Some(pragma) => Some(
                Directive::parse(&pragma.directive)
                    .map_err(|e| e.into_gen_error(pragma, &class.name, &method.name))?,
            ),
            None => None,
        };

        match directive {
            Some(Directive::Exclude) => continue,
            Some(Directive::IsFailed) => {
                check_is_failed(class, method)?;
                if is_failed.is_some() {
                    return Err(GenError::InvalidIsFailed {
                        device: class.name.clone(),
                        operation: method.name.clone(),
                        line: method.line,
                        reason: "only one failure indicator function per device".to_string(),
                    });
                }
                is_failed = Some(method.name.clone());
            }
            directive => {
                if operations.iter().any(|op| op.name == method.name) {
                    return Err(GenError::Operation {
                        device: class.name.clone(),
                        operation: method.name.clone(),
                        reason: "overloaded operations are not supported".to_string(),
                    });
                }
                let id = operation_id(&class.name, &method.name, operations.len())?;
                operations.push(describe_operation(&class.name, method, id, directive)?);
            }
        }
    }

    Ok(DeviceDescriptor {
        tag: device_tag(&class.name),
        name: class.name.clone(),
        id: 0,
        operations,
        is_failed,
    })
}

/// Wire id of the operation at `index`; ids are 16 bits wide.
fn operation_id(device: &str, operation: &str, index: usize) -> GenResult<u16> {
    u16::try_from(index).map_err(|_| GenError::Operation {
        device: device.to_string(),
        operation: operation.to_string(),
        reason: format!("more than {} operations in one device", u16::MAX as usize + 1),
    })
}

fn check_is_failed(class: &ClassDecl, method: &MethodDecl) -> GenResult<()> {
    let fail = |reason: &str| GenError::InvalidIsFailed {
        device: class.name.clone(),
        operation: method.name.clone(),
        line: method.line,
        reason: reason.to_string(),
    };
    if method.return_type != "bool" {
        return Err(fail("Failure indicator function must return a bool"));
    }
    if !method.params.is_empty() {
        return Err(fail("Failure indicator function must not have argument"));
    }
    Ok(())
}

fn describe_operation(
    device: &str,
    method: &MethodDecl,
    id: u16,
    directive: Option<Directive>,
) -> GenResult<OperationDescriptor> {
    let unsupported = |ty: &str, reason: String| GenError::UnsupportedType {
        device: device.to_string(),
        operation: method.name.clone(),
        ty: ty.to_string(),
        reason,
    };
    let malformed = |directive: &'static str, reason: String| GenError::MalformedDirective {
        device: device.to_string(),
        operation: method.name.clone(),
        line: method.line.saturating_sub(1),
        directive,
        reason,
    };

    let ret = strip_qualifiers(&method.return_type);
    let returns = if ret.ty.ends_with('*') {
        classify(&method.return_type)
    } else {
        classify(&ret.ty)
    };
    if let WireType::Unsupported(reason) = &returns {
        return Err(unsupported(&method.return_type, reason.clone()));
    }

    let (write_params, read_length) = match directive {
        Some(Directive::WriteArray { pointer, length }) => (Some((pointer, length)), None),
        Some(Directive::ReadArray { length }) => {
            if returns.element().is_none() {
                return Err(malformed(
                    "read_array",
                    format!("return type '{}' is not an array, vector or pointer", method.return_type),
                ));
            }
            if matches!(returns, WireType::Pointer(_)) && length.is_none() {
                return Err(malformed(
                    "read_array",
                    "a pointer result needs a length expression".to_string(),
                ));
            }
            (None, Some(length))
        }
        _ => (None, None),
    };

    let io_type = if read_length.is_some() {
        IoType::ReadArray
    } else {
        match &returns {
            WireType::Void => IoType::Write,
            WireType::CString | WireType::Str => IoType::ReadCstr,
            WireType::Pointer(_) => {
                return Err(malformed(
                    "read_array",
                    format!("pointer result '{}' requires a read_array annotation", method.return_type),
                ))
            }
            _ => IoType::Read,
        }
    };

    let mut arguments = Vec::with_capacity(method.params.len());
    let mut write_array = None;

    for (index, param) in method.params.iter().enumerate() {
        let name = param
            .name
            .clone()
            .unwrap_or_else(|| format!("arg{}", index));
        let stripped = strip_qualifiers(&param.ty);
        let wire = classify(&stripped.ty);

        let kind = match wire {
            WireType::Scalar(ty) => ArgKind::Scalar(ty),
            WireType::FixedArray { elem, len } => ArgKind::FixedArray { elem, len },
            WireType::Vector(elem) => ArgKind::Vector(elem),
            WireType::Pointer(elem) => {
                match &write_params {
                    Some((pointer, length)) if *pointer == name => {
                        write_array = Some(WriteArray {
                            pointer: name,
                            pointer_index: index,
                            length: length.clone(),
                            element: elem,
                            is_const: stripped.is_const,
                        });
                    }
                    _ => {
                        return Err(GenError::PointerArgument {
                            device: device.to_string(),
                            operation: method.name.clone(),
                            argument: name,
                        })
                    }
                }
                continue;
            }
            WireType::Unsupported(reason) => return Err(unsupported(&param.ty, reason)),
            other => {
                return Err(unsupported(
                    &param.ty,
                    format!("{} is not accepted as an argument", other),
                ))
            }
        };

        arguments.push(ArgumentDescriptor {
            name,
            ty: stripped.ty,
            by_reference: stripped.by_reference,
            is_const: stripped.is_const,
            kind,
        });
    }

    if let Some((pointer, length)) = &write_params {
        let Some(wa) = &write_array else {
            return Err(malformed(
                "write_array",
                format!("'{}' is not a pointer parameter", pointer),
            ));
        };
        let Some(len_arg) = arguments.iter().position(|a| a.name == *length) else {
            return Err(malformed(
                "write_array",
                format!("'{}' is not a parameter", length),
            ));
        };
        if arguments[len_arg].kind != ArgKind::Scalar(ScalarType::U32) {
            return Err(malformed(
                "write_array",
                format!("length '{}' must be a uint32_t", length),
            ));
        }
        if len_arg + 1 != arguments.len() {
            return Err(malformed(
                "write_array",
                format!("length '{}' must be the last parameter", length),
            ));
        }
        if arguments.iter().any(|a| a.category() == ArgCategory::Vector) {
            return Err(GenError::Operation {
                device: device.to_string(),
                operation: method.name.clone(),
                reason: format!("write_array buffer '{}' cannot be combined with a vector argument", wa.pointer),
            });
        }
    }

    Ok(OperationDescriptor {
        tag: method.name.to_uppercase(),
        name: method.name.clone(),
        id,
        return_type: method.return_type.clone(),
        returns,
        io_type,
        arguments,
        write_array,
        read_array_length: read_length.flatten(),
        line: method.line,
    })
}
