//! Pragma extraction and directive parsing.
//!
//! Two pure passes: `extract_pragmas` lists every `#pragma <namespace> ...`
//! line, `associate` binds a pragma to the declaration on the very next
//! line. A pragma with no declaration right below it is ignored.

use super::error::{GenError, GenResult};

/// Default pragma namespace.
pub const DEFAULT_NAMESPACE: &str = "devlink";

/// One pragma line (1-based line number).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pragma {
    pub line: usize,
    pub directive: String,
}

pub fn extract_pragmas(source: &str, namespace: &str) -> Vec<Pragma> {
    source
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let rest = line.trim_start().strip_prefix('#')?.trim_start();
            let rest = rest.strip_prefix("pragma")?;
            if !rest.starts_with(char::is_whitespace) {
                return None;
            }
            let rest = rest.trim_start().strip_prefix(namespace)?;
            if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
                return None;
            }
            Some(Pragma {
                line: idx + 1,
                directive: rest.trim().to_string(),
            })
        })
        .collect()
}

/// Pragma placed on the line right above `decl_line`, if any.
pub fn associate(pragmas: &[Pragma], decl_line: usize) -> Option<&Pragma> {
    pragmas.iter().find(|p| p.line + 1 == decl_line)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Drop the method from the operation list
    Exclude,
    /// Health check of the device
    IsFailed,
    /// Handshake transfer of the result, with an optional length expression
    ReadArray { length: Option<String> },
    /// Handshake transfer of an input buffer
    WriteArray { pointer: String, length: String },
}

/// Directive parse failure, completed with device context by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    Unknown,
    Malformed {
        directive: &'static str,
        reason: String,
    },
}

impl DirectiveError {
    pub fn into_gen_error(self, pragma: &Pragma, device: &str, operation: &str) -> GenError {
        match self {
            DirectiveError::Unknown => GenError::UnknownDirective {
                device: device.to_string(),
                operation: operation.to_string(),
                line: pragma.line,
                directive: pragma.directive.clone(),
            },
            DirectiveError::Malformed { directive, reason } => GenError::MalformedDirective {
                device: device.to_string(),
                operation: operation.to_string(),
                line: pragma.line,
                directive,
                reason,
            },
        }
    }
}

impl Directive {
    pub fn parse(text: &str) -> Result<Directive, DirectiveError> {
        let text = text.trim();
        let (keyword, rest) = match text.find(char::is_whitespace) {
            Some(pos) => (&text[..pos], text[pos..].trim()),
            None => (text, ""),
        };

        match keyword {
            "exclude" if rest.is_empty() => Ok(Directive::Exclude),
            "is_failed" if rest.is_empty() => Ok(Directive::IsFailed),
            "exclude" | "is_failed" => Err(DirectiveError::Malformed {
                directive: if keyword == "exclude" { "exclude" } else { "is_failed" },
                reason: format!("unexpected parameters '{}'", rest),
            }),
            "read_array" => Ok(Directive::ReadArray {
                length: (!rest.is_empty()).then(|| rest.to_string()),
            }),
            "write_array" => {
                let tokens: Vec<&str> = rest.split_whitespace().collect();
                if tokens.len() != 2 {
                    return Err(DirectiveError::Malformed {
                        directive: "write_array",
                        reason: format!("expected 2 parameters, found {}", tokens.len()),
                    });
                }
                let pointer = arg_reference(tokens[0])?;
                let length = arg_reference(tokens[1])?;
                Ok(Directive::WriteArray { pointer, length })
            }
            _ => Err(DirectiveError::Unknown),
        }
    }
}

fn arg_reference(token: &str) -> Result<String, DirectiveError> {
    token
        .strip_prefix("arg{")
        .and_then(|t| t.strip_suffix('}'))
        .map(str::trim)
        .filter(|name| !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_'))
        .map(str::to_string)
        .ok_or_else(|| DirectiveError::Malformed {
            directive: "write_array",
            reason: format!("'{}' is not of the form arg{{<name>}}", token),
        })
}

/// Translate a length expression into C++: `arg{x}` reads the parsed
/// argument, `this{expr}` reads a device member.
pub fn length_expr_to_cpp(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut rest = expr;
    loop {
        let next = [("arg{", "args."), ("this{", "THIS->")]
            .iter()
            .filter_map(|(open, repl)| rest.find(open).map(|pos| (pos, *open, *repl)))
            .min_by_key(|(pos, _, _)| *pos);
        let Some((pos, open, repl)) = next else {
            out.push_str(rest);
            return out;
        };
        let body_start = pos + open.len();
        let Some(close) = rest[body_start..].find('}') else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..pos]);
        out.push_str(repl);
        out.push_str(&rest[body_start..body_start + close]);
        rest = &rest[body_start + close + 1..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "class Foo {
  public:
    #pragma devlink exclude
    void hidden();
    # pragma devlink read_array 2*arg{n_pts}
    const float* samples(uint32_t n_pts);
    #pragma other exclude
    #pragma devlinkx exclude
    void shown();
};";

    #[test]
    fn test_extract_pragmas() {
        let pragmas = extract_pragmas(HEADER, DEFAULT_NAMESPACE);
        assert_eq!(
            pragmas,
            vec![
                Pragma {
                    line: 3,
                    directive: "exclude".into()
                },
                Pragma {
                    line: 5,
                    directive: "read_array 2*arg{n_pts}".into()
                },
            ]
        );
    }

    #[test]
    fn test_strict_adjacency() {
        let pragmas = extract_pragmas(HEADER, DEFAULT_NAMESPACE);
        assert_eq!(associate(&pragmas, 4).map(|p| p.line), Some(3));
        assert_eq!(associate(&pragmas, 6).map(|p| p.line), Some(5));
        assert!(associate(&pragmas, 5).is_none());
        assert!(associate(&pragmas, 9).is_none());
    }

    #[test]
    fn test_parse_directives() {
        assert_eq!(Directive::parse("exclude"), Ok(Directive::Exclude));
        assert_eq!(Directive::parse(" is_failed "), Ok(Directive::IsFailed));
        assert_eq!(
            Directive::parse("read_array"),
            Ok(Directive::ReadArray { length: None })
        );
        assert_eq!(
            Directive::parse("write_array arg{data} arg{len}"),
            Ok(Directive::WriteArray {
                pointer: "data".into(),
                length: "len".into()
            })
        );
        assert_eq!(Directive::parse("frobnicate"), Err(DirectiveError::Unknown));
    }

    #[test]
    fn test_malformed_write_array() {
        assert!(matches!(
            Directive::parse("write_array arg{data}"),
            Err(DirectiveError::Malformed { directive: "write_array", .. })
        ));
        assert!(matches!(
            Directive::parse("write_array data len"),
            Err(DirectiveError::Malformed { .. })
        ));
    }

    #[test]
    fn test_length_expr() {
        assert_eq!(length_expr_to_cpp("2*arg{n_pts}"), "2*args.n_pts");
        assert_eq!(length_expr_to_cpp("this{data.size()}"), "THIS->data.size()");
        assert_eq!(length_expr_to_cpp("arg{a} + this{b}"), "args.a + THIS->b");
    }
}
