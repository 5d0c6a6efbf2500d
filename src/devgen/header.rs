//! Minimal C++ header reader.
//!
//! Only what device headers need: class/struct declarations, access
//! specifiers and member function signatures. Comments, preprocessor
//! lines, inline bodies, member templates, nested types and operators are
//! skipped. Every declaration keeps the line of its first token so pragmas
//! can be matched by adjacency.

use super::error::{GenError, GenResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Number(String),
    Literal,
    /// `::`
    Scope,
    Sym(char),
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

impl Token {
    fn is_sym(&self, c: char) -> bool {
        self.tok == Tok::Sym(c)
    }

    fn is_ident(&self, word: &str) -> bool {
        matches!(&self.tok, Tok::Ident(w) if w == word)
    }

    fn ident(&self) -> Option<&str> {
        match &self.tok {
            Tok::Ident(w) => Some(w),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    /// `None` for unnamed parameters
    pub name: Option<String>,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub name: String,
    pub line: usize,
    pub return_type: String,
    pub params: Vec<ParamDecl>,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    pub name: String,
    pub line: usize,
    pub methods: Vec<MethodDecl>,
}

/// Parse every class and struct declared in `source`.
///
/// `origin` only labels errors (usually the header path).
pub fn parse_header(source: &str, origin: &str) -> GenResult<Vec<ClassDecl>> {
    let tokens = tokenize(source, origin)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        origin,
    };
    parser.top_level()
}

fn tokenize(source: &str, origin: &str) -> GenResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    let mut line_start = true;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            line += 1;
            line_start = true;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Preprocessor line, with backslash continuations
        if c == '#' && line_start {
            while i < chars.len() && chars[i] != '\n' {
                if chars[i] == '\\' && chars.get(i + 1) == Some(&'\n') {
                    line += 1;
                    i += 1;
                }
                i += 1;
            }
            continue;
        }

        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if c == '/' && chars.get(i + 1) == Some(&'*') {
            let start = line;
            i += 2;
            loop {
                match chars.get(i) {
                    None => {
                        return Err(GenError::Parse {
                            origin: origin.to_string(),
                            line: start,
                            reason: "unterminated comment".to_string(),
                        })
                    }
                    Some('*') if chars.get(i + 1) == Some(&'/') => {
                        i += 2;
                        break;
                    }
                    Some('\n') => line += 1,
                    Some(_) => {}
                }
                i += 1;
            }
            continue;
        }

        line_start = false;
        let tok_line = line;

        if c == '"' || c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                if chars.get(i) == Some(&'\n') {
                    line += 1;
                }
                i += 1;
            }
            if i >= chars.len() {
                return Err(GenError::Parse {
                    origin: origin.to_string(),
                    line: tok_line,
                    reason: "unterminated literal".to_string(),
                });
            }
            i += 1;
            tokens.push(Token {
                tok: Tok::Literal,
                line: tok_line,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token {
                tok: Tok::Ident(chars[start..i].iter().collect()),
                line: tok_line,
            });
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token {
                tok: Tok::Number(chars[start..i].iter().collect()),
                line: tok_line,
            });
            continue;
        }

        if c == ':' && chars.get(i + 1) == Some(&':') {
            tokens.push(Token {
                tok: Tok::Scope,
                line: tok_line,
            });
            i += 2;
            continue;
        }

        tokens.push(Token {
            tok: Tok::Sym(c),
            line: tok_line,
        });
        i += 1;
    }

    Ok(tokens)
}

/// Specifiers that never belong to the return type.
const DECL_SPECIFIERS: &[&str] = &[
    "virtual", "static", "inline", "explicit", "constexpr", "friend", "extern", "mutable",
];

/// Words that name a type and therefore cannot be a parameter name.
const TYPE_WORDS: &[&str] = &[
    "void", "bool", "char", "short", "int", "long", "unsigned", "signed", "float", "double",
    "const", "volatile", "auto",
];

const QUALIFIERS: &[&str] = &["const", "volatile"];

/// Tokens that may directly precede a function body.
const BODY_PRECEDERS: &[&str] = &["const", "override", "final", "noexcept"];

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    origin: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    fn error(&self, line: usize, reason: impl Into<String>) -> GenError {
        GenError::Parse {
            origin: self.origin.to_string(),
            line,
            reason: reason.into(),
        }
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map(|t| t.line).unwrap_or(1)
    }

    fn top_level(&mut self) -> GenResult<Vec<ClassDecl>> {
        let mut classes = Vec::new();

        while let Some(token) = self.peek() {
            match &token.tok {
                Tok::Ident(word) if word == "namespace" => {
                    // namespace a::b { ... } is transparent
                    self.pos += 1;
                    while let Some(t) = self.peek() {
                        if t.is_sym('{') || t.is_sym(';') || t.is_sym('=') {
                            break;
                        }
                        self.pos += 1;
                    }
                    match self.peek() {
                        Some(t) if t.is_sym('{') => self.pos += 1,
                        _ => self.skip_declaration()?,
                    }
                }
                Tok::Ident(word) if word == "extern" && matches!(self.peek_at(1), Some(t) if t.tok == Tok::Literal) => {
                    self.pos += 2;
                    if matches!(self.peek(), Some(t) if t.is_sym('{')) {
                        self.pos += 1;
                    }
                }
                Tok::Ident(word) if word == "template" => {
                    self.pos += 1;
                    self.skip_angles()?;
                    self.skip_declaration()?;
                }
                Tok::Ident(word) if word == "class" || word == "struct" => {
                    if let Some(class) = self.class_declaration()? {
                        classes.push(class);
                    }
                }
                Tok::Sym('}') | Tok::Sym(';') => self.pos += 1,
                _ => self.skip_declaration()?,
            }
        }

        Ok(classes)
    }

    /// Parse `class Name [final] [: bases] { ... };`. Forward declarations
    /// and anonymous types yield `None`.
    fn class_declaration(&mut self) -> GenResult<Option<ClassDecl>> {
        let tokens = self.tokens;
        let keyword = &tokens[self.pos];
        let is_struct = keyword.is_ident("struct");
        let line = keyword.line;
        self.pos += 1;

        let name = match self.peek().and_then(Token::ident) {
            Some(name) => name.to_string(),
            None => {
                self.skip_declaration()?;
                return Ok(None);
            }
        };
        self.pos += 1;

        while let Some(t) = self.peek() {
            if t.is_sym('{') || t.is_sym(';') {
                break;
            }
            self.pos += 1;
        }
        match self.peek() {
            Some(t) if t.is_sym(';') => {
                self.pos += 1;
                return Ok(None);
            }
            Some(_) => self.pos += 1,
            None => return Err(self.error(line, format!("unterminated declaration of {}", name))),
        }

        let methods = self.class_body(&name, is_struct, line)?;

        // Trailing declarators up to ';'
        while let Some(t) = self.peek() {
            self.pos += 1;
            if t.is_sym(';') {
                break;
            }
        }

        Ok(Some(ClassDecl {
            name,
            line,
            methods,
        }))
    }

    fn class_body(&mut self, class: &str, is_struct: bool, line: usize) -> GenResult<Vec<MethodDecl>> {
        let mut is_public = is_struct;
        let mut methods = Vec::new();

        loop {
            let Some(token) = self.peek() else {
                return Err(self.error(line, format!("missing '}}' closing class {}", class)));
            };

            match &token.tok {
                Tok::Sym('}') => {
                    self.pos += 1;
                    return Ok(methods);
                }
                Tok::Sym(';') => self.pos += 1,
                Tok::Ident(word)
                    if matches!(word.as_str(), "public" | "private" | "protected")
                        && matches!(self.peek_at(1), Some(t) if t.is_sym(':')) =>
                {
                    is_public = word == "public";
                    self.pos += 2;
                }
                Tok::Ident(word) if word == "template" => {
                    self.pos += 1;
                    self.skip_angles()?;
                    self.skip_declaration()?;
                }
                Tok::Ident(word)
                    if matches!(
                        word.as_str(),
                        "using" | "typedef" | "friend" | "static_assert" | "enum" | "union" | "class" | "struct"
                    ) =>
                {
                    self.skip_declaration()?;
                }
                _ => {
                    if let Some(method) = self.member(class, is_public)? {
                        methods.push(method);
                    }
                }
            }
        }
    }

    /// One member declaration. Returns the method it declares, if any.
    fn member(&mut self, class: &str, is_public: bool) -> GenResult<Option<MethodDecl>> {
        let tokens = self.tokens;
        let start = self.pos;
        let line = tokens[start].line;
        let mut depth = 0usize;

        while let Some(t) = self.peek() {
            match t.tok {
                Tok::Sym('(') | Tok::Sym('[') => depth += 1,
                Tok::Sym(')') | Tok::Sym(']') => depth = depth.saturating_sub(1),
                Tok::Sym(';') | Tok::Sym('{') | Tok::Sym('}') if depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }

        let decl = &tokens[start..self.pos];
        let method = self.function_signature(decl, class, is_public);

        match self.peek() {
            Some(t) if t.is_sym(';') => self.pos += 1,
            Some(t) if t.is_sym('{') => {
                let in_init_list = method
                    .as_ref()
                    .map(|_| has_initializer_list(decl))
                    .unwrap_or(false);
                if in_init_list {
                    self.skip_initializer_list()?;
                } else {
                    self.skip_braces()?;
                    if method.is_none() {
                        // Brace-initialized data member
                        self.skip_declaration()?;
                    } else if matches!(self.peek(), Some(t) if t.is_sym(';')) {
                        self.pos += 1;
                    }
                }
            }
            // '}' closes the class, handled by the caller
            Some(_) => {}
            None => return Err(self.error(line, format!("unterminated member of {}", class))),
        }

        Ok(method)
    }

    fn function_signature(&self, decl: &[Token], class: &str, is_public: bool) -> Option<MethodDecl> {
        if decl.iter().any(|t| t.is_ident("operator")) {
            return None;
        }

        let open = decl.iter().position(|t| t.is_sym('('))?;
        if open == 0 {
            return None;
        }
        let name_token = &decl[open - 1];
        let mut name = name_token.ident()?.to_string();
        if TYPE_WORDS.contains(&name.as_str()) {
            // Function pointer member such as `void (*cb)(int)`
            return None;
        }

        let mut ret_end = open - 1;
        if ret_end > 0 && decl[ret_end - 1].is_sym('~') {
            name = format!("~{}", name);
            ret_end -= 1;
        }

        let close = matching_paren(decl, open)?;
        let params = split_params(&decl[open + 1..close])
            .into_iter()
            .map(param_decl)
            .collect::<Vec<_>>();
        let params = match params.as_slice() {
            [single] if single.name.is_none() && single.ty == "void" => Vec::new(),
            _ => params,
        };

        let ret_tokens: Vec<Token> = strip_specifiers(&decl[..ret_end]);
        let mut return_type = render_type(&ret_tokens);

        // Trailing return type: auto f() -> T
        let trailing = &decl[close + 1..];
        if let Some(arrow) = trailing
            .windows(2)
            .position(|w| w[0].is_sym('-') && w[1].is_sym('>'))
        {
            let tail: Vec<Token> = trailing[arrow + 2..]
                .iter()
                .take_while(|t| !t.is_ident("override") && !t.is_ident("final") && !t.is_sym('='))
                .cloned()
                .collect();
            if return_type == "auto" {
                return_type = render_type(&tail);
            }
        }

        if return_type.is_empty() && name != class && !name.starts_with('~') {
            return None;
        }

        Some(MethodDecl {
            name,
            line: decl.first().map(|t| t.line).unwrap_or(0),
            return_type,
            params,
            is_public,
        })
    }

    /// Skip everything up to and including the next `;` at depth 0, or a
    /// complete `{ ... }` block (plus a following `;`).
    fn skip_declaration(&mut self) -> GenResult<()> {
        let line = self.peek().map(|t| t.line).unwrap_or_else(|| self.last_line());
        let mut parens = 0usize;
        while let Some(t) = self.peek() {
            match t.tok {
                Tok::Sym('(') => parens += 1,
                Tok::Sym(')') => parens = parens.saturating_sub(1),
                Tok::Sym(';') if parens == 0 => {
                    self.pos += 1;
                    return Ok(());
                }
                Tok::Sym('{') if parens == 0 => {
                    let is_body = self.pos > 0 && {
                        let prev = &self.tokens[self.pos - 1];
                        prev.is_sym(')') || BODY_PRECEDERS.iter().any(|w| prev.is_ident(w))
                    };
                    self.skip_braces()?;
                    if matches!(self.peek(), Some(t) if t.is_sym(';')) {
                        self.pos += 1;
                        return Ok(());
                    }
                    if is_body {
                        return Ok(());
                    }
                    // `enum E { ... } e;` and friends run on to ';'
                    continue;
                }
                Tok::Sym('}') if parens == 0 => return Ok(()),
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.error(line, "unterminated declaration"))
    }

    /// Skip a balanced `{ ... }` starting at the current `{`.
    fn skip_braces(&mut self) -> GenResult<()> {
        let line = self.peek().map(|t| t.line).unwrap_or_else(|| self.last_line());
        let mut depth = 0usize;
        while let Some(t) = self.peek() {
            self.pos += 1;
            if t.is_sym('{') {
                depth += 1;
            } else if t.is_sym('}') {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
        Err(self.error(line, "unbalanced braces"))
    }

    /// Skip a balanced `< ... >` starting at the current `<`.
    fn skip_angles(&mut self) -> GenResult<()> {
        let line = self.peek().map(|t| t.line).unwrap_or_else(|| self.last_line());
        if !matches!(self.peek(), Some(t) if t.is_sym('<')) {
            return Ok(());
        }
        let mut depth = 0usize;
        while let Some(t) = self.peek() {
            self.pos += 1;
            if t.is_sym('<') {
                depth += 1;
            } else if t.is_sym('>') {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
        Err(self.error(line, "unbalanced template parameter list"))
    }

    /// Constructor initializer list: `member{init}` groups are skipped
    /// until the `{` that opens the body.
    fn skip_initializer_list(&mut self) -> GenResult<()> {
        loop {
            let prev_is_init = self.pos > 0 && {
                let prev = &self.tokens[self.pos - 1];
                prev.ident().is_some() || prev.is_sym('>')
            };
            self.skip_braces()?;
            if !prev_is_init {
                return Ok(());
            }
            let line = self.peek().map(|t| t.line).unwrap_or_else(|| self.last_line());
            let mut depth = 0usize;
            loop {
                match self.peek() {
                    None => return Err(self.error(line, "unterminated constructor")),
                    Some(t) if t.is_sym('(') => depth += 1,
                    Some(t) if t.is_sym(')') => depth = depth.saturating_sub(1),
                    Some(t) if t.is_sym('{') && depth == 0 => break,
                    Some(_) => {}
                }
                self.pos += 1;
            }
        }
    }
}

fn has_initializer_list(decl: &[Token]) -> bool {
    let Some(open) = decl.iter().position(|t| t.is_sym('(')) else {
        return false;
    };
    let Some(close) = matching_paren(decl, open) else {
        return false;
    };
    decl[close + 1..].iter().any(|t| t.is_sym(':'))
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, t) in tokens.iter().enumerate().skip(open) {
        if t.is_sym('(') {
            depth += 1;
        } else if t.is_sym(')') {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}

fn strip_specifiers(tokens: &[Token]) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        // [[attribute]]
        if tokens[i].is_sym('[') && tokens.get(i + 1).map(|t| t.is_sym('[')).unwrap_or(false) {
            while i < tokens.len() && !(tokens[i].is_sym(']') && tokens.get(i + 1).map(|t| t.is_sym(']')).unwrap_or(false)) {
                i += 1;
            }
            i += 2;
            continue;
        }
        match tokens[i].ident() {
            Some(word) if DECL_SPECIFIERS.contains(&word) => {}
            _ => out.push(tokens[i].clone()),
        }
        i += 1;
    }
    out
}

fn split_params(tokens: &[Token]) -> Vec<&[Token]> {
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut params = Vec::new();
    let mut depth = 0isize;
    let mut start = 0;
    for (idx, t) in tokens.iter().enumerate() {
        match t.tok {
            Tok::Sym('<') | Tok::Sym('(') | Tok::Sym('{') | Tok::Sym('[') => depth += 1,
            Tok::Sym('>') | Tok::Sym(')') | Tok::Sym('}') | Tok::Sym(']') => depth -= 1,
            Tok::Sym(',') if depth == 0 => {
                params.push(&tokens[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    params.push(&tokens[start..]);
    params
}

fn param_decl(tokens: &[Token]) -> ParamDecl {
    // Drop the default value
    let mut depth = 0isize;
    let mut end = tokens.len();
    for (idx, t) in tokens.iter().enumerate() {
        match t.tok {
            Tok::Sym('<') | Tok::Sym('(') | Tok::Sym('{') => depth += 1,
            Tok::Sym('>') | Tok::Sym(')') | Tok::Sym('}') => depth -= 1,
            Tok::Sym('=') if depth == 0 => {
                end = idx;
                break;
            }
            _ => {}
        }
    }
    let tokens = &tokens[..end];

    if let Some((last, rest)) = tokens.split_last() {
        let named = match last.ident() {
            Some(word) => {
                !rest.is_empty()
                    && !TYPE_WORDS.contains(&word)
                    && !matches!(rest.last(), Some(t) if t.tok == Tok::Scope)
                    && rest.iter().any(|t| match t.ident() {
                        Some(w) => !QUALIFIERS.contains(&w),
                        None => t.tok == Tok::Scope || t.is_sym('>'),
                    })
            }
            None => false,
        };
        if named {
            return ParamDecl {
                name: last.ident().map(str::to_string),
                ty: render_type(rest),
            };
        }
    }

    ParamDecl {
        name: None,
        ty: render_type(tokens),
    }
}

/// Canonical spelling of a type: single spaces between words, `" *"` for
/// pointers, `", "` between template arguments.
fn render_type(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Tok> = None;
    for t in tokens {
        match &t.tok {
            Tok::Ident(word) | Tok::Number(word) => {
                if matches!(prev, Some(Tok::Ident(_)) | Some(Tok::Number(_)) | Some(Tok::Sym('*')) | Some(Tok::Sym('&')) | Some(Tok::Sym('>'))) {
                    out.push(' ');
                }
                out.push_str(word);
            }
            Tok::Literal => {}
            Tok::Scope => out.push_str("::"),
            Tok::Sym(',') => out.push_str(", "),
            Tok::Sym(c @ '*') | Tok::Sym(c @ '&') => {
                if !matches!(prev, Some(Tok::Sym('*')) | Some(Tok::Sym('&')) | None) {
                    out.push(' ');
                }
                out.push(*c);
            }
            Tok::Sym(c) => out.push(*c),
        }
        prev = Some(&t.tok);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATH: &str = r#"
#ifndef __MATH_HPP__
#define __MATH_HPP__

#include <array>
#include <vector>

namespace devices {

/* Arithmetic test device */
class Math : public Base<Math>
{
  public:
    Math(Context& ctx_) : ctx(ctx_), data{0} {}
    ~Math() {}

    uint32_t add(uint32_t a, uint32_t b) { return a + b; }
    bool set_buffer(const std::vector<uint32_t>& buf);
    float dot(std::array<float, 3> v, float k = 1.0f) const;
    const char* name();
    void reset(void);
    static uint32_t count(std::uint64_t);
    Math& operator=(const Math&) = delete;
    template<typename T> T get() { return T{}; }
    auto next(uint32_t x) -> uint32_t;

  private:
    uint32_t hidden();
    Context& ctx;
    std::array<uint32_t, 4> data;
};

} // namespace devices

#endif
"#;

    #[test]
    fn test_parse_class() {
        let classes = parse_header(MATH, "math.hpp").unwrap();
        assert_eq!(classes.len(), 1);
        let class = &classes[0];
        assert_eq!(class.name, "Math");

        let names: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Math", "~Math", "add", "set_buffer", "dot", "name", "reset", "count", "next", "hidden"]
        );
        assert!(!class.methods.iter().find(|m| m.name == "hidden").unwrap().is_public);
    }

    #[test]
    fn test_signatures() {
        let classes = parse_header(MATH, "math.hpp").unwrap();
        let method = |name: &str| classes[0].methods.iter().find(|m| m.name == name).unwrap().clone();

        let add = method("add");
        assert_eq!(add.return_type, "uint32_t");
        assert_eq!(add.line, 17);
        assert_eq!(
            add.params,
            vec![
                ParamDecl {
                    name: Some("a".into()),
                    ty: "uint32_t".into()
                },
                ParamDecl {
                    name: Some("b".into()),
                    ty: "uint32_t".into()
                },
            ]
        );

        let buf = method("set_buffer");
        assert_eq!(buf.params[0].ty, "const std::vector<uint32_t> &");

        let dot = method("dot");
        assert_eq!(dot.return_type, "float");
        assert_eq!(dot.params[0].ty, "std::array<float, 3>");
        assert_eq!(dot.params[1].name.as_deref(), Some("k"));

        assert_eq!(method("name").return_type, "const char *");
        assert!(method("reset").params.is_empty());
        assert_eq!(method("count").params[0].name, None);
        assert_eq!(method("count").params[0].ty, "std::uint64_t");
        assert_eq!(method("next").return_type, "uint32_t");
    }

    #[test]
    fn test_struct_defaults_public() {
        let classes = parse_header("struct S { void f(); };\nclass C { void g(); };", "s.hpp").unwrap();
        assert!(classes[0].methods[0].is_public);
        assert!(!classes[1].methods[0].is_public);
    }

    #[test]
    fn test_forward_declaration_skipped() {
        let classes = parse_header("class Fwd;\nstruct Ctx;\nclass Real { public: void f(); };", "x.hpp").unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "Real");
    }

    #[test]
    fn test_unterminated_class() {
        let err = parse_header("class Broken {\n public:\n void f();\n", "broken.hpp").unwrap_err();
        assert!(matches!(err, GenError::Parse { .. }));
    }
}
