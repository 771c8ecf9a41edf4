//! A small JavaScript IR for generated glue code.
//!
//! Values never reach the output through string splicing: strings, numbers
//! and JSON go through [`Expr`] literal variants and are escaped on print,
//! and identifiers must pass [`Ident::new`]. The printer ([`JsWriter`])
//! emits readable, indented code; minification is a separate pass.

use serde_json::Value;
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a valid JavaScript identifier")]
pub struct InvalidIdent(pub String);

const RESERVED: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "import", "in", "instanceof", "let", "new", "null", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: &str) -> Result<Self, InvalidIdent> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if valid_start && valid_rest && !RESERVED.contains(&name) {
            Ok(Self(name.to_string()))
        } else {
            Err(InvalidIdent(name.to_string()))
        }
    }

    /// Maps arbitrary text onto a valid identifier with the given prefix.
    pub fn sanitized(prefix: &str, text: &str) -> Result<Self, InvalidIdent> {
        let body: String = text
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        Self::new(&format!("{prefix}{body}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(Ident),
    This,
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    /// Any JSON value, printed as an escaped literal.
    Json(Value),
    Member(Box<Expr>, Ident),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    New(Box<Expr>, Vec<Expr>),
    Arrow(Vec<Ident>, Vec<Stmt>),
    Assign(Box<Expr>, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Not(Box<Expr>),
    Object(Vec<(String, Expr)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    StrictEq,
    And,
    Or,
    Plus,
}

impl BinOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::StrictEq => "===",
            Self::And => "&&",
            Self::Or => "||",
            Self::Plus => "+",
        }
    }
}

impl Expr {
    pub fn ident(id: &Ident) -> Self {
        Self::Ident(id.clone())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    pub fn member(self, name: &Ident) -> Self {
        Self::Member(Box::new(self), name.clone())
    }

    pub fn index(self, key: Expr) -> Self {
        Self::Index(Box::new(self), Box::new(key))
    }

    pub fn call(self, args: Vec<Expr>) -> Self {
        Self::Call(Box::new(self), args)
    }

    pub fn method(self, name: &Ident, args: Vec<Expr>) -> Self {
        self.member(name).call(args)
    }

    pub fn new_with(self, args: Vec<Expr>) -> Self {
        Self::New(Box::new(self), args)
    }

    pub fn assign(self, value: Expr) -> Self {
        Self::Assign(Box::new(self), Box::new(value))
    }

    pub fn bin(self, op: BinOp, rhs: Expr) -> Self {
        Self::Binary(Box::new(self), op, Box::new(rhs))
    }

    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Const(Ident, Expr),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    Return(Option<Expr>),
    Class(Class),
    /// `(function () { "use strict"; ... })();`
    Iife(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: Ident,
    pub extends: Option<Expr>,
    pub methods: Vec<Method>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub body: Vec<Stmt>,
}

/// Escapes `s` as a double-quoted JavaScript string literal that is also
/// safe inside an HTML `<script>` element.
pub fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn number_literal(n: f64) -> String {
    if n.is_finite() {
        if n.fract() == 0.0 && n.abs() < 1e15 {
            format!("{}", n as i64)
        } else {
            format!("{n}")
        }
    } else {
        "null".to_string()
    }
}

/// JSON printed as a JavaScript expression. Keys and strings are escaped
/// with [`string_literal`] so the result is script-safe.
pub fn json_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => string_literal(s),
        Value::Array(items) => {
            let inner: Vec<_> = items.iter().map(json_literal).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", string_literal(k), json_literal(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

/// Pretty printer for [`Stmt`] trees.
#[derive(Debug, Default)]
pub struct JsWriter {
    out: String,
    depth: usize,
}

impl JsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub fn stmts(&mut self, stmts: &[Stmt]) -> &mut Self {
        for stmt in stmts {
            self.stmt(stmt);
        }
        self
    }

    pub fn stmt(&mut self, stmt: &Stmt) -> &mut Self {
        match stmt {
            Stmt::Expr(expr) => {
                let text = format!("{};", self.expr(expr));
                self.line(&text);
            }
            Stmt::Const(name, value) => {
                let text = format!("const {} = {};", name.as_str(), self.expr(value));
                self.line(&text);
            }
            Stmt::Return(None) => self.line("return;"),
            Stmt::Return(Some(value)) => {
                let text = format!("return {};", self.expr(value));
                self.line(&text);
            }
            Stmt::If(cond, then, otherwise) => {
                let text = format!("if ({}) {{", self.expr(cond));
                self.line(&text);
                self.block(then);
                if otherwise.is_empty() {
                    self.line("}");
                } else {
                    self.line("} else {");
                    self.block(otherwise);
                    self.line("}");
                }
            }
            Stmt::Class(class) => {
                let header = match &class.extends {
                    Some(base) => format!("class {} extends {} {{", class.name.as_str(), self.expr(base)),
                    None => format!("class {} {{", class.name.as_str()),
                };
                self.line(&header);
                self.depth += 1;
                for method in &class.methods {
                    let params: Vec<_> = method.params.iter().map(Ident::as_str).collect();
                    let text = format!("{}({}) {{", method.name.as_str(), params.join(", "));
                    self.line(&text);
                    self.block(&method.body);
                    self.line("}");
                }
                self.depth -= 1;
                self.line("}");
            }
            Stmt::Iife(body) => {
                self.line("(function () {");
                self.depth += 1;
                self.line("\"use strict\";");
                self.depth -= 1;
                self.block(body);
                self.line("})();");
            }
        }
        self
    }

    fn block(&mut self, stmts: &[Stmt]) {
        self.depth += 1;
        self.stmts(stmts);
        self.depth -= 1;
    }

    fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Ident(id) => id.as_str().to_string(),
            Expr::This => "this".to_string(),
            Expr::Str(s) => string_literal(s),
            Expr::Num(n) => number_literal(*n),
            Expr::Bool(b) => b.to_string(),
            Expr::Null => "null".to_string(),
            Expr::Json(value) => json_literal(value),
            Expr::Member(target, name) => format!("{}.{}", self.operand(target), name.as_str()),
            Expr::Index(target, key) => format!("{}[{}]", self.operand(target), self.expr(key)),
            Expr::Call(callee, args) => format!("{}({})", self.operand(callee), self.args(args)),
            Expr::New(callee, args) => format!("new {}({})", self.operand(callee), self.args(args)),
            Expr::Arrow(params, body) => {
                let params: Vec<_> = params.iter().map(Ident::as_str).collect();
                let mut inner = JsWriter {
                    out: String::new(),
                    depth: self.depth + 1,
                };
                inner.stmts(body);
                let indent = "  ".repeat(self.depth);
                format!("({}) => {{\n{}{}}}", params.join(", "), inner.out, indent)
            }
            Expr::Assign(target, value) => format!("{} = {}", self.expr(target), self.expr(value)),
            Expr::Binary(lhs, op, rhs) => format!(
                "{} {} {}",
                self.operand(lhs),
                op.as_str(),
                self.operand(rhs)
            ),
            Expr::Not(inner) => format!("!{}", self.operand(inner)),
            Expr::Object(fields) => {
                let inner: Vec<_> = fields
                    .iter()
                    .map(|(k, v)| format!("{}: {}", string_literal(k), self.expr(v)))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }

    /// Wraps compound expressions in parentheses when used as operands.
    fn operand(&self, expr: &Expr) -> String {
        match expr {
            Expr::Binary(..) | Expr::Assign(..) | Expr::Arrow(..) | Expr::Not(..) | Expr::New(..) => {
                format!("({})", self.expr(expr))
            }
            _ => self.expr(expr),
        }
    }

    fn args(&self, args: &[Expr]) -> String {
        args.iter()
            .map(|a| self.expr(a))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(name: &str) -> Ident {
        Ident::new(name).unwrap()
    }

    #[test]
    fn test_ident_validation() {
        assert!(Ident::new("Strata_tabs").is_ok());
        assert!(Ident::new("1abc").is_err());
        assert!(Ident::new("class").is_err());
        assert!(Ident::new("a-b").is_err());
        assert_eq!(Ident::sanitized("strata_", "my-tabs.v2").unwrap().as_str(), "strata_my_tabs_v2");
    }

    #[test]
    fn test_string_literal_cannot_close_script() {
        let lit = string_literal("</script><b>\"x\"\u{2028}");
        assert!(!lit.contains("</script>"));
        assert_eq!(lit, r#""\u003C/script\u003E\u003Cb\u003E\"x\"\u2028""#);
    }

    #[test]
    fn test_json_literal_escapes_keys() {
        let lit = json_literal(&json!({"</a>": [1, "b"]}));
        assert_eq!(lit, r#"{"\u003C/a\u003E": [1, "b"]}"#);
    }

    #[test]
    fn test_writer_prints_class_and_if() {
        let class = Stmt::Class(Class {
            name: id("Demo"),
            extends: Some(Expr::ident(&id("Base"))),
            methods: vec![Method {
                name: id("setup"),
                params: vec![],
                body: vec![Stmt::If(
                    Expr::This.member(&id("ready")).not(),
                    vec![Stmt::Return(None)],
                    vec![],
                )],
            }],
        });
        let mut w = JsWriter::new();
        w.stmt(&class);
        assert_eq!(
            w.finish(),
            "class Demo extends Base {\n  setup() {\n    if (!this.ready) {\n      return;\n    }\n  }\n}\n"
        );
    }

    #[test]
    fn test_arrow_and_call() {
        let cb = Expr::Arrow(
            vec![id("d")],
            vec![Stmt::Expr(Expr::ident(&id("log")).call(vec![Expr::str("a\nb"), Expr::Num(2.0)]))],
        );
        let call = Expr::This.method(&id("on"), vec![Expr::str("filter"), cb]);
        let mut w = JsWriter::new();
        w.stmt(&Stmt::Expr(call));
        assert_eq!(w.finish(), "this.on(\"filter\", (d) => {\n  log(\"a\\nb\", 2);\n});\n");
    }
}
