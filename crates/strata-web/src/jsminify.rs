//! `jsminify` — JavaScript minification for generated component scripts.
//!
//! The minifier works in two stages:
//!
//! ## Stage 1: Tokenize
//!
//! Splits the source into words, numbers, punctuation, string literals,
//! template literals (nested `${}` included) and regular-expression
//! literals. Comments are dropped here and count as whitespace. Literal
//! contents are never inspected again, so nothing inside a string, template
//! or regex is ever touched.
//!
//! ## Stage 2: Join
//!
//! Re-emits the tokens. Tokens that were adjacent in the input stay
//! adjacent. Where whitespace separated two tokens it becomes:
//!
//! - a newline, if a line break sat between a token that can end a statement
//!   and one that can start one (automatic semicolon insertion may depend
//!   on it);
//! - a single space, if dropping it would merge the tokens (`a b`, `+ +`,
//!   `- -`, `/ /`, `/ *`, `1 .x`);
//! - nothing otherwise.
//!
//! # Constraints
//!
//! - Pure Rust, no shell-out to `node`/`esbuild`/`terser`.
//! - Never panics; malformed input returns [`MinifyError`].
//! - Identifiers and keywords are emitted unchanged.
//! - Deterministic and idempotent: `minify_js(minify_js(x)) == minify_js(x)`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MinifyError {
    #[error("unterminated string literal at byte {0}")]
    UnterminatedString(usize),
    #[error("unterminated template literal at byte {0}")]
    UnterminatedTemplate(usize),
    #[error("unterminated block comment at byte {0}")]
    UnterminatedComment(usize),
    #[error("unterminated regular expression at byte {0}")]
    UnterminatedRegex(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Number,
    Punct,
    Str,
    Template,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Whitespace or a comment preceded this token.
    pub spaced: bool,
    /// That whitespace contained a line break.
    pub newline: bool,
}

/// Words after which a `/` starts a regular expression.
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b == b'\\' || b >= 0x80
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token<'a>>,
    spaced: bool,
    newline: bool,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
            spaced: false,
            newline: false,
        }
    }

    fn at(&self, i: usize) -> Option<u8> {
        self.bytes.get(i).copied()
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token {
            kind,
            text: &self.src[start..self.pos],
            spaced: self.spaced,
            newline: self.newline,
        });
        self.spaced = false;
        self.newline = false;
    }

    fn run(mut self) -> Result<Vec<Token<'a>>, MinifyError> {
        while let Some(b) = self.at(self.pos) {
            let start = self.pos;
            match b {
                b'\n' | b'\r' => {
                    self.newline = true;
                    self.spaced = true;
                    self.pos += 1;
                }
                b if b.is_ascii_whitespace() => {
                    self.spaced = true;
                    self.pos += 1;
                }
                b'/' if self.at(start + 1) == Some(b'/') => {
                    while self.at(self.pos).is_some_and(|c| c != b'\n' && c != b'\r') {
                        self.pos += 1;
                    }
                    self.spaced = true;
                }
                b'/' if self.at(start + 1) == Some(b'*') => {
                    let body = &self.src[start + 2..];
                    let end = body.find("*/").ok_or(MinifyError::UnterminatedComment(start))?;
                    if body[..end].contains(['\n', '\r']) {
                        self.newline = true;
                    }
                    self.spaced = true;
                    self.pos = start + 2 + end + 2;
                }
                b'/' if self.regex_allowed() => {
                    self.pos = scan_regex(self.bytes, start)?;
                    self.push(TokenKind::Regex, start);
                }
                b'"' | b'\'' => {
                    self.pos = scan_string(self.bytes, start)?;
                    self.push(TokenKind::Str, start);
                }
                b'`' => {
                    self.pos = scan_template(self.bytes, start)?;
                    self.push(TokenKind::Template, start);
                }
                b'0'..=b'9' => {
                    self.pos = scan_number(self.bytes, start);
                    self.push(TokenKind::Number, start);
                }
                b'.' if self.at(start + 1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.pos = scan_number(self.bytes, start);
                    self.push(TokenKind::Number, start);
                }
                b if is_word_byte(b) => {
                    while self.at(self.pos).is_some_and(is_word_byte) {
                        self.pos += 1;
                    }
                    self.push(TokenKind::Word, start);
                }
                _ => {
                    self.pos += 1;
                    self.push(TokenKind::Punct, start);
                }
            }
        }
        Ok(self.tokens)
    }

    /// Whether a `/` at the current position opens a regex rather than
    /// dividing.
    fn regex_allowed(&self) -> bool {
        let Some(prev) = self.tokens.last() else {
            return true;
        };
        match prev.kind {
            TokenKind::Word => REGEX_PREFIX_KEYWORDS.contains(&prev.text),
            TokenKind::Number | TokenKind::Str | TokenKind::Template | TokenKind::Regex => false,
            TokenKind::Punct => match prev.text {
                ")" | "]" | "}" => false,
                "+" | "-" => !self.ends_with_postfix_update(),
                _ => true,
            },
        }
    }

    /// `x++ /` and `x-- /` divide.
    fn ends_with_postfix_update(&self) -> bool {
        let n = self.tokens.len();
        if n < 3 {
            return false;
        }
        let (operand, first, second) = (&self.tokens[n - 3], &self.tokens[n - 2], &self.tokens[n - 1]);
        let operand_ends = matches!(operand.kind, TokenKind::Word | TokenKind::Number)
            || matches!(operand.text, ")" | "]");
        operand_ends && first.text == second.text && !second.spaced
    }
}

fn scan_string(bytes: &[u8], start: usize) -> Result<usize, MinifyError> {
    let quote = bytes[start];
    let mut i = start + 1;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => i += 2,
            b'\n' | b'\r' => break,
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(MinifyError::UnterminatedString(start))
}

fn scan_template(bytes: &[u8], start: usize) -> Result<usize, MinifyError> {
    let mut i = start + 1;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => i += 2,
            b'`' => return Ok(i + 1),
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                i = scan_substitution(bytes, i + 2).ok_or(MinifyError::UnterminatedTemplate(start))?;
            }
            _ => i += 1,
        }
    }
    Err(MinifyError::UnterminatedTemplate(start))
}

/// Skips a `${ ... }` body; returns the index after its closing brace.
fn scan_substitution(bytes: &[u8], mut i: usize) -> Option<usize> {
    let mut depth = 1usize;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            b'"' | b'\'' => i = scan_string(bytes, i).ok()?,
            b'`' => i = scan_template(bytes, i).ok()?,
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let rest = bytes.get(i + 2..)?;
                let end = rest.windows(2).position(|w| w == b"*/")?;
                i += 2 + end + 2;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while bytes.get(i).is_some_and(|&c| c != b'\n') {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    None
}

fn scan_regex(bytes: &[u8], start: usize) -> Result<usize, MinifyError> {
    let mut i = start + 1;
    let mut in_class = false;
    loop {
        match bytes.get(i) {
            None | Some(b'\n') | Some(b'\r') => return Err(MinifyError::UnterminatedRegex(start)),
            Some(b'\\') => i += 2,
            Some(b'[') => {
                in_class = true;
                i += 1;
            }
            Some(b']') => {
                in_class = false;
                i += 1;
            }
            Some(b'/') if !in_class => {
                i += 1;
                break;
            }
            Some(_) => i += 1,
        }
    }
    while bytes.get(i).is_some_and(|b| b.is_ascii_alphabetic()) {
        i += 1;
    }
    Ok(i)
}

fn scan_number(bytes: &[u8], start: usize) -> usize {
    let hex = bytes.get(start) == Some(&b'0')
        && bytes.get(start + 1).is_some_and(|b| matches!(b, b'x' | b'X' | b'b' | b'B' | b'o' | b'O'));
    let mut i = start;
    while let Some(&b) = bytes.get(i) {
        let exponent_sign = !hex
            && matches!(b, b'+' | b'-')
            && i > start
            && matches!(bytes[i - 1], b'e' | b'E');
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
            i += 1;
        } else {
            break;
        }
    }
    i
}

/// Stage 1: splits `input` into tokens, dropping comments.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, MinifyError> {
    Lexer::new(input).run()
}

fn can_end_statement(t: &Token<'_>) -> bool {
    match t.kind {
        TokenKind::Punct => matches!(t.text, ")" | "]" | "}" | "+" | "-"),
        _ => true,
    }
}

fn can_start_statement(t: &Token<'_>) -> bool {
    match t.kind {
        TokenKind::Punct => matches!(
            t.text,
            "(" | "[" | "{" | "+" | "-" | "!" | "~" | "#" | "@"
        ),
        _ => true,
    }
}

fn needs_space(prev: &Token<'_>, next: &Token<'_>) -> bool {
    let (Some(last), Some(first)) = (prev.text.bytes().last(), next.text.bytes().next()) else {
        return false;
    };
    if prev.kind == TokenKind::Number && first == b'.' {
        return true;
    }
    if matches!(prev.kind, TokenKind::Str | TokenKind::Template) {
        return false;
    }
    // A word right after a regex would read as flags.
    if prev.kind == TokenKind::Regex && is_word_byte(first) {
        return true;
    }
    (is_word_byte(last) && is_word_byte(first))
        || (last == b'+' && first == b'+')
        || (last == b'-' && first == b'-')
        || (last == b'/' && matches!(first, b'/' | b'*'))
}

/// Stage 2: re-emits tokens with the minimum separators.
pub fn join(tokens: &[Token<'_>]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token<'_>> = None;
    for token in tokens {
        if let Some(p) = prev {
            if token.spaced {
                if token.newline && can_end_statement(p) && can_start_statement(token) {
                    out.push('\n');
                } else if needs_space(p, token) {
                    out.push(' ');
                }
            }
        }
        out.push_str(token.text);
        prev = Some(token);
    }
    out
}

/// Minifies a JavaScript source string.
pub fn minify_js(input: &str) -> Result<String, MinifyError> {
    let tokens = tokenize(input)?;
    Ok(join(&tokens))
}
