//! Pattern tokenizer.
//!
//! Splits a pattern string into [`Lexeme`]s with byte offsets. Context-free
//! except for a few multi-character openers (`(?:`, `(?$name`, `(?m)`), the
//! relation operators and bare values after `:`; the parser decides what a
//! token means in place.
//!
//! A bare value runs up to whitespace or one of `[ ] ( ) { } | & , : " /`, so
//! tags such as `PRP$`, `-LRB-` or `3rd` need no quotes.

use super::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    /// `(?:`
    NonCapture,
    /// `(?$name`
    NamedGroup(String),
    /// `(?m)`
    MultiNode,
    Pipe,
    Amp,
    Bang,
    Star,
    Plus,
    Question,
    Comma,
    Colon,
    DoubleColon,
    Arrow,
    /// One of `<`, `<=`, `>`, `>=`, `==`, `!=`.
    Rel(String),
    Caret,
    /// A `$` not followed by a name.
    Dollar,
    Var(String),
    Func(String),
    Backref(usize),
    Str(String),
    Regex(String),
    Ident(String),
    Number(String),
    Eof,
}

impl Tok {
    /// Short human-readable form for error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("identifier `{s}`"),
            Tok::Number(s) => format!("number `{s}`"),
            Tok::Str(s) => format!("string \"{s}\""),
            Tok::Regex(s) => format!("regex /{s}/"),
            Tok::Var(s) => format!("`${s}`"),
            Tok::Func(s) => format!("`#{s}`"),
            Tok::Eof => "end of pattern".to_string(),
            other => format!("{other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lexeme {
    pub tok: Tok,
    pub offset: usize,
}

const RELATIONS: &[&str] = &["<", "<=", ">", ">=", "==", "!="];

pub(crate) fn tokenize(src: &str) -> Result<Vec<Lexeme>, CompileError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < src.len() {
        let rest = &src[pos..];
        let Some(c) = rest.chars().next() else {
            break;
        };
        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }
        let start = pos;
        if matches!(out.last(), Some(Lexeme { tok: Tok::Colon, .. })) && c != '"' && c != '/' {
            if let Some(m) = regex!(r#"^[^\s\[\](){}|&,:"/]+"#).find(rest) {
                out.push(Lexeme { tok: Tok::Ident(m.as_str().to_string()), offset: start });
                pos += m.len();
                continue;
            }
        }
        let (tok, len) = match c {
            '[' => (Tok::LBracket, 1),
            ']' => (Tok::RBracket, 1),
            '{' => (Tok::LBrace, 1),
            '}' => (Tok::RBrace, 1),
            ')' => (Tok::RParen, 1),
            '*' => (Tok::Star, 1),
            '+' => (Tok::Plus, 1),
            '?' => (Tok::Question, 1),
            ',' => (Tok::Comma, 1),
            '^' => (Tok::Caret, 1),
            '|' => (Tok::Pipe, if rest.starts_with("||") { 2 } else { 1 }),
            '&' => (Tok::Amp, if rest.starts_with("&&") { 2 } else { 1 }),
            ':' if rest.starts_with("::") => (Tok::DoubleColon, 2),
            ':' => (Tok::Colon, 1),
            '(' => lex_group_open(src, rest, start)?,
            '!' if rest.starts_with("!=") => (Tok::Rel("!=".to_string()), 2),
            '!' => (Tok::Bang, 1),
            '<' | '>' | '=' => {
                let op = regex!(r"^[<>=!~]+").find(rest).map_or("", |m| m.as_str());
                if op == "=>" {
                    (Tok::Arrow, 2)
                } else if RELATIONS.contains(&op) {
                    (Tok::Rel(op.to_string()), op.len())
                } else {
                    return Err(CompileError::UnknownRelation { op: op.to_string(), offset: start });
                }
            }
            '"' => {
                let (text, len) = lex_quoted(src, rest, start, '"')?;
                (Tok::Str(text), len)
            }
            '/' => {
                let (text, len) = lex_quoted(src, rest, start, '/')?;
                (Tok::Regex(text), len)
            }
            '\\' => match regex!(r"^\\([0-9]+)").captures(rest) {
                Some(caps) => {
                    let digits = &caps[1];
                    let group = digits
                        .parse::<usize>()
                        .map_err(|_| CompileError::syntax(src, start, "backreference number is too large"))?;
                    (Tok::Backref(group), digits.len() + 1)
                }
                None => return Err(CompileError::syntax(src, start, "expected a group number after `\\`")),
            },
            '$' => match ident_at(&rest[1..]) {
                Some(name) => (Tok::Var(name.to_string()), name.len() + 1),
                None => (Tok::Dollar, 1),
            },
            '#' => match ident_at(&rest[1..]) {
                Some(name) => (Tok::Func(name.to_string()), name.len() + 1),
                None => return Err(CompileError::syntax(src, start, "expected a function name after `#`")),
            },
            _ => {
                if let Some(m) = regex!(r"^-?[0-9]+(?:\.[0-9]+)?").find(rest) {
                    (Tok::Number(m.as_str().to_string()), m.len())
                } else if let Some(name) = ident_at(rest) {
                    (Tok::Ident(name.to_string()), name.len())
                } else {
                    return Err(CompileError::syntax(src, start, format!("unexpected character `{c}`")));
                }
            }
        };
        out.push(Lexeme { tok, offset: start });
        pos += len;
    }
    out.push(Lexeme { tok: Tok::Eof, offset: src.len() });
    Ok(out)
}

fn ident_at(text: &str) -> Option<&str> {
    regex!(r"^[\p{L}_][\p{L}\p{N}_\-]*").find(text).map(|m| m.as_str())
}

fn lex_group_open(src: &str, rest: &str, start: usize) -> Result<(Tok, usize), CompileError> {
    if rest.starts_with("(?:") {
        return Ok((Tok::NonCapture, 3));
    }
    if rest.starts_with("(?m)") {
        return Ok((Tok::MultiNode, 4));
    }
    if let Some(after) = rest.strip_prefix("(?$") {
        return match ident_at(after) {
            Some(name) => Ok((Tok::NamedGroup(name.to_string()), name.len() + 3)),
            None => {
                let bad: String = after.chars().take_while(|c| !c.is_whitespace() && *c != ')').collect();
                Err(CompileError::InvalidGroupName { name: bad, offset: start + 3 })
            }
        };
    }
    if rest.starts_with("(?") {
        return Err(CompileError::syntax(src, start, "unknown group flag"));
    }
    Ok((Tok::LParen, 1))
}

/// Read a `"string"` or `/regex/` starting at the opening delimiter.
///
/// In strings `\x` stands for `x`. In regexes only `\/` is unescaped; every
/// other escape is passed to the regex engine untouched.
fn lex_quoted(src: &str, rest: &str, start: usize, delim: char) -> Result<(String, usize), CompileError> {
    let mut text = String::new();
    let mut chars = rest.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        if c == delim {
            return Ok((text, i + 1));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, next)) if next == delim || delim == '"' => text.push(next),
                Some((_, next)) => {
                    text.push('\\');
                    text.push(next);
                }
                None => break,
            }
        } else {
            text.push(c);
        }
    }
    let what = if delim == '"' { "unterminated string literal" } else { "unterminated regex literal" };
    Err(CompileError::syntax(src, start, what))
}
