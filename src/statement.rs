//! Query templates with `:name` placeholders.
//!
//! A template is split once into literal text and placeholder spans. The
//! spans drive both renderings: the prepared form, where each span becomes
//! the dialect's positional marker, and literal substitution (see
//! [`crate::binder::bind_literal`]), where each span becomes an escaped value.
//!
//! Placeholders are not recognised inside quoted strings, quoted identifiers
//! or comments, and `::` (a PostgreSQL cast) is left alone.

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use std::fmt;

pub const PLACEHOLDER_SIGIL: u8 = b':';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl StatementKind {
    /// Classify by the leading keyword, skipping whitespace, comments and
    /// opening parentheses.
    pub fn classify(template: &str) -> Self {
        let bytes = template.as_bytes();
        let mut i = 0;
        loop {
            while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'(') {
                i += 1;
            }
            if bytes[i..].starts_with(b"--") {
                i = skip_line_comment(bytes, i);
            } else if bytes[i..].starts_with(b"/*") {
                match skip_block_comment(bytes, i) {
                    Ok(end) => i = end,
                    Err(_) => return StatementKind::Other,
                }
            } else {
                break;
            }
        }
        let end = bytes[i..]
            .iter()
            .position(|b| !b.is_ascii_alphabetic())
            .map_or(bytes.len(), |p| i + p);
        match template[i..end].to_ascii_lowercase().as_str() {
            "select" => StatementKind::Select,
            "insert" => StatementKind::Insert,
            "update" => StatementKind::Update,
            "delete" => StatementKind::Delete,
            _ => StatementKind::Other,
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Other => "other",
        })
    }
}

/// A piece of a split template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Text(String),
    Placeholder(String),
}

/// A select template compiled for one dialect. Read-only once built.
#[derive(Debug, Clone)]
pub struct CompiledStatement {
    template: String,
    dialect: Dialect,
    kind: StatementKind,
    segments: Vec<Segment>,
    placeholder_names: Vec<String>,
    prepared_sql: String,
}

impl CompiledStatement {
    pub fn compile(template: &str, dialect: Dialect) -> Result<Self> {
        let kind = StatementKind::classify(template);
        if kind != StatementKind::Select {
            return Err(Error::UnsupportedStatementKind(kind));
        }

        let segments = split_template(template, dialect)?;
        let mut placeholder_names = Vec::new();
        let mut prepared_sql = String::with_capacity(template.len());
        for segment in &segments {
            match segment {
                Segment::Text(text) => prepared_sql.push_str(text),
                Segment::Placeholder(name) => {
                    placeholder_names.push(name.clone());
                    prepared_sql.push_str(&dialect.placeholder(placeholder_names.len()));
                }
            }
        }

        Ok(Self {
            template: template.to_string(),
            dialect,
            kind,
            segments,
            placeholder_names,
            prepared_sql,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Placeholder names in order of occurrence, repeats included.
    pub fn placeholder_names(&self) -> &[String] {
        &self.placeholder_names
    }

    /// The template with every placeholder replaced by a positional marker.
    pub fn prepared_sql(&self) -> &str {
        &self.prepared_sql
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

fn split_template(template: &str, dialect: Dialect) -> Result<Vec<Segment>> {
    let bytes = template.as_bytes();
    let backslash_escapes = dialect == Dialect::MySql;
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut terminator: Option<usize> = None;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i..].starts_with(b"--") {
            i = skip_line_comment(bytes, i);
            continue;
        }
        if bytes[i..].starts_with(b"/*") {
            i = skip_block_comment(bytes, i)?;
            continue;
        }
        if let Some(end) = terminator {
            if !bytes[i].is_ascii_whitespace() && bytes[i] != b';' {
                return Err(Error::Compilation {
                    offset: i,
                    reason: format!("only one statement is allowed, the first ends at byte {end}"),
                });
            }
            i += 1;
            continue;
        }

        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i = skip_quoted(bytes, i, quote, backslash_escapes)?;
            }
            b';' => {
                terminator = Some(i);
                i += 1;
            }
            PLACEHOLDER_SIGIL if bytes.get(i + 1) == Some(&PLACEHOLDER_SIGIL) => i += 2,
            PLACEHOLDER_SIGIL if bytes.get(i + 1).is_some_and(|b| is_ident_start(*b)) => {
                let start = i + 1;
                let end = bytes[start..]
                    .iter()
                    .position(|b| !is_ident_continue(*b))
                    .map_or(bytes.len(), |p| start + p);
                if text_start < i {
                    segments.push(Segment::Text(template[text_start..i].to_string()));
                }
                segments.push(Segment::Placeholder(template[start..end].to_string()));
                i = end;
                text_start = end;
            }
            _ => i += 1,
        }
    }

    if text_start < bytes.len() {
        segments.push(Segment::Text(template[text_start..].to_string()));
    }
    Ok(segments)
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Index just past the closing quote. A doubled quote is an escaped quote.
fn skip_quoted(bytes: &[u8], open: usize, quote: u8, backslash_escapes: bool) -> Result<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
        } else if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
            } else {
                return Ok(i + 1);
            }
        } else {
            i += 1;
        }
    }
    Err(Error::Compilation {
        offset: open,
        reason: format!("unterminated {} quote", quote as char),
    })
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |p| start + p + 1)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> Result<usize> {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map(|p| start + 2 + p + 2)
        .ok_or_else(|| Error::Compilation {
            offset: start,
            reason: "unterminated block comment".to_string(),
        })
}
