//! Formatting helpers for S-expressions.
//!
//! This module contains:
//! - A character-stream prettifier (`prettify`) producing the canonical
//!   schematic layout: tab indentation, one child list per line, `(xy ...)`
//!   runs packed onto shared lines
//! - A tree entrypoint (`format_tree`) that always formats via `prettify`
//!
//! There is exactly one output style. Saved files must be byte-stable across
//! repeated loads and saves, so the formatter takes no mode switches.

use crate::{Sexp, SexpKind};

const INDENT: u8 = b'\t';
const XY_COLUMN_LIMIT: usize = 99;
const TOKEN_WRAP_THRESHOLD: usize = 72;

/// Pretty-print raw S-expression text into the canonical schematic layout.
///
/// Whitespace in the input is normalized away; quoted strings pass through
/// untouched. `(xy ...)` point lists share a line until the column limit, and
/// the short-form text tokens (`font`, `stroke`, `fill`, `offset`) stay on
/// one line with their parent.
pub fn prettify(source: &str) -> String {
    Prettifier::new(source).run()
}

/// Byte-level state for one prettify pass.
struct Prettifier<'a> {
    bytes: &'a [u8],
    out: Vec<u8>,
    /// Open lists around the cursor.
    depth: usize,
    /// Output column the next byte lands in.
    column: usize,
    /// Last non-whitespace byte copied out, 0 before the first.
    prev: u8,
    in_quote: bool,
    /// The current whitespace run already produced its separator.
    gap_emitted: bool,
    /// The innermost list has broken onto multiple lines.
    wrapped: bool,
    /// The most recently opened child was an `(xy ...)` point.
    xy_run: bool,
    /// Depth at which the active short-form list opened, if any.
    inline_from: Option<usize>,
    /// Consecutive backslashes, for tracking escaped quotes.
    backslashes: usize,
}

impl<'a> Prettifier<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            bytes: source.as_bytes(),
            out: Vec::with_capacity(source.len()),
            depth: 0,
            column: 0,
            prev: 0,
            in_quote: false,
            gap_emitted: false,
            wrapped: false,
            xy_run: false,
            inline_from: None,
            backslashes: 0,
        }
    }

    fn run(mut self) -> String {
        for index in 0..self.bytes.len() {
            let byte = self.bytes[index];
            if is_whitespace(byte) && !self.in_quote {
                self.gap(index);
                continue;
            }
            self.gap_emitted = false;
            match byte {
                b'(' if !self.in_quote => self.open(index),
                b')' if !self.in_quote => self.close(),
                _ => self.literal(byte),
            }
            self.prev = byte;
        }

        // POSIX newline at EOF.
        self.out.push(b'\n');
        String::from_utf8(self.out).expect("formatter emitted non-UTF-8 output")
    }

    /// A whitespace run between tokens collapses to one separator: a space
    /// while the line is short or packing applies, otherwise a line break.
    /// Runs bordering a parenthesis emit nothing; `open` and `close` lay
    /// those out themselves.
    fn gap(&mut self, index: usize) {
        if self.gap_emitted || self.depth == 0 || self.prev == b'(' {
            return;
        }
        if matches!(next_token_byte(self.bytes, index + 1), b'(' | b')') {
            return;
        }
        if self.xy_run || self.column < TOKEN_WRAP_THRESHOLD {
            self.out.push(b' ');
            self.column += 1;
        } else if self.inline_from.is_some() {
            self.out.push(b' ');
        } else {
            self.break_line();
            self.wrapped = true;
        }
        self.gap_emitted = true;
    }

    fn open(&mut self, index: usize) {
        let xy = starts_xy(self.bytes, index);
        let packed = self.inline_from.is_some()
            || (self.xy_run && xy && self.column < XY_COLUMN_LIMIT);
        if self.out.is_empty() {
            self.out.push(b'(');
            self.column += 1;
        } else if packed {
            self.out.extend_from_slice(b" (");
            self.column += 2;
        } else {
            self.break_line();
            self.out.push(b'(');
            self.column += 1;
        }

        self.xy_run = xy;
        if starts_short_form(self.bytes, index) {
            self.inline_from = Some(self.depth);
        }
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.inline_from.is_some() {
            self.out.push(b')');
            self.column += 1;
        } else if self.prev == b')' || self.wrapped {
            // A list that held child lists, or wrapped, closes on its own line.
            self.break_line();
            self.out.push(b')');
            self.column += 1;
            self.wrapped = false;
        } else {
            self.out.push(b')');
            self.column += 1;
        }
        if self.inline_from == Some(self.depth) {
            self.inline_from = None;
        }
    }

    fn literal(&mut self, byte: u8) {
        if byte == b'\\' {
            self.backslashes += 1;
        } else {
            if byte == b'"' && self.backslashes % 2 == 0 {
                self.in_quote = !self.in_quote;
            }
            self.backslashes = 0;
        }
        self.out.push(byte);
        self.column += 1;
    }

    /// Start a fresh line indented one tab per open list.
    fn break_line(&mut self) {
        self.out.push(b'\n');
        self.out.extend(std::iter::repeat_n(INDENT, self.depth));
        self.column = self.depth;
    }
}

/// Format an S-expression tree through the canonical prettifier.
///
/// The returned string includes a trailing newline.
pub fn format_tree(sexp: &Sexp) -> String {
    let mut compact = String::new();
    write_compact(sexp, &mut compact);
    prettify(&compact)
}

fn write_compact(sexp: &Sexp, out: &mut String) {
    match &sexp.kind {
        SexpKind::Symbol(s) => out.push_str(s),
        SexpKind::Str(s) => out.push_str(&quote_string(s)),
        SexpKind::Int(n) => match sexp.raw.as_deref() {
            Some(raw) => out.push_str(raw),
            None => out.push_str(&n.to_string()),
        },
        SexpKind::Float(f) => match sexp.raw.as_deref() {
            Some(raw) => out.push_str(raw),
            None => out.push_str(&trim_float(f.to_string())),
        },
        SexpKind::List(items) => {
            out.push('(');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(' ');
                }
                write_compact(item, out);
            }
            out.push(')');
        }
    }
}

/// Quote a string value, escaping special characters.
pub fn quote_string(value: &str) -> String {
    format!("\"{}\"", escape_string(value))
}

pub(crate) fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        let escaped = match ch {
            '"' => Some("\\\""),
            '\\' => Some("\\\\"),
            '\n' => Some("\\n"),
            '\r' => Some("\\r"),
            '\t' => Some("\\t"),
            _ => None,
        };
        match escaped {
            Some(text) => out.push_str(text),
            None => out.push(ch),
        }
    }
    out
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

/// First non-whitespace byte at or after `index`, 0 at end of input.
fn next_token_byte(bytes: &[u8], index: usize) -> u8 {
    bytes[index..]
        .iter()
        .copied()
        .find(|&byte| !is_whitespace(byte))
        .unwrap_or(0)
}

/// True when the list opening at `open` is an `(xy ...)` point.
fn starts_xy(bytes: &[u8], open: usize) -> bool {
    bytes.get(open + 1..open + 4) == Some(b"xy ".as_slice())
}

/// Short-form lists keep all their children on one line with them.
fn starts_short_form(bytes: &[u8], open: usize) -> bool {
    let rest = &bytes[open + 1..];
    let end = rest
        .iter()
        .position(|byte| !byte.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    matches!(&rest[..end], b"font" | b"stroke" | b"fill" | b"offset")
}

/// Drop trailing zeros (and a bare trailing dot) from a float lexeme.
fn trim_float(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else if trimmed.len() == s.len() {
        s
    } else {
        trimmed.to_string()
    }
}
