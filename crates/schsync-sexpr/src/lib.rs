//! Span-tracking S-expression support for schsync schematic files.
//!
//! Every node remembers its byte span in the source text, and numeric atoms
//! keep their original lexeme, so a parsed document can be re-emitted or
//! surgically patched without disturbing bytes the synchronizer never touched.
//!
//! The crate provides three layers:
//!
//! - [`parse`] / [`Sexp`] - the parser and tree, with field query helpers
//! - [`Sexp::walk`] / [`Sexp::walk_strings`] - traversal with ancestor context
//! - [`PatchSet`] - collected span replacements written in one forward pass

pub mod format;
pub mod patch;

pub use patch::{Patch, PatchSet};

use std::fmt;

/// Byte range of a node in its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Span for nodes built in memory rather than parsed.
    pub fn synthetic() -> Self {
        Self { start: 0, end: 0 }
    }

    pub fn is_synthetic(&self) -> bool {
        self.start == 0 && self.end == 0
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// The kind of S-expression value.
#[derive(Debug, Clone, PartialEq)]
pub enum SexpKind {
    /// Unquoted identifier
    Symbol(String),
    /// Quoted text
    Str(String),
    Int(i64),
    Float(f64),
    List(Vec<Sexp>),
}

/// An S-expression node with source span.
#[derive(Debug, Clone)]
pub struct Sexp {
    pub kind: SexpKind,
    pub span: Span,
    /// Original lexeme for numeric atoms, kept verbatim so that re-emitting a
    /// parsed document never rewrites `38.10` as `38.1`.
    pub raw: Option<String>,
}

impl PartialEq for Sexp {
    fn eq(&self, other: &Self) -> bool {
        // Structural equality only; spans and lexemes are presentation state.
        self.kind == other.kind
    }
}

impl Sexp {
    pub fn with_span(kind: SexpKind, span: Span) -> Self {
        Self {
            kind,
            span,
            raw: None,
        }
    }

    /// Create a symbol (unquoted atom) with a synthetic span.
    pub fn symbol(s: impl Into<String>) -> Self {
        Self::with_span(SexpKind::Symbol(s.into()), Span::synthetic())
    }

    /// Create a string (quoted atom) with a synthetic span.
    pub fn string(s: impl Into<String>) -> Self {
        Self::with_span(SexpKind::Str(s.into()), Span::synthetic())
    }

    pub fn int(n: i64) -> Self {
        Self::with_span(SexpKind::Int(n), Span::synthetic())
    }

    pub fn float(f: f64) -> Self {
        Self::with_span(SexpKind::Float(f), Span::synthetic())
    }

    pub fn list(items: Vec<Sexp>) -> Self {
        Self::with_span(SexpKind::List(items), Span::synthetic())
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, SexpKind::List(_))
    }

    /// Atom text for symbols and strings alike.
    pub fn as_atom(&self) -> Option<&str> {
        match &self.kind {
            SexpKind::Symbol(s) | SexpKind::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sym(&self) -> Option<&str> {
        match &self.kind {
            SexpKind::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            SexpKind::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match &self.kind {
            SexpKind::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match &self.kind {
            SexpKind::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Coerce either numeric atom kind into f64.
    ///
    /// Schematic files encode whole coordinates as ints and the rest as
    /// floats, so `(at 25 38.1 0)` mixes both.
    pub fn as_number(&self) -> Option<f64> {
        match &self.kind {
            SexpKind::Int(n) => Some(*n as f64),
            SexpKind::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexp]> {
        match &self.kind {
            SexpKind::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Sexp>> {
        match &mut self.kind {
            SexpKind::List(items) => Some(items),
            _ => None,
        }
    }

    /// Find the first direct child list `(name ...)`.
    pub fn find_child(&self, name: &str) -> Option<&[Sexp]> {
        child_list(self.as_list()?, name)
    }

    /// Find every direct child list `(name ...)`.
    pub fn find_children(&self, name: &str) -> Vec<&[Sexp]> {
        self.as_list()
            .map(|items| child_lists(items, name))
            .unwrap_or_default()
    }

    /// Depth-first traversal visiting every node once.
    ///
    /// The callback receives each node plus a [`WalkCtx`] with the ancestor
    /// stack and the node's index in its parent list. Patching code uses the
    /// context to decide whether a string sits in a patchable position, e.g.
    /// a net name inside `(label "NAME" ...)`.
    pub fn walk<F>(&self, mut f: F)
    where
        F: FnMut(&Sexp, WalkCtx<'_>),
    {
        fn recurse<'a, F>(
            node: &'a Sexp,
            stack: &mut Vec<&'a Sexp>,
            f: &mut F,
            index_in_parent: Option<usize>,
        ) where
            F: FnMut(&Sexp, WalkCtx<'_>),
        {
            f(
                node,
                WalkCtx {
                    ancestors: stack,
                    index_in_parent,
                },
            );
            if let Some(children) = node.as_list() {
                stack.push(node);
                for (i, child) in children.iter().enumerate() {
                    recurse(child, stack, f, Some(i));
                }
                stack.pop();
            }
        }

        let mut stack = Vec::new();
        recurse(self, &mut stack, &mut f, None);
    }

    /// Walk only quoted-string nodes, with value, span, and context.
    pub fn walk_strings<F>(&self, mut f: F)
    where
        F: FnMut(&str, Span, WalkCtx<'_>),
    {
        self.walk(|node, ctx| {
            if let SexpKind::Str(ref s) = node.kind {
                f(s, node.span, ctx);
            }
        });
    }
}

/// Ancestry context provided while walking a tree.
#[derive(Debug, Clone)]
pub struct WalkCtx<'a> {
    /// Ancestors from root to the current node's parent (root first).
    pub ancestors: &'a [&'a Sexp],
    /// Index of this node in its parent list, if any.
    pub index_in_parent: Option<usize>,
}

impl<'a> WalkCtx<'a> {
    pub fn parent(&self) -> Option<&'a Sexp> {
        self.ancestors.last().copied()
    }

    pub fn grandparent(&self) -> Option<&'a Sexp> {
        self.ancestors.len().checked_sub(2).map(|i| self.ancestors[i])
    }

    /// Tag (first symbol) of the parent list.
    pub fn parent_tag(&self) -> Option<&'a str> {
        self.parent()?.as_list()?.first()?.as_sym()
    }

    /// Tag (first symbol) of the grandparent list.
    pub fn grandparent_tag(&self) -> Option<&'a str> {
        self.grandparent()?.as_list()?.first()?.as_sym()
    }
}

/// Find the first direct child list `(name ...)` among `items`.
pub fn child_list<'a>(items: &'a [Sexp], name: &str) -> Option<&'a [Sexp]> {
    items.iter().find_map(|item| {
        let list = item.as_list()?;
        (list.first().and_then(Sexp::as_sym) == Some(name)).then_some(list)
    })
}

/// Find every direct child list `(name ...)` among `items`.
pub fn child_lists<'a>(items: &'a [Sexp], name: &str) -> Vec<&'a [Sexp]> {
    items
        .iter()
        .filter_map(|item| {
            let list = item.as_list()?;
            (list.first().and_then(Sexp::as_sym) == Some(name)).then_some(list)
        })
        .collect()
}

/// Read a string field `(tag "VALUE")`.
pub fn string_field<'a>(items: &'a [Sexp], tag: &str) -> Option<&'a str> {
    child_list(items, tag)?.get(1)?.as_str()
}

/// Read a symbol field `(tag value)`.
pub fn sym_field<'a>(items: &'a [Sexp], tag: &str) -> Option<&'a str> {
    child_list(items, tag)?.get(1)?.as_sym()
}

/// Read an integer field `(tag 123)`.
pub fn int_field(items: &[Sexp], tag: &str) -> Option<i64> {
    child_list(items, tag)?.get(1)?.as_int()
}

/// Read a numeric field `(tag 1.27)`, coercing ints.
pub fn number_field(items: &[Sexp], tag: &str) -> Option<f64> {
    child_list(items, tag)?.get(1)?.as_number()
}

/// Build a `(key value)` pair list.
pub fn kv<K: Into<String>, V: Into<Sexp>>(key: K, value: V) -> Sexp {
    Sexp::list(vec![Sexp::symbol(key), value.into()])
}

/// Incremental list construction for emitters.
#[derive(Debug, Default)]
pub struct ListBuilder {
    items: Vec<Sexp>,
}

impl ListBuilder {
    /// Start a named node: `ListBuilder::node("symbol")` -> `(symbol ...)`.
    pub fn node<N: Into<Sexp>>(name: N) -> Self {
        Self {
            items: vec![name.into()],
        }
    }

    pub fn push<V: Into<Sexp>>(&mut self, v: V) -> &mut Self {
        self.items.push(v.into());
        self
    }

    pub fn push_if<V: Into<Sexp>>(&mut self, cond: bool, v: V) -> &mut Self {
        if cond {
            self.items.push(v.into());
        }
        self
    }

    pub fn extend<I, V>(&mut self, iter: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Sexp>,
    {
        self.items.extend(iter.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Sexp {
        Sexp::list(self.items)
    }
}

impl From<&str> for Sexp {
    fn from(s: &str) -> Self {
        Self::symbol(s)
    }
}

impl From<String> for Sexp {
    fn from(s: String) -> Self {
        Self::symbol(s)
    }
}

impl From<i64> for Sexp {
    fn from(n: i64) -> Self {
        Sexp::int(n)
    }
}

impl From<u32> for Sexp {
    fn from(n: u32) -> Self {
        Sexp::int(n as i64)
    }
}

impl From<f64> for Sexp {
    fn from(f: f64) -> Self {
        Sexp::float(f)
    }
}

impl From<bool> for Sexp {
    fn from(b: bool) -> Self {
        Self::symbol(if b { "yes" } else { "no" })
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = format::format_tree(self);
        write!(f, "{}", formatted.trim_end_matches('\n'))
    }
}

/// Parse a single S-expression from `input`.
pub fn parse(input: &str) -> Result<Sexp, ParseError> {
    log::trace!("parsing {} bytes of s-expression input", input.len());
    let mut parser = Parser::new(input);
    let node = parser.parse_node()?;
    parser.skip_trivia();
    if !parser.at_end() {
        return Err(ParseError::new(
            ParseErrorKind::TrailingContent,
            parser.pos,
        ));
    }
    Ok(node)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn cur_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn parse_node(&mut self) -> Result<Sexp, ParseError> {
        self.skip_trivia();
        match self.peek() {
            None => Err(ParseError::new(ParseErrorKind::UnexpectedEof, self.pos)),
            Some(b'(') => self.parse_list(),
            Some(b'"') => self.parse_string(),
            Some(b')') => Err(ParseError::new(
                ParseErrorKind::UnexpectedChar(')'),
                self.pos,
            )),
            Some(_) => self.parse_atom(),
        }
    }

    fn parse_list(&mut self) -> Result<Sexp, ParseError> {
        let start = self.pos;
        self.pos += 1; // consume '('
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return Err(ParseError::new(ParseErrorKind::UnclosedList, start)),
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                _ => items.push(self.parse_node()?),
            }
        }
        Ok(Sexp::with_span(
            SexpKind::List(items),
            Span::new(start, self.pos),
        ))
    }

    fn parse_string(&mut self) -> Result<Sexp, ParseError> {
        let start = self.pos;
        self.pos += 1; // consume opening quote
        let mut out = String::new();
        loop {
            let Some(ch) = self.cur_char() else {
                return Err(ParseError::new(ParseErrorKind::UnterminatedString, start));
            };
            self.pos += ch.len_utf8();
            match ch {
                '"' => break,
                '\\' => {
                    let Some(esc) = self.cur_char() else {
                        return Err(ParseError::new(ParseErrorKind::UnterminatedString, start));
                    };
                    self.pos += esc.len_utf8();
                    match esc {
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }
        Ok(Sexp::with_span(
            SexpKind::Str(out),
            Span::new(start, self.pos),
        ))
    }

    fn parse_atom(&mut self) -> Result<Sexp, ParseError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'(' || b == b')' || b.is_ascii_whitespace() {
                break;
            }
            // Continuation bytes of multi-byte chars never match the break
            // set, so a plain byte advance stays on char boundaries at exit.
            self.pos += 1;
        }
        if self.pos == start {
            return Err(ParseError::new(ParseErrorKind::EmptyAtom, start));
        }

        let lexeme = &self.src[start..self.pos];
        let span = Span::new(start, self.pos);

        // Numbers first; anything non-numeric is a symbol.
        if let Ok(n) = lexeme.parse::<i64>() {
            let mut node = Sexp::with_span(SexpKind::Int(n), span);
            node.raw = Some(lexeme.to_string());
            Ok(node)
        } else if let Ok(f) = lexeme.parse::<f64>() {
            let mut node = Sexp::with_span(SexpKind::Float(f), span);
            node.raw = Some(lexeme.to_string());
            Ok(node)
        } else {
            Ok(Sexp::with_span(SexpKind::Symbol(lexeme.to_string()), span))
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else if b == b';' {
                // Line comment, through end of line.
                while let Some(b) = self.peek() {
                    self.pos += 1;
                    if b == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }
}

/// Errors produced while parsing, with the byte offset they occurred at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
}

impl ParseError {
    fn new(kind: ParseErrorKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedEof,
    UnexpectedChar(char),
    UnclosedList,
    UnterminatedString,
    EmptyAtom,
    TrailingContent,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParseErrorKind::UnexpectedEof => {
                write!(f, "unexpected end of input at byte {}", self.offset)
            }
            ParseErrorKind::UnexpectedChar(ch) => {
                write!(f, "unexpected '{}' at byte {}", ch, self.offset)
            }
            ParseErrorKind::UnclosedList => {
                write!(f, "unclosed list starting at byte {}", self.offset)
            }
            ParseErrorKind::UnterminatedString => {
                write!(f, "unterminated string starting at byte {}", self.offset)
            }
            ParseErrorKind::EmptyAtom => write!(f, "empty atom at byte {}", self.offset),
            ParseErrorKind::TrailingContent => {
                write!(f, "trailing content after document at byte {}", self.offset)
            }
        }
    }
}

impl std::error::Error for ParseError {}
