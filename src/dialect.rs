//! Parser for the loose JSON dialect used by theme files.
//!
//! Accepts `//` and `/* */` comments, trailing commas and unquoted keys.
//! The parser does not build values; it records byte spans for every node,
//! member key and separator so callers can edit the original text in place.

use thiserror::Error;

const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at byte {offset}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Half-open byte range into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn slice<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start..self.end]
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Object(Vec<Member>),
    Array(Vec<Node>),
    /// A quoted string literal; the span includes both quotes.
    String,
    /// Numbers, `true`, `false`, `null` and other bare words.
    Scalar,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn members(&self) -> Option<&[Member]> {
        match &self.kind {
            NodeKind::Object(members) => Some(members),
            _ => None,
        }
    }

    /// Span of a string literal's contents, without the quotes.
    pub fn string_inner(&self) -> Option<Span> {
        match self.kind {
            NodeKind::String => Some(Span::new(self.span.start + 1, self.span.end - 1)),
            _ => None,
        }
    }
}

/// One `key: value` pair of an object.
#[derive(Debug, Clone)]
pub struct Member {
    /// Span of the key token, including quotes when quoted.
    pub key_span: Span,
    pub value: Node,
    /// Offset of the comma following the value, if any.
    pub comma: Option<usize>,
}

impl Member {
    /// Key text with surrounding quotes removed. Escapes are left as written.
    pub fn key<'s>(&self, source: &'s str) -> &'s str {
        let raw = self.key_span.slice(source);
        raw.strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(raw)
    }

    pub fn start(&self) -> usize {
        self.key_span.start
    }

    /// End of the value, not including the trailing comma.
    pub fn end(&self) -> usize {
        self.value.span.end
    }

    /// Text between the key and the value, e.g. `":"` or `": "`.
    pub fn separator<'s>(&self, source: &'s str) -> &'s str {
        &source[self.key_span.end..self.value.span.start]
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub root: Node,
}

impl Document {
    /// Looks up a member of the root object by key.
    pub fn root_member(&self, source: &str, key: &str) -> Option<&Member> {
        self.root
            .members()?
            .iter()
            .find(|m| m.key(source) == key)
    }

    /// Depth-first search for object-valued members named `key`, in source order.
    pub fn find_objects<'d>(&'d self, source: &str, key: &str) -> Vec<&'d Member> {
        let mut found = Vec::new();
        collect_objects(&self.root, source, key, &mut found);
        found
    }
}

fn collect_objects<'d>(node: &'d Node, source: &str, key: &str, found: &mut Vec<&'d Member>) {
    match &node.kind {
        NodeKind::Object(members) => {
            for member in members {
                if member.key(source) == key && matches!(member.value.kind, NodeKind::Object(_)) {
                    found.push(member);
                }
                collect_objects(&member.value, source, key, found);
            }
        }
        NodeKind::Array(items) => {
            for item in items {
                collect_objects(item, source, key, found);
            }
        }
        NodeKind::String | NodeKind::Scalar => {}
    }
}

/// Parses `source` into a span tree.
pub fn parse(source: &str) -> Result<Document, ParseError> {
    let mut parser = Parser::new(source)?;
    let root = parser.parse_value()?;
    let (tok, span) = parser.current;
    if tok != Tok::Eof {
        return Err(ParseError::new(
            span.start,
            format!("unexpected {} after document", tok.describe()),
        ));
    }
    Ok(Document { root })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Str,
    Word,
    Eof,
}

impl Tok {
    fn describe(self) -> &'static str {
        match self {
            Tok::LBrace => "`{`",
            Tok::RBrace => "`}`",
            Tok::LBracket => "`[`",
            Tok::RBracket => "`]`",
            Tok::Colon => "`:`",
            Tok::Comma => "`,`",
            Tok::Str => "string",
            Tok::Word => "bare word",
            Tok::Eof => "end of input",
        }
    }
}

pub(crate) fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'+' | b'.' | b'$') || b >= 0x80
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn next_token(&mut self) -> Result<(Tok, Span), ParseError> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(&b) = self.bytes.get(start) else {
            return Ok((Tok::Eof, Span::new(start, start)));
        };
        let tok = match b {
            b'{' => Tok::LBrace,
            b'}' => Tok::RBrace,
            b'[' => Tok::LBracket,
            b']' => Tok::RBracket,
            b':' => Tok::Colon,
            b',' => Tok::Comma,
            b'"' => {
                self.scan_string()?;
                return Ok((Tok::Str, Span::new(start, self.pos)));
            }
            _ if is_word_byte(b) => {
                while self.bytes.get(self.pos).is_some_and(|&c| is_word_byte(c)) {
                    self.pos += 1;
                }
                return Ok((Tok::Word, Span::new(start, self.pos)));
            }
            _ => {
                return Err(ParseError::new(
                    start,
                    format!("unexpected character `{}`", b as char),
                ));
            }
        };
        self.pos += 1;
        Ok((tok, Span::new(start, self.pos)))
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.bytes.get(self.pos) {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') => match self.bytes.get(self.pos + 1) {
                    Some(b'/') => {
                        while self.bytes.get(self.pos).is_some_and(|&c| c != b'\n') {
                            self.pos += 1;
                        }
                    }
                    Some(b'*') => {
                        let start = self.pos;
                        self.pos += 2;
                        loop {
                            match self.bytes.get(self.pos) {
                                None => {
                                    return Err(ParseError::new(start, "unterminated block comment"));
                                }
                                Some(b'*') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                                    self.pos += 2;
                                    break;
                                }
                                Some(_) => self.pos += 1,
                            }
                        }
                    }
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            }
        }
    }

    fn scan_string(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.bytes.get(self.pos) {
                None => return Err(ParseError::new(start, "unterminated string")),
                Some(b'\\') => self.pos += 2,
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: (Tok, Span),
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self, ParseError> {
        // A leading byte-order mark is skipped, not removed, so spans still
        // index the original text.
        let pos = if source.starts_with('\u{feff}') {
            '\u{feff}'.len_utf8()
        } else {
            0
        };
        let mut lexer = Lexer {
            bytes: source.as_bytes(),
            pos,
        };
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            depth: 0,
        })
    }

    fn bump(&mut self) -> Result<(), ParseError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn enter(&mut self, offset: usize) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::new(offset, "nesting too deep"));
        }
        Ok(())
    }

    fn parse_value(&mut self) -> Result<Node, ParseError> {
        let (tok, span) = self.current;
        match tok {
            Tok::LBrace => self.parse_object(),
            Tok::LBracket => self.parse_array(),
            Tok::Str => {
                self.bump()?;
                Ok(Node {
                    kind: NodeKind::String,
                    span,
                })
            }
            Tok::Word => {
                self.bump()?;
                Ok(Node {
                    kind: NodeKind::Scalar,
                    span,
                })
            }
            Tok::Eof => Err(ParseError::new(span.start, "unexpected end of input")),
            _ => Err(ParseError::new(
                span.start,
                format!("expected a value, found {}", tok.describe()),
            )),
        }
    }

    fn parse_object(&mut self) -> Result<Node, ParseError> {
        let open = self.current.1.start;
        self.enter(open)?;
        self.bump()?;
        let mut members = Vec::new();

        loop {
            let (tok, key_span) = self.current;
            match tok {
                Tok::RBrace => {
                    self.bump()?;
                    self.depth -= 1;
                    return Ok(Node {
                        kind: NodeKind::Object(members),
                        span: Span::new(open, key_span.end),
                    });
                }
                Tok::Str | Tok::Word => {}
                Tok::Eof => return Err(ParseError::new(open, "unclosed object")),
                _ => {
                    return Err(ParseError::new(
                        key_span.start,
                        format!("expected an object key, found {}", tok.describe()),
                    ));
                }
            }
            self.bump()?;

            let (tok, span) = self.current;
            if tok != Tok::Colon {
                return Err(ParseError::new(
                    span.start,
                    format!("expected `:`, found {}", tok.describe()),
                ));
            }
            self.bump()?;

            let value = self.parse_value()?;
            let mut member = Member {
                key_span,
                value,
                comma: None,
            };

            let (tok, span) = self.current;
            match tok {
                Tok::Comma => {
                    member.comma = Some(span.start);
                    self.bump()?;
                }
                Tok::RBrace => {}
                Tok::Eof => return Err(ParseError::new(open, "unclosed object")),
                _ => {
                    return Err(ParseError::new(
                        span.start,
                        format!("expected `,` or `}}`, found {}", tok.describe()),
                    ));
                }
            }
            members.push(member);
        }
    }

    fn parse_array(&mut self) -> Result<Node, ParseError> {
        let open = self.current.1.start;
        self.enter(open)?;
        self.bump()?;
        let mut items = Vec::new();

        loop {
            let (tok, span) = self.current;
            match tok {
                Tok::RBracket => {
                    self.bump()?;
                    self.depth -= 1;
                    return Ok(Node {
                        kind: NodeKind::Array(items),
                        span: Span::new(open, span.end),
                    });
                }
                Tok::Eof => return Err(ParseError::new(open, "unclosed array")),
                _ => {}
            }

            items.push(self.parse_value()?);

            let (tok, span) = self.current;
            match tok {
                Tok::Comma => self.bump()?,
                Tok::RBracket => {}
                Tok::Eof => return Err(ParseError::new(open, "unclosed array")),
                _ => {
                    return Err(ParseError::new(
                        span.start,
                        format!("expected `,` or `]`, found {}", tok.describe()),
                    ));
                }
            }
        }
    }
}
