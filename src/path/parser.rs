//! Recursive-descent parser for knowledge path expressions.

use miette::Diagnostic;
use thiserror::Error;

use super::{IndexExpr, IndexKey, KnowledgePath, PathRoot, PathSegment};

/// Errors produced while parsing a path expression.
#[derive(Debug, Error, Diagnostic)]
pub enum PathParseError {
    #[error("empty path expression")]
    #[diagnostic(code(murmuration::path::empty))]
    Empty,

    #[error("unexpected character '{found}' at offset {at}")]
    #[diagnostic(
        code(murmuration::path::unexpected_char),
        help("segments are identifiers, optionally followed by [index]")
    )]
    UnexpectedChar { found: char, at: usize },

    #[error("unexpected end of path (expected {expected})")]
    #[diagnostic(code(murmuration::path::unexpected_end))]
    UnexpectedEnd { expected: &'static str },

    #[error("role prefix '{prefix}.' must be followed by a segment")]
    #[diagnostic(code(murmuration::path::bare_prefix))]
    BarePrefix { prefix: &'static str },

    #[error("index literal at offset {at} is out of range")]
    #[diagnostic(code(murmuration::path::index_out_of_range))]
    IndexOutOfRange { at: usize },
}

/// Parse a path expression such as `position.x`, `requests[7]`, or
/// `coord.incomingRequests[member.request.requestId]`.
pub fn parse(input: &str) -> Result<KnowledgePath, PathParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut parser = Parser { chars, pos: 0 };
    let path = parser.path()?;
    match parser.peek() {
        None => Ok(path),
        Some(c) => Err(PathParseError::UnexpectedChar {
            found: c,
            at: parser.pos,
        }),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn path(&mut self) -> Result<KnowledgePath, PathParseError> {
        if self.peek().is_none() {
            return Err(PathParseError::Empty);
        }
        let root = self.role_prefix()?;
        let mut segments = vec![self.segment()?];
        while self.peek() == Some('.') {
            self.bump();
            segments.push(self.segment()?);
        }
        Ok(KnowledgePath { root, segments })
    }

    /// Consumes a leading `coord.` / `member.` token if present.
    ///
    /// The prefix only counts when followed by a dot; a lone `coord` is an
    /// ordinary field name.
    fn role_prefix(&mut self) -> Result<PathRoot, PathParseError> {
        for (token, root) in [
            ("coord", PathRoot::Coordinator),
            ("member", PathRoot::Member),
        ] {
            if self.lookahead_is_prefix(token) {
                self.pos += token.len() + 1;
                if self.peek().is_none() || self.peek() == Some(']') {
                    return Err(PathParseError::BarePrefix {
                        prefix: if root == PathRoot::Coordinator {
                            "coord"
                        } else {
                            "member"
                        },
                    });
                }
                return Ok(root);
            }
        }
        Ok(PathRoot::Local)
    }

    fn lookahead_is_prefix(&self, token: &str) -> bool {
        let token_chars: Vec<char> = token.chars().collect();
        let end = self.pos + token_chars.len();
        if self.chars.get(self.pos..end) != Some(&token_chars[..]) {
            return false;
        }
        self.chars.get(end) == Some(&'.')
    }

    fn segment(&mut self) -> Result<PathSegment, PathParseError> {
        let name = self.identifier()?;
        let index = if self.peek() == Some('[') {
            self.bump();
            let index = self.index()?;
            match self.bump() {
                Some(']') => Some(index),
                Some(c) => {
                    return Err(PathParseError::UnexpectedChar {
                        found: c,
                        at: self.pos - 1,
                    });
                }
                None => return Err(PathParseError::UnexpectedEnd { expected: "']'" }),
            }
        } else {
            None
        };
        Ok(PathSegment { name, index })
    }

    fn index(&mut self) -> Result<IndexExpr, PathParseError> {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(c) = self.peek() {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    digits.push(c);
                    self.bump();
                }
                let pos = digits
                    .parse::<usize>()
                    .map_err(|_| PathParseError::IndexOutOfRange { at: self.pos })?;
                Ok(IndexExpr::Literal(IndexKey::Pos(pos)))
            }
            Some(_) => Ok(IndexExpr::Path(Box::new(self.path()?))),
            None => Err(PathParseError::UnexpectedEnd {
                expected: "an index expression",
            }),
        }
    }

    fn identifier(&mut self) -> Result<String, PathParseError> {
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            Some(c) => {
                return Err(PathParseError::UnexpectedChar {
                    found: c,
                    at: self.pos,
                });
            }
            None => {
                return Err(PathParseError::UnexpectedEnd {
                    expected: "an identifier",
                });
            }
        }
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            self.bump();
        }
        Ok(name)
    }
}
