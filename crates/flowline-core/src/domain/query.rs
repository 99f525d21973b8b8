//! Contact-search query grammar.
//!
//! Recipient queries for flow starts must parse against this grammar before
//! a start is admitted. Parsing produces a normalized query string; a
//! malformed query is reported with the parser's message, never swallowed.
//!
//! Grammar: conditions are `field op value` with ops `= != ~ > >= < <=`,
//! values are bare words or double-quoted strings, conditions combine with
//! `AND` / `OR` (implicit `AND` between adjacent conditions) and group with
//! parentheses. A bare word is shorthand for `name ~ value`.

use std::fmt;

use crate::{CoreError, CoreResult};

/// A parsed, normalized contact query
#[derive(Debug, Clone, PartialEq)]
pub struct ContactQuery {
    root: Node,
}

impl ContactQuery {
    /// Parse a raw query string
    pub fn parse(input: &str) -> CoreResult<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.parse_or()?;

        if parser.pos < parser.tokens.len() {
            return Err(CoreError::QueryError(format!(
                "Unexpected input at \"{}\"",
                parser.tokens[parser.pos]
            )));
        }

        Ok(Self { root })
    }

    /// The normalized query string
    pub fn as_string(&self) -> String {
        self.root.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Condition {
        field: String,
        op: String,
        value: String,
    },
    Bool {
        op: BoolOp,
        children: Vec<Node>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BoolOp {
    And,
    Or,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Condition { field, op, value } => {
                if value.contains(' ') || value.is_empty() {
                    write!(f, "{} {} \"{}\"", field, op, value)
                } else {
                    write!(f, "{} {} {}", field, op, value)
                }
            }
            Node::Bool { op, children } => {
                let sep = match op {
                    BoolOp::And => " AND ",
                    BoolOp::Or => " OR ",
                };
                let parts: Vec<String> = children
                    .iter()
                    .map(|c| match c {
                        Node::Bool { .. } => format!("({})", c),
                        _ => c.to_string(),
                    })
                    .collect();
                write!(f, "{}", parts.join(sep))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Op(String),
    LParen,
    RParen,
    And,
    Or,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "{}", w),
            Token::Quoted(q) => write!(f, "\"{}\"", q),
            Token::Op(o) => write!(f, "{}", o),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
        }
    }
}

fn tokenize(input: &str) -> CoreResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    value.push(c);
                }
                if !closed {
                    return Err(CoreError::QueryError(
                        "Unterminated string literal".to_string(),
                    ));
                }
                tokens.push(Token::Quoted(value));
            }
            '=' | '~' => {
                chars.next();
                tokens.push(Token::Op(ch.to_string()));
            }
            '!' | '<' | '>' => {
                chars.next();
                let mut op = ch.to_string();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    op.push('=');
                } else if ch == '!' {
                    return Err(CoreError::QueryError(
                        "Unexpected character: !".to_string(),
                    ));
                }
                tokens.push(Token::Op(op));
            }
            c if c.is_alphanumeric() || c == '_' || c == '+' || c == '-' || c == '.' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '+' || c == '-' || c == '.' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.to_uppercase().as_str() {
                    "AND" => tokens.push(Token::And),
                    "OR" => tokens.push(Token::Or),
                    _ => tokens.push(Token::Word(word)),
                }
            }
            c => {
                return Err(CoreError::QueryError(format!(
                    "Unexpected character: {}",
                    c
                )));
            }
        }
    }

    if tokens.is_empty() {
        return Err(CoreError::QueryError("Query cannot be empty".to_string()));
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn parse_or(&mut self) -> CoreResult<Node> {
        let mut children = vec![self.parse_and()?];

        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            children.push(self.parse_and()?);
        }

        if children.len() == 1 {
            Ok(children.pop().unwrap())
        } else {
            Ok(Node::Bool {
                op: BoolOp::Or,
                children,
            })
        }
    }

    fn parse_and(&mut self) -> CoreResult<Node> {
        let mut children = vec![self.parse_atom()?];

        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.pos += 1;
                    children.push(self.parse_atom()?);
                }
                // adjacent conditions are an implicit AND
                Some(Token::Word(_)) | Some(Token::Quoted(_)) | Some(Token::LParen) => {
                    children.push(self.parse_atom()?);
                }
                _ => break,
            }
        }

        if children.len() == 1 {
            Ok(children.pop().unwrap())
        } else {
            Ok(Node::Bool {
                op: BoolOp::And,
                children,
            })
        }
    }

    fn parse_atom(&mut self) -> CoreResult<Node> {
        match self.peek().cloned() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(CoreError::QueryError(
                        "Expected closing parenthesis".to_string(),
                    ));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(Token::Word(word)) => {
                self.pos += 1;
                if let Some(Token::Op(op)) = self.peek().cloned() {
                    self.pos += 1;
                    let value = match self.peek().cloned() {
                        Some(Token::Word(v)) => {
                            self.pos += 1;
                            v
                        }
                        Some(Token::Quoted(v)) => {
                            self.pos += 1;
                            v
                        }
                        _ => {
                            return Err(CoreError::QueryError(format!(
                                "Expected value after \"{} {}\"",
                                word, op
                            )));
                        }
                    };
                    Ok(Node::Condition {
                        field: word.to_lowercase(),
                        op,
                        value,
                    })
                } else {
                    // bare word is shorthand for a name match
                    Ok(Node::Condition {
                        field: "name".to_string(),
                        op: "~".to_string(),
                        value: word,
                    })
                }
            }
            Some(Token::Quoted(value)) => {
                self.pos += 1;
                Ok(Node::Condition {
                    field: "name".to_string(),
                    op: "~".to_string(),
                    value,
                })
            }
            Some(token) => Err(CoreError::QueryError(format!(
                "Unexpected input at \"{}\"",
                token
            ))),
            None => Err(CoreError::QueryError("Unexpected end of query".to_string())),
        }
    }
}
