//! Tokenizer for the expression core
//!
//! Turns an expression body (without delimiters) into a token stream with
//! byte offsets. Offsets are relative to the expression body, which is what
//! validation reports expect.

use crate::error::{ExpressionError, Result};

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Dollar,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    In,
    True,
    False,
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
}

/// A token together with its lexeme and byte offset
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub lexeme: String,
    pub pos: usize,
}

struct Cursor<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    idx: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            idx: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).map(|&(_, c)| c)
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.idx + 1).map(|&(_, c)| c)
    }

    /// Byte offset of the current character, or the end of input.
    fn pos(&self) -> usize {
        self.chars
            .get(self.idx)
            .map(|&(i, _)| i)
            .unwrap_or(self.src.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.idx += 1;
        }
        c
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().map(&pred) == Some(true) {
            self.idx += 1;
        }
    }
}

/// Tokenize an expression body
///
/// Fails with [`ExpressionError::Lexical`] on the first character that does
/// not start a token.
pub fn tokenize(src: &str) -> Result<Vec<SpannedToken>> {
    let mut cursor = Cursor::new(src);
    let mut tokens = Vec::new();

    while let Some(c) = cursor.peek() {
        if c.is_whitespace() {
            cursor.bump();
            continue;
        }

        let start = cursor.pos();
        let token = match c {
            '$' => one(&mut cursor, Token::Dollar),
            '.' => one(&mut cursor, Token::Dot),
            ',' => one(&mut cursor, Token::Comma),
            '(' => one(&mut cursor, Token::LParen),
            ')' => one(&mut cursor, Token::RParen),
            '[' => one(&mut cursor, Token::LBracket),
            ']' => one(&mut cursor, Token::RBracket),
            '+' => one(&mut cursor, Token::Plus),
            '-' => one(&mut cursor, Token::Minus),
            '*' => one(&mut cursor, Token::Star),
            '/' => one(&mut cursor, Token::Slash),
            '%' => one(&mut cursor, Token::Percent),
            '=' => one(&mut cursor, Token::Eq),
            '!' => {
                cursor.bump();
                if cursor.peek() == Some('=') {
                    cursor.bump();
                    Token::Ne
                } else {
                    return Err(ExpressionError::Lexical { ch: '!', pos: start });
                }
            }
            '<' => {
                cursor.bump();
                if cursor.peek() == Some('=') {
                    cursor.bump();
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                cursor.bump();
                if cursor.peek() == Some('=') {
                    cursor.bump();
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            quote @ ('\'' | '"') => {
                cursor.bump();
                let mut value = String::new();
                loop {
                    match cursor.bump() {
                        None => return Err(ExpressionError::UnterminatedString { pos: start }),
                        Some(c) if c == quote => break,
                        Some('\\') => match cursor.peek() {
                            // Escapes cover the quote character and the backslash itself.
                            Some(e) if e == quote || e == '\\' => {
                                value.push(e);
                                cursor.bump();
                            }
                            _ => value.push('\\'),
                        },
                        Some(c) => value.push(c),
                    }
                }
                Token::Str(value)
            }
            c if c.is_ascii_digit() => {
                cursor.eat_while(|c| c.is_ascii_digit());
                let mut is_float = false;
                if cursor.peek() == Some('.')
                    && cursor.peek2().map(|c| c.is_ascii_digit()) == Some(true)
                {
                    is_float = true;
                    cursor.bump();
                    cursor.eat_while(|c| c.is_ascii_digit());
                }
                let text = &src[start..cursor.pos()];
                let parsed = if is_float {
                    text.parse::<f64>().map(Token::Float).ok()
                } else {
                    text.parse::<i64>().map(Token::Int).ok()
                };
                match parsed {
                    Some(token) => token,
                    None => {
                        return Err(ExpressionError::InvalidNumber {
                            text: text.to_string(),
                            pos: start,
                        })
                    }
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                cursor.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
                match &src[start..cursor.pos()] {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    ident => Token::Ident(ident.to_string()),
                }
            }
            other => return Err(ExpressionError::Lexical { ch: other, pos: start }),
        };

        tokens.push(SpannedToken {
            token,
            lexeme: src[start..cursor.pos()].to_string(),
            pos: start,
        });
    }

    Ok(tokens)
}

fn one(cursor: &mut Cursor<'_>, token: Token) -> Token {
    cursor.bump();
    token
}
