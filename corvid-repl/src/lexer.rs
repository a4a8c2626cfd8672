//! Tokenizer for the snippet language.
//!
//! Hand-rolled, spanned, with Python-flavoured surface syntax: `#`
//! comments, single/double/triple-quoted strings, and newline tokens
//! suppressed inside brackets so bracketed expressions span lines.

use std::fmt;

/// A lexical error with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub col: usize,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.col)
    }
}

/// One token with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token kind and payload.
    pub kind: TokenKind,
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub col: usize,
}

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword-like name.
    Ident(String),
    /// String literal (already unescaped).
    Str(String),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// `=`
    Assign,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// End of statement (newline at bracket depth zero).
    Newline,
    /// End of input.
    Eof,
}

/// Tokenize a snippet.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens: Vec<Token> = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    let mut line = 1;
    let mut col = 1;
    let mut depth = 0usize;

    macro_rules! push {
        ($kind:expr) => {
            tokens.push(Token {
                kind: $kind,
                line,
                col,
            })
        };
    }

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => {
                i += 1;
                col += 1;
            }
            '\n' => {
                if depth == 0 {
                    // Collapse runs of blank lines into one statement break.
                    if !matches!(
                        tokens.last().map(|t| &t.kind),
                        Some(TokenKind::Newline) | None
                    ) {
                        push!(TokenKind::Newline);
                    }
                }
                i += 1;
                line += 1;
                col = 1;
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '(' => {
                push!(TokenKind::LParen);
                depth += 1;
                i += 1;
                col += 1;
            }
            ')' => {
                push!(TokenKind::RParen);
                depth = depth.saturating_sub(1);
                i += 1;
                col += 1;
            }
            '[' => {
                push!(TokenKind::LBracket);
                depth += 1;
                i += 1;
                col += 1;
            }
            ']' => {
                push!(TokenKind::RBracket);
                depth = depth.saturating_sub(1);
                i += 1;
                col += 1;
            }
            '{' => {
                push!(TokenKind::LBrace);
                depth += 1;
                i += 1;
                col += 1;
            }
            '}' => {
                push!(TokenKind::RBrace);
                depth = depth.saturating_sub(1);
                i += 1;
                col += 1;
            }
            ',' => {
                push!(TokenKind::Comma);
                i += 1;
                col += 1;
            }
            ':' => {
                push!(TokenKind::Colon);
                i += 1;
                col += 1;
            }
            '=' => {
                push!(TokenKind::Assign);
                i += 1;
                col += 1;
            }
            '+' => {
                push!(TokenKind::Plus);
                i += 1;
                col += 1;
            }
            '-' => {
                push!(TokenKind::Minus);
                i += 1;
                col += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let triple = i + 2 < chars.len() && chars[i + 1] == quote && chars[i + 2] == quote;
                let (value, consumed, newlines, last_line_len) =
                    read_string(&chars[i..], quote, triple).map_err(|message| LexError {
                        line,
                        col,
                        message,
                    })?;
                push!(TokenKind::Str(value));
                i += consumed;
                if newlines > 0 {
                    line += newlines;
                    col = last_line_len + 1;
                } else {
                    col += consumed;
                }
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut is_float = false;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_')
                {
                    if chars[i] == '.' {
                        // A second dot ends the number (indexing etc. is not
                        // supported on numbers anyway).
                        if is_float {
                            break;
                        }
                        is_float = true;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
                let kind = if is_float {
                    text.parse::<f64>().map(TokenKind::Float).map_err(|_| ())
                } else {
                    text.parse::<i64>().map(TokenKind::Int).map_err(|_| ())
                }
                .map_err(|()| LexError {
                    line,
                    col,
                    message: format!("bad number literal `{text}`"),
                })?;
                push!(kind);
                col += i - start;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                push!(TokenKind::Ident(text));
                col += i - start;
            }
            other => {
                return Err(LexError {
                    line,
                    col,
                    message: format!("unexpected character `{other}`"),
                });
            }
        }
    }
    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
        col,
    });
    Ok(tokens)
}

/// Read a string literal starting at `chars[0]` (the opening quote).
/// Returns (value, chars consumed, newlines crossed, last line length).
fn read_string(
    chars: &[char],
    quote: char,
    triple: bool,
) -> Result<(String, usize, usize, usize), String> {
    let open = if triple { 3 } else { 1 };
    let mut i = open;
    let mut value = String::new();
    let mut newlines = 0;
    let mut last_line_len = 0;
    while i < chars.len() {
        let c = chars[i];
        if triple {
            if c == quote
                && chars.get(i + 1) == Some(&quote)
                && chars.get(i + 2) == Some(&quote)
            {
                return Ok((value, i + 3, newlines, last_line_len));
            }
        } else if c == quote {
            return Ok((value, i + 1, newlines, last_line_len));
        }
        if c == '\n' {
            if !triple {
                return Err("unterminated string literal".into());
            }
            newlines += 1;
            last_line_len = 0;
            value.push(c);
            i += 1;
            continue;
        }
        if c == '\\' && !triple {
            let escaped = chars.get(i + 1).ok_or("dangling escape")?;
            value.push(match escaped {
                'n' => '\n',
                't' => '\t',
                '\\' => '\\',
                '"' => '"',
                '\'' => '\'',
                other => *other,
            });
            i += 2;
            last_line_len += 2;
            continue;
        }
        value.push(c);
        i += 1;
        last_line_len += 1;
    }
    Err("unterminated string literal".into())
}
