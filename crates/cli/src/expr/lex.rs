// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tokenizer for the evaluate source language. Tokens carry byte spans so
//! the parser can hand nested function literals to the engine verbatim.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    Ident(String),
    Number(f64),
    Str(String),
    KwAsync,
    KwAwait,
    KwReturn,
    KwTrue,
    KwFalse,
    KwNull,
    KwUndefined,
    KwNew,
    KwTypeof,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Dot,
    Arrow,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    AndAnd,
    OrOr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug)]
pub enum LexError {
    UnexpectedChar { ch: char, at: usize },
    UnterminatedString { at: usize },
    UnterminatedComment { at: usize },
    BadNumber { at: usize },
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedChar { ch, at } => write!(f, "unexpected {ch:?} at byte {at}"),
            Self::UnterminatedString { at } => write!(f, "unterminated string at byte {at}"),
            Self::UnterminatedComment { at } => write!(f, "unterminated comment at byte {at}"),
            Self::BadNumber { at } => write!(f, "malformed number at byte {at}"),
        }
    }
}

impl std::error::Error for LexError {}

fn keyword(ident: &str) -> Option<TokKind> {
    match ident {
        "async" => Some(TokKind::KwAsync),
        "await" => Some(TokKind::KwAwait),
        "return" => Some(TokKind::KwReturn),
        "true" => Some(TokKind::KwTrue),
        "false" => Some(TokKind::KwFalse),
        "null" => Some(TokKind::KwNull),
        "undefined" => Some(TokKind::KwUndefined),
        "new" => Some(TokKind::KwNew),
        "typeof" => Some(TokKind::KwTypeof),
        _ => None,
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((at, ch)) = chars.next() {
        if ch.is_whitespace() {
            continue;
        }
        if ch == '/' {
            match chars.peek() {
                Some((_, '/')) => {
                    while let Some((_, c)) = chars.next() {
                        if c == '\n' {
                            break;
                        }
                    }
                    continue;
                }
                Some((_, '*')) => {
                    chars.next();
                    let mut closed = false;
                    while let Some((_, c)) = chars.next() {
                        if c == '*' && matches!(chars.peek(), Some((_, '/'))) {
                            chars.next();
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return Err(LexError::UnterminatedComment { at });
                    }
                    continue;
                }
                _ => {}
            }
        }

        let token = match ch {
            '(' => single(at, TokKind::LParen),
            ')' => single(at, TokKind::RParen),
            '{' => single(at, TokKind::LBrace),
            '}' => single(at, TokKind::RBrace),
            '[' => single(at, TokKind::LBracket),
            ']' => single(at, TokKind::RBracket),
            ',' => single(at, TokKind::Comma),
            ';' => single(at, TokKind::Semi),
            ':' => single(at, TokKind::Colon),
            '.' => single(at, TokKind::Dot),
            '+' => single(at, TokKind::Plus),
            '-' => single(at, TokKind::Minus),
            '*' => single(at, TokKind::Star),
            '/' => single(at, TokKind::Slash),
            '%' => single(at, TokKind::Percent),
            '=' => match chars.peek() {
                Some((_, '>')) => {
                    chars.next();
                    Token {
                        kind: TokKind::Arrow,
                        start: at,
                        end: at + 2,
                    }
                }
                Some((_, '=')) => {
                    chars.next();
                    if matches!(chars.peek(), Some((_, '='))) {
                        chars.next();
                        Token {
                            kind: TokKind::EqEqEq,
                            start: at,
                            end: at + 3,
                        }
                    } else {
                        Token {
                            kind: TokKind::EqEq,
                            start: at,
                            end: at + 2,
                        }
                    }
                }
                _ => return Err(LexError::UnexpectedChar { ch, at }),
            },
            '!' => match chars.peek() {
                Some((_, '=')) => {
                    chars.next();
                    if matches!(chars.peek(), Some((_, '='))) {
                        chars.next();
                        Token {
                            kind: TokKind::NotEqEq,
                            start: at,
                            end: at + 3,
                        }
                    } else {
                        Token {
                            kind: TokKind::NotEq,
                            start: at,
                            end: at + 2,
                        }
                    }
                }
                _ => single(at, TokKind::Bang),
            },
            '<' => twin_or(&mut chars, at, '=', TokKind::Le, TokKind::Lt),
            '>' => twin_or(&mut chars, at, '=', TokKind::Ge, TokKind::Gt),
            '&' => match chars.next() {
                Some((_, '&')) => Token {
                    kind: TokKind::AndAnd,
                    start: at,
                    end: at + 2,
                },
                _ => return Err(LexError::UnexpectedChar { ch, at }),
            },
            '|' => match chars.next() {
                Some((_, '|')) => Token {
                    kind: TokKind::OrOr,
                    start: at,
                    end: at + 2,
                },
                _ => return Err(LexError::UnexpectedChar { ch, at }),
            },
            '\'' | '"' => lex_string(source, &mut chars, at, ch)?,
            _ if ch.is_ascii_digit() => lex_number(source, &mut chars, at)?,
            _ if is_ident_start(ch) => {
                let mut end = at + ch.len_utf8();
                while let Some((next_at, next_ch)) = chars.peek().copied() {
                    if is_ident_continue(next_ch) {
                        end = next_at + next_ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &source[at..end];
                Token {
                    kind: keyword(text).unwrap_or_else(|| TokKind::Ident(text.to_owned())),
                    start: at,
                    end,
                }
            }
            _ => return Err(LexError::UnexpectedChar { ch, at }),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn single(at: usize, kind: TokKind) -> Token {
    Token {
        kind,
        start: at,
        end: at + 1,
    }
}

fn twin_or(
    chars: &mut Peekable<CharIndices<'_>>,
    at: usize,
    second: char,
    twin: TokKind,
    alone: TokKind,
) -> Token {
    if matches!(chars.peek(), Some((_, c)) if *c == second) {
        chars.next();
        Token {
            kind: twin,
            start: at,
            end: at + 2,
        }
    } else {
        Token {
            kind: alone,
            start: at,
            end: at + 1,
        }
    }
}

fn lex_string(
    source: &str,
    chars: &mut Peekable<CharIndices<'_>>,
    at: usize,
    quote: char,
) -> Result<Token, LexError> {
    let mut text = String::new();
    loop {
        let Some((pos, ch)) = chars.next() else {
            return Err(LexError::UnterminatedString { at });
        };
        match ch {
            c if c == quote => {
                return Ok(Token {
                    kind: TokKind::Str(text),
                    start: at,
                    end: pos + 1,
                });
            }
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    return Err(LexError::UnterminatedString { at });
                };
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
            }
            '\n' => return Err(LexError::UnterminatedString { at }),
            other => text.push(other),
        }
    }
}

fn lex_number(
    source: &str,
    chars: &mut Peekable<CharIndices<'_>>,
    at: usize,
) -> Result<Token, LexError> {
    let mut end = at + 1;
    let mut seen_dot = false;
    let mut seen_exp = false;
    while let Some((pos, ch)) = chars.peek().copied() {
        let take = match ch {
            '0'..='9' => true,
            '.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                true
            }
            'e' | 'E' if !seen_exp => {
                seen_exp = true;
                true
            }
            '+' | '-' if seen_exp && matches!(&source[at..pos], s if s.ends_with(['e', 'E'])) => {
                true
            }
            _ => false,
        };
        if !take {
            break;
        }
        end = pos + ch.len_utf8();
        chars.next();
    }
    let value: f64 = source[at..end]
        .parse()
        .map_err(|_| LexError::BadNumber { at })?;
    Ok(Token {
        kind: TokKind::Number(value),
        start: at,
        end,
    })
}

#[cfg(test)]
#[path = "lex_tests.rs"]
mod tests;
