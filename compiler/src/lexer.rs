// Lexer for the textual formula notation.
//
// Tokenizes formulas such as `Exp(-SqDist(x, y)) * b` and alias
// declarations such as `x = Vi(0, 3)`. Uses the `logos` crate for DFA-based
// lexing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Formula tokens. Identifiers carry no value; use the span to retrieve
/// the text from the source.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+|#[^\n]*")]
pub enum Token {
    // ── Symbols ──
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[token("|")]
    Pipe,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,

    // ── Literals ──
    /// Non-negative integer literal; a leading `-` is a separate token.
    #[regex(r"[0-9]+", parse_int)]
    Int(i64),

    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Caret => write!(f, "^"),
            Token::Pipe => write!(f, "|"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Equals => write!(f, "="),
            Token::Int(n) => write!(f, "{n}"),
            Token::Ident => write!(f, "<ident>"),
        }
    }
}

// ── Callbacks ──

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

// ── Public API ──

/// Lex a formula or alias declaration into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(result.errors.is_empty(), "lex errors: {:?}", result.errors);
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn formula_tokens() {
        assert_eq!(
            kinds("Exp(-x*2)"),
            vec![
                Token::Ident,
                Token::LParen,
                Token::Minus,
                Token::Ident,
                Token::Star,
                Token::Int(2),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn scalar_product_and_power() {
        assert_eq!(
            kinds("(a|b)^3"),
            vec![
                Token::LParen,
                Token::Ident,
                Token::Pipe,
                Token::Ident,
                Token::RParen,
                Token::Caret,
                Token::Int(3),
            ]
        );
    }

    #[test]
    fn whitespace_and_comments_skipped() {
        assert_eq!(
            kinds("x = Vi(0, 3)  # first point\n"),
            vec![
                Token::Ident,
                Token::Equals,
                Token::Ident,
                Token::LParen,
                Token::Int(0),
                Token::Comma,
                Token::Int(3),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn spans_are_byte_offsets() {
        let result = lex("ab + 12");
        assert_eq!(result.tokens[0].1, Span { start: 0, end: 2 });
        assert_eq!(result.tokens[2].1, Span { start: 5, end: 7 });
    }

    #[test]
    fn unknown_character_is_reported_and_skipped() {
        let result = lex("x $ y");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span { start: 2, end: 3 });
        assert_eq!(result.tokens.len(), 2);
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let result = lex("99999999999999999999");
        assert_eq!(result.errors.len(), 1);
    }
}
