//! Script text to token stream.
//!
//! Whitespace and `;` comments are skipped. Every other character belongs to a
//! parenthesis, a quote mark, a string literal, or an atom: a maximal run of
//! non-delimiter characters. An atom becomes a number only when the whole run
//! parses as a finite float, so `1+`, `1-`, `-` and `inf` stay symbols.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, multispace1},
    combinator::value,
    error::ErrorKind,
    multi::many0,
    sequence::preceded,
};

use crate::ast::NumberType;
use crate::{Error, LexError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    Quote,
    Number(NumberType),
    String(String),
    /// Uppercased symbol name
    Symbol(String),
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"' | ';')
}

/// Convert nom errors into a LexError positioned in the original input
fn lex_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> Error {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = input.len().saturating_sub(e.input.len());
            let message = match e.code {
                ErrorKind::Char => "unterminated string literal",
                _ => "unexpected input",
            };
            Error::LexError(LexError::with_context(message, input, offset))
        }
        nom::Err::Incomplete(_) => Error::LexError(LexError::with_context(
            "incomplete input",
            input,
            input.len(),
        )),
    }
}

/// `;` up to (not including) the end of the line
fn comment(input: &str) -> IResult<&str, &str> {
    preceded(char(';'), take_till(|c| c == '\n')).parse(input)
}

fn skip_trivia(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, comment)))).parse(input)
}

/// Parse a string literal. Only `\n \t \\ \"` are escapes; any other backslash
/// pair is kept as written.
fn parse_string(input: &str) -> IResult<&str, Token> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => {
                return Ok((char_iter.as_str(), Token::String(chars)));
            }
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    Some(other) => {
                        chars.push('\\');
                        chars.push(other);
                    }
                    None => {
                        // Backslash at end of input, the closing quote can't follow
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            input,
                            ErrorKind::Char,
                        )));
                    }
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    ErrorKind::Char,
                )));
            }
        }
    }
}

fn classify_atom(text: &str) -> Token {
    match text.parse::<NumberType>() {
        Ok(n) if n.is_finite() => Token::Number(n),
        _ => Token::Symbol(text.to_uppercase()),
    }
}

fn parse_atom(input: &str) -> IResult<&str, Token> {
    let (input, text) = take_while1(|c: char| !is_delimiter(c)).parse(input)?;
    Ok((input, classify_atom(text)))
}

fn parse_token(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::LParen, char('(')),
        value(Token::RParen, char(')')),
        value(Token::Quote, char('\'')),
        parse_string,
        parse_atom,
    ))
    .parse(input)
}

/// Split script text into tokens
pub fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut rest = input;

    loop {
        let (after_trivia, ()) = skip_trivia(rest).map_err(|e| lex_error(input, e))?;
        if after_trivia.is_empty() {
            break;
        }
        let (remaining, token) = parse_token(after_trivia).map_err(|e| lex_error(input, e))?;
        tokens.push(token);
        rest = remaining;
    }

    Ok(tokens)
}
