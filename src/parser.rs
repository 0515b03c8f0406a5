//! Token stream to forms.
//!
//! A program is a sequence of top-level forms. `'x` is read as `(QUOTE x)`.
//! List nesting (including quote chains) is bounded by a configurable depth.

use crate::ast::Form;
use crate::lexer::{Token, tokenize};
use crate::{Error, MAX_PARSE_DEPTH};

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    max_depth: usize,
    /// Lists opened but not yet closed
    open: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_form(&mut self, depth: usize) -> Result<Form, Error> {
        if depth >= self.max_depth {
            return Err(Error::SyntaxError(format!(
                "nesting exceeds maximum depth of {}",
                self.max_depth
            )));
        }

        match self.next() {
            None => Err(Error::SyntaxError("unexpected end of input".into())),
            Some(Token::RParen) => Err(Error::SyntaxError("unexpected ')'".into())),
            Some(Token::Quote) => {
                if self.peek().is_none() {
                    return Err(Error::SyntaxError("quote without a following form".into()));
                }
                let quoted = self.parse_form(depth + 1)?;
                Ok(Form::List(vec![Form::Symbol("QUOTE".into()), quoted]))
            }
            Some(Token::LParen) => {
                self.open += 1;
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        None => {
                            return Err(Error::SyntaxError(format!(
                                "unexpected end of input: {} unclosed parenthesis",
                                self.open
                            )));
                        }
                        Some(Token::RParen) => {
                            self.pos += 1;
                            self.open -= 1;
                            return Ok(Form::List(items));
                        }
                        Some(_) => items.push(self.parse_form(depth + 1)?),
                    }
                }
            }
            Some(Token::Number(n)) => Ok(Form::Number(*n)),
            Some(Token::String(s)) => Ok(Form::String(s.clone())),
            Some(Token::Symbol(s)) => Ok(Form::Symbol(s.clone())),
        }
    }
}

/// Parse every top-level form in a token slice
pub fn parse(tokens: &[Token]) -> Result<Vec<Form>, Error> {
    parse_with_depth(tokens, MAX_PARSE_DEPTH)
}

/// [`parse`] with an explicit nesting limit
pub fn parse_with_depth(tokens: &[Token], max_depth: usize) -> Result<Vec<Form>, Error> {
    let mut cursor = Cursor {
        tokens,
        pos: 0,
        max_depth,
        open: 0,
    };
    let mut forms = Vec::new();
    while cursor.peek().is_some() {
        forms.push(cursor.parse_form(0)?);
    }
    Ok(forms)
}

/// Tokenize and parse script text
pub fn parse_program(input: &str) -> Result<Vec<Form>, Error> {
    parse(&tokenize(input)?)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn sym(s: &str) -> Form {
        Form::Symbol(s.to_owned())
    }

    fn num(n: f64) -> Form {
        Form::Number(n)
    }

    fn list(items: Vec<Form>) -> Form {
        Form::List(items)
    }

    /// Test result variants for comprehensive parser testing
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Vec<Form>),
        SyntaxError,
        LexError,
    }
    use ParseTestResult::*;

    #[test]
    fn test_parser_comprehensive() {
        let test_cases = vec![
            ("42", Success(vec![num(42.0)])),
            ("a b", Success(vec![sym("A"), sym("B")])),
            ("", Success(vec![])),
            ("; only a comment", Success(vec![])),
            ("()", Success(vec![list(vec![])])),
            (
                "(+ 1 (* 2 3))",
                Success(vec![list(vec![
                    sym("+"),
                    num(1.0),
                    list(vec![sym("*"), num(2.0), num(3.0)]),
                ])]),
            ),
            (
                "'x",
                Success(vec![list(vec![sym("QUOTE"), sym("X")])]),
            ),
            (
                "'(1 2)",
                Success(vec![list(vec![
                    sym("QUOTE"),
                    list(vec![num(1.0), num(2.0)]),
                ])]),
            ),
            (
                "''a",
                Success(vec![list(vec![
                    sym("QUOTE"),
                    list(vec![sym("QUOTE"), sym("A")]),
                ])]),
            ),
            (
                "(princ \"hi\") (terpri)",
                Success(vec![
                    list(vec![sym("PRINC"), Form::String("hi".into())]),
                    list(vec![sym("TERPRI")]),
                ]),
            ),
            // Structural errors
            ("(+ 1 2", SyntaxError),
            ("((a)", SyntaxError),
            (")", SyntaxError),
            ("(a))", SyntaxError),
            ("'", SyntaxError),
            ("(a ')", SyntaxError),
            ("(princ \"x)", LexError),
        ];

        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            let test_id = format!("#{} '{}'", i + 1, input);
            match (parse_program(input), expected) {
                (Ok(actual), Success(forms)) => {
                    assert_eq!(actual, forms, "{test_id}: wrong forms");
                }
                (Err(Error::SyntaxError(_)), SyntaxError) => {}
                (Err(Error::LexError(_)), LexError) => {}
                (actual, expected) => {
                    panic!("{test_id}: expected {expected:?}, got {actual:?}");
                }
            }
        }
    }

    #[test]
    fn test_depth_limit() {
        let deep_ok = format!("{}{}", "(".repeat(10), ")".repeat(10));
        assert!(parse_with_depth(&tokenize(&deep_ok).unwrap(), 10).is_ok());

        let too_deep = format!("{}{}", "(".repeat(11), ")".repeat(11));
        assert!(matches!(
            parse_with_depth(&tokenize(&too_deep).unwrap(), 10),
            Err(Error::SyntaxError(_))
        ));

        let quotes = format!("{}a", "'".repeat(11));
        assert!(matches!(
            parse_with_depth(&tokenize(&quotes).unwrap(), 10),
            Err(Error::SyntaxError(_))
        ));

        // The default limit is generous enough for real scripts
        let nested = format!("{}1{}", "(a ".repeat(100), ")".repeat(100));
        assert!(parse_program(&nested).is_ok());
    }

    #[test]
    fn test_unclosed_count_is_reported() {
        let Err(Error::SyntaxError(msg)) = parse_program("(defun f (x) (+ x 1)") else {
            panic!("expected SyntaxError");
        };
        assert_eq!(msg, "unexpected end of input: 1 unclosed parenthesis");

        let Err(Error::SyntaxError(msg)) = parse_program("((a") else {
            panic!("expected SyntaxError");
        };
        assert!(msg.contains("2 unclosed"));
    }

    #[test]
    fn test_forms_print_back() {
        let forms = parse_program("(setq  s \"a\\\"b\" n 2.5)").unwrap();
        assert_eq!(forms[0].to_string(), "(SETQ S \"a\\\"b\" N 2.5)");
    }
}
