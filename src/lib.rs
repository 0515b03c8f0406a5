//! cadlisp - LISP-family macro interpreter embedded in a 2D CAD editor
//!
//! This crate implements the scripting language used to automate drawing work:
//! a tokenizer, a recursive-descent parser, a tree-walking evaluator with a fixed
//! set of special forms, a table of roughly one hundred native builtins, and an
//! asynchronous input broker that lets a script pause while the user picks a
//! point or types a value in the host UI.
//!
//! ```lisp
//! (defun sq (x) (* x x))          ; named function
//! (setq r (sq 5))                 ; global assignment
//! (setq p (getpoint "Center: "))  ; suspends until the host resolves the request
//! (entmake (list (list 0 "CIRCLE") (list 10 (car p)) (list 20 (cadr p)) (list 40 r)))
//! ```
//!
//! ## Evaluation model
//!
//! - Numbers are 64-bit floats, symbols are canonicalized to uppercase
//! - `nil` and the empty list are the only falsy values
//! - `setq` always writes the global frame; closures capture a snapshot of
//!   their defining environment
//! - Builtins take precedence over closures, which take precedence over `defun`
//!   functions
//!
//! ## Suspension
//!
//! [`interpreter::Interpreter::execute`] returns an [`interpreter::Execution`], a
//! future that only ever waits on the [`broker::InputBroker`]. The host either
//! awaits it in its own executor or drives it with
//! [`interpreter::Execution::step`], answering each
//! [`broker::InputRequest`] through [`broker::InputBroker::resolve`].
//!
//! ## Modules
//!
//! - `lexer` / `parser`: script text to tokens to forms
//! - `environment`: local and global variable frames
//! - `evaluator`: special forms and function application
//! - `builtinops`: the native builtin registry
//! - `marshal`: entity to association-list conversion
//! - `broker`: the single-slot pending input request
//! - `host`: collaborator traits and the in-memory reference host
//! - `interpreter`: the interpreter instance and its execution handle

use std::fmt;

/// Default maximum parsing depth, limiting nested lists and quote chains
pub const MAX_PARSE_DEPTH: usize = 256;

/// Default maximum evaluation depth, limiting nested forms and recursive calls
pub const MAX_EVAL_DEPTH: usize = 1024;

/// A failure raised while turning script text into tokens.
#[derive(Debug, PartialEq, Clone)]
pub struct LexError {
    pub message: String,
    /// Byte offset of the offending input
    pub offset: usize,
    /// Context snippet from the input showing where the error occurred (max 60 chars)
    pub context: Option<String>,
}

impl LexError {
    /// Create a LexError with context extracted from input at a given offset
    pub fn with_context(message: impl Into<String>, input: &str, error_offset: usize) -> Self {
        const MAX_CONTEXT: usize = 60;

        let context_start = error_offset.saturating_sub(20);
        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        LexError {
            message: message.into(),
            offset: error_offset,
            context: Some(display_context),
        }
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    LexError(LexError),
    SyntaxError(String),
    UnknownFunction(String),
    HostBridge(String),
    EvalError(String),
    TypeError(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>,
    },
    /// A pending input request was replaced by a newer one before being resolved
    InputOrphaned(String),
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError naming the function that was called
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::LexError(e) => {
                write!(f, "LexError: {} at offset {}", e.message, e.offset)?;
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::SyntaxError(msg) => write!(f, "SyntaxError: {msg}"),
            Error::UnknownFunction(name) => write!(f, "UnknownFunction: no function definition: {name}"),
            Error::HostBridge(msg) => write!(f, "HostBridgeError: {msg}"),
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::ArityError {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "ArityError: {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: function expected {expected} arguments but got {got}"
                ),
            },
            Error::InputOrphaned(kind) => {
                write!(f, "InputOrphaned: {kind} request was replaced before it was answered")
            }
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod broker;
pub mod builtinops;
pub mod config;
pub mod environment;
pub mod evaluator;
pub mod host;
pub mod interpreter;
pub mod lexer;
pub mod marshal;
pub mod parser;

pub use ast::{Form, Value};
pub use broker::{InputBroker, InputKind, InputRequest};
pub use config::InterpreterConfig;
pub use host::{Host, MemoryHost};
pub use interpreter::{Execution, Interpreter, Step};
