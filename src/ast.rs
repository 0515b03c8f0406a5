//! This module defines the two tree types of the interpreter. [`Form`] is what the
//! parser produces: numbers, strings, symbols and nested lists, nothing more.
//! [`Value`] is what evaluation produces and what builtins consume; besides the
//! atoms and lists it carries closures, entity references and selection sets.
//! Ergonomic helpers such as [`val`], [`sym`] and [`nil`] build values in code
//! and tests, and `From` implementations cover the common Rust literals.
//!
//! Empty lists never survive as `Value::List`: [`Value::list`] and every
//! conversion normalize them to [`Value::Nil`], so truthiness and equality only
//! have one falsy shape to deal with.

use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::environment::Environment;
use crate::host::{EntityId, Point};

/// Type alias for number values in interpreter
pub(crate) type NumberType = f64;

/// Parsed s-expression
#[derive(Debug, Clone, PartialEq)]
pub enum Form {
    Number(NumberType),
    String(String),
    /// Canonical (uppercase) symbol name
    Symbol(String),
    List(Vec<Form>),
}

impl Form {
    /// The symbol name if this form is a symbol
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Form::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Convert an evaluated value back into a form, as `eval` and `read` need.
    /// Closures, entity references and selection sets have no textual form.
    pub fn from_value(value: &Value) -> Option<Form> {
        match value {
            Value::Nil => Some(Form::Symbol("NIL".into())),
            Value::True => Some(Form::Symbol("T".into())),
            Value::Number(n) => Some(Form::Number(*n)),
            Value::String(s) => Some(Form::String(s.clone())),
            Value::Symbol(s) => Some(Form::Symbol(s.clone())),
            Value::List(items) => items
                .iter()
                .map(Form::from_value)
                .collect::<Option<Vec<_>>>()
                .map(Form::List),
            Value::Closure(_) | Value::Entity(_) | Value::SelectionSet(_) => None,
        }
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Form::Number(n) => write_number(f, *n),
            Form::String(s) => write_quoted(f, s),
            Form::Symbol(s) => write!(f, "{s}"),
            Form::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Function value produced by `lambda`
#[derive(Debug)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Vec<Form>,
    /// Snapshot of the defining environment, taken when the lambda was evaluated
    pub captured: Environment,
}

/// Function registered by `defun`
#[derive(Debug)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Form>,
}

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    True,
    Number(NumberType),
    String(String),
    /// Quoted symbols evaluated as data
    Symbol(String),
    /// Non-empty list (empty lists are represented by `Nil`)
    List(Vec<Value>),
    Closure(Rc<Closure>),
    Entity(EntityId),
    SelectionSet(Vec<EntityId>),
}

impl Value {
    /// Build a list value, normalizing the empty list to `Nil`
    pub fn list(items: Vec<Value>) -> Value {
        if items.is_empty() {
            Value::Nil
        } else {
            Value::List(items)
        }
    }

    /// Build a `(x y z)` point list
    pub fn point(p: Point) -> Value {
        Value::List(vec![
            Value::Number(p.x),
            Value::Number(p.y),
            Value::Number(0.0),
        ])
    }

    pub fn from_bool(b: bool) -> Value {
        if b { Value::True } else { Value::Nil }
    }

    /// Everything except nil (and the empty list) is true
    pub fn is_truthy(&self) -> bool {
        !self.is_nil()
    }

    pub fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Elements of a list value; nil is the empty list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::Nil => Some(&[]),
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<NumberType> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Interpret a list of two or three numbers as a 2D point
    pub fn as_point(&self) -> Option<Point> {
        match self {
            Value::List(items) if items.len() == 2 || items.len() == 3 => {
                let x = items[0].as_number()?;
                let y = items[1].as_number()?;
                if let Some(z) = items.get(2) {
                    z.as_number()?;
                }
                Some(Point::new(x, y))
            }
            _ => None,
        }
    }

    /// Convert a quoted form into data
    pub fn from_form(form: &Form) -> Value {
        match form {
            Form::Number(n) => Value::Number(*n),
            Form::String(s) => Value::String(s.clone()),
            Form::Symbol(s) if s == "NIL" => Value::Nil,
            Form::Symbol(s) => Value::Symbol(s.clone()),
            Form::List(items) => Value::list(items.iter().map(Value::from_form).collect()),
        }
    }

    /// Short type tag used in error messages and by the `type` builtin
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "NIL",
            Value::True | Value::Symbol(_) => "SYM",
            Value::Number(_) => "REAL",
            Value::String(_) => "STR",
            Value::List(_) => "LIST",
            Value::Closure(_) => "USUBR",
            Value::Entity(_) => "ENAME",
            Value::SelectionSet(_) => "PICKSET",
        }
    }

    /// Text as `princ` writes it: strings without quotes or escapes
    pub fn to_display_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: NumberType) -> fmt::Result {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::True => write!(f, "T"),
            Value::Number(n) => write_number(f, *n),
            Value::String(s) => write_quoted(f, s),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::Closure(_) => write!(f, "#<lambda>"),
            Value::Entity(id) => write!(f, "<Entity name: {:x}>", id.0),
            Value::SelectionSet(ids) => write!(f, "<Selection set: {}>", ids.len()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_nil() && b.is_nil() => true,
            (Value::True, Value::True) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Closures compare by identity
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Entity(a), Value::Entity(b)) => a == b,
            (Value::SelectionSet(a), Value::SelectionSet(b)) => a == b,
            _ => false,
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::from_bool(b)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::Entity(id)
    }
}

impl From<Point> for Value {
    fn from(p: Point) -> Self {
        Value::point(p)
    }
}

macro_rules! impl_from_number {
    ($num_type:ty) => {
        impl From<$num_type> for Value {
            fn from(n: $num_type) -> Self {
                Value::Number(n as NumberType)
            }
        }
    };
}

impl_from_number!(i32);
impl_from_number!(i64);
impl_from_number!(u32);
impl_from_number!(usize);
impl_from_number!(f32);
impl_from_number!(NumberType); // Special case - no casting

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Nil, Into::into)
    }
}

// Fallible conversions from `Value` back into primitive Rust types.

impl std::convert::TryInto<NumberType> for Value {
    type Error = Error;

    fn try_into(self) -> Result<NumberType, Error> {
        if let Value::Number(n) = self {
            Ok(n)
        } else {
            Err(Error::TypeError(format!("expected number, got {self}")))
        }
    }
}

impl std::convert::TryInto<EntityId> for Value {
    type Error = Error;

    fn try_into(self) -> Result<EntityId, Error> {
        if let Value::Entity(id) = self {
            Ok(id)
        } else {
            Err(Error::TypeError(format!("expected entity name, got {self}")))
        }
    }
}

impl std::convert::TryInto<Point> for Value {
    type Error = Error;

    fn try_into(self) -> Result<Point, Error> {
        self.as_point()
            .ok_or_else(|| Error::TypeError(format!("expected point, got {self}")))
    }
}

/// Helper function for creating symbol values - works great in mixed lists!
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_uppercase())
}

/// Helper function for creating Values - accepts any type that can be converted to Value
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating nil
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::Nil
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod helper_function_tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (val(42), Value::Number(42.0)),
            (val(-17), Value::Number(-17.0)),
            (val(2.5), Value::Number(2.5)),
            (val(true), Value::True),
            (val(false), Value::Nil),
            (val("hello"), Value::String("hello".to_owned())),
            (sym("foo-bar"), Value::Symbol("FOO-BAR".to_owned())),
            (nil(), Value::Nil),
            (
                val([1, 2, 3]),
                Value::List(vec![
                    Value::Number(1.0),
                    Value::Number(2.0),
                    Value::Number(3.0),
                ]),
            ),
            (val(Vec::<Value>::new()), Value::Nil),
            (val(None::<i32>), Value::Nil),
            (
                val(vec![sym("op"), val(42), val("result")]),
                Value::List(vec![
                    Value::Symbol("OP".to_owned()),
                    Value::Number(42.0),
                    Value::String("result".to_owned()),
                ]),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_nil_and_empty_list_are_the_same_falsy_value() {
        assert_eq!(Value::List(vec![]), Value::Nil);
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Nil.is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::String(String::new()).is_truthy());
    }

    #[test]
    fn test_display() {
        let cases = vec![
            (val(6), "6"),
            (val(2.5), "2.5"),
            (val(-0.125), "-0.125"),
            (val("a\"b"), "\"a\\\"b\""),
            (val([1, 2]), "(1 2)"),
            (nil(), "nil"),
            (Value::True, "T"),
            (Value::Entity(EntityId(26)), "<Entity name: 1a>"),
            (
                Value::SelectionSet(vec![EntityId(1), EntityId(2)]),
                "<Selection set: 2>",
            ),
        ];
        for (value, expected) in cases {
            assert_eq!(value.to_string(), expected);
        }
        assert_eq!(val("plain").to_display_string(), "plain");
    }

    #[test]
    fn test_form_value_conversion() {
        let form = Form::List(vec![
            Form::Symbol("A".into()),
            Form::Number(1.0),
            Form::List(vec![]),
            Form::Symbol("NIL".into()),
        ]);
        let value = Value::from_form(&form);
        assert_eq!(value, val(vec![sym("a"), val(1), nil(), nil()]));

        let back = Form::from_value(&val(vec![sym("a"), val("s")])).unwrap();
        assert_eq!(back.to_string(), "(A \"s\")");
        assert!(Form::from_value(&Value::Entity(EntityId(1))).is_none());
    }

    #[test]
    fn test_point_extraction() {
        assert_eq!(val([1, 2]).as_point(), Some(Point::new(1.0, 2.0)));
        assert_eq!(val([1, 2, 3]).as_point(), Some(Point::new(1.0, 2.0)));
        assert_eq!(val([1]).as_point(), None);
        assert_eq!(val(vec![val(1), val("y")]).as_point(), None);
    }
}
