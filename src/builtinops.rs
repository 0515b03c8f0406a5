//! Builtin operation registry.
//!
//! Every builtin lives in one static table keyed by its uppercase name, with
//! a declared [`Arity`] checked before the call. Operations come in three
//! kinds:
//!
//! - **Pure functions** over evaluated values. They are written as typed Rust
//!   functions and erased through the adapters in `evaluator::intooperation`.
//! - **Host builtins** (`cad`), which read or change drawing state through
//!   the interpreter's host.
//! - **Suspending builtins** (`interactive`), which return a future and may
//!   wait on the input broker or call back into the evaluator.
//!
//! Builtins are resolved before closures and `defun` functions, so user code
//! can't replace them.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use crate::Error;
use crate::ast::{NumberType, Value};
use crate::environment::Environment;
use crate::evaluator::{
    Arity, EvalFuture, IntoOperation, IntoVariadicOperation, NumIter, OperationFn, StringIter,
    ValueIter,
};
use crate::host::{EntityId, Point};
use crate::interpreter::Interpreter;
use crate::parser::parse_program;

mod cad;
mod interactive;

/// Builtin with synchronous access to the interpreter and its host
pub(crate) type HostFn = fn(&mut Interpreter, Vec<Value>) -> Result<Value, Error>;

/// Builtin that may suspend; receives the caller's local frame and depth
pub(crate) type AsyncFn =
    for<'a> fn(&'a mut Interpreter, &'a Environment, Vec<Value>, usize) -> EvalFuture<'a>;

#[derive(Clone)]
pub(crate) enum OpKind {
    Function(Arc<OperationFn>),
    Host(HostFn),
    Async(AsyncFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::Host(_) => write!(f, "Host(<fn>)"),
            OpKind::Async(_) => write!(f, "Async(<fn>)"),
        }
    }
}

/// Definition of a builtin operation
#[derive(Debug, Clone)]
pub(crate) struct BuiltinOp {
    /// Canonical (uppercase) name
    pub name: &'static str,
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

//
// Argument helpers shared with the host and interactive builtins
//

pub(crate) fn list_items(value: &Value) -> Result<&[Value], Error> {
    value
        .as_list()
        .ok_or_else(|| Error::TypeError(format!("expected list, got {value}")))
}

pub(crate) fn expect_number(value: &Value) -> Result<NumberType, Error> {
    value
        .as_number()
        .ok_or_else(|| Error::TypeError(format!("expected number, got {value}")))
}

pub(crate) fn expect_string(value: &Value) -> Result<&str, Error> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(Error::TypeError(format!("expected string, got {other}"))),
    }
}

pub(crate) fn expect_point(value: &Value) -> Result<Point, Error> {
    value
        .as_point()
        .ok_or_else(|| Error::TypeError(format!("expected point, got {value}")))
}

pub(crate) fn expect_entity(value: &Value) -> Result<EntityId, Error> {
    match value {
        Value::Entity(id) => Ok(*id),
        other => Err(Error::TypeError(format!("expected entity name, got {other}"))),
    }
}

pub(crate) fn selection(value: &Value) -> Result<&[EntityId], Error> {
    match value {
        Value::SelectionSet(ids) => Ok(ids),
        other => Err(Error::TypeError(format!(
            "expected selection set, got {other}"
        ))),
    }
}

//
// Arithmetic
//

fn builtin_add(args: NumIter<'_>) -> NumberType {
    args.sum()
}

fn builtin_sub(args: NumIter<'_>) -> NumberType {
    let mut args = args;
    match args.next() {
        None => 0.0,
        Some(first) if args.len() == 0 => -first,
        Some(first) => args.fold(first, |acc, n| acc - n),
    }
}

fn builtin_mul(args: NumIter<'_>) -> NumberType {
    args.reduce(|acc, n| acc * n).unwrap_or(0.0)
}

fn builtin_div(first: NumberType, rest: NumIter<'_>) -> Result<NumberType, Error> {
    let mut acc = first;
    for divisor in rest {
        if divisor == 0.0 {
            return Err(Error::EvalError("divide by zero".into()));
        }
        acc /= divisor;
    }
    Ok(acc)
}

fn builtin_rem(first: NumberType, rest: NumIter<'_>) -> Result<NumberType, Error> {
    let mut acc = first;
    for divisor in rest {
        if divisor == 0.0 {
            return Err(Error::EvalError("divide by zero".into()));
        }
        acc %= divisor;
    }
    Ok(acc)
}

fn builtin_inc(n: NumberType) -> NumberType {
    n + 1.0
}

fn builtin_dec(n: NumberType) -> NumberType {
    n - 1.0
}

fn builtin_abs(n: NumberType) -> NumberType {
    n.abs()
}

fn builtin_sqrt(n: NumberType) -> Result<NumberType, Error> {
    if n < 0.0 {
        return Err(Error::EvalError(format!(
            "function undefined for argument: {}",
            Value::Number(n)
        )));
    }
    Ok(n.sqrt())
}

fn builtin_expt(base: NumberType, power: NumberType) -> NumberType {
    base.powf(power)
}

fn builtin_exp(n: NumberType) -> NumberType {
    n.exp()
}

fn builtin_log(n: NumberType) -> Result<NumberType, Error> {
    if n <= 0.0 {
        return Err(Error::EvalError(format!(
            "function undefined for argument: {}",
            Value::Number(n)
        )));
    }
    Ok(n.ln())
}

fn builtin_sin(n: NumberType) -> NumberType {
    n.sin()
}

fn builtin_cos(n: NumberType) -> NumberType {
    n.cos()
}

/// `(atan y)` or `(atan y x)`
fn builtin_atan(y: NumberType, rest: NumIter<'_>) -> NumberType {
    let mut rest = rest;
    match rest.next() {
        Some(x) => y.atan2(x),
        None => y.atan(),
    }
}

fn builtin_fix(n: NumberType) -> NumberType {
    n.trunc()
}

fn builtin_float(n: NumberType) -> NumberType {
    n
}

fn builtin_max(first: NumberType, rest: NumIter<'_>) -> NumberType {
    rest.fold(first, NumberType::max)
}

fn builtin_min(first: NumberType, rest: NumIter<'_>) -> NumberType {
    rest.fold(first, NumberType::min)
}

fn builtin_gcd(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if a.fract() != 0.0 || b.fract() != 0.0 {
        return Err(Error::TypeError("gcd: expected integers".into()));
    }
    let (mut a, mut b) = ((a as i64).abs(), (b as i64).abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    Ok(a as NumberType)
}

fn builtin_logand(args: NumIter<'_>) -> NumberType {
    args.map(|n| n as i64).reduce(|a, b| a & b).unwrap_or(0) as NumberType
}

fn builtin_logior(args: NumIter<'_>) -> NumberType {
    args.map(|n| n as i64).fold(0, |a, b| a | b) as NumberType
}

//
// Comparison
//

/// Numbers order numerically, strings lexically; anything else is a type error
fn compare(a: &Value, b: &Value) -> Result<Ordering, Error> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .partial_cmp(y)
            .ok_or_else(|| Error::EvalError(format!("cannot compare {a} with {b}"))),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(Error::TypeError(format!("cannot compare {a} with {b}"))),
    }
}

// Chained comparisons: every adjacent pair must satisfy the test
macro_rules! comparison {
    ($name:ident, $test:path) => {
        fn $name(first: Value, rest: ValueIter<'_>) -> Result<bool, Error> {
            let mut previous = &first;
            for next in rest {
                if !$test(compare(previous, next)?) {
                    return Ok(false);
                }
                previous = next;
            }
            Ok(true)
        }
    };
}

comparison!(builtin_num_eq, Ordering::is_eq);
comparison!(builtin_num_ne, Ordering::is_ne);
comparison!(builtin_lt, Ordering::is_lt);
comparison!(builtin_gt, Ordering::is_gt);
comparison!(builtin_le, Ordering::is_le);
comparison!(builtin_ge, Ordering::is_ge);

fn builtin_eq(a: Value, b: Value) -> bool {
    a == b
}

fn equal_within(a: &Value, b: &Value, fuzz: NumberType) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => (x - y).abs() <= fuzz,
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| equal_within(x, y, fuzz))
        }
        _ => a == b,
    }
}

/// `(equal a b [fuzz])`
fn builtin_equal(a: Value, b: Value, fuzz: NumIter<'_>) -> bool {
    let mut fuzz = fuzz;
    equal_within(&a, &b, fuzz.next().unwrap_or(0.0))
}

//
// Lists
//

fn car(value: &Value) -> Result<Value, Error> {
    Ok(list_items(value)?.first().cloned().unwrap_or(Value::Nil))
}

fn cdr(value: &Value) -> Result<Value, Error> {
    let items = list_items(value)?;
    Ok(match items {
        [] | [_] => Value::Nil,
        [_, rest @ ..] => Value::List(rest.to_vec()),
    })
}

fn builtin_car(list: Value) -> Result<Value, Error> {
    car(&list)
}

fn builtin_cdr(list: Value) -> Result<Value, Error> {
    cdr(&list)
}

fn builtin_caar(list: Value) -> Result<Value, Error> {
    car(&car(&list)?)
}

fn builtin_cadr(list: Value) -> Result<Value, Error> {
    car(&cdr(&list)?)
}

fn builtin_cdar(list: Value) -> Result<Value, Error> {
    cdr(&car(&list)?)
}

fn builtin_cddr(list: Value) -> Result<Value, Error> {
    cdr(&cdr(&list)?)
}

fn builtin_caddr(list: Value) -> Result<Value, Error> {
    car(&cdr(&cdr(&list)?)?)
}

fn builtin_list(args: ValueIter<'_>) -> Value {
    Value::list(args.cloned().collect())
}

/// Onto a list, prepend. Onto an atom, build the two-element pair `(a b)`.
fn builtin_cons(first: Value, rest: Value) -> Value {
    match rest.as_list() {
        Some(items) => {
            let mut result = Vec::with_capacity(items.len() + 1);
            result.push(first);
            result.extend_from_slice(items);
            Value::List(result)
        }
        None => Value::List(vec![first, rest]),
    }
}

fn builtin_append(lists: ValueIter<'_>) -> Result<Value, Error> {
    let mut result = Vec::new();
    for list in lists {
        result.extend_from_slice(list_items(list)?);
    }
    Ok(Value::list(result))
}

fn builtin_length(list: ValueIter<'_>) -> usize {
    list.len()
}

/// Zero-based position; negative and NaN numbers are no position
fn position(index: NumberType) -> Option<usize> {
    (index >= 0.0).then_some(index as usize)
}

fn builtin_nth(index: NumberType, list: ValueIter<'_>) -> Value {
    let mut list = list;
    position(index)
        .and_then(|i| list.nth(i))
        .cloned()
        .unwrap_or(Value::Nil)
}

fn builtin_last(list: ValueIter<'_>) -> Value {
    list.last().cloned().unwrap_or(Value::Nil)
}

fn builtin_reverse(list: ValueIter<'_>) -> Value {
    Value::list(list.rev().cloned().collect())
}

/// Tail of the list starting at the first element equal to `item`
fn builtin_member(item: Value, list: Value) -> Result<Value, Error> {
    let items = list_items(&list)?;
    Ok(items
        .iter()
        .position(|v| *v == item)
        .map_or(Value::Nil, |i| Value::List(items[i..].to_vec())))
}

fn builtin_assoc(key: Value, alist: ValueIter<'_>) -> Value {
    let mut alist = alist;
    alist
        .find(|entry| matches!(entry.as_list(), Some([first, ..]) if *first == key))
        .cloned()
        .unwrap_or(Value::Nil)
}

fn substitute(new: &Value, old: &Value, tree: &Value) -> Value {
    if tree == old {
        return new.clone();
    }
    match tree {
        Value::List(items) => {
            Value::list(items.iter().map(|item| substitute(new, old, item)).collect())
        }
        other => other.clone(),
    }
}

fn builtin_subst(new: Value, old: Value, list: Value) -> Result<Value, Error> {
    list_items(&list)?;
    Ok(substitute(&new, &old, &list))
}

fn builtin_vl_position(item: Value, list: ValueIter<'_>) -> Option<usize> {
    let mut list = list;
    list.position(|v| *v == item)
}

fn builtin_vl_remove(item: Value, list: ValueIter<'_>) -> Value {
    Value::list(list.filter(|v| **v != item).cloned().collect())
}

//
// Strings
//

fn builtin_strcat(parts: StringIter<'_>) -> String {
    parts.collect()
}

fn builtin_strlen(parts: StringIter<'_>) -> usize {
    parts.map(|s| s.chars().count()).sum()
}

/// `(substr text start [length])`, start is 1-based
fn builtin_substr(text: &str, start: NumberType, length: NumIter<'_>) -> Result<String, Error> {
    let mut length = length;
    let Some(skip) = position(start - 1.0) else {
        return Err(Error::EvalError(format!(
            "substr: start must be at least 1, got {}",
            Value::Number(start)
        )));
    };
    let chars = text.chars().skip(skip);
    match length.next() {
        None => Ok(chars.collect()),
        Some(n) => match position(n) {
            Some(n) => Ok(chars.take(n).collect()),
            None => Err(Error::EvalError(format!(
                "substr: invalid length {}",
                Value::Number(n)
            ))),
        },
    }
}

/// `(strcase text [lower])`
fn builtin_strcase(text: &str, rest: ValueIter<'_>) -> String {
    let mut rest = rest;
    if rest.next().is_some_and(Value::is_truthy) {
        text.to_lowercase()
    } else {
        text.to_uppercase()
    }
}

/// Leading integer of the text, 0 when there is none
fn builtin_atoi(text: &str) -> NumberType {
    let text = text.trim_start();
    let end = text
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && matches!(c, '+' | '-')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    text[..end].parse::<i64>().map_or(0.0, |n| n as NumberType)
}

/// Longest leading float of the text, 0 when there is none
fn builtin_atof(text: &str) -> NumberType {
    let text = text.trim_start();
    let end = text
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
        .unwrap_or(text.len());
    (1..=end)
        .rev()
        .find_map(|len| text[..len].parse::<NumberType>().ok().filter(|n| n.is_finite()))
        .unwrap_or(0.0)
}

fn builtin_itoa(n: NumberType) -> String {
    (n.trunc() as i64).to_string()
}

/// `(rtos number [mode [precision]])`; mode 1 is scientific, anything else decimal
fn builtin_rtos(n: NumberType, options: NumIter<'_>) -> String {
    let mut options = options;
    let mode = options.next().unwrap_or(2.0) as i64;
    let precision = options.next().map_or(4, |p| p.max(0.0) as usize);
    match mode {
        1 => format!("{n:.precision$E}"),
        _ => format!("{n:.precision$}"),
    }
}

fn builtin_chr(code: NumberType) -> Result<String, Error> {
    if code >= 0.0
        && let Some(ch) = char::from_u32(code as u32)
    {
        return Ok(ch.to_string());
    }
    Err(Error::EvalError(format!(
        "chr: invalid character code {}",
        Value::Number(code)
    )))
}

fn builtin_ascii(text: &str) -> u32 {
    text.chars().next().map_or(0, |c| c as u32)
}

/// `(vl-string-search pattern text [start])`, 0-based character position
fn builtin_vl_string_search(pattern: &str, text: &str, start: NumIter<'_>) -> Option<usize> {
    let mut start = start;
    let start = start.next().and_then(position).unwrap_or(0);
    let byte_start = text
        .char_indices()
        .nth(start)
        .map_or(text.len(), |(i, _)| i);
    text[byte_start..]
        .find(pattern)
        .map(|found| text[..byte_start + found].chars().count())
}

fn builtin_vl_princ_to_string(value: Value) -> String {
    value.to_display_string()
}

/// First expression of the text as data
fn builtin_read(text: &str) -> Result<Value, Error> {
    Ok(parse_program(text)?
        .first()
        .map_or(Value::Nil, Value::from_form))
}

//
// Predicates
//

fn builtin_null(value: Value) -> bool {
    value.is_nil()
}

fn builtin_atom(value: Value) -> bool {
    !matches!(value, Value::List(_))
}

fn builtin_listp(value: Value) -> bool {
    value.as_list().is_some()
}

fn builtin_numberp(value: Value) -> bool {
    matches!(value, Value::Number(_))
}

fn builtin_minusp(n: NumberType) -> bool {
    n < 0.0
}

fn builtin_zerop(n: NumberType) -> bool {
    n == 0.0
}

fn builtin_type(value: Value) -> Value {
    if value.is_nil() {
        Value::Nil
    } else {
        Value::Symbol(value.type_name().to_owned())
    }
}

//
// Selection sets
//

fn builtin_sslength(set: Value) -> Result<usize, Error> {
    Ok(selection(&set)?.len())
}

fn builtin_ssname(set: Value, index: NumberType) -> Result<Option<EntityId>, Error> {
    let ids = selection(&set)?;
    Ok(position(index).and_then(|i| ids.get(i)).copied())
}

/// `(ssadd)` makes an empty set, `(ssadd ename [set])` adds a member
fn builtin_ssadd(args: ValueIter<'_>) -> Result<Value, Error> {
    let mut args = args;
    match (args.next(), args.next()) {
        (None, _) => Ok(Value::SelectionSet(Vec::new())),
        (Some(entity), None) => Ok(Value::SelectionSet(vec![expect_entity(entity)?])),
        (Some(entity), Some(set)) => {
            let id = expect_entity(entity)?;
            let mut ids = selection(set)?.to_vec();
            if !ids.contains(&id) {
                ids.push(id);
            }
            Ok(Value::SelectionSet(ids))
        }
    }
}

fn builtin_ssdel(id: EntityId, set: Value) -> Result<Value, Error> {
    let ids = selection(&set)?;
    if !ids.contains(&id) {
        return Ok(Value::Nil);
    }
    Ok(Value::SelectionSet(
        ids.iter().copied().filter(|member| *member != id).collect(),
    ))
}

fn builtin_ssmemb(id: EntityId, set: Value) -> Result<Option<EntityId>, Error> {
    Ok(selection(&set)?.contains(&id).then_some(id))
}

//
// Registry
//

fn fixed<Args, F>(f: F) -> Arc<OperationFn>
where
    F: IntoOperation<Args>,
{
    <F as IntoOperation<Args>>::into_operation(f)
}

fn variadic<Args, F>(f: F) -> Arc<OperationFn>
where
    F: IntoVariadicOperation<Args>,
{
    <F as IntoVariadicOperation<Args>>::into_variadic_operation(f)
}

fn function(name: &'static str, arity: Arity, op: Arc<OperationFn>) -> BuiltinOp {
    BuiltinOp {
        name,
        op_kind: OpKind::Function(op),
        arity,
    }
}

pub(crate) fn host(name: &'static str, arity: Arity, op: HostFn) -> BuiltinOp {
    BuiltinOp {
        name,
        op_kind: OpKind::Host(op),
        arity,
    }
}

pub(crate) fn suspending(name: &'static str, arity: Arity, op: AsyncFn) -> BuiltinOp {
    BuiltinOp {
        name,
        op_kind: OpKind::Async(op),
        arity,
    }
}

/// Global registry of all builtin operations, built once
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    use Arity::{AtLeast, Any, Exact, Range};

    let mut ops = vec![
        // Arithmetic
        function("+", Any, variadic::<(NumIter<'static>,), _>(builtin_add)),
        function("-", Any, variadic::<(NumIter<'static>,), _>(builtin_sub)),
        function("*", Any, variadic::<(NumIter<'static>,), _>(builtin_mul)),
        function("/", AtLeast(1), variadic::<(NumberType, NumIter<'static>), _>(builtin_div)),
        function("1+", Exact(1), fixed::<(NumberType,), _>(builtin_inc)),
        function("1-", Exact(1), fixed::<(NumberType,), _>(builtin_dec)),
        function("ABS", Exact(1), fixed::<(NumberType,), _>(builtin_abs)),
        function("SQRT", Exact(1), fixed::<(NumberType,), _>(builtin_sqrt)),
        function("EXPT", Exact(2), fixed::<(NumberType, NumberType), _>(builtin_expt)),
        function("EXP", Exact(1), fixed::<(NumberType,), _>(builtin_exp)),
        function("LOG", Exact(1), fixed::<(NumberType,), _>(builtin_log)),
        function("SIN", Exact(1), fixed::<(NumberType,), _>(builtin_sin)),
        function("COS", Exact(1), fixed::<(NumberType,), _>(builtin_cos)),
        function("ATAN", Range(1, 2), variadic::<(NumberType, NumIter<'static>), _>(builtin_atan)),
        function("REM", AtLeast(1), variadic::<(NumberType, NumIter<'static>), _>(builtin_rem)),
        function("FIX", Exact(1), fixed::<(NumberType,), _>(builtin_fix)),
        function("FLOAT", Exact(1), fixed::<(NumberType,), _>(builtin_float)),
        function("MAX", AtLeast(1), variadic::<(NumberType, NumIter<'static>), _>(builtin_max)),
        function("MIN", AtLeast(1), variadic::<(NumberType, NumIter<'static>), _>(builtin_min)),
        function("GCD", Exact(2), fixed::<(NumberType, NumberType), _>(builtin_gcd)),
        function("LOGAND", Any, variadic::<(NumIter<'static>,), _>(builtin_logand)),
        function("LOGIOR", Any, variadic::<(NumIter<'static>,), _>(builtin_logior)),
        // Comparison
        function("=", AtLeast(1), variadic::<(Value, ValueIter<'static>), _>(builtin_num_eq)),
        function("/=", AtLeast(1), variadic::<(Value, ValueIter<'static>), _>(builtin_num_ne)),
        function("<", AtLeast(1), variadic::<(Value, ValueIter<'static>), _>(builtin_lt)),
        function(">", AtLeast(1), variadic::<(Value, ValueIter<'static>), _>(builtin_gt)),
        function("<=", AtLeast(1), variadic::<(Value, ValueIter<'static>), _>(builtin_le)),
        function(">=", AtLeast(1), variadic::<(Value, ValueIter<'static>), _>(builtin_ge)),
        function("EQ", Exact(2), fixed::<(Value, Value), _>(builtin_eq)),
        function(
            "EQUAL",
            Range(2, 3),
            variadic::<(Value, Value, NumIter<'static>), _>(builtin_equal),
        ),
        // Lists
        function("CAR", Exact(1), fixed::<(Value,), _>(builtin_car)),
        function("CDR", Exact(1), fixed::<(Value,), _>(builtin_cdr)),
        function("CAAR", Exact(1), fixed::<(Value,), _>(builtin_caar)),
        function("CADR", Exact(1), fixed::<(Value,), _>(builtin_cadr)),
        function("CDAR", Exact(1), fixed::<(Value,), _>(builtin_cdar)),
        function("CDDR", Exact(1), fixed::<(Value,), _>(builtin_cddr)),
        function("CADDR", Exact(1), fixed::<(Value,), _>(builtin_caddr)),
        function("LIST", Any, variadic::<(ValueIter<'static>,), _>(builtin_list)),
        function("CONS", Exact(2), fixed::<(Value, Value), _>(builtin_cons)),
        function("APPEND", Any, variadic::<(ValueIter<'static>,), _>(builtin_append)),
        function("LENGTH", Exact(1), fixed::<(ValueIter<'static>,), _>(builtin_length)),
        function("NTH", Exact(2), fixed::<(NumberType, ValueIter<'static>), _>(builtin_nth)),
        function("LAST", Exact(1), fixed::<(ValueIter<'static>,), _>(builtin_last)),
        function("REVERSE", Exact(1), fixed::<(ValueIter<'static>,), _>(builtin_reverse)),
        function("MEMBER", Exact(2), fixed::<(Value, Value), _>(builtin_member)),
        function("ASSOC", Exact(2), fixed::<(Value, ValueIter<'static>), _>(builtin_assoc)),
        function("SUBST", Exact(3), fixed::<(Value, Value, Value), _>(builtin_subst)),
        function(
            "VL-POSITION",
            Exact(2),
            fixed::<(Value, ValueIter<'static>), _>(builtin_vl_position),
        ),
        function(
            "VL-REMOVE",
            Exact(2),
            fixed::<(Value, ValueIter<'static>), _>(builtin_vl_remove),
        ),
        // Strings
        function("STRCAT", Any, variadic::<(StringIter<'static>,), _>(builtin_strcat)),
        function("STRLEN", Any, variadic::<(StringIter<'static>,), _>(builtin_strlen)),
        function(
            "SUBSTR",
            Range(2, 3),
            variadic::<(&str, NumberType, NumIter<'static>), _>(builtin_substr),
        ),
        function(
            "STRCASE",
            Range(1, 2),
            variadic::<(&str, ValueIter<'static>), _>(builtin_strcase),
        ),
        function("ATOI", Exact(1), fixed::<(&str,), _>(builtin_atoi)),
        function("ATOF", Exact(1), fixed::<(&str,), _>(builtin_atof)),
        function("ITOA", Exact(1), fixed::<(NumberType,), _>(builtin_itoa)),
        function(
            "RTOS",
            Range(1, 3),
            variadic::<(NumberType, NumIter<'static>), _>(builtin_rtos),
        ),
        function("CHR", Exact(1), fixed::<(NumberType,), _>(builtin_chr)),
        function("ASCII", Exact(1), fixed::<(&str,), _>(builtin_ascii)),
        function(
            "VL-STRING-SEARCH",
            Range(2, 3),
            variadic::<(&str, &str, NumIter<'static>), _>(builtin_vl_string_search),
        ),
        function(
            "VL-PRINC-TO-STRING",
            Exact(1),
            fixed::<(Value,), _>(builtin_vl_princ_to_string),
        ),
        function("READ", Exact(1), fixed::<(&str,), _>(builtin_read)),
        // Predicates
        function("NOT", Exact(1), fixed::<(Value,), _>(builtin_null)),
        function("NULL", Exact(1), fixed::<(Value,), _>(builtin_null)),
        function("ATOM", Exact(1), fixed::<(Value,), _>(builtin_atom)),
        function("LISTP", Exact(1), fixed::<(Value,), _>(builtin_listp)),
        function("NUMBERP", Exact(1), fixed::<(Value,), _>(builtin_numberp)),
        function("MINUSP", Exact(1), fixed::<(NumberType,), _>(builtin_minusp)),
        function("ZEROP", Exact(1), fixed::<(NumberType,), _>(builtin_zerop)),
        function("TYPE", Exact(1), fixed::<(Value,), _>(builtin_type)),
        // Selection sets
        function("SSLENGTH", Exact(1), fixed::<(Value,), _>(builtin_sslength)),
        function("SSNAME", Exact(2), fixed::<(Value, NumberType), _>(builtin_ssname)),
        function("SSADD", Range(0, 2), variadic::<(ValueIter<'static>,), _>(builtin_ssadd)),
        function("SSDEL", Exact(2), fixed::<(EntityId, Value), _>(builtin_ssdel)),
        function("SSMEMB", Exact(2), fixed::<(EntityId, Value), _>(builtin_ssmemb)),
    ];

    ops.extend(cad::ops());
    ops.extend(interactive::ops());
    ops
});

/// Lookup table from name to operation
static BUILTIN_INDEX: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.name, op)).collect()
});

/// All builtin operations, in registration order
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin by canonical name
pub(crate) fn find_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_INDEX.get(name).copied()
}

/// Names of every builtin, for completion and listings
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    get_builtin_ops().iter().map(|op| op.name)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};
    use crate::host::MemoryHost;
    use std::collections::HashSet;

    /// Evaluation should succeed with this value, or fail
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),
        SpecificError(&'static str),
        Error,
    }
    use TestResult::*;

    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    /// Invoke a pure builtin through the registry using the erased signature
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, crate::Error> {
        let op = find_op(name).unwrap();
        op.arity.validate(args.len())?;
        match &op.op_kind {
            OpKind::Function(func) => func(args.to_vec()),
            other => panic!("expected a pure builtin for {name}, got {other:?}"),
        }
    }

    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let mut interp = Interpreter::new(MemoryHost::new());
            let test_id = format!("#{} '{}'", i + 1, input);
            match (interp.eval_now(input), expected) {
                (Ok(actual), EvalResult(expected_val)) => {
                    assert_eq!(&actual, expected_val, "{test_id}");
                }
                (Err(_), Error) => {}
                (Err(e), SpecificError(text)) => {
                    let msg = format!("{e}");
                    assert!(msg.contains(text), "{test_id}: error should contain '{text}', got: {msg}");
                }
                (actual, expected) => panic!("{test_id}: expected {expected:?}, got {actual:?}"),
            }
        }
    }

    #[test]
    fn test_registry() {
        let ops = get_builtin_ops();
        let names: HashSet<_> = ops.iter().map(|op| op.name).collect();
        assert_eq!(names.len(), ops.len(), "builtin names must be unique");
        assert!(ops.len() >= 100, "only {} builtins registered", ops.len());

        for op in ops {
            assert_eq!(op.name, op.name.to_uppercase(), "{} is not canonical", op.name);
            assert!(std::ptr::eq(find_op(op.name).unwrap(), op));
        }

        assert_eq!(find_op("CAR").unwrap().arity, Arity::Exact(1));
        assert!(find_op("car").is_none());
        assert!(find_op("SETQ").is_none(), "special forms are not builtins");
        assert!(builtin_names().any(|name| name == "GETPOINT"));
    }

    #[test]
    fn test_call_through_registry() {
        assert_eq!(call_builtin("+", &[val(1), val(2), val(3)]).unwrap(), val(6));
        assert_eq!(call_builtin("+", &[]).unwrap(), val(0));
        assert!(matches!(
            call_builtin("CAR", &[]),
            Err(crate::Error::ArityError { expected: 1, got: 0, .. })
        ));
        assert!(matches!(
            call_builtin("+", &[val(1), val("x")]),
            Err(crate::Error::TypeError(_))
        ));
    }

    #[test]
    #[expect(clippy::too_many_lines)]
    fn test_pure_builtins_data_driven() {
        let test_cases = vec![
            // === ARITHMETIC ===
            ("(+ 1 2 3)", success(6)),
            ("(+ 1.5 2)", success(3.5)),
            ("(-)", success(0)),
            ("(- 5)", success(-5)),
            ("(- 10 3 2)", success(5)),
            ("(*)", success(0)),
            ("(* 2 3 4)", success(24)),
            ("(/ 7 2)", success(3.5)),
            ("(/ 8)", success(8)),
            ("(/ 1 0)", SpecificError("divide by zero")),
            ("(1+ 5)", success(6)),
            ("(1- 5)", success(4)),
            ("(abs -3)", success(3)),
            ("(sqrt 16)", success(4)),
            ("(sqrt -1)", SpecificError("function undefined for argument: -1")),
            ("(expt 2 10)", success(1024)),
            ("(exp 0)", success(1)),
            ("(log 1)", success(0)),
            ("(log 0)", Error),
            ("(sin 0)", success(0)),
            ("(cos 0)", success(1)),
            ("(atan 0)", success(0)),
            ("(atan 1 0)", success(std::f64::consts::FRAC_PI_2)),
            ("(rem 7 3)", success(1)),
            ("(rem 7 0)", SpecificError("divide by zero")),
            ("(fix 3.7)", success(3)),
            ("(fix -3.7)", success(-3)),
            ("(float 3)", success(3)),
            ("(max 1 5 3)", success(5)),
            ("(min 4 2 8)", success(2)),
            ("(gcd 12 18)", success(6)),
            ("(gcd 1.5 3)", Error),
            ("(logand 7 12)", success(4)),
            ("(logior 1 4)", success(5)),
            ("(+ 1 \"2\")", SpecificError("expected number")),
            ("(abs)", SpecificError("ArityError: abs")),
            // === COMPARISON ===
            ("(= 1 1 1)", success(true)),
            ("(= 1 2)", success(false)),
            ("(= \"a\" \"a\")", success(true)),
            ("(/= 1 2)", success(true)),
            ("(/= 1 1)", success(false)),
            ("(< 1 2 3)", success(true)),
            ("(< 1 3 2)", success(false)),
            ("(> 3 2 1)", success(true)),
            ("(<= 1 1 2)", success(true)),
            ("(>= 2 2 3)", success(false)),
            ("(< \"abc\" \"abd\")", success(true)),
            ("(< 1 \"a\")", SpecificError("cannot compare")),
            ("(eq 'a 'a)", success(true)),
            ("(eq 'a 'b)", success(false)),
            ("(equal '(1 (2 \"x\")) '(1 (2 \"x\")))", success(true)),
            ("(equal 1.0 1.05 0.1)", success(true)),
            ("(equal 1.0 1.5 0.1)", success(false)),
            ("(equal '(1 2) '(1.01 2) 0.1)", success(true)),
            // === LISTS ===
            ("(car '(1 2 3))", success(1)),
            ("(car nil)", EvalResult(nil())),
            ("(car 5)", SpecificError("expected list")),
            ("(cdr '(1 2 3))", success([2, 3])),
            ("(cdr '(1))", EvalResult(nil())),
            ("(caar '((1 2) 3))", success(1)),
            ("(cadr '(1 2 3))", success(2)),
            ("(cdar '((1 2) 3))", success([2])),
            ("(cddr '(1 2 3))", success([3])),
            ("(caddr '(1 2 3))", success(3)),
            ("(list 1 \"a\" 'b)", EvalResult(val(vec![val(1), val("a"), sym("b")]))),
            ("(list)", EvalResult(nil())),
            ("(cons 1 '(2 3))", success([1, 2, 3])),
            ("(cons 1 nil)", success([1])),
            ("(cons 0 \"LINE\")", EvalResult(val(vec![val(0), val("LINE")]))),
            ("(car (cons 'a '(b)))", EvalResult(sym("a"))),
            ("(append '(1 2) '(3) nil '(4))", success([1, 2, 3, 4])),
            ("(append)", EvalResult(nil())),
            ("(append '(1) 2)", Error),
            ("(length '(1 2 3))", success(3)),
            ("(length nil)", success(0)),
            ("(length (append '(1 2) '(3 4 5)))", success(5)),
            ("(nth 1 '(a b c))", EvalResult(sym("b"))),
            ("(nth 5 '(a b c))", EvalResult(nil())),
            ("(nth -1 '(a b c))", EvalResult(nil())),
            ("(nth (expt -1 0.5) '(a b c))", EvalResult(nil())),
            ("(last '(1 2 3))", success(3)),
            ("(last nil)", EvalResult(nil())),
            ("(reverse '(1 2 3))", success([3, 2, 1])),
            ("(member 2 '(1 2 3))", success([2, 3])),
            ("(member 9 '(1 2 3))", EvalResult(nil())),
            ("(assoc 8 '((0 \"LINE\") (8 \"WALLS\")))", EvalResult(val(vec![val(8), val("WALLS")]))),
            ("(assoc 40 '((0 \"LINE\")))", EvalResult(nil())),
            ("(subst 'x 'b '(a b (b c)))", EvalResult(val(vec![sym("a"), sym("x"), val(vec![sym("x"), sym("c")])]))),
            ("(vl-position 'c '(a b c))", success(2)),
            ("(vl-position 'z '(a b c))", EvalResult(nil())),
            ("(vl-remove 2 '(1 2 3 2))", success([1, 3])),
            // === STRINGS ===
            ("(strcat \"foo\" \"bar\")", success("foobar")),
            ("(strcat)", success("")),
            ("(strcat \"a\" 1)", SpecificError("expected string")),
            ("(strlen \"hello\")", success(5)),
            ("(strlen \"ab\" \"cd\")", success(4)),
            ("(substr \"Hello World\" 7)", success("World")),
            ("(substr \"Hello\" 2 3)", success("ell")),
            ("(substr \"Hello\" 9)", success("")),
            ("(substr \"Hello\" 0)", SpecificError("substr: start must be at least 1")),
            ("(substr \"abc\" (expt -1 0.5))", SpecificError("substr: start must be at least 1")),
            ("(substr \"abc\" 2 (expt -1 0.5))", SpecificError("substr: invalid length")),
            ("(substr \"abc\" 2 -1)", SpecificError("substr: invalid length")),
            ("(vl-string-search \"b\" \"abc\" (expt -1 0.5))", success(1)),
            ("(strcase \"MiXed\")", success("MIXED")),
            ("(strcase \"MiXed\" t)", success("mixed")),
            ("(atoi \"42\")", success(42)),
            ("(atoi \"  -7abc\")", success(-7)),
            ("(atoi \"3.9\")", success(3)),
            ("(atoi \"abc\")", success(0)),
            ("(atof \"2.5\")", success(2.5)),
            ("(atof \"1e2x\")", success(100)),
            ("(atof \"x\")", success(0)),
            ("(itoa 42)", success("42")),
            ("(itoa -3.7)", success("-3")),
            ("(rtos 3.14159)", success("3.1416")),
            ("(rtos 3.14159 2 2)", success("3.14")),
            ("(rtos 2 2 0)", success("2")),
            ("(chr 65)", success("A")),
            ("(chr -1)", Error),
            ("(ascii \"A\")", success(65)),
            ("(ascii \"\")", success(0)),
            ("(vl-string-search \"lo\" \"hello\")", success(3)),
            ("(vl-string-search \"x\" \"hello\")", EvalResult(nil())),
            ("(vl-string-search \"l\" \"hello\" 3)", success(3)),
            ("(vl-princ-to-string '(1 \"a\"))", success("(1 \"a\")")),
            ("(vl-princ-to-string \"plain\")", success("plain")),
            ("(read \"(1 2)\")", success([1, 2])),
            ("(read \"foo bar\")", EvalResult(sym("foo"))),
            ("(read \"\")", EvalResult(nil())),
            ("(read \"(1\")", SpecificError("SyntaxError")),
            // === PREDICATES ===
            ("(not nil)", success(true)),
            ("(not 0)", success(false)),
            ("(null '())", success(true)),
            ("(atom 'a)", success(true)),
            ("(atom '(1))", success(false)),
            ("(atom nil)", success(true)),
            ("(listp nil)", success(true)),
            ("(listp '(1))", success(true)),
            ("(listp 1)", success(false)),
            ("(numberp 1.5)", success(true)),
            ("(numberp \"1\")", success(false)),
            ("(minusp -1)", success(true)),
            ("(zerop 0)", success(true)),
            ("(zerop 'a)", Error),
            ("(type 1)", EvalResult(sym("real"))),
            ("(type \"s\")", EvalResult(sym("str"))),
            ("(type 'a)", EvalResult(sym("sym"))),
            ("(type '(1))", EvalResult(sym("list"))),
            ("(type nil)", EvalResult(nil())),
            ("(type car)", EvalResult(nil())),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_selection_set_builtins() {
        let a = Value::Entity(EntityId(1));
        let b = Value::Entity(EntityId(2));
        let set = Value::SelectionSet(vec![EntityId(1)]);

        assert_eq!(call_builtin("SSADD", &[]).unwrap(), Value::SelectionSet(vec![]));
        let grown = call_builtin("SSADD", &[b.clone(), set.clone()]).unwrap();
        assert_eq!(grown, Value::SelectionSet(vec![EntityId(1), EntityId(2)]));
        // Adding a member twice keeps one copy
        assert_eq!(call_builtin("SSADD", &[a.clone(), set.clone()]).unwrap(), set);

        assert_eq!(call_builtin("SSLENGTH", &[grown.clone()]).unwrap(), val(2));
        assert_eq!(call_builtin("SSNAME", &[grown.clone(), val(1)]).unwrap(), b);
        assert_eq!(call_builtin("SSNAME", &[grown.clone(), val(5)]).unwrap(), nil());
        assert_eq!(call_builtin("SSNAME", &[grown.clone(), val(f64::NAN)]).unwrap(), nil());
        assert_eq!(call_builtin("SSMEMB", &[b.clone(), grown.clone()]).unwrap(), b);
        assert_eq!(call_builtin("SSMEMB", &[b.clone(), set.clone()]).unwrap(), nil());
        assert_eq!(call_builtin("SSDEL", &[a.clone(), grown]).unwrap(), Value::SelectionSet(vec![EntityId(2)]));
        assert_eq!(call_builtin("SSDEL", &[b, set]).unwrap(), nil());
        assert!(matches!(
            call_builtin("SSLENGTH", &[val(1)]),
            Err(crate::Error::TypeError(_))
        ));
    }
}
