use std::f64::consts::PI;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::Error;
use crate::ast::{Closure, Form, UserFunction, Value};
use crate::builtinops::{BuiltinOp, OpKind, find_op};
use crate::environment::Environment;
use crate::interpreter::Interpreter;

pub(crate) mod intooperation;

pub(crate) use intooperation::{
    IntoOperation, IntoVariadicOperation, NumIter, OperationFn, StringIter, ValueIter,
};

/// Boxed evaluation future. Evaluation is recursive, so every level is boxed.
pub(crate) type EvalFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, Error>> + 'a>>;

/// Remaining stack below which polling switches to a fresh segment
const RED_ZONE: usize = 100 * 1024;

/// Size of each new stack segment
const STACK_GROWTH: usize = 1024 * 1024;

/// Polls the inner future on a grown stack when the current one runs low.
/// Nested evaluation polls nest as deeply as the forms do.
struct StackGuard<'a>(EvalFuture<'a>);

impl Future for StackGuard<'_> {
    type Output = Result<Value, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.0;
        stacker::maybe_grow(RED_ZONE, STACK_GROWTH, || inner.as_mut().poll(cx))
    }
}

/// Accepted argument counts of a builtin or special form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn validate(&self, got: usize) -> Result<(), Error> {
        match *self {
            Arity::Exact(n) if got != n => Err(Error::arity_error(n, got)),
            Arity::AtLeast(n) if got < n => Err(Error::arity_error(n, got)),
            Arity::Range(min, _) if got < min => Err(Error::arity_error(min, got)),
            Arity::Range(_, max) if got > max => Err(Error::arity_error(max, got)),
            _ => Ok(()),
        }
    }
}

/// Attach the operator name to an anonymous arity error
fn named(error: Error, name: &str) -> Error {
    match error {
        Error::ArityError {
            expected,
            got,
            expression: None,
        } => Error::arity_error_with_expr(expected, got, name.to_lowercase()),
        other => other,
    }
}

/// A special form whose shape is wrong
fn malformed(form: &str, detail: impl std::fmt::Display) -> Error {
    Error::SyntaxError(format!("malformed {}: {detail}", form.to_lowercase()))
}

/// Forms whose operands are not evaluated before dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpecialForm {
    Quote,
    Function,
    Setq,
    If,
    Cond,
    While,
    Repeat,
    Foreach,
    Progn,
    Defun,
    Lambda,
    And,
    Or,
}

impl SpecialForm {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        let form = match name {
            "QUOTE" => SpecialForm::Quote,
            "FUNCTION" => SpecialForm::Function,
            "SETQ" => SpecialForm::Setq,
            "IF" => SpecialForm::If,
            "COND" => SpecialForm::Cond,
            "WHILE" => SpecialForm::While,
            "REPEAT" => SpecialForm::Repeat,
            "FOREACH" => SpecialForm::Foreach,
            "PROGN" => SpecialForm::Progn,
            "DEFUN" => SpecialForm::Defun,
            "LAMBDA" => SpecialForm::Lambda,
            "AND" => SpecialForm::And,
            "OR" => SpecialForm::Or,
            _ => return None,
        };
        Some(form)
    }

    fn arity(self) -> Arity {
        match self {
            SpecialForm::Quote | SpecialForm::Function => Arity::Exact(1),
            SpecialForm::If => Arity::Range(2, 3),
            SpecialForm::While | SpecialForm::Repeat | SpecialForm::Lambda => Arity::AtLeast(1),
            SpecialForm::Foreach | SpecialForm::Defun => Arity::AtLeast(2),
            SpecialForm::Setq
            | SpecialForm::Cond
            | SpecialForm::Progn
            | SpecialForm::And
            | SpecialForm::Or => Arity::Any,
        }
    }
}

/// Something that can be applied to evaluated arguments
#[derive(Debug, Clone)]
pub(crate) enum Callable {
    Builtin(&'static BuiltinOp),
    Closure(Rc<Closure>),
    Defun(Rc<UserFunction>),
}

/// Evaluate a form. `env` is the local frame of the running top-level form
/// or function call; the global frame lives in the interpreter.
pub(crate) fn eval<'a>(
    interp: &'a mut Interpreter,
    form: &'a Form,
    env: &'a mut Environment,
    depth: usize,
) -> EvalFuture<'a> {
    Box::pin(StackGuard(Box::pin(async move {
        let max_depth = interp.config.max_eval_depth;
        if depth >= max_depth {
            return Err(Error::EvalError(format!(
                "evaluation depth limit exceeded (max: {max_depth})"
            )));
        }

        match form {
            Form::Number(n) => Ok(Value::Number(*n)),
            Form::String(s) => Ok(Value::String(s.clone())),
            Form::Symbol(name) => Ok(lookup(interp, env, name)),
            Form::List(items) => {
                let Some((head, args)) = items.split_first() else {
                    return Ok(Value::Nil);
                };
                if let Some(name) = head.as_symbol()
                    && let Some(special) = SpecialForm::from_name(name)
                {
                    if special.arity().validate(args.len()).is_err() {
                        let detail = format!("{} operand(s) in {form}", args.len());
                        return Err(malformed(name, detail));
                    }
                    return eval_special(special, interp, args, env, depth).await;
                }
                eval_application(interp, head, args, env, depth).await
            }
        }
    })))
}

fn lookup(interp: &Interpreter, env: &Environment, name: &str) -> Value {
    match name {
        "T" => Value::True,
        "NIL" => Value::Nil,
        "PI" => Value::Number(PI),
        _ => env
            .get(name)
            .or_else(|| interp.globals.get(name))
            .cloned()
            .unwrap_or(Value::Nil),
    }
}

async fn eval_special(
    special: SpecialForm,
    interp: &mut Interpreter,
    args: &[Form],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    match special {
        SpecialForm::Quote => Ok(Value::from_form(&args[0])),
        SpecialForm::Function => eval_function(interp, args, env, depth).await,
        SpecialForm::Setq => eval_setq(interp, args, env, depth).await,
        SpecialForm::If => eval_if(interp, args, env, depth).await,
        SpecialForm::Cond => eval_cond(interp, args, env, depth).await,
        SpecialForm::While => eval_while(interp, args, env, depth).await,
        SpecialForm::Repeat => eval_repeat(interp, args, env, depth).await,
        SpecialForm::Foreach => eval_foreach(interp, args, env, depth).await,
        SpecialForm::Progn => eval_body(interp, args, env, depth).await,
        SpecialForm::Defun => eval_defun(interp, args),
        SpecialForm::Lambda => {
            let closure = make_closure(&args[0], &args[1..], env, &interp.globals)?;
            Ok(Value::Closure(closure))
        }
        SpecialForm::And => {
            for arg in args {
                if !eval(interp, arg, env, depth + 1).await?.is_truthy() {
                    return Ok(Value::Nil);
                }
            }
            Ok(Value::True)
        }
        SpecialForm::Or => {
            for arg in args {
                let value = eval(interp, arg, env, depth + 1).await?;
                if value.is_truthy() {
                    return Ok(value);
                }
            }
            Ok(Value::Nil)
        }
    }
}

/// Evaluate forms in order, returning the last value (nil when empty)
async fn eval_body(
    interp: &mut Interpreter,
    forms: &[Form],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    let mut result = Value::Nil;
    for form in forms {
        result = eval(interp, form, env, depth + 1).await?;
    }
    Ok(result)
}

/// `(function (lambda ...))` builds the closure, `(function name)` names a function
async fn eval_function(
    interp: &mut Interpreter,
    args: &[Form],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    match &args[0] {
        Form::Symbol(name) => Ok(Value::Symbol(name.clone())),
        lambda @ Form::List(items) if items.first().and_then(Form::as_symbol) == Some("LAMBDA") => {
            eval(interp, lambda, env, depth + 1).await
        }
        other => Ok(Value::from_form(other)),
    }
}

/// Pairs of `name value`, always assigned in the global frame
async fn eval_setq(
    interp: &mut Interpreter,
    args: &[Form],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    if args.len() % 2 != 0 {
        return Err(malformed("setq", format_args!("no value for {}", args[args.len() - 1])));
    }

    let mut result = Value::Nil;
    for pair in args.chunks(2) {
        let name = match &pair[0] {
            Form::Symbol(name) if matches!(name.as_str(), "T" | "NIL" | "PI") => {
                return Err(Error::EvalError(format!("setq: cannot assign to constant {name}")));
            }
            Form::Symbol(name) => name,
            other => return Err(malformed("setq", format_args!("expected symbol, got {other}"))),
        };
        result = eval(interp, &pair[1], env, depth + 1).await?;
        interp.globals.define(name.clone(), result.clone());
    }
    Ok(result)
}

async fn eval_if(
    interp: &mut Interpreter,
    args: &[Form],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    if eval(interp, &args[0], env, depth + 1).await?.is_truthy() {
        eval(interp, &args[1], env, depth + 1).await
    } else if let Some(else_form) = args.get(2) {
        eval(interp, else_form, env, depth + 1).await
    } else {
        Ok(Value::Nil)
    }
}

async fn eval_cond(
    interp: &mut Interpreter,
    args: &[Form],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    for clause in args {
        let Form::List(parts) = clause else {
            return Err(malformed("cond", format_args!("clause must be a list, got {clause}")));
        };
        let Some((test, body)) = parts.split_first() else {
            continue;
        };

        let test_value = eval(interp, test, env, depth + 1).await?;
        if test_value.is_truthy() {
            if body.is_empty() {
                return Ok(test_value);
            }
            return eval_body(interp, body, env, depth).await;
        }
    }
    Ok(Value::Nil)
}

async fn eval_while(
    interp: &mut Interpreter,
    args: &[Form],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    let (test, body) = (&args[0], &args[1..]);
    let mut result = Value::Nil;
    while eval(interp, test, env, depth + 1).await?.is_truthy() {
        result = eval_body(interp, body, env, depth).await?;
    }
    Ok(result)
}

async fn eval_repeat(
    interp: &mut Interpreter,
    args: &[Form],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    let count = eval(interp, &args[0], env, depth + 1).await?;
    let Some(count) = count.as_number() else {
        return Err(Error::TypeError(format!("repeat: expected number, got {count}")));
    };

    let mut result = Value::Nil;
    for _ in 0..(count.trunc() as i64).max(0) {
        result = eval_body(interp, &args[1..], env, depth).await?;
    }
    Ok(result)
}

/// The loop variable is bound in the current frame and stays bound afterwards
async fn eval_foreach(
    interp: &mut Interpreter,
    args: &[Form],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    let Some(var) = args[0].as_symbol() else {
        return Err(malformed("foreach", format_args!("expected symbol, got {}", args[0])));
    };
    let list = eval(interp, &args[1], env, depth + 1).await?;
    let Some(items) = list.as_list() else {
        return Err(Error::TypeError(format!("foreach: expected list, got {list}")));
    };

    let mut result = Value::Nil;
    for item in items.to_vec() {
        env.define(var.to_owned(), item);
        result = eval_body(interp, &args[2..], env, depth).await?;
    }
    Ok(result)
}

fn eval_defun(interp: &mut Interpreter, args: &[Form]) -> Result<Value, Error> {
    let Some(name) = args[0].as_symbol() else {
        return Err(malformed("defun", format_args!("expected function name, got {}", args[0])));
    };
    let params = parse_params("defun", &args[1])?;
    log::debug!("defun {name} ({})", params.join(" "));

    interp.functions.insert(
        name.to_owned(),
        Rc::new(UserFunction {
            name: name.to_owned(),
            params,
            body: args[2..].to_vec(),
        }),
    );
    Ok(Value::Symbol(name.to_owned()))
}

/// Parameter names, stopping at `/` (the names after it declare locals)
fn parse_params(owner: &str, form: &Form) -> Result<Vec<String>, Error> {
    match form {
        Form::Symbol(s) if s == "NIL" => Ok(Vec::new()),
        Form::List(items) => items
            .iter()
            .take_while(|item| item.as_symbol() != Some("/"))
            .map(|item| match item {
                Form::Symbol(name) => Ok(name.clone()),
                other => Err(malformed(
                    owner,
                    format_args!("parameter must be a symbol, got {other}"),
                )),
            })
            .collect(),
        other => Err(malformed(owner, format_args!("parameter list expected, got {other}"))),
    }
}

fn make_closure(
    params: &Form,
    body: &[Form],
    env: &Environment,
    globals: &Environment,
) -> Result<Rc<Closure>, Error> {
    Ok(Rc::new(Closure {
        params: parse_params("lambda", params)?,
        body: body.to_vec(),
        captured: Environment::snapshot(env, globals),
    }))
}

/// Operator resolution order: builtin, closure bound to the name, defun
fn resolve_symbol(interp: &Interpreter, env: &Environment, name: &str) -> Option<Callable> {
    if let Some(op) = find_op(name) {
        return Some(Callable::Builtin(op));
    }
    if let Some(Value::Closure(closure)) = env.get(name).or_else(|| interp.globals.get(name)) {
        return Some(Callable::Closure(Rc::clone(closure)));
    }
    interp.functions.get(name).cloned().map(Callable::Defun)
}

/// Interpret an evaluated value as a function, as `mapcar` and `apply` do:
/// a closure, a quoted name, or a quoted `(lambda ...)` list.
pub(crate) fn callable_from_value(
    interp: &Interpreter,
    env: &Environment,
    value: &Value,
) -> Result<Callable, Error> {
    match value {
        Value::Closure(closure) => Ok(Callable::Closure(Rc::clone(closure))),
        Value::Symbol(name) => {
            resolve_symbol(interp, env, name).ok_or_else(|| Error::UnknownFunction(name.clone()))
        }
        Value::List(items) if items.first() == Some(&Value::Symbol("LAMBDA".into())) => {
            let Some(Form::List(parts)) = Form::from_value(value) else {
                return Err(Error::TypeError(format!("not a function: {value}")));
            };
            let Some(params) = parts.get(1) else {
                return Err(malformed("lambda", format_args!("missing parameter list in {value}")));
            };
            Ok(Callable::Closure(make_closure(
                params,
                &parts[2..],
                env,
                &interp.globals,
            )?))
        }
        other => Err(Error::TypeError(format!("not a function: {other}"))),
    }
}

async fn eval_application(
    interp: &mut Interpreter,
    head: &Form,
    arg_forms: &[Form],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    let mut args = Vec::with_capacity(arg_forms.len());
    for arg in arg_forms {
        args.push(eval(interp, arg, env, depth + 1).await?);
    }

    // Operands before the operator
    let callable = match head {
        Form::Symbol(name) => resolve_symbol(interp, env, name)
            .ok_or_else(|| Error::UnknownFunction(name.clone()))?,
        other => {
            let value = eval(interp, other, env, depth + 1).await?;
            callable_from_value(interp, env, &value)?
        }
    };

    apply(interp, callable, args, env, depth + 1).await
}

fn bind_params(frame: &mut Environment, params: &[String], args: Vec<Value>) {
    let mut args = args.into_iter();
    for param in params {
        frame.define(param.clone(), args.next().unwrap_or(Value::Nil));
    }
}

/// Apply a callable to evaluated arguments. Closures run in a copy of their
/// captured frame, defun functions in a copy of the caller's frame. Missing
/// arguments bind nil and extra ones are dropped.
pub(crate) fn apply<'a>(
    interp: &'a mut Interpreter,
    callable: Callable,
    args: Vec<Value>,
    caller: &'a Environment,
    depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move {
        match callable {
            Callable::Builtin(op) => {
                op.arity.validate(args.len()).map_err(|e| named(e, op.name))?;
                let result = match &op.op_kind {
                    OpKind::Function(f) => f(args),
                    OpKind::Host(f) => f(interp, args),
                    OpKind::Async(f) => f(interp, caller, args, depth).await,
                };
                result.map_err(|e| named(e, op.name))
            }
            Callable::Closure(closure) => {
                let mut frame = closure.captured.clone();
                bind_params(&mut frame, &closure.params, args);
                eval_body(interp, &closure.body, &mut frame, depth).await
            }
            Callable::Defun(function) => {
                let mut frame = caller.clone();
                bind_params(&mut frame, &function.params, args);
                eval_body(interp, &function.body, &mut frame, depth).await
            }
        }
    })
}
