//! Builtins that may suspend: user input requests, which wait on the input
//! broker, and the higher-order builtins, which call back into the evaluator
//! and so can suspend whenever the function they call does.

use crate::Error;
use crate::ast::{Form, Value};
use crate::broker::InputKind;
use crate::environment::Environment;
use crate::evaluator::Arity::{AtLeast, Exact, Range};
use crate::evaluator::{EvalFuture, apply, callable_from_value, eval};
use crate::host::Point;
use crate::interpreter::Interpreter;

use super::{BuiltinOp, cad, expect_point, list_items, suspending};

/// Optional base point and prompt text, in any order
fn prompt_args(args: &[Value]) -> Result<(String, Option<Point>), Error> {
    let mut prompt = String::new();
    let mut base = None;
    for arg in args {
        match arg {
            Value::String(text) => prompt.clone_from(text),
            Value::Nil => {}
            other => base = Some(expect_point(other)?),
        }
    }
    Ok((prompt, base))
}

async fn request(
    interp: &mut Interpreter,
    kind: InputKind,
    args: &[Value],
) -> Result<Value, Error> {
    let (prompt, base) = prompt_args(args)?;
    interp.request_input(kind, prompt, base).await
}

fn builtin_getpoint<'a>(
    interp: &'a mut Interpreter,
    _env: &'a Environment,
    args: Vec<Value>,
    _depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move { request(interp, InputKind::Point, &args).await })
}

/// The base corner is required
fn builtin_getcorner<'a>(
    interp: &'a mut Interpreter,
    _env: &'a Environment,
    args: Vec<Value>,
    _depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move {
        expect_point(&args[0])?;
        request(interp, InputKind::Corner, &args).await
    })
}

fn builtin_getdist<'a>(
    interp: &'a mut Interpreter,
    _env: &'a Environment,
    args: Vec<Value>,
    _depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move { request(interp, InputKind::Dist, &args).await })
}

fn builtin_getangle<'a>(
    interp: &'a mut Interpreter,
    _env: &'a Environment,
    args: Vec<Value>,
    _depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move { request(interp, InputKind::Angle, &args).await })
}

fn builtin_getreal<'a>(
    interp: &'a mut Interpreter,
    _env: &'a Environment,
    args: Vec<Value>,
    _depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move { request(interp, InputKind::Real, &args).await })
}

fn builtin_getint<'a>(
    interp: &'a mut Interpreter,
    _env: &'a Environment,
    args: Vec<Value>,
    _depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move { request(interp, InputKind::Int, &args).await })
}

/// `(getstring [allow-spaces] [prompt])`; the flag is up to the host UI
fn builtin_getstring<'a>(
    interp: &'a mut Interpreter,
    _env: &'a Environment,
    args: Vec<Value>,
    _depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move {
        let prompt: Vec<Value> = args
            .into_iter()
            .filter(|arg| matches!(arg, Value::String(_)))
            .collect();
        request(interp, InputKind::String, &prompt).await
    })
}

fn builtin_getkword<'a>(
    interp: &'a mut Interpreter,
    _env: &'a Environment,
    args: Vec<Value>,
    _depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move { request(interp, InputKind::Keyword, &args).await })
}

/// Answers `(ename (x y z))` or nil
fn builtin_entsel<'a>(
    interp: &'a mut Interpreter,
    _env: &'a Environment,
    args: Vec<Value>,
    _depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move { request(interp, InputKind::EntSel, &args).await })
}

/// `(ssget)` asks the user to select; `(ssget "X" [filter])` takes the whole
/// drawing, optionally filtered, without suspending
fn builtin_ssget<'a>(
    interp: &'a mut Interpreter,
    _env: &'a Environment,
    args: Vec<Value>,
    _depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move {
        match args.first() {
            Some(Value::String(mode)) if mode.eq_ignore_ascii_case("X") => {
                cad::select_all(interp, args.get(1))
            }
            Some(Value::String(mode)) => Err(Error::EvalError(format!(
                "ssget: unsupported selection mode {mode:?}"
            ))),
            _ => {
                interp
                    .request_input(InputKind::SsGet, "Select objects: ".to_owned(), None)
                    .await
            }
        }
    })
}

/// `(mapcar fn list...)`, stopping at the shortest list
fn builtin_mapcar<'a>(
    interp: &'a mut Interpreter,
    env: &'a Environment,
    args: Vec<Value>,
    depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move {
        let callable = callable_from_value(interp, env, &args[0])?;
        let lists = args[1..]
            .iter()
            .map(list_items)
            .collect::<Result<Vec<_>, _>>()?;
        let count = lists.iter().map(|list| list.len()).min().unwrap_or(0);

        let mut results = Vec::with_capacity(count);
        for i in 0..count {
            let call_args = lists.iter().map(|list| list[i].clone()).collect();
            results.push(apply(interp, callable.clone(), call_args, env, depth + 1).await?);
        }
        Ok(Value::list(results))
    })
}

fn builtin_apply<'a>(
    interp: &'a mut Interpreter,
    env: &'a Environment,
    args: Vec<Value>,
    depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move {
        let callable = callable_from_value(interp, env, &args[0])?;
        let call_args = list_items(&args[1])?.to_vec();
        apply(interp, callable, call_args, env, depth + 1).await
    })
}

/// Evaluate data as code, in a copy of the caller's frame. Values without a
/// textual form (closures, entity names, selection sets) evaluate to themselves.
fn builtin_eval<'a>(
    interp: &'a mut Interpreter,
    env: &'a Environment,
    args: Vec<Value>,
    depth: usize,
) -> EvalFuture<'a> {
    Box::pin(async move {
        let mut args = args;
        let value = args.swap_remove(0);
        let Some(form) = Form::from_value(&value) else {
            return Ok(value);
        };
        let mut frame = env.clone();
        eval(interp, &form, &mut frame, depth + 1).await
    })
}

pub(super) fn ops() -> Vec<BuiltinOp> {
    vec![
        suspending("GETPOINT", Range(0, 2), builtin_getpoint),
        suspending("GETCORNER", Range(1, 2), builtin_getcorner),
        suspending("GETDIST", Range(0, 2), builtin_getdist),
        suspending("GETANGLE", Range(0, 2), builtin_getangle),
        suspending("GETREAL", Range(0, 1), builtin_getreal),
        suspending("GETINT", Range(0, 1), builtin_getint),
        suspending("GETSTRING", Range(0, 2), builtin_getstring),
        suspending("GETKWORD", Range(0, 1), builtin_getkword),
        suspending("ENTSEL", Range(0, 1), builtin_entsel),
        suspending("SSGET", Range(0, 2), builtin_ssget),
        suspending("MAPCAR", AtLeast(2), builtin_mapcar),
        suspending("APPLY", Exact(2), builtin_apply),
        suspending("EVAL", Exact(1), builtin_eval),
    ]
}
