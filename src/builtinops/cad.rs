//! Builtins that talk to the host: console output, geometry, entities,
//! commands and system variables.

use crate::Error;
use crate::ast::Value;
use crate::evaluator::Arity::{self, AtLeast, Any, Exact, Range};
use crate::host::{Entity, EntityId, Host, HostError, LogStyle, SysVarValue};
use crate::interpreter::Interpreter;
use crate::marshal::{apply_assoc_list, assoc_entity_id, assoc_list_to_new_entity, entity_to_assoc_list};

use super::{BuiltinOp, expect_entity, expect_number, expect_point, expect_string, host};

//
// Output
//

fn output(interp: &mut Interpreter, text: &str, style: LogStyle) {
    interp.host.log(text, style);
}

/// `(princ)` prints nothing, so a script can end quietly
fn builtin_princ(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let Some(value) = args.into_iter().next() else {
        return Ok(Value::Nil);
    };
    output(interp, &value.to_display_string(), LogStyle::Output);
    Ok(value)
}

fn builtin_prin1(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let Some(value) = args.into_iter().next() else {
        return Ok(Value::Nil);
    };
    output(interp, &value.to_string(), LogStyle::Output);
    Ok(value)
}

fn builtin_print(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let Some(value) = args.into_iter().next() else {
        return Ok(Value::Nil);
    };
    output(interp, &format!("\n{value} "), LogStyle::Output);
    Ok(value)
}

fn builtin_prompt(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let text = expect_string(&args[0])?.to_owned();
    output(interp, &text, LogStyle::Prompt);
    Ok(Value::Nil)
}

fn builtin_terpri(interp: &mut Interpreter, _args: Vec<Value>) -> Result<Value, Error> {
    output(interp, "\n", LogStyle::Output);
    Ok(Value::Nil)
}

fn builtin_alert(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let text = args[0].to_display_string();
    output(interp, &text, LogStyle::Alert);
    Ok(Value::Nil)
}

//
// Geometry
//

fn builtin_distance(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let (a, b) = (expect_point(&args[0])?, expect_point(&args[1])?);
    Ok(Value::Number(interp.host.distance(a, b)))
}

fn builtin_angle(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let (a, b) = (expect_point(&args[0])?, expect_point(&args[1])?);
    Ok(Value::Number(interp.host.angle(a, b)))
}

fn builtin_polar(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let origin = expect_point(&args[0])?;
    let angle = expect_number(&args[1])?;
    let distance = expect_number(&args[2])?;
    Ok(Value::point(interp.host.polar(origin, angle, distance)))
}

/// `(inters a1 a2 b1 b2 [on-segment])`; a nil fifth argument extends the lines
fn builtin_inters(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let a1 = expect_point(&args[0])?;
    let a2 = expect_point(&args[1])?;
    let b1 = expect_point(&args[2])?;
    let b2 = expect_point(&args[3])?;
    let on_segment = args.get(4).is_none_or(Value::is_truthy);
    Ok(interp
        .host
        .intersect(a1, a2, b1, b2, on_segment)
        .map_or(Value::Nil, Value::point))
}

//
// Entities
//

/// Checkpoint, change with undo recording off, then redraw
fn mutate<T>(
    interp: &mut Interpreter,
    label: &str,
    change: impl FnOnce(&mut dyn Host) -> Result<T, Error>,
) -> Result<T, Error> {
    let host = interp.host.as_mut();
    host.save_undo_checkpoint(label);
    let result = change(host)?;
    host.request_redraw();
    Ok(result)
}

/// Entities a builtin mutates must exist
fn existing(interp: &Interpreter, id: EntityId, builtin: &str) -> Result<Entity, Error> {
    interp
        .host
        .get(id)
        .ok_or_else(|| HostError::new(format!("{builtin}: entity {} does not exist", id.0)).into())
}

fn current_layer(interp: &Interpreter) -> String {
    match interp.host.get_var("CLAYER") {
        Some(SysVarValue::Text(layer)) if !layer.is_empty() => layer,
        _ => "0".to_owned(),
    }
}

fn builtin_entget(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let id = expect_entity(&args[0])?;
    Ok(interp
        .host
        .get(id)
        .map_or(Value::Nil, |entity| entity_to_assoc_list(&entity)))
}

fn builtin_entmod(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let list = &args[0];
    let id = assoc_entity_id(list).ok_or_else(|| {
        Error::TypeError(format!("entmod: list has no entity name (group -1): {list}"))
    })?;
    let entity = existing(interp, id, "entmod")?;

    let mut data = entity.data();
    apply_assoc_list(list, &mut data)?;
    mutate(interp, "entmod", |host| Ok(host.update(id, data, true)?))?;
    Ok(list.clone())
}

fn builtin_entmake(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let list = &args[0];
    let data = assoc_list_to_new_entity(list, &current_layer(interp))?;
    let id = mutate(interp, "entmake", |host| Ok(host.add(data, true)))?;
    log::debug!("entmake created entity {}", id.0);
    Ok(list.clone())
}

fn builtin_entdel(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let id = expect_entity(&args[0])?;
    existing(interp, id, "entdel")?;
    mutate(interp, "entdel", |host| Ok(host.remove(id, true)?))?;
    Ok(Value::Entity(id))
}

/// `(entnext)` is the first entity, `(entnext e)` the one created after `e`
fn builtin_entnext(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let ids = interp.host.ids();
    let next = match args.first() {
        None => ids.first().copied(),
        Some(after) => {
            let after = expect_entity(after)?;
            ids.iter()
                .position(|id| *id == after)
                .and_then(|i| ids.get(i + 1))
                .copied()
        }
    };
    Ok(Value::from(next))
}

fn builtin_entlast(interp: &mut Interpreter, _args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::from(interp.host.ids().last().copied()))
}

fn builtin_entupd(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let id = expect_entity(&args[0])?;
    existing(interp, id, "entupd")?;
    interp.host.request_redraw();
    Ok(Value::Entity(id))
}

/// `(ssget "X" [filter])` selects from the whole drawing without suspending.
/// The filter is an association list matched on type (0) and layer (8).
pub(super) fn select_all(interp: &Interpreter, filter: Option<&Value>) -> Result<Value, Error> {
    let mut wanted = Vec::new();
    if let Some(filter) = filter {
        for entry in super::list_items(filter)? {
            if let Some([Value::Number(code), Value::String(text)]) = entry.as_list() {
                wanted.push((*code as i32, text.to_uppercase()));
            }
        }
    }

    let ids: Vec<EntityId> = interp
        .host
        .ids()
        .into_iter()
        .filter(|id| {
            let Some(entity) = interp.host.get(*id) else {
                return false;
            };
            wanted.iter().all(|(code, text)| match *code {
                0 => entity.shape.type_name() == text.as_str(),
                8 => entity.layer.to_uppercase() == *text,
                _ => true,
            })
        })
        .collect();

    Ok(if ids.is_empty() {
        Value::Nil
    } else {
        Value::SelectionSet(ids)
    })
}

//
// Commands
//

/// Command names may carry the `_` (untranslated) and `.` (undefined-safe) prefixes
fn command_name(value: &Value) -> Result<String, Error> {
    let name = expect_string(value)?;
    Ok(name.trim_start_matches(['_', '.']).to_uppercase())
}

/// Text sent to a command for a non-point argument
fn command_text(value: &Value) -> String {
    match value {
        Value::Nil => String::new(),
        other => other.to_display_string(),
    }
}

/// Drive the host command state machine one step at a time, as one undo step
fn builtin_command(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let Some((name, rest)) = args.split_first() else {
        interp.host.cancel_command();
        return Ok(Value::Nil);
    };

    let name = command_name(name)?;
    let pacing = interp.config.command_pacing;
    log::debug!("command {name} with {} argument(s)", rest.len());

    mutate(interp, &name, |host| {
        host.start_command(&name)?;
        host.settle(pacing);
        for arg in rest {
            match arg.as_point() {
                Some(point) => host.handle_click(point),
                None => host.handle_input(&command_text(arg)),
            }
            host.settle(pacing);
        }
        Ok(())
    })?;
    Ok(Value::Nil)
}

/// Run a command in one shot, all arguments passed as text
fn builtin_command_s(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let name = command_name(&args[0])?;
    let command_args: Vec<String> = args[1..]
        .iter()
        .map(|arg| match arg.as_point() {
            Some(p) => format!("{},{}", Value::Number(p.x), Value::Number(p.y)),
            None => command_text(arg),
        })
        .collect();

    mutate(interp, &name, |host| Ok(host.execute(&name, &command_args)?))?;
    Ok(Value::True)
}

//
// System variables
//

fn builtin_getvar(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let name = expect_string(&args[0])?.to_uppercase();
    Ok(match interp.host.get_var(&name) {
        Some(SysVarValue::Number(n)) => Value::Number(n),
        Some(SysVarValue::Text(s)) => Value::String(s),
        None => Value::Nil,
    })
}

fn builtin_setvar(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let name = expect_string(&args[0])?.to_uppercase();
    let value = match &args[1] {
        Value::Number(n) => SysVarValue::Number(*n),
        Value::String(s) => SysVarValue::Text(s.clone()),
        other => {
            return Err(Error::TypeError(format!(
                "setvar: expected number or string, got {other}"
            )));
        }
    };
    interp.host.set_var(&name, value)?;
    Ok(args[1].clone())
}

pub(super) fn ops() -> Vec<BuiltinOp> {
    let table: [(&'static str, Arity, super::HostFn); 21] = [
        ("PRINC", Range(0, 1), builtin_princ),
        ("PRIN1", Range(0, 1), builtin_prin1),
        ("PRINT", Range(0, 1), builtin_print),
        ("PROMPT", Exact(1), builtin_prompt),
        ("TERPRI", Exact(0), builtin_terpri),
        ("ALERT", Exact(1), builtin_alert),
        ("DISTANCE", Exact(2), builtin_distance),
        ("ANGLE", Exact(2), builtin_angle),
        ("POLAR", Exact(3), builtin_polar),
        ("INTERS", Range(4, 5), builtin_inters),
        ("ENTGET", Exact(1), builtin_entget),
        ("ENTMOD", Exact(1), builtin_entmod),
        ("ENTMAKE", Exact(1), builtin_entmake),
        ("ENTDEL", Exact(1), builtin_entdel),
        ("ENTNEXT", Range(0, 1), builtin_entnext),
        ("ENTLAST", Exact(0), builtin_entlast),
        ("ENTUPD", Exact(1), builtin_entupd),
        ("COMMAND", Any, builtin_command),
        ("COMMAND-S", AtLeast(1), builtin_command_s),
        ("GETVAR", Exact(1), builtin_getvar),
        ("SETVAR", Exact(2), builtin_setvar),
    ];
    table
        .into_iter()
        .map(|(name, arity, op)| host(name, arity, op))
        .collect()
}
