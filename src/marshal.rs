//! Conversion between host entities and `(group-code value)` association lists.
//!
//! | code | meaning |
//! |---|---|
//! | -1 | entity name |
//! | 0 | type: `LINE` `CIRCLE` `ARC` `LWPOLYLINE` `TEXT` |
//! | 8 | layer |
//! | 10 20 30 | primary point (polyline: one 10/20 pair per vertex) |
//! | 11 21 31 | line end point |
//! | 40 | radius or text height |
//! | 50 51 | arc start/end angle or text rotation, in degrees |
//! | 70 | polyline flags, bit 1 closed |
//! | 1 | text content |
//!
//! z codes are written as 0 and ignored when read back.

use crate::Error;
use crate::ast::Value;
use crate::host::{Entity, EntityData, EntityId, Point, Shape};

fn pair(code: i32, value: impl Into<Value>) -> Value {
    Value::List(vec![Value::from(code), value.into()])
}

fn point_pairs(out: &mut Vec<Value>, x_code: i32, p: Point) {
    out.push(pair(x_code, p.x));
    out.push(pair(x_code + 10, p.y));
    out.push(pair(x_code + 20, 0.0));
}

/// Describe an entity as an association list, as `entget` returns it
pub fn entity_to_assoc_list(entity: &Entity) -> Value {
    let mut out = vec![
        pair(-1, entity.id),
        pair(0, entity.shape.type_name()),
        pair(8, entity.layer.as_str()),
    ];

    match &entity.shape {
        Shape::Line { start, end } => {
            point_pairs(&mut out, 10, *start);
            point_pairs(&mut out, 11, *end);
        }
        Shape::Circle { center, radius } => {
            point_pairs(&mut out, 10, *center);
            out.push(pair(40, *radius));
        }
        Shape::Arc {
            center,
            radius,
            start_angle,
            end_angle,
        } => {
            point_pairs(&mut out, 10, *center);
            out.push(pair(40, *radius));
            out.push(pair(50, *start_angle));
            out.push(pair(51, *end_angle));
        }
        Shape::Polyline { vertices, closed } => {
            out.push(pair(70, if *closed { 1 } else { 0 }));
            for v in vertices {
                out.push(pair(10, v.x));
                out.push(pair(20, v.y));
            }
        }
        Shape::Text {
            position,
            height,
            rotation,
            content,
        } => {
            point_pairs(&mut out, 10, *position);
            out.push(pair(40, *height));
            out.push(pair(50, *rotation));
            out.push(pair(1, content.as_str()));
        }
    }

    Value::List(out)
}

/// Well-formed `(code value)` entries; anything else in the list is skipped
fn group_pairs(list: &Value) -> Result<Vec<(i32, &Value)>, Error> {
    let items = list
        .as_list()
        .ok_or_else(|| Error::TypeError(format!("expected association list, got {list}")))?;

    Ok(items
        .iter()
        .filter_map(|item| match item.as_list()? {
            [Value::Number(code), value] if code.fract() == 0.0 => Some((*code as i32, value)),
            _ => None,
        })
        .collect())
}

fn number(code: i32, value: &Value) -> Result<f64, Error> {
    value
        .as_number()
        .ok_or_else(|| Error::TypeError(format!("group {code} expects a number, got {value}")))
}

fn text(code: i32, value: &Value) -> Result<&str, Error> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(Error::TypeError(format!(
            "group {code} expects a string, got {value}"
        ))),
    }
}

/// Overwrite the fields of `data` named by the list. The entity type can't
/// change; type, name, z and unknown codes are ignored.
pub fn apply_assoc_list(list: &Value, data: &mut EntityData) -> Result<(), Error> {
    let mut xs = Vec::new();
    let mut ys = Vec::new();

    for (code, value) in group_pairs(list)? {
        if code == 8 {
            data.layer = text(code, value)?.to_owned();
            continue;
        }

        match (&mut data.shape, code) {
            (Shape::Line { start, .. }, 10) => start.x = number(code, value)?,
            (Shape::Line { start, .. }, 20) => start.y = number(code, value)?,
            (Shape::Line { end, .. }, 11) => end.x = number(code, value)?,
            (Shape::Line { end, .. }, 21) => end.y = number(code, value)?,
            (Shape::Circle { center, .. } | Shape::Arc { center, .. }, 10) => {
                center.x = number(code, value)?
            }
            (Shape::Circle { center, .. } | Shape::Arc { center, .. }, 20) => {
                center.y = number(code, value)?
            }
            (Shape::Circle { radius, .. } | Shape::Arc { radius, .. }, 40) => {
                *radius = number(code, value)?
            }
            (Shape::Arc { start_angle, .. }, 50) => *start_angle = number(code, value)?,
            (Shape::Arc { end_angle, .. }, 51) => *end_angle = number(code, value)?,
            (Shape::Polyline { .. }, 10) => xs.push(number(code, value)?),
            (Shape::Polyline { .. }, 20) => ys.push(number(code, value)?),
            (Shape::Polyline { closed, .. }, 70) => {
                *closed = (number(code, value)? as i64) & 1 == 1
            }
            (Shape::Text { position, .. }, 10) => position.x = number(code, value)?,
            (Shape::Text { position, .. }, 20) => position.y = number(code, value)?,
            (Shape::Text { height, .. }, 40) => *height = number(code, value)?,
            (Shape::Text { rotation, .. }, 50) => *rotation = number(code, value)?,
            (Shape::Text { content, .. }, 1) => *content = text(code, value)?.to_owned(),
            _ => {}
        }
    }

    // Vertex pairs replace the whole vertex list
    if let Shape::Polyline { vertices, .. } = &mut data.shape
        && !xs.is_empty()
    {
        *vertices = xs
            .iter()
            .enumerate()
            .map(|(i, x)| Point::new(*x, ys.get(i).copied().unwrap_or(0.0)))
            .collect();
    }

    Ok(())
}

fn default_shape(type_name: &str) -> Option<Shape> {
    let origin = Point::default();
    let shape = match type_name {
        "LINE" => Shape::Line {
            start: origin,
            end: origin,
        },
        "CIRCLE" => Shape::Circle {
            center: origin,
            radius: 10.0,
        },
        "ARC" => Shape::Arc {
            center: origin,
            radius: 10.0,
            start_angle: 0.0,
            end_angle: 90.0,
        },
        "LWPOLYLINE" => Shape::Polyline {
            vertices: Vec::new(),
            closed: false,
        },
        "TEXT" => Shape::Text {
            position: origin,
            height: 10.0,
            rotation: 0.0,
            content: String::new(),
        },
        _ => return None,
    };
    Some(shape)
}

/// Build new entity data from a list, as `entmake` does. Missing groups take
/// their defaults; the layer defaults to `default_layer`.
pub fn assoc_list_to_new_entity(list: &Value, default_layer: &str) -> Result<EntityData, Error> {
    let type_name = group_pairs(list)?
        .into_iter()
        .find(|(code, _)| *code == 0)
        .map(|(code, value)| text(code, value).map(str::to_uppercase))
        .transpose()?
        .ok_or_else(|| Error::EvalError("entity list has no type (group 0)".into()))?;

    let shape = default_shape(&type_name)
        .ok_or_else(|| Error::EvalError(format!("unsupported entity type: {type_name}")))?;

    let mut data = EntityData {
        layer: default_layer.to_owned(),
        shape,
    };
    apply_assoc_list(list, &mut data)?;
    Ok(data)
}

/// The entity named by group -1, if any
pub fn assoc_entity_id(list: &Value) -> Option<EntityId> {
    group_pairs(list)
        .ok()?
        .into_iter()
        .find_map(|(code, value)| match (code, value) {
            (-1, Value::Entity(id)) => Some(*id),
            _ => None,
        })
}
