//! Single-slot broker between suspended input builtins and the host UI.
//!
//! A builtin such as `getpoint` calls [`InputBroker::request`] and awaits the
//! returned [`InputFuture`]. The host reads [`InputBroker::pending`] to show the
//! prompt, then answers with [`InputBroker::resolve`] (a raw JSON value from the
//! UI) or [`InputBroker::cancel`]. Only one request can be pending; a newer
//! request replaces the older one, which then settles with
//! [`Error::InputOrphaned`].

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use serde_json::Value as JsonValue;

use crate::Error;
use crate::ast::Value;
use crate::host::{EntityId, Point};

/// What kind of answer a pending request expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Point,
    Corner,
    Dist,
    Angle,
    Real,
    Int,
    String,
    Keyword,
    EntSel,
    SsGet,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputKind::Point => "point",
            InputKind::Corner => "corner",
            InputKind::Dist => "dist",
            InputKind::Angle => "angle",
            InputKind::Real => "real",
            InputKind::Int => "int",
            InputKind::String => "string",
            InputKind::Keyword => "keyword",
            InputKind::EntSel => "entsel",
            InputKind::SsGet => "ssget",
        };
        write!(f, "{name}")
    }
}

/// The request shown to the user while a script is suspended
#[derive(Debug, Clone, PartialEq)]
pub struct InputRequest {
    pub kind: InputKind,
    pub prompt: String,
    /// Rubber-band origin for point, corner, distance and angle picks
    pub base_point: Option<Point>,
}

#[derive(Debug, Default)]
struct Settlement {
    outcome: Option<Result<Value, Error>>,
    waker: Option<Waker>,
}

impl Settlement {
    fn settle(cell: &RefCell<Settlement>, outcome: Result<Value, Error>) {
        let waker = {
            let mut settlement = cell.borrow_mut();
            settlement.outcome = Some(outcome);
            settlement.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

#[derive(Debug)]
struct Pending {
    request: InputRequest,
    settlement: Rc<RefCell<Settlement>>,
}

/// Cloneable handle on the pending-request slot
#[derive(Debug, Clone, Default)]
pub struct InputBroker {
    slot: Rc<RefCell<Option<Pending>>>,
}

/// Resolves once the host answers (or abandons) the request it was created for
#[derive(Debug)]
pub struct InputFuture {
    settlement: Rc<RefCell<Settlement>>,
}

impl Future for InputFuture {
    type Output = Result<Value, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut settlement = self.settlement.borrow_mut();
        match settlement.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                settlement.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl InputBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending request, replacing any previous one
    pub fn request(
        &self,
        kind: InputKind,
        prompt: impl Into<String>,
        base_point: Option<Point>,
    ) -> InputFuture {
        let request = InputRequest {
            kind,
            prompt: prompt.into(),
            base_point,
        };
        log::debug!("input requested: {kind} {:?}", request.prompt);

        let settlement = Rc::new(RefCell::new(Settlement::default()));
        let previous = self.slot.borrow_mut().replace(Pending {
            request,
            settlement: Rc::clone(&settlement),
        });

        if let Some(orphan) = previous {
            log::warn!(
                "{} request {:?} replaced before it was answered",
                orphan.request.kind,
                orphan.request.prompt
            );
            Settlement::settle(
                &orphan.settlement,
                Err(Error::InputOrphaned(orphan.request.kind.to_string())),
            );
        }

        InputFuture { settlement }
    }

    /// The request currently waiting for an answer
    pub fn pending(&self) -> Option<InputRequest> {
        self.slot.borrow().as_ref().map(|p| p.request.clone())
    }

    pub fn is_pending(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Answer the pending request with a raw UI value. Does nothing when no
    /// request is pending.
    pub fn resolve(&self, raw: JsonValue) {
        let pending = self.slot.borrow_mut().take();
        let Some(pending) = pending else {
            log::debug!("resolve ignored, no input pending");
            return;
        };

        let value = coerce(pending.request.kind, &raw).unwrap_or_else(|| {
            log::warn!(
                "cannot use {raw} as {} input, answering nil",
                pending.request.kind
            );
            Value::Nil
        });
        log::debug!("input resolved: {} -> {value}", pending.request.kind);
        Settlement::settle(&pending.settlement, Ok(value));
    }

    /// Abandon the pending request; the waiting builtin receives nil
    pub fn cancel(&self) {
        let pending = self.slot.borrow_mut().take();
        if let Some(pending) = pending {
            log::debug!("input cancelled: {}", pending.request.kind);
            Settlement::settle(&pending.settlement, Ok(Value::Nil));
        }
    }
}

fn json_number(raw: &JsonValue) -> Option<f64> {
    match raw {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok().filter(|n: &f64| n.is_finite()),
        _ => None,
    }
}

/// `{x, y[, z]}` or `[x, y[, z]]` as an `(x y z)` list
fn json_point(raw: &JsonValue) -> Option<Value> {
    let (x, y, z) = match raw {
        JsonValue::Object(map) => (
            json_number(map.get("x")?)?,
            json_number(map.get("y")?)?,
            match map.get("z") {
                Some(z) => json_number(z)?,
                None => 0.0,
            },
        ),
        JsonValue::Array(items) if items.len() == 2 || items.len() == 3 => (
            json_number(&items[0])?,
            json_number(&items[1])?,
            match items.get(2) {
                Some(z) => json_number(z)?,
                None => 0.0,
            },
        ),
        _ => return None,
    };
    Some(Value::List(vec![
        Value::Number(x),
        Value::Number(y),
        Value::Number(z),
    ]))
}

fn json_entity(raw: &JsonValue) -> Option<EntityId> {
    raw.as_u64().map(EntityId)
}

/// Convert a raw UI answer into the value the waiting builtin returns.
/// `None` means the answer doesn't fit the requested kind.
pub(crate) fn coerce(kind: InputKind, raw: &JsonValue) -> Option<Value> {
    if raw.is_null() {
        return Some(Value::Nil);
    }

    match kind {
        InputKind::Point | InputKind::Corner => json_point(raw),
        InputKind::Dist | InputKind::Real => json_number(raw).map(Value::Number),
        InputKind::Angle => json_number(raw).map(|deg| Value::Number(deg.to_radians())),
        InputKind::Int => json_number(raw).map(|n| Value::Number(n.trunc())),
        InputKind::String | InputKind::Keyword => match raw {
            JsonValue::String(s) => Some(Value::String(s.clone())),
            JsonValue::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        },
        InputKind::EntSel => {
            // {"entity": id, "point": p} or [id, p]
            let (entity, point) = match raw {
                JsonValue::Object(map) => (map.get("entity")?, map.get("point")?),
                JsonValue::Array(items) if items.len() == 2 => (&items[0], &items[1]),
                _ => return None,
            };
            Some(Value::List(vec![
                Value::Entity(json_entity(entity)?),
                json_point(point)?,
            ]))
        }
        InputKind::SsGet => {
            let ids = raw
                .as_array()?
                .iter()
                .map(json_entity)
                .collect::<Option<Vec<_>>>()?;
            if ids.is_empty() {
                Some(Value::Nil)
            } else {
                Some(Value::SelectionSet(ids))
            }
        }
    }
}
