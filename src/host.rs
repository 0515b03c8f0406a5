//! Host collaborator boundary.
//!
//! The interpreter never owns drawing state. Everything it reads or changes in
//! the editor goes through the traits below, which the embedding application
//! implements over its real entity store, command state machine, settings and
//! console. [`MemoryHost`] is a complete in-memory implementation used by the
//! test-suite and the REPL demo.

use std::fmt;
use std::time::Duration;

mod memory;

pub use memory::{CommandEvent, Drawing, MemoryHost};

/// Opaque identifier of an entity in the host store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// Geometry of a drawable entity. Angles are stored in degrees.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Line {
        start: Point,
        end: Point,
    },
    Circle {
        center: Point,
        radius: f64,
    },
    Arc {
        center: Point,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    },
    Polyline {
        vertices: Vec<Point>,
        closed: bool,
    },
    Text {
        position: Point,
        height: f64,
        rotation: f64,
        content: String,
    },
}

impl Shape {
    /// Association-list type name (group code 0)
    pub fn type_name(&self) -> &'static str {
        match self {
            Shape::Line { .. } => "LINE",
            Shape::Circle { .. } => "CIRCLE",
            Shape::Arc { .. } => "ARC",
            Shape::Polyline { .. } => "LWPOLYLINE",
            Shape::Text { .. } => "TEXT",
        }
    }
}

/// Entity state without an identity, as passed to `add` and `update`
#[derive(Debug, Clone, PartialEq)]
pub struct EntityData {
    pub layer: String,
    pub shape: Shape,
}

/// Entity as stored by the host
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub layer: String,
    pub shape: Shape,
}

impl Entity {
    pub fn data(&self) -> EntityData {
        EntityData {
            layer: self.layer.clone(),
            shape: self.shape.clone(),
        }
    }
}

/// Style tag attached to every line written to the host console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    /// `princ`/`print` output
    Output,
    /// Echo of a batch result
    Result,
    /// Input prompts
    Prompt,
    Error,
    /// `alert` boxes
    Alert,
}

/// Value of a named CAD runtime setting
#[derive(Debug, Clone, PartialEq)]
pub enum SysVarValue {
    Number(f64),
    Text(String),
}

/// Failure reported by a host collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        HostError(message.into())
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<HostError> for crate::Error {
    fn from(err: HostError) -> Self {
        crate::Error::HostBridge(err.0)
    }
}

pub trait EntityStore {
    fn get(&self, id: EntityId) -> Option<Entity>;
    fn add(&mut self, data: EntityData, skip_undo: bool) -> EntityId;
    fn update(&mut self, id: EntityId, data: EntityData, skip_undo: bool) -> Result<(), HostError>;
    fn remove(&mut self, id: EntityId, skip_undo: bool) -> Result<(), HostError>;
    fn remove_many(&mut self, ids: &[EntityId], skip_undo: bool);
    fn save_undo_checkpoint(&mut self, label: &str);
    /// All entity ids in creation order
    fn ids(&self) -> Vec<EntityId>;
}

pub trait CommandDispatcher {
    /// Run a command to completion with all of its arguments at once
    fn execute(&mut self, name: &str, args: &[String]) -> Result<(), HostError>;
    fn start_command(&mut self, name: &str) -> Result<(), HostError>;
    fn handle_click(&mut self, point: Point);
    fn handle_input(&mut self, text: &str);
    fn cancel_command(&mut self);

    /// Let host-side command state settle between sub-steps
    fn settle(&mut self, pacing: Duration) {
        if !pacing.is_zero() {
            std::thread::sleep(pacing);
        }
    }
}

/// Geometry queries. The default bodies are plain planar math; hosts with their
/// own geometry kernel override them.
pub trait Geometry {
    fn distance(&self, a: Point, b: Point) -> f64 {
        (b.x - a.x).hypot(b.y - a.y)
    }

    /// Angle of the direction from `a` to `b`, in radians within `[0, 2π)`
    fn angle(&self, a: Point, b: Point) -> f64 {
        (b.y - a.y).atan2(b.x - a.x).rem_euclid(std::f64::consts::TAU)
    }

    fn polar(&self, origin: Point, angle: f64, distance: f64) -> Point {
        Point::new(
            origin.x + distance * angle.cos(),
            origin.y + distance * angle.sin(),
        )
    }

    /// Intersection of the lines through `a1`-`a2` and `b1`-`b2`. With
    /// `on_segment` the point must lie on both segments.
    fn intersect(&self, a1: Point, a2: Point, b1: Point, b2: Point, on_segment: bool) -> Option<Point> {
        let d1 = (a2.x - a1.x, a2.y - a1.y);
        let d2 = (b2.x - b1.x, b2.y - b1.y);
        let denom = d1.0 * d2.1 - d1.1 * d2.0;
        if denom.abs() < 1e-12 {
            return None;
        }
        let t = ((b1.x - a1.x) * d2.1 - (b1.y - a1.y) * d2.0) / denom;
        let u = ((b1.x - a1.x) * d1.1 - (b1.y - a1.y) * d1.0) / denom;
        if on_segment && !((0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)) {
            return None;
        }
        Some(Point::new(a1.x + t * d1.0, a1.y + t * d1.1))
    }
}

pub trait Settings {
    fn get_var(&self, name: &str) -> Option<SysVarValue>;
    fn set_var(&mut self, name: &str, value: SysVarValue) -> Result<(), HostError>;
}

pub trait LogSink {
    fn log(&mut self, text: &str, style: LogStyle);
}

/// Everything the interpreter needs from the editor
pub trait Host: EntityStore + CommandDispatcher + Geometry + Settings + LogSink {
    fn request_redraw(&mut self) {}
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    struct PlainGeometry;
    impl Geometry for PlainGeometry {}

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_default_geometry() {
        let g = PlainGeometry;
        let origin = Point::new(0.0, 0.0);

        assert_close(g.distance(origin, Point::new(3.0, 4.0)), 5.0);
        assert_close(g.angle(origin, Point::new(0.0, 1.0)), std::f64::consts::FRAC_PI_2);
        assert_close(g.angle(origin, Point::new(0.0, -1.0)), 1.5 * std::f64::consts::PI);

        let p = g.polar(Point::new(1.0, 1.0), 0.0, 2.0);
        assert_close(p.x, 3.0);
        assert_close(p.y, 1.0);
    }

    #[test]
    fn test_intersection() {
        let g = PlainGeometry;
        let hit = g
            .intersect(
                Point::new(0.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
                Point::new(10.0, 0.0),
                true,
            )
            .unwrap();
        assert_close(hit.x, 5.0);
        assert_close(hit.y, 5.0);

        // Parallel lines never meet
        assert!(
            g.intersect(
                Point::new(0.0, 0.0),
                Point::new(1.0, 0.0),
                Point::new(0.0, 1.0),
                Point::new(1.0, 1.0),
                false
            )
            .is_none()
        );

        // Extended lines meet outside the segments
        let a1 = Point::new(0.0, 0.0);
        let a2 = Point::new(1.0, 0.0);
        let b1 = Point::new(5.0, -1.0);
        let b2 = Point::new(5.0, 1.0);
        assert!(g.intersect(a1, a2, b1, b2, true).is_none());
        let far = g.intersect(a1, a2, b1, b2, false).unwrap();
        assert_close(far.x, 5.0);
    }
}
