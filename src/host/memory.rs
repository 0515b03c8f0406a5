use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use super::{
    CommandDispatcher, Entity, EntityData, EntityId, EntityStore, Geometry, Host, HostError,
    LogSink, LogStyle, Point, Settings, SysVarValue,
};

/// Command dispatcher traffic recorded by [`MemoryHost`]
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    Execute { name: String, args: Vec<String> },
    Start(String),
    Click(Point),
    Input(String),
    Cancel,
    Settle,
}

/// Everything a [`MemoryHost`] has stored or observed
#[derive(Debug)]
pub struct Drawing {
    pub entities: Vec<Entity>,
    next_id: u64,
    /// Undo checkpoint labels, oldest first
    pub checkpoints: Vec<String>,
    pub redraws: usize,
    pub log: Vec<(String, LogStyle)>,
    pub commands: Vec<CommandEvent>,
    pub vars: HashMap<String, SysVarValue>,
    /// Interleaved record of checkpoints, mutations and redraws
    pub journal: Vec<String>,
}

impl Default for Drawing {
    fn default() -> Self {
        let vars = [
            ("CLAYER", SysVarValue::Text("0".into())),
            ("OSMODE", SysVarValue::Number(0.0)),
            ("SNAPMODE", SysVarValue::Number(0.0)),
            ("GRIDMODE", SysVarValue::Number(0.0)),
            ("ORTHOMODE", SysVarValue::Number(0.0)),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect();

        Drawing {
            entities: Vec::new(),
            next_id: 1,
            checkpoints: Vec::new(),
            redraws: 0,
            log: Vec::new(),
            commands: Vec::new(),
            vars,
            journal: Vec::new(),
        }
    }
}

impl Drawing {
    /// Concatenated text of every log line with the given style
    pub fn output(&self, style: LogStyle) -> String {
        self.log
            .iter()
            .filter(|(_, s)| *s == style)
            .map(|(text, _)| text.as_str())
            .collect()
    }

    fn checkpoint(&mut self, label: &str) {
        self.checkpoints.push(label.to_owned());
        self.journal.push(format!("checkpoint {label}"));
    }
}

/// In-memory host. Clones share the same [`Drawing`], so a test or an embedding
/// UI can keep a handle while the interpreter owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    state: Rc<RefCell<Drawing>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drawing(&self) -> Ref<'_, Drawing> {
        self.state.borrow()
    }

    pub fn drawing_mut(&self) -> RefMut<'_, Drawing> {
        self.state.borrow_mut()
    }
}

impl EntityStore for MemoryHost {
    fn get(&self, id: EntityId) -> Option<Entity> {
        self.state
            .borrow()
            .entities
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    fn add(&mut self, data: EntityData, skip_undo: bool) -> EntityId {
        let mut drawing = self.state.borrow_mut();
        if !skip_undo {
            drawing.checkpoint("add");
        }
        let id = EntityId(drawing.next_id);
        drawing.next_id += 1;
        drawing.entities.push(Entity {
            id,
            layer: data.layer,
            shape: data.shape,
        });
        drawing.journal.push(format!("add {}", id.0));
        id
    }

    fn update(&mut self, id: EntityId, data: EntityData, skip_undo: bool) -> Result<(), HostError> {
        let mut drawing = self.state.borrow_mut();
        if !drawing.entities.iter().any(|e| e.id == id) {
            return Err(HostError::new(format!("no entity with id {}", id.0)));
        }
        if !skip_undo {
            drawing.checkpoint("update");
        }
        if let Some(entity) = drawing.entities.iter_mut().find(|e| e.id == id) {
            entity.layer = data.layer;
            entity.shape = data.shape;
        }
        drawing.journal.push(format!("update {}", id.0));
        Ok(())
    }

    fn remove(&mut self, id: EntityId, skip_undo: bool) -> Result<(), HostError> {
        let mut drawing = self.state.borrow_mut();
        let Some(index) = drawing.entities.iter().position(|e| e.id == id) else {
            return Err(HostError::new(format!("no entity with id {}", id.0)));
        };
        if !skip_undo {
            drawing.checkpoint("remove");
        }
        drawing.entities.remove(index);
        drawing.journal.push(format!("remove {}", id.0));
        Ok(())
    }

    fn remove_many(&mut self, ids: &[EntityId], skip_undo: bool) {
        let mut drawing = self.state.borrow_mut();
        if !skip_undo {
            drawing.checkpoint("remove");
        }
        let mut removed = Vec::new();
        drawing.entities.retain(|e| {
            let keep = !ids.contains(&e.id);
            if !keep {
                removed.push(e.id);
            }
            keep
        });
        for id in removed {
            drawing.journal.push(format!("remove {}", id.0));
        }
    }

    fn save_undo_checkpoint(&mut self, label: &str) {
        self.state.borrow_mut().checkpoint(label);
    }

    fn ids(&self) -> Vec<EntityId> {
        self.state.borrow().entities.iter().map(|e| e.id).collect()
    }
}

impl CommandDispatcher for MemoryHost {
    fn execute(&mut self, name: &str, args: &[String]) -> Result<(), HostError> {
        if name.is_empty() {
            return Err(HostError::new("empty command name"));
        }
        self.state.borrow_mut().commands.push(CommandEvent::Execute {
            name: name.to_owned(),
            args: args.to_vec(),
        });
        Ok(())
    }

    fn start_command(&mut self, name: &str) -> Result<(), HostError> {
        if name.is_empty() {
            return Err(HostError::new("empty command name"));
        }
        self.state
            .borrow_mut()
            .commands
            .push(CommandEvent::Start(name.to_owned()));
        Ok(())
    }

    fn handle_click(&mut self, point: Point) {
        self.state
            .borrow_mut()
            .commands
            .push(CommandEvent::Click(point));
    }

    fn handle_input(&mut self, text: &str) {
        self.state
            .borrow_mut()
            .commands
            .push(CommandEvent::Input(text.to_owned()));
    }

    fn cancel_command(&mut self) {
        self.state.borrow_mut().commands.push(CommandEvent::Cancel);
    }

    fn settle(&mut self, _pacing: Duration) {
        self.state.borrow_mut().commands.push(CommandEvent::Settle);
    }
}

impl Geometry for MemoryHost {}

impl Settings for MemoryHost {
    fn get_var(&self, name: &str) -> Option<SysVarValue> {
        self.state.borrow().vars.get(name).cloned()
    }

    fn set_var(&mut self, name: &str, value: SysVarValue) -> Result<(), HostError> {
        self.state.borrow_mut().vars.insert(name.to_owned(), value);
        Ok(())
    }
}

impl LogSink for MemoryHost {
    fn log(&mut self, text: &str, style: LogStyle) {
        self.state.borrow_mut().log.push((text.to_owned(), style));
    }
}

impl Host for MemoryHost {
    fn request_redraw(&mut self) {
        let mut drawing = self.state.borrow_mut();
        drawing.redraws += 1;
        drawing.journal.push("redraw".into());
    }
}
