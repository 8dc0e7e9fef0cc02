use crate::events::EngineEvent;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub type InputHandle = Rc<RefCell<InputState>>;

/// Polled input state fed from engine events. Key names are case-insensitive.
#[derive(Debug, Default)]
pub struct InputState {
    held: HashSet<String>,
    pressed: HashSet<String>,
    released: HashSet<String>,
    axes: HashMap<String, f32>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> InputHandle {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn apply(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::KeyPressed { key } => {
                let key = normalize_key(key);
                if self.held.insert(key.clone()) {
                    self.pressed.insert(key);
                }
            }
            EngineEvent::KeyReleased { key } => {
                let key = normalize_key(key);
                if self.held.remove(&key) {
                    self.released.insert(key);
                }
            }
            EngineEvent::AxisMoved { axis, value } => {
                self.axes.insert(axis.to_ascii_lowercase(), value.clamp(-1.0, 1.0));
            }
            _ => {}
        }
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains(&normalize_key(key))
    }

    /// True only during the frame the key went down.
    pub fn was_pressed(&self, key: &str) -> bool {
        self.pressed.contains(&normalize_key(key))
    }

    pub fn was_released(&self, key: &str) -> bool {
        self.released.contains(&normalize_key(key))
    }

    pub fn axis(&self, axis: &str) -> f32 {
        self.axes.get(&axis.to_ascii_lowercase()).copied().unwrap_or(0.0)
    }

    pub fn clear_frame(&mut self) {
        self.pressed.clear();
        self.released.clear();
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}
