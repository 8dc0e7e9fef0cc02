use bevy_ecs::prelude::Entity;
use rhai::{Dynamic, Map, FLOAT, INT};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    KeyPressed { key: String },
    KeyReleased { key: String },
    AxisMoved { axis: String, value: f32 },
    EntityDespawned { entity: Entity },
    ModelLoaded { entity: Entity, path: String },
    BehaviorReloaded { entity: Entity, name: String },
    ScriptMessage { message: String },
}

impl EngineEvent {
    pub fn key_pressed(key: impl Into<String>) -> Self {
        EngineEvent::KeyPressed { key: key.into() }
    }

    pub fn key_released(key: impl Into<String>) -> Self {
        EngineEvent::KeyReleased { key: key.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::KeyPressed { .. } => "key_pressed",
            EngineEvent::KeyReleased { .. } => "key_released",
            EngineEvent::AxisMoved { .. } => "axis_moved",
            EngineEvent::EntityDespawned { .. } => "entity_despawned",
            EngineEvent::ModelLoaded { .. } => "model_loaded",
            EngineEvent::BehaviorReloaded { .. } => "behavior_reloaded",
            EngineEvent::ScriptMessage { .. } => "script_message",
        }
    }

    /// Script-facing view of the event: a map with a `kind` field plus the
    /// variant's payload.
    pub fn to_script_map(&self) -> Map {
        let mut map = Map::new();
        map.insert("kind".into(), self.kind().into());
        match self {
            EngineEvent::KeyPressed { key } | EngineEvent::KeyReleased { key } => {
                map.insert("key".into(), key.clone().into());
            }
            EngineEvent::AxisMoved { axis, value } => {
                map.insert("axis".into(), axis.clone().into());
                map.insert("value".into(), Dynamic::from(*value as FLOAT));
            }
            EngineEvent::EntityDespawned { entity } => {
                map.insert("entity".into(), Dynamic::from(entity.to_bits() as INT));
            }
            EngineEvent::ModelLoaded { entity, path } => {
                map.insert("entity".into(), Dynamic::from(entity.to_bits() as INT));
                map.insert("path".into(), path.clone().into());
            }
            EngineEvent::BehaviorReloaded { entity, name } => {
                map.insert("entity".into(), Dynamic::from(entity.to_bits() as INT));
                map.insert("name".into(), name.clone().into());
            }
            EngineEvent::ScriptMessage { message } => {
                map.insert("message".into(), message.clone().into());
            }
        }
        map
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::KeyPressed { key } => write!(f, "KeyPressed key={key}"),
            EngineEvent::KeyReleased { key } => write!(f, "KeyReleased key={key}"),
            EngineEvent::AxisMoved { axis, value } => write!(f, "AxisMoved axis={axis} value={value:.3}"),
            EngineEvent::EntityDespawned { entity } => {
                write!(f, "EntityDespawned entity={}", entity.index())
            }
            EngineEvent::ModelLoaded { entity, path } => {
                write!(f, "ModelLoaded entity={} path={}", entity.index(), path)
            }
            EngineEvent::BehaviorReloaded { entity, name } => {
                write!(f, "BehaviorReloaded entity={} name={}", entity.index(), name)
            }
            EngineEvent::ScriptMessage { message } => write!(f, "ScriptMessage {message}"),
        }
    }
}

#[derive(Default)]
pub struct EventBus {
    events: Vec<EngineEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
