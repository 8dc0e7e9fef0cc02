//! Per-entity behavior units.
//!
//! A unit is either native Rust ([`BehaviorSource::Native`]) or a Rhai script
//! ([`ScriptedBehavior`]). Both implement [`Behavior`] and live in the owning
//! entity's [`BehaviorRegistry`].

mod native;
mod registry;
mod scripted;

pub use native::Spinner;
pub use registry::{BehaviorRef, BehaviorRegistry, FaultPolicy, PassReport};
pub use scripted::ScriptedBehavior;

use crate::ecs::EntityHandle;
use crate::events::EngineEvent;
use crate::scripting::ContextError;
use bevy_ecs::prelude::{Component, Entity};
use serde::Serialize;
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

/// File label reported for units implemented in Rust.
pub const NATIVE_SOURCE_LABEL: &str = "Internal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BehaviorSource {
    Native,
    Script(PathBuf),
}

impl BehaviorSource {
    pub fn label(&self) -> String {
        match self {
            BehaviorSource::Native => NATIVE_SOURCE_LABEL.to_string(),
            BehaviorSource::Script(path) => path.display().to_string(),
        }
    }

    pub fn script_path(&self) -> Option<&Path> {
        match self {
            BehaviorSource::Native => None,
            BehaviorSource::Script(path) => Some(path),
        }
    }
}

impl fmt::Display for BehaviorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Error)]
pub enum BehaviorError {
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("compiling {}: {message}", .path.display())]
    Compile { path: PathBuf, message: String },
    #[error("{}: module not found: {module}", .path.display())]
    ModuleNotFound { path: PathBuf, module: String },
    #[error("initialising {}: {message}", .path.display())]
    Init { path: PathBuf, message: String },
    #[error("behavior '{name}' failed: {message}")]
    Script { name: String, message: String },
    #[error("behavior '{0}' is not scripted")]
    NotScripted(String),
    #[error("no behavior named '{0}'")]
    UnknownBehavior(String),
    #[error("entity {0:?} does not exist")]
    EntityMissing(Entity),
}

impl From<ContextError> for BehaviorError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Io { path, source } => BehaviorError::Io { path, source },
            ContextError::Compile { path, message } => BehaviorError::Compile { path, message },
            ContextError::ModuleNotFound { path, module } => BehaviorError::ModuleNotFound { path, module },
            ContextError::Init { path, message } => BehaviorError::Init { path, message },
        }
    }
}

/// Identity and flags shared by every unit kind.
#[derive(Debug, Clone)]
pub struct BehaviorState {
    name: String,
    entity: EntityHandle,
    source: BehaviorSource,
    enabled: bool,
    unset: Rc<Cell<bool>>,
}

impl BehaviorState {
    pub fn new(name: impl Into<String>, entity: EntityHandle, source: BehaviorSource) -> Self {
        Self { name: name.into(), entity, source, enabled: true, unset: Rc::new(Cell::new(false)) }
    }

    pub fn native(name: impl Into<String>, entity: EntityHandle) -> Self {
        Self::new(name, entity, BehaviorSource::Native)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity(&self) -> &EntityHandle {
        &self.entity
    }

    pub fn source(&self) -> &BehaviorSource {
        &self.source
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn unset_flag(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.unset)
    }
}

/// A named unit of per-entity logic.
///
/// Dispatch methods return errors instead of unwinding; the registry logs
/// them and keeps iterating.
pub trait Behavior: Any {
    fn state(&self) -> &BehaviorState;
    fn state_mut(&mut self) -> &mut BehaviorState;

    fn on_update(&mut self, _dt: f32) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_event(&mut self, _event: &EngineEvent) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.state_mut().set_enabled(enabled);
    }

    fn exposed_params(&self) -> Vec<(String, f64)> {
        Vec::new()
    }

    /// Returns false when the unit has no parameter with that name.
    fn set_exposed_param(&mut self, _name: &str, _value: f64) -> bool {
        false
    }

    fn last_error(&self) -> Option<&str> {
        None
    }

    /// Called once when the unit leaves its registry.
    fn retire(&mut self) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn name(&self) -> &str {
        self.state().name()
    }

    fn entity(&self) -> &EntityHandle {
        self.state().entity()
    }

    fn source(&self) -> &BehaviorSource {
        self.state().source()
    }

    fn is_enabled(&self) -> bool {
        self.state().is_enabled()
    }

    fn is_native(&self) -> bool {
        matches!(self.state().source(), BehaviorSource::Native)
    }

    fn source_file(&self) -> String {
        self.state().source().label()
    }

    fn is_pending_unset(&self) -> bool {
        self.state().unset.get()
    }

    fn mark_unset(&self) {
        self.state().unset.set(true);
    }

    fn summary(&self) -> BehaviorSummary {
        BehaviorSummary {
            name: self.name().to_string(),
            enabled: self.is_enabled(),
            source: self.source_file(),
            is_native: self.is_native(),
            last_error: self.last_error().map(str::to_string),
            exposed: self.exposed_params(),
        }
    }

    #[track_caller]
    fn add_component<T: Component>(&self, component: T)
    where
        Self: Sized,
    {
        self.entity().add_component(component);
    }

    #[track_caller]
    fn get_component<T: Component + Clone>(&self) -> T
    where
        Self: Sized,
    {
        self.entity().get_component::<T>()
    }

    fn has_component<T: Component>(&self) -> bool
    where
        Self: Sized,
    {
        self.entity().has_component::<T>()
    }

    fn remove_component<T: Component>(&self) -> bool
    where
        Self: Sized,
    {
        self.entity().remove_component::<T>()
    }
}

/// Inspector read model of one unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorSummary {
    pub name: String,
    pub enabled: bool,
    pub source: String,
    pub is_native: bool,
    pub last_error: Option<String>,
    pub exposed: Vec<(String, f64)>,
}
