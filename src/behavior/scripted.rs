use super::{Behavior, BehaviorError, BehaviorSource, BehaviorState};
use crate::ecs::EntityHandle;
use crate::events::EngineEvent;
use crate::scripting::{missing_module, BehaviorApi, ExposedParams, ScriptBindings, ScriptContext, ScriptLog};
use rhai::{EvalAltResult, FLOAT};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::rc::Rc;

const INIT_FN: &str = "on_init";
const UPDATE_FN: &str = "on_update";
const EVENT_FN: &str = "on_event";

/// A behavior whose logic lives in a Rhai file.
///
/// Entry points are optional: `on_init(behavior)`, `on_update(behavior, dt)`
/// and `on_event(behavior, event)`. `on_init` runs before the first update
/// and is retried every frame until it succeeds.
pub struct ScriptedBehavior {
    state: BehaviorState,
    context: ScriptContext,
    api: BehaviorApi,
    exposed: ExposedParams,
    log: ScriptLog,
    initialized: bool,
    last_error: Option<String>,
    faults: u64,
}

impl ScriptedBehavior {
    pub fn load(
        name: impl Into<String>,
        entity: EntityHandle,
        source: impl AsRef<Path>,
        bindings: &Rc<ScriptBindings>,
    ) -> Result<Self, BehaviorError> {
        let name = name.into();
        let path = source.as_ref().to_path_buf();
        let context = ScriptContext::compile_file(&path, bindings)?;
        let state = BehaviorState::new(name.clone(), entity.clone(), BehaviorSource::Script(path));
        let exposed = ExposedParams::default();
        let log = ScriptLog::default();
        let api = BehaviorApi {
            name,
            entity,
            bindings: Rc::clone(bindings),
            lease: context.lease().clone(),
            exposed: Rc::clone(&exposed),
            log: log.clone(),
            unset: state.unset_flag(),
        };
        let initialized = !context.has_function(INIT_FN);
        log::debug!(target: "behavior", "loaded script behavior '{}' from {}", state.name(), context.source().display());
        Ok(Self { state, context, api, exposed, log, initialized, last_error: None, faults: 0 })
    }

    /// Loads a unit named after the file stem (`move.rhai` -> `move`).
    pub fn from_file(
        entity: EntityHandle,
        source: impl AsRef<Path>,
        bindings: &Rc<ScriptBindings>,
    ) -> Result<Self, BehaviorError> {
        let source = source.as_ref();
        let name = source.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
        Self::load(name, entity, source, bindings)
    }

    /// Builds a fresh instance from the same file, keeping name, enabled flag
    /// and exposed parameter values. `self` is left untouched.
    pub fn reloaded(&self, bindings: &Rc<ScriptBindings>) -> Result<Self, BehaviorError> {
        self.rebuilt_from(self.script_path(), bindings, true)
    }

    /// Builds an instance of the same name and enabled flag from a different file.
    pub fn replaced(&self, source: impl AsRef<Path>, bindings: &Rc<ScriptBindings>) -> Result<Self, BehaviorError> {
        self.rebuilt_from(source.as_ref(), bindings, false)
    }

    fn rebuilt_from(
        &self,
        source: &Path,
        bindings: &Rc<ScriptBindings>,
        keep_exposed: bool,
    ) -> Result<Self, BehaviorError> {
        let mut next = Self::load(self.state.name(), self.state.entity().clone(), source, bindings)?;
        next.state.set_enabled(self.state.is_enabled());
        if keep_exposed {
            let values = self.exposed.borrow().clone();
            *next.exposed.borrow_mut() = values;
        }
        Ok(next)
    }

    pub fn script_path(&self) -> &Path {
        self.context.source()
    }

    pub fn context(&self) -> &ScriptContext {
        &self.context
    }

    pub fn fault_count(&self) -> u64 {
        self.faults
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Drains the lines the script logged since the last call.
    pub fn take_logs(&self) -> Vec<String> {
        self.log.take()
    }

    fn fault(&mut self, entry: &str, err: Box<EvalAltResult>) -> anyhow::Error {
        let message = match missing_module(&err) {
            Some(module) => format!("{entry}: module not found: {module}"),
            None => format!("{entry}: {err}"),
        };
        self.faults += 1;
        self.last_error = Some(message.clone());
        BehaviorError::Script { name: self.state.name().to_string(), message }.into()
    }

    fn ensure_initialized(&mut self) -> anyhow::Result<()> {
        if self.initialized {
            return Ok(());
        }
        let api = self.api.clone();
        match self.context.call(INIT_FN, (api,)) {
            Ok(_) => {
                self.initialized = true;
                Ok(())
            }
            Err(err) => Err(self.fault(INIT_FN, err)),
        }
    }
}

impl Behavior for ScriptedBehavior {
    fn state(&self) -> &BehaviorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BehaviorState {
        &mut self.state
    }

    fn on_update(&mut self, dt: f32) -> anyhow::Result<()> {
        self.ensure_initialized()?;
        if !self.context.has_function(UPDATE_FN) {
            self.last_error = None;
            return Ok(());
        }
        let api = self.api.clone();
        match self.context.call(UPDATE_FN, (api, dt as FLOAT)) {
            Ok(_) => {
                self.last_error = None;
                Ok(())
            }
            Err(err) => Err(self.fault(UPDATE_FN, err)),
        }
    }

    fn on_event(&mut self, event: &EngineEvent) -> anyhow::Result<()> {
        if !self.context.has_function(EVENT_FN) {
            return Ok(());
        }
        self.ensure_initialized()?;
        let api = self.api.clone();
        match self.context.call(EVENT_FN, (api, event.to_script_map())) {
            Ok(_) => {
                self.last_error = None;
                Ok(())
            }
            Err(err) => Err(self.fault(EVENT_FN, err)),
        }
    }

    fn exposed_params(&self) -> Vec<(String, f64)> {
        self.exposed.borrow().iter().map(|(name, value)| (name.clone(), *value)).collect()
    }

    fn set_exposed_param(&mut self, name: &str, value: f64) -> bool {
        let mut exposed = self.exposed.borrow_mut();
        match exposed.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn retire(&mut self) {
        self.context.invalidate();
        log::debug!(target: "behavior", "retired script behavior '{}'", self.state.name());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for ScriptedBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedBehavior")
            .field("name", &self.state.name())
            .field("source", &PathBuf::from(self.script_path()))
            .field("enabled", &self.state.is_enabled())
            .field("initialized", &self.initialized)
            .finish()
    }
}
