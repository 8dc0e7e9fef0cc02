use super::bindings::ScriptBindings;
use super::proxy::ProxyLease;
use crate::ecs::EntityHandle;
use rhai::{Dynamic, Engine, EvalAltResult, FLOAT, INT};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

pub type ExposedParams = Rc<RefCell<BTreeMap<String, f64>>>;

const LOG_CAPACITY: usize = 64;

/// Lines a script logged through `behavior.log/warn/error`, newest last.
#[derive(Clone, Default)]
pub struct ScriptLog {
    lines: Rc<RefCell<VecDeque<String>>>,
}

impl ScriptLog {
    pub fn push(&self, line: String) {
        let mut lines = self.lines.borrow_mut();
        if lines.len() == LOG_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn take(&self) -> Vec<String> {
        self.lines.borrow_mut().drain(..).collect()
    }
}

/// The `behavior` object passed to every script entry point.
#[derive(Clone)]
pub struct BehaviorApi {
    pub(crate) name: String,
    pub(crate) entity: EntityHandle,
    pub(crate) bindings: Rc<ScriptBindings>,
    pub(crate) lease: ProxyLease,
    pub(crate) exposed: ExposedParams,
    pub(crate) log: ScriptLog,
    pub(crate) unset: Rc<Cell<bool>>,
}

impl BehaviorApi {
    fn get_component(&mut self, type_name: &str) -> Result<Dynamic, Box<EvalAltResult>> {
        self.bindings.get_component(type_name, &self.entity, &self.lease).map_err(|err| err.to_string().into())
    }

    fn has_component(&mut self, type_name: &str) -> bool {
        self.bindings.has_component(type_name, &self.entity)
    }

    fn expose(&mut self, param: &str, default: f64) -> FLOAT {
        *self.exposed.borrow_mut().entry(param.to_string()).or_insert(default)
    }

    fn record(&self, level: log::Level, message: &str) {
        log::log!(target: "script", level, "[{}] {}", self.name, message);
        self.log.push(format!("{level}: {message}"));
    }
}

pub fn link_behavior_api(engine: &mut Engine) {
    engine.register_type_with_name::<BehaviorApi>("Behavior");
    engine.register_get("name", |b: &mut BehaviorApi| b.name.clone());
    engine.register_get("entity", |b: &mut BehaviorApi| b.entity.id().to_bits() as INT);
    engine.register_fn("get_component", BehaviorApi::get_component);
    engine.register_fn("has_component", BehaviorApi::has_component);
    engine.register_fn("expose", BehaviorApi::expose);
    engine.register_fn("expose", |b: &mut BehaviorApi, param: &str, default: INT| b.expose(param, default as f64));
    engine.register_fn("log", |b: &mut BehaviorApi, message: &str| b.record(log::Level::Info, message));
    engine.register_fn("warn", |b: &mut BehaviorApi, message: &str| b.record(log::Level::Warn, message));
    engine.register_fn("error", |b: &mut BehaviorApi, message: &str| b.record(log::Level::Error, message));
    engine.register_fn("remove_self", |b: &mut BehaviorApi| b.unset.set(true));
}
