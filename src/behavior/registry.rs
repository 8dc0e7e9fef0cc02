use super::{Behavior, BehaviorError, BehaviorSummary, ScriptedBehavior};
use crate::events::EngineEvent;
use crate::scripting::ScriptBindings;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

pub type BehaviorRef = Rc<RefCell<dyn Behavior>>;

/// What to do with a unit whose update or event handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    #[default]
    KeepEnabled,
    Disable,
}

impl FaultPolicy {
    pub fn from_disable_flag(disable_on_fault: bool) -> Self {
        if disable_on_fault {
            FaultPolicy::Disable
        } else {
            FaultPolicy::KeepEnabled
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub invoked: usize,
    pub faults: usize,
    pub removed: usize,
}

impl PassReport {
    pub fn merge(&mut self, other: PassReport) {
        self.invoked += other.invoked;
        self.faults += other.faults;
        self.removed += other.removed;
    }
}

/// Name-keyed behaviors of one entity. Units run in name order.
#[derive(Default)]
pub struct BehaviorRegistry {
    units: BTreeMap<String, BehaviorRef>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `unit` under its own name, retiring any unit it replaces.
    pub fn add_behavior<T: Behavior>(&mut self, unit: T) -> Rc<RefCell<T>> {
        let unit = Rc::new(RefCell::new(unit));
        self.insert(unit.clone());
        unit
    }

    pub fn insert(&mut self, unit: BehaviorRef) {
        let name = unit.borrow().name().to_string();
        if let Some(previous) = self.units.insert(name.clone(), unit) {
            log::debug!(target: "behavior", "replacing behavior '{name}'");
            retire(&previous);
        }
    }

    pub fn get(&self, name: &str) -> Option<BehaviorRef> {
        self.units.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Removes and retires `name` now. Returns false if it was not present.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.units.remove(name) {
            Some(unit) => {
                retire(&unit);
                true
            }
            None => false,
        }
    }

    /// Marks `name` for removal at the next sweep.
    pub fn request_removal(&self, name: &str) -> bool {
        let Some(unit) = self.units.get(name) else {
            return false;
        };
        let marked = unit.try_borrow().map(|unit| unit.mark_unset()).is_ok();
        marked
    }

    /// Runs `on_update` on every enabled unit, then sweeps.
    pub fn update(&mut self, dt: f32, policy: FaultPolicy) -> PassReport {
        let mut report = self.dispatch(policy, "update", |unit| unit.on_update(dt));
        report.removed = self.sweep();
        report
    }

    pub fn dispatch_event(&mut self, event: &EngineEvent, policy: FaultPolicy) -> PassReport {
        let mut report = self.dispatch(policy, "event", |unit| unit.on_event(event));
        report.removed = self.sweep();
        report
    }

    fn dispatch(
        &self,
        policy: FaultPolicy,
        phase: &str,
        mut call: impl FnMut(&mut dyn Behavior) -> anyhow::Result<()>,
    ) -> PassReport {
        let mut report = PassReport::default();
        for (name, unit) in &self.units {
            let Ok(mut unit) = unit.try_borrow_mut() else {
                log::warn!(target: "behavior", "[behavior:{name}] skipped {phase}: already borrowed");
                continue;
            };
            if !unit.is_enabled() || unit.is_pending_unset() {
                continue;
            }
            report.invoked += 1;
            if let Err(err) = call(&mut *unit) {
                report.faults += 1;
                log::error!(target: "behavior", "[behavior:{name}] {phase} failed: {err:#}");
                if policy == FaultPolicy::Disable {
                    unit.set_enabled(false);
                    log::warn!(target: "behavior", "[behavior:{name}] disabled after fault");
                }
            }
        }
        report
    }

    /// Erases every unit marked for removal. Returns how many were erased.
    pub fn sweep(&mut self) -> usize {
        let pending: Vec<String> = self
            .units
            .iter()
            .filter(|(_, unit)| unit.try_borrow().map_or(false, |unit| unit.is_pending_unset()))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &pending {
            if let Some(unit) = self.units.remove(name) {
                retire(&unit);
            }
        }
        pending.len()
    }

    /// Recompiles a scripted unit from its file. The old instance stays in
    /// place, untouched, if the new one fails to load.
    pub fn reload(&mut self, name: &str, bindings: &Rc<ScriptBindings>) -> Result<(), BehaviorError> {
        self.rebuild(name, |scripted| scripted.reloaded(bindings))
    }

    /// Points a scripted unit at a different file, keeping its name and enabled flag.
    pub fn replace_script(
        &mut self,
        name: &str,
        source: impl AsRef<Path>,
        bindings: &Rc<ScriptBindings>,
    ) -> Result<(), BehaviorError> {
        let source = source.as_ref();
        self.rebuild(name, |scripted| scripted.replaced(source, bindings))
    }

    fn rebuild(
        &mut self,
        name: &str,
        build: impl FnOnce(&ScriptedBehavior) -> Result<ScriptedBehavior, BehaviorError>,
    ) -> Result<(), BehaviorError> {
        let unit = self.get(name).ok_or_else(|| BehaviorError::UnknownBehavior(name.to_string()))?;
        let replacement = {
            let current = unit.borrow();
            let scripted = current
                .as_any()
                .downcast_ref::<ScriptedBehavior>()
                .ok_or_else(|| BehaviorError::NotScripted(name.to_string()))?;
            build(scripted)?
        };
        retire(&unit);
        self.units.insert(name.to_string(), Rc::new(RefCell::new(replacement)));
        log::info!(target: "behavior", "reloaded behavior '{name}'");
        Ok(())
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), BehaviorError> {
        let unit = self.get(name).ok_or_else(|| BehaviorError::UnknownBehavior(name.to_string()))?;
        unit.borrow_mut().set_enabled(enabled);
        Ok(())
    }

    pub fn set_exposed_param(&mut self, name: &str, param: &str, value: f64) -> Result<bool, BehaviorError> {
        let unit = self.get(name).ok_or_else(|| BehaviorError::UnknownBehavior(name.to_string()))?;
        let changed = unit.borrow_mut().set_exposed_param(param, value);
        Ok(changed)
    }

    /// Names of scripted units loaded from `path`.
    pub fn scripted_from(&self, path: &Path) -> Vec<String> {
        self.units
            .iter()
            .filter(|(_, unit)| unit.borrow().source().script_path().map_or(false, |own| same_file(own, path)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn summaries(&self) -> Vec<BehaviorSummary> {
        self.units.values().map(|unit| unit.borrow().summary()).collect()
    }

    /// Removes and retires everything, e.g. when the owning entity goes away.
    pub fn clear(&mut self) {
        for (_, unit) in std::mem::take(&mut self.units) {
            retire(&unit);
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn retire(unit: &BehaviorRef) {
    match unit.try_borrow_mut() {
        Ok(mut unit) => unit.retire(),
        Err(_) => log::warn!(target: "behavior", "could not retire a behavior that is still borrowed"),
    }
}
