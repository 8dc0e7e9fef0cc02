mod document;

pub use document::{BehaviorData, EntityDocument, ModelData, SceneDocument, SceneLoadReport, TransformData, Vec3Data};

use crate::behavior::{Behavior, BehaviorError, BehaviorRegistry, BehaviorSummary, FaultPolicy, PassReport, ScriptedBehavior};
use crate::ecs::{shared_world, EntityHandle, Name, SharedWorld, Transform};
use crate::events::EngineEvent;
use crate::scripting::ScriptBindings;
use bevy_ecs::prelude::Entity;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

/// The live world plus the behavior registries of its entities.
///
/// Registries hold script engines, which cannot be stored as components, so
/// they live in a side table keyed by entity and are dropped with it.
pub struct Scene {
    world: SharedWorld,
    behaviors: BTreeMap<Entity, BehaviorRegistry>,
    emitted: Vec<EngineEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
    pub entity: u64,
    pub name: Option<String>,
    pub behaviors: Vec<BehaviorSummary>,
}

impl Scene {
    pub fn new() -> Self {
        Self { world: shared_world(), behaviors: BTreeMap::new(), emitted: Vec::new() }
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    pub fn spawn(&mut self, name: impl Into<String>, transform: Transform) -> EntityHandle {
        let id = self.world.borrow_mut().spawn((Name(name.into()), transform)).id();
        EntityHandle::new(id, &self.world)
    }

    pub fn is_alive(&self, id: Entity) -> bool {
        let alive = self.world.borrow().get_entity(id).is_ok();
        alive
    }

    /// Handle for a live entity.
    pub fn entity(&self, id: Entity) -> Option<EntityHandle> {
        self.is_alive(id).then(|| EntityHandle::new(id, &self.world))
    }

    pub fn find_by_name(&self, name: &str) -> Option<EntityHandle> {
        let mut world = self.world.borrow_mut();
        let mut query = world.query::<(Entity, &Name)>();
        let found = query.iter(&world).find(|(_, n)| n.0 == name).map(|(id, _)| id);
        drop(world);
        found.map(|id| EntityHandle::new(id, &self.world))
    }

    /// Despawns the entity and drops its registry. Returns false if it was already gone.
    pub fn despawn(&mut self, id: Entity) -> bool {
        if let Some(mut registry) = self.behaviors.remove(&id) {
            registry.clear();
        }
        let removed = self.world.borrow_mut().despawn(id);
        if removed {
            self.emit(EngineEvent::EntityDespawned { entity: id });
        }
        removed
    }

    /// Queues an event for the runtime to dispatch on the next frame.
    pub fn emit(&mut self, event: EngineEvent) {
        self.emitted.push(event);
    }

    pub fn take_emitted(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.emitted)
    }

    pub fn attach_behaviors(&mut self, id: Entity) -> Result<&mut BehaviorRegistry, BehaviorError> {
        if !self.is_alive(id) {
            return Err(BehaviorError::EntityMissing(id));
        }
        Ok(self.behaviors.entry(id).or_default())
    }

    pub fn behaviors(&self, id: Entity) -> Option<&BehaviorRegistry> {
        self.behaviors.get(&id)
    }

    pub fn behaviors_mut(&mut self, id: Entity) -> Option<&mut BehaviorRegistry> {
        self.behaviors.get_mut(&id)
    }

    pub fn detach_behaviors(&mut self, id: Entity) -> Option<BehaviorRegistry> {
        self.behaviors.remove(&id)
    }

    pub fn entities_with_behaviors(&self) -> Vec<Entity> {
        self.behaviors.keys().copied().collect()
    }

    /// Loads a script unit named after the file stem and attaches it to `id`.
    pub fn add_script(
        &mut self,
        id: Entity,
        source: impl AsRef<Path>,
        bindings: &Rc<ScriptBindings>,
    ) -> Result<String, BehaviorError> {
        let handle = self.entity(id).ok_or(BehaviorError::EntityMissing(id))?;
        let unit = ScriptedBehavior::from_file(handle, source, bindings)?;
        let name = unit.state().name().to_string();
        self.attach_behaviors(id)?.add_behavior(unit);
        Ok(name)
    }

    pub fn update(&mut self, dt: f32, policy: FaultPolicy) -> PassReport {
        let mut report = PassReport::default();
        for registry in self.behaviors.values_mut() {
            report.merge(registry.update(dt, policy));
        }
        report
    }

    pub fn dispatch_event(&mut self, event: &EngineEvent, policy: FaultPolicy) -> PassReport {
        let mut report = PassReport::default();
        for registry in self.behaviors.values_mut() {
            report.merge(registry.dispatch_event(event, policy));
        }
        report
    }

    /// Drops registries whose entity was despawned behind the scene's back.
    pub fn sweep_despawned(&mut self) -> Vec<Entity> {
        let dead: Vec<Entity> = self.behaviors.keys().copied().filter(|id| !self.is_alive(*id)).collect();
        for id in &dead {
            if let Some(mut registry) = self.behaviors.remove(id) {
                registry.clear();
            }
        }
        dead
    }

    /// Reloads every scripted unit sourced from `path`, on every entity.
    pub fn reload_scripts_from(
        &mut self,
        path: &Path,
        bindings: &Rc<ScriptBindings>,
    ) -> Vec<(Entity, String, Result<(), BehaviorError>)> {
        let mut results = Vec::new();
        for (id, registry) in self.behaviors.iter_mut() {
            for name in registry.scripted_from(path) {
                let outcome = registry.reload(&name, bindings);
                results.push((*id, name, outcome));
            }
        }
        results
    }

    pub fn summaries(&self) -> Vec<EntitySummary> {
        self.behaviors
            .iter()
            .map(|(id, registry)| EntitySummary {
                entity: id.to_bits(),
                name: EntityHandle::new(*id, &self.world).try_get_component::<Name>().map(|n| n.0),
                behaviors: registry.summaries(),
            })
            .collect()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        for registry in self.behaviors.values_mut() {
            registry.clear();
        }
    }
}
