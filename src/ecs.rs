use bevy_ecs::prelude::*;
use glam::Vec3;
use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

// ---------- Components ----------
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}
impl Default for Transform {
    fn default() -> Self {
        Self { translation: Vec3::ZERO, rotation: Vec3::ZERO, scale: Vec3::ONE }
    }
}
impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::default() }
    }
}

#[derive(Component, Clone, Debug, Default, PartialEq, Eq)]
pub struct Name(pub String);

/// Model reference attached to an entity. Geometry statistics are filled in
/// on the main thread once an import finishes.
#[derive(Component, Clone, Debug, PartialEq)]
pub struct Model {
    pub path: String,
    pub receive_shadows: bool,
    pub loaded: bool,
    pub mesh_count: usize,
    pub vertex_count: usize,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
}
impl Default for Model {
    fn default() -> Self {
        Self {
            path: String::new(),
            receive_shadows: true,
            loaded: false,
            mesh_count: 0,
            vertex_count: 0,
            bounds_min: Vec3::ZERO,
            bounds_max: Vec3::ZERO,
        }
    }
}
impl Model {
    pub fn pending(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Self::default() }
    }
}

// ---------- Shared world ----------
pub type SharedWorld = Rc<RefCell<World>>;

pub fn shared_world() -> SharedWorld {
    Rc::new(RefCell::new(World::new()))
}

/// Capability to reach one entity's components in the shared world.
///
/// The handle holds a weak pointer: it never keeps the world alive. Every
/// accessor borrows the world for the duration of the call only, so callers
/// must not nest accesses inside `with_component*` closures.
#[derive(Clone)]
pub struct EntityHandle {
    id: Entity,
    world: Weak<RefCell<World>>,
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHandle").field("id", &self.id).field("alive", &self.is_alive()).finish()
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.world.ptr_eq(&other.world)
    }
}

impl EntityHandle {
    pub fn new(id: Entity, world: &SharedWorld) -> Self {
        Self { id, world: Rc::downgrade(world) }
    }

    pub fn id(&self) -> Entity {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        let Some(world) = self.world.upgrade() else {
            return false;
        };
        let alive = world.borrow().get_entity(self.id).is_ok();
        alive
    }

    #[track_caller]
    fn world(&self) -> SharedWorld {
        match self.world.upgrade() {
            Some(world) => world,
            None => panic!("entity {:?} outlived its world", self.id),
        }
    }

    #[track_caller]
    pub fn add_component<T: Component>(&self, component: T) {
        let world = self.world();
        let mut world = world.borrow_mut();
        if world.get_entity(self.id).is_err() {
            panic!("cannot add {} to despawned entity {:?}", type_name::<T>(), self.id);
        }
        world.entity_mut(self.id).insert(component);
    }

    pub fn has_component<T: Component>(&self) -> bool {
        let Some(world) = self.world.upgrade() else {
            return false;
        };
        let present = world.borrow().get::<T>(self.id).is_some();
        present
    }

    #[track_caller]
    pub fn get_component<T: Component + Clone>(&self) -> T {
        self.with_component(|component: &T| component.clone())
    }

    pub fn try_get_component<T: Component + Clone>(&self) -> Option<T> {
        let world = self.world.upgrade()?;
        let world = world.borrow();
        world.get::<T>(self.id).cloned()
    }

    #[track_caller]
    pub fn with_component<T: Component, R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let world = self.world();
        let world = world.borrow();
        let component = world.get::<T>(self.id);
        match component {
            Some(component) => f(component),
            None => missing_component::<T>(self.id),
        }
    }

    #[track_caller]
    pub fn with_component_mut<T: Component, R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let world = self.world();
        let mut world = world.borrow_mut();
        let component = world.get_mut::<T>(self.id);
        match component {
            Some(mut component) => f(&mut *component),
            None => missing_component::<T>(self.id),
        }
    }

    /// Returns whether the component was present.
    pub fn remove_component<T: Component>(&self) -> bool {
        let Some(world) = self.world.upgrade() else {
            return false;
        };
        let mut world = world.borrow_mut();
        if world.get::<T>(self.id).is_none() {
            return false;
        }
        world.entity_mut(self.id).remove::<T>();
        true
    }

    pub fn despawn(&self) -> bool {
        let Some(world) = self.world.upgrade() else {
            return false;
        };
        let removed = world.borrow_mut().despawn(self.id);
        removed
    }
}

#[track_caller]
fn missing_component<T>(id: Entity) -> ! {
    panic!("entity {id:?} has no {} component", type_name::<T>())
}
