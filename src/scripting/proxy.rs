use crate::ecs::{EntityHandle, Model, Name, Transform};
use bevy_ecs::prelude::Component;
use glam::Vec3;
use rhai::{Engine, EvalAltResult, FLOAT, INT};
use std::cell::Cell;
use std::marker::PhantomData;
use std::rc::Rc;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Validity token shared by every proxy a script context hands out.
/// Reloading or dropping the context invalidates it.
#[derive(Clone, Debug)]
pub struct ProxyLease(Rc<Cell<bool>>);

impl ProxyLease {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    pub fn is_valid(&self) -> bool {
        self.0.get()
    }

    pub fn invalidate(&self) {
        self.0.set(false);
    }
}

impl Default for ProxyLease {
    fn default() -> Self {
        Self::new()
    }
}

/// Live reference to one component of one entity. Every read and write goes
/// to the world; nothing is cached on the script side.
pub struct ComponentRef<T> {
    entity: EntityHandle,
    lease: ProxyLease,
    _component: PhantomData<fn() -> T>,
}

impl<T> Clone for ComponentRef<T> {
    fn clone(&self) -> Self {
        Self { entity: self.entity.clone(), lease: self.lease.clone(), _component: PhantomData }
    }
}

impl<T: Component> ComponentRef<T> {
    pub fn new(entity: EntityHandle, lease: ProxyLease) -> Self {
        Self { entity, lease, _component: PhantomData }
    }

    pub fn entity(&self) -> &EntityHandle {
        &self.entity
    }

    fn check(&self) -> ScriptResult<()> {
        if !self.lease.is_valid() {
            return Err("component proxy invalidated".into());
        }
        if !self.entity.is_alive() {
            return Err(format!("entity {:?} was despawned", self.entity.id()).into());
        }
        Ok(())
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> ScriptResult<R> {
        self.check()?;
        Ok(self.entity.with_component(f))
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> ScriptResult<R> {
        self.check()?;
        Ok(self.entity.with_component_mut(f))
    }
}

/// A script-visible class wrapping one native component type.
pub trait ComponentProxy: Clone + 'static {
    type Target: Component;
    /// Name scripts pass to `behavior.get_component(..)`.
    const TYPE_NAME: &'static str;

    fn from_ref(component: ComponentRef<Self::Target>) -> Self;

    /// Registers the class, its properties and methods on a script engine.
    fn link(engine: &mut Engine);
}

// ---------- Vec3 ----------
pub fn link_vec3(engine: &mut Engine) {
    engine.register_type_with_name::<Vec3>("Vec3");
    engine.register_fn("vec3", |x: FLOAT, y: FLOAT, z: FLOAT| Vec3::new(x as f32, y as f32, z as f32));
    engine.register_fn("vec3", |x: INT, y: INT, z: INT| Vec3::new(x as f32, y as f32, z as f32));
    engine.register_get_set("x", |v: &mut Vec3| v.x as FLOAT, |v: &mut Vec3, value: FLOAT| v.x = value as f32);
    engine.register_get_set("y", |v: &mut Vec3| v.y as FLOAT, |v: &mut Vec3, value: FLOAT| v.y = value as f32);
    engine.register_get_set("z", |v: &mut Vec3| v.z as FLOAT, |v: &mut Vec3, value: FLOAT| v.z = value as f32);
    engine.register_fn("+", |a: Vec3, b: Vec3| a + b);
    engine.register_fn("-", |a: Vec3, b: Vec3| a - b);
    engine.register_fn("*", |a: Vec3, s: FLOAT| a * s as f32);
    engine.register_fn("*", |s: FLOAT, a: Vec3| a * s as f32);
    engine.register_fn("==", |a: Vec3, b: Vec3| a == b);
    engine.register_fn("to_string", |v: &mut Vec3| format_vec3(*v));
    engine.register_fn("to_debug", |v: &mut Vec3| format_vec3(*v));
}

fn format_vec3(v: Vec3) -> String {
    format!("({:.3}, {:.3}, {:.3})", v.x, v.y, v.z)
}

// ---------- Transform ----------
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TransformField {
    Position,
    Rotation,
    Scale,
}

impl TransformField {
    fn get(self, transform: &Transform) -> Vec3 {
        match self {
            TransformField::Position => transform.translation,
            TransformField::Rotation => transform.rotation,
            TransformField::Scale => transform.scale,
        }
    }

    fn slot(self, transform: &mut Transform) -> &mut Vec3 {
        match self {
            TransformField::Position => &mut transform.translation,
            TransformField::Rotation => &mut transform.rotation,
            TransformField::Scale => &mut transform.scale,
        }
    }
}

/// Script handle for `Transform`.
#[derive(Clone)]
pub struct TransformProxy {
    component: ComponentRef<Transform>,
}

/// Reference to one vector field of a live `Transform`. `t.position.x = 1.0`
/// writes straight into the component.
#[derive(Clone)]
pub struct Vec3Ref {
    component: ComponentRef<Transform>,
    field: TransformField,
}

impl Vec3Ref {
    fn value(&self) -> ScriptResult<Vec3> {
        let field = self.field;
        self.component.read(|t| field.get(t))
    }

    fn update(&self, f: impl FnOnce(&mut Vec3)) -> ScriptResult<()> {
        let field = self.field;
        self.component.write(|t| f(field.slot(t)))
    }
}

impl TransformProxy {
    fn field(&self, field: TransformField) -> Vec3Ref {
        Vec3Ref { component: self.component.clone(), field }
    }

    fn assign(&self, field: TransformField, value: Vec3) -> ScriptResult<()> {
        self.component.write(|t| *field.slot(t) = value)
    }

    fn offset(&self, field: TransformField, delta: Vec3) -> ScriptResult<()> {
        self.component.write(|t| *field.slot(t) += delta)
    }
}

fn vec3_from(x: FLOAT, y: FLOAT, z: FLOAT) -> Vec3 {
    Vec3::new(x as f32, y as f32, z as f32)
}

impl ComponentProxy for TransformProxy {
    type Target = Transform;
    const TYPE_NAME: &'static str = "Transform";

    fn from_ref(component: ComponentRef<Transform>) -> Self {
        Self { component }
    }

    fn link(engine: &mut Engine) {
        engine.register_type_with_name::<Vec3Ref>("Vec3Ref");
        engine.register_get_set(
            "x",
            |r: &mut Vec3Ref| r.value().map(|v| v.x as FLOAT),
            |r: &mut Vec3Ref, value: FLOAT| r.update(|v| v.x = value as f32),
        );
        engine.register_get_set(
            "y",
            |r: &mut Vec3Ref| r.value().map(|v| v.y as FLOAT),
            |r: &mut Vec3Ref, value: FLOAT| r.update(|v| v.y = value as f32),
        );
        engine.register_get_set(
            "z",
            |r: &mut Vec3Ref| r.value().map(|v| v.z as FLOAT),
            |r: &mut Vec3Ref, value: FLOAT| r.update(|v| v.z = value as f32),
        );
        engine.register_fn("get", |r: &mut Vec3Ref| r.value());
        engine.register_fn("to_string", |r: &mut Vec3Ref| r.value().map(format_vec3));
        engine.register_fn("to_debug", |r: &mut Vec3Ref| r.value().map(format_vec3));

        engine.register_type_with_name::<TransformProxy>("Transform");
        for (name, field) in [
            ("position", TransformField::Position),
            ("rotation", TransformField::Rotation),
            ("scale", TransformField::Scale),
        ] {
            engine.register_get(name, move |t: &mut TransformProxy| t.field(field));
            engine.register_set(name, move |t: &mut TransformProxy, value: Vec3| t.assign(field, value));
            engine.register_set(name, move |t: &mut TransformProxy, value: Vec3Ref| {
                let value = value.value()?;
                t.assign(field, value)
            });
        }

        engine.register_fn("translate", |t: &mut TransformProxy, x: FLOAT, y: FLOAT, z: FLOAT| {
            t.offset(TransformField::Position, vec3_from(x, y, z))
        });
        engine.register_fn("translate", |t: &mut TransformProxy, delta: Vec3| {
            t.offset(TransformField::Position, delta)
        });
        engine.register_fn("set_position", |t: &mut TransformProxy, x: FLOAT, y: FLOAT, z: FLOAT| {
            t.assign(TransformField::Position, vec3_from(x, y, z))
        });
        engine.register_fn("rotate", |t: &mut TransformProxy, x: FLOAT, y: FLOAT, z: FLOAT| {
            t.offset(TransformField::Rotation, vec3_from(x, y, z))
        });
        engine.register_fn("set_rotation", |t: &mut TransformProxy, x: FLOAT, y: FLOAT, z: FLOAT| {
            t.assign(TransformField::Rotation, vec3_from(x, y, z))
        });
        engine.register_fn("rescale", |t: &mut TransformProxy, x: FLOAT, y: FLOAT, z: FLOAT| {
            t.offset(TransformField::Scale, vec3_from(x, y, z))
        });
        engine.register_fn("set_scale", |t: &mut TransformProxy, x: FLOAT, y: FLOAT, z: FLOAT| {
            t.assign(TransformField::Scale, vec3_from(x, y, z))
        });
    }
}

// ---------- Model ----------
#[derive(Clone)]
pub struct ModelProxy {
    component: ComponentRef<Model>,
}

impl ComponentProxy for ModelProxy {
    type Target = Model;
    const TYPE_NAME: &'static str = "Model";

    fn from_ref(component: ComponentRef<Model>) -> Self {
        Self { component }
    }

    fn link(engine: &mut Engine) {
        engine.register_type_with_name::<ModelProxy>("Model");
        engine.register_get("path", |m: &mut ModelProxy| m.component.read(|model| model.path.clone()));
        engine.register_get("loaded", |m: &mut ModelProxy| m.component.read(|model| model.loaded));
        engine.register_get("vertex_count", |m: &mut ModelProxy| {
            m.component.read(|model| model.vertex_count as INT)
        });
        engine.register_get_set(
            "receive_shadows",
            |m: &mut ModelProxy| m.component.read(|model| model.receive_shadows),
            |m: &mut ModelProxy, value: bool| m.component.write(|model| model.receive_shadows = value),
        );
    }
}

// ---------- Name ----------
#[derive(Clone)]
pub struct NameProxy {
    component: ComponentRef<Name>,
}

impl ComponentProxy for NameProxy {
    type Target = Name;
    const TYPE_NAME: &'static str = "Name";

    fn from_ref(component: ComponentRef<Name>) -> Self {
        Self { component }
    }

    fn link(engine: &mut Engine) {
        engine.register_type_with_name::<NameProxy>("Name");
        engine.register_get_set(
            "value",
            |n: &mut NameProxy| n.component.read(|name| name.0.clone()),
            |n: &mut NameProxy, value: String| n.component.write(|name| name.0 = value),
        );
    }
}
