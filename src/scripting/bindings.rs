use super::context::{ModuleCache, ScriptContext};
use super::modules::{self, ENGINE_MODULE, INPUT_MODULE, MATH_MODULE};
use super::proxy::{self, ComponentProxy, ComponentRef, ModelProxy, NameProxy, ProxyLease, TransformProxy};
use super::{api, ScriptLimits};
use crate::ecs::EntityHandle;
use crate::input::InputHandle;
use bevy_ecs::prelude::{Component, Entity};
use rhai::{Dynamic, Engine, Module};
use std::any::type_name;
use std::collections::BTreeMap;
use std::rc::Rc;
use thiserror::Error;

pub type ComponentGetter = Rc<dyn Fn(&EntityHandle, &ProxyLease) -> Dynamic>;
pub type ModuleLoaderFn = Rc<dyn Fn(&mut Module)>;
pub type ClassLinker = Rc<dyn Fn(&mut Engine)>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("component getter '{0}' is already registered")]
    DuplicateGetter(String),
    #[error("module loader '{0}' is already registered")]
    DuplicateModule(String),
    #[error("unknown component type '{0}'")]
    UnknownComponent(String),
    #[error("module not found: {0}")]
    ModuleNotFound(String),
    #[error("entity {0:?} was despawned")]
    EntityDespawned(Entity),
}

struct ComponentBinding {
    getter: ComponentGetter,
    has: fn(&EntityHandle) -> bool,
}

/// Startup-time builder for the two script lookup tables. Registration is
/// only possible here; the built [`ScriptBindings`] is immutable.
#[derive(Default)]
pub struct ScriptBindingsBuilder {
    components: BTreeMap<String, ComponentBinding>,
    modules: BTreeMap<String, ModuleLoaderFn>,
    classes: Vec<ClassLinker>,
    limits: ScriptLimits,
}

impl ScriptBindingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: ScriptLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Registers a getter producing the script value for component type `T`.
    pub fn register_getter<T, F>(&mut self, name: impl Into<String>, getter: F) -> Result<(), BindingError>
    where
        T: Component,
        F: Fn(&EntityHandle, &ProxyLease) -> Dynamic + 'static,
    {
        let name = name.into();
        if self.components.contains_key(&name) {
            return Err(BindingError::DuplicateGetter(name));
        }
        self.components.insert(name, ComponentBinding { getter: Rc::new(getter), has: EntityHandle::has_component::<T> });
        Ok(())
    }

    /// Replaces an existing getter (or adds one). Returns whether a getter was replaced.
    pub fn override_getter<T, F>(&mut self, name: impl Into<String>, getter: F) -> bool
    where
        T: Component,
        F: Fn(&EntityHandle, &ProxyLease) -> Dynamic + 'static,
    {
        let name = name.into();
        log::debug!(target: "scripting", "overriding component getter '{name}'");
        self.components
            .insert(name, ComponentBinding { getter: Rc::new(getter), has: EntityHandle::has_component::<T> })
            .is_some()
    }

    /// Registers a proxy class: its getter plus the engine-side class definition.
    pub fn register_proxy<P: ComponentProxy>(&mut self) -> Result<(), BindingError> {
        self.register_getter::<P::Target, _>(P::TYPE_NAME, |entity, lease| {
            if !entity.has_component::<P::Target>() {
                panic!("entity {:?} has no {} component", entity.id(), type_name::<P::Target>());
            }
            Dynamic::from(P::from_ref(ComponentRef::new(entity.clone(), lease.clone())))
        })?;
        self.classes.push(Rc::new(P::link));
        Ok(())
    }

    pub fn register_class(&mut self, link: impl Fn(&mut Engine) + 'static) {
        self.classes.push(Rc::new(link));
    }

    pub fn register_module_loader(
        &mut self,
        name: impl Into<String>,
        loader: impl Fn(&mut Module) + 'static,
    ) -> Result<(), BindingError> {
        let name = name.into();
        if self.modules.contains_key(&name) {
            return Err(BindingError::DuplicateModule(name));
        }
        self.modules.insert(name, Rc::new(loader));
        Ok(())
    }

    pub fn override_module_loader(&mut self, name: impl Into<String>, loader: impl Fn(&mut Module) + 'static) -> bool {
        let name = name.into();
        log::debug!(target: "scripting", "overriding module loader '{name}'");
        self.modules.insert(name, Rc::new(loader)).is_some()
    }

    /// Built-in proxies (`Transform`, `Model`, `Name`) and modules
    /// (`engine`, `input`, `math`).
    pub fn with_engine_defaults(mut self, input: &InputHandle) -> Result<Self, BindingError> {
        self.register_proxy::<TransformProxy>()?;
        self.register_proxy::<ModelProxy>()?;
        self.register_proxy::<NameProxy>()?;
        self.register_module_loader(ENGINE_MODULE, modules::load_engine_module)?;
        self.register_module_loader(INPUT_MODULE, modules::input_module_loader(input.clone()))?;
        self.register_module_loader(MATH_MODULE, modules::load_math_module)?;
        Ok(self)
    }

    pub fn build(self) -> Rc<ScriptBindings> {
        log::debug!(
            target: "scripting",
            "script bindings frozen: {} component(s), {} module(s)",
            self.components.len(),
            self.modules.len()
        );
        Rc::new(ScriptBindings {
            components: self.components,
            modules: self.modules,
            classes: self.classes,
            limits: self.limits,
        })
    }
}

/// Frozen component proxy and module loader registries.
pub struct ScriptBindings {
    components: BTreeMap<String, ComponentBinding>,
    modules: BTreeMap<String, ModuleLoaderFn>,
    classes: Vec<ClassLinker>,
    limits: ScriptLimits,
}

impl ScriptBindings {
    pub fn builder() -> ScriptBindingsBuilder {
        ScriptBindingsBuilder::new()
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    pub fn get_component(
        &self,
        name: &str,
        entity: &EntityHandle,
        lease: &ProxyLease,
    ) -> Result<Dynamic, BindingError> {
        let binding = self.components.get(name).ok_or_else(|| BindingError::UnknownComponent(name.to_string()))?;
        if !entity.is_alive() {
            return Err(BindingError::EntityDespawned(entity.id()));
        }
        Ok((binding.getter)(entity, lease))
    }

    /// False for unknown names as well as for absent components.
    pub fn has_component(&self, name: &str, entity: &EntityHandle) -> bool {
        self.components.get(name).map_or(false, |binding| (binding.has)(entity))
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.keys().map(String::as_str).collect()
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    /// Loads `name` into the context's namespace. A second request for the
    /// same context returns the cached module without running the loader.
    pub fn load_module(&self, name: &str, context: &ScriptContext) -> Result<Rc<Module>, BindingError> {
        self.load_into(name, context.module_cache())
    }

    pub(super) fn load_into(&self, name: &str, cache: &ModuleCache) -> Result<Rc<Module>, BindingError> {
        if let Some(module) = cache.borrow().get(name).cloned() {
            return Ok(module);
        }
        let loader = self.modules.get(name).ok_or_else(|| BindingError::ModuleNotFound(name.to_string()))?;
        let mut module = Module::new();
        loader(&mut module);
        module.build_index();
        let module = Rc::new(module);
        cache.borrow_mut().insert(name.to_string(), Rc::clone(&module));
        log::debug!(target: "scripting", "loaded module '{name}'");
        Ok(module)
    }

    /// Registers the value types, the behavior API and every proxy class.
    pub fn link_classes(&self, engine: &mut Engine) {
        proxy::link_vec3(engine);
        api::link_behavior_api(engine);
        for link in &self.classes {
            link(engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Transform;

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut builder = ScriptBindingsBuilder::new();
        builder.register_proxy::<TransformProxy>().expect("first registration");
        assert_eq!(
            builder.register_getter::<Transform, _>("Transform", |_, _| Dynamic::UNIT),
            Err(BindingError::DuplicateGetter("Transform".into()))
        );
        builder.register_module_loader("math", modules::load_math_module).expect("first loader");
        assert_eq!(
            builder.register_module_loader("math", modules::load_math_module),
            Err(BindingError::DuplicateModule("math".into()))
        );
        assert!(builder.override_module_loader("math", |_| {}));
    }

    #[test]
    fn module_cache_skips_loader_on_second_request() {
        let calls = Rc::new(std::cell::Cell::new(0));
        let counter = calls.clone();
        let mut builder = ScriptBindingsBuilder::new();
        builder
            .register_module_loader("counter", move |_module: &mut Module| counter.set(counter.get() + 1))
            .expect("register loader");
        let bindings = builder.build();
        let cache = ModuleCache::default();

        let first = bindings.load_into("counter", &cache).expect("first load");
        let second = bindings.load_into("counter", &cache).expect("second load");
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(calls.get(), 1);

        assert_eq!(
            bindings.load_into("missing", &cache).unwrap_err(),
            BindingError::ModuleNotFound("missing".into())
        );
        assert_eq!(cache.borrow().len(), 1);
    }
}
