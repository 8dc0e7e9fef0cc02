//! Bridge between the component store and the Rhai scripting layer.
//!
//! [`ScriptBindings`] holds the two lookup tables scripts reach native code
//! through: component proxy getters (`behavior.get_component("Transform")`)
//! and module loaders (`import "input" as input;`). Each scripted behavior
//! owns one [`ScriptContext`].

mod api;
mod bindings;
mod context;
pub mod modules;
pub mod proxy;

pub use api::{BehaviorApi, ExposedParams, ScriptLog};
pub use bindings::{BindingError, ComponentGetter, ModuleLoaderFn, ScriptBindings, ScriptBindingsBuilder};
pub use context::{ContextError, ModuleCache, ScriptContext};
pub use proxy::{ComponentProxy, ComponentRef, ModelProxy, NameProxy, ProxyLease, TransformProxy, Vec3Ref};

pub(crate) use context::missing_module;

/// Sandbox limits applied to every script engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self { max_operations: 500_000, max_call_levels: 64, max_expr_depth: 64 }
    }
}
