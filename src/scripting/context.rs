use super::bindings::ScriptBindings;
use super::proxy::ProxyLease;
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FuncArgs, Module, ModuleResolver, Position, Scope, AST};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

pub type ModuleCache = Rc<RefCell<BTreeMap<String, Rc<Module>>>>;

#[derive(Debug, Error)]
pub enum ContextError {
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
    #[error("{}: {message}", .path.display())]
    Init { path: PathBuf, message: String },
}

/// Resolves `import "name"` through the frozen loader registry, caching per context.
struct BindingsResolver {
    bindings: Rc<ScriptBindings>,
    cache: ModuleCache,
}

impl ModuleResolver for BindingsResolver {
    fn resolve(
        &self,
        _engine: &Engine,
        _source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Rc<Module>, Box<EvalAltResult>> {
        self.bindings
            .load_into(path, &self.cache)
            .map_err(|_| Box::new(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos)))
    }
}

/// One compiled script with its own engine, scope and module namespace.
pub struct ScriptContext {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    modules: ModuleCache,
    lease: ProxyLease,
    source: PathBuf,
}

impl ScriptContext {
    pub fn compile_file(path: impl AsRef<Path>, bindings: &Rc<ScriptBindings>) -> Result<Self, ContextError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|source| ContextError::Io { path: path.to_path_buf(), source })?;
        Self::compile_source(path, &source, bindings)
    }

    /// Compiles `source` and evaluates its top level once, resolving
    /// top-level imports.
    ///
    /// Public functions are kept with the imports and constants the top level
    /// produced, so entry points see them without re-running the script body.
    pub fn compile_source(
        path: impl AsRef<Path>,
        source: &str,
        bindings: &Rc<ScriptBindings>,
    ) -> Result<Self, ContextError> {
        let path = path.as_ref().to_path_buf();
        let modules = ModuleCache::default();
        let engine = build_engine(bindings, &modules, &path);
        let compiled = engine
            .compile(source)
            .map_err(|err| ContextError::Compile { path: path.clone(), message: err.to_string() })?;
        let evaluated = match Module::eval_ast_as_new(Scope::new(), &compiled, &engine) {
            Ok(module) => module,
            Err(err) => {
                return Err(match missing_module(&err) {
                    Some(module) => ContextError::ModuleNotFound { path, module },
                    None => ContextError::Init { path, message: err.to_string() },
                });
            }
        };
        let ast = AST::new_from_module(evaluated);
        Ok(Self { engine, ast, scope: Scope::new(), modules, lease: ProxyLease::new(), source: path })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn lease(&self) -> &ProxyLease {
        &self.lease
    }

    pub(crate) fn module_cache(&self) -> &ModuleCache {
        &self.modules
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        self.modules.borrow().keys().cloned().collect()
    }

    pub fn is_module_loaded(&self, name: &str) -> bool {
        self.modules.borrow().contains_key(name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.ast.iter_functions().any(|f| f.name == name)
    }

    /// Calls an entry point. The script's top level is not evaluated again.
    pub fn call(&mut self, name: &str, args: impl FuncArgs) -> Result<Dynamic, Box<EvalAltResult>> {
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(false);
        self.engine.call_fn_with_options::<Dynamic>(options, &mut self.scope, &self.ast, name, args)
    }

    /// Stale proxies from this context fail from now on.
    pub fn invalidate(&self) {
        self.lease.invalidate();
    }
}

impl Drop for ScriptContext {
    fn drop(&mut self) {
        self.lease.invalidate();
    }
}

fn build_engine(bindings: &Rc<ScriptBindings>, modules: &ModuleCache, path: &Path) -> Engine {
    let mut engine = Engine::new();
    let limits = bindings.limits();
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
    engine.set_fast_operators(true);
    let label = path.display().to_string();
    engine.on_print(move |text| log::info!(target: "script", "[{label}] {text}"));
    let label = path.display().to_string();
    engine.on_debug(move |text, _source, pos| log::debug!(target: "script", "[{label}:{pos}] {text}"));
    engine.set_module_resolver(BindingsResolver { bindings: Rc::clone(bindings), cache: Rc::clone(modules) });
    bindings.link_classes(&mut engine);
    engine
}

/// Name of the module whose import failed, looking through call frames.
pub(crate) fn missing_module(err: &EvalAltResult) -> Option<String> {
    match err {
        EvalAltResult::ErrorModuleNotFound(name, _) => Some(name.clone()),
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) | EvalAltResult::ErrorInModule(_, inner, _) => {
            missing_module(inner)
        }
        _ => None,
    }
}
