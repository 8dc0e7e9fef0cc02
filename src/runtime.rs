use crate::assets::{gltf_importer, ImportFn, ModelImportWorker};
use crate::behavior::{FaultPolicy, PassReport};
use crate::config::RuntimeConfig;
use crate::ecs::Model;
use crate::events::{EngineEvent, EventBus};
use crate::input::{InputHandle, InputState};
use crate::scene::{Scene, SceneDocument, SceneLoadReport};
use crate::scripting::{BindingError, ScriptBindings};
use crate::tasks::{MainThreadQueue, TaskSender};
use crate::watch::{normalize_watch_path, ScriptWatcher};
use anyhow::{anyhow, Context, Result};
use bevy_ecs::prelude::Entity;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    pub tasks_run: usize,
    pub reloads: usize,
    pub reload_failures: usize,
    pub events: usize,
    pub invoked: usize,
    pub faults: usize,
    pub removed: usize,
    pub swept_entities: usize,
}

/// Owns the scene and drives it one frame at a time:
/// tasks, hot reload, events, updates, then cleanup.
pub struct Runtime {
    config: RuntimeConfig,
    scene: Scene,
    bindings: Rc<ScriptBindings>,
    input: InputHandle,
    tasks: MainThreadQueue,
    events: EventBus,
    watcher: Option<ScriptWatcher>,
    importer: Option<ModelImportWorker>,
    frame: u64,
}

impl Runtime {
    /// Runtime with the built-in proxies and modules.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let input = InputState::shared();
        let bindings = default_bindings(&config, &input)?;
        Self::with_bindings(config, bindings, input)
    }

    pub fn with_bindings(config: RuntimeConfig, bindings: Rc<ScriptBindings>, input: InputHandle) -> Result<Self> {
        let watcher = if config.scripts.hot_reload { start_watcher(&config.scripts.watch_roots) } else { None };
        Ok(Self {
            config,
            scene: Scene::new(),
            bindings,
            input,
            tasks: MainThreadQueue::new(),
            events: EventBus::default(),
            watcher,
            importer: None,
            frame: 0,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn bindings(&self) -> &Rc<ScriptBindings> {
        &self.bindings
    }

    pub fn input(&self) -> &InputHandle {
        &self.input
    }

    pub fn task_sender(&self) -> TaskSender {
        self.tasks.sender()
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        self.config.behaviors.fault_policy()
    }

    pub fn push_event(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    pub fn frame(&mut self, dt: f32) -> FrameReport {
        self.frame += 1;
        let policy = self.fault_policy();
        let mut report = FrameReport { frame: self.frame, ..FrameReport::default() };

        report.tasks_run = self.tasks.drain_once(&mut self.scene);

        let changed = self.watcher.as_mut().map(ScriptWatcher::drain_changes).unwrap_or_default();
        for path in changed {
            let (reloads, failures) = self.reload_scripts(&path);
            report.reloads += reloads;
            report.reload_failures += failures;
        }

        for event in self.scene.take_emitted() {
            self.events.push(event);
        }
        let mut pass = PassReport::default();
        for event in self.events.drain() {
            self.input.borrow_mut().apply(&event);
            pass.merge(self.scene.dispatch_event(&event, policy));
            report.events += 1;
        }

        pass.merge(self.scene.update(dt, policy));
        report.invoked = pass.invoked;
        report.faults = pass.faults;
        report.removed = pass.removed;

        report.swept_entities = self.scene.sweep_despawned().len();
        self.input.borrow_mut().clear_frame();
        report
    }

    /// Reloads every unit sourced from `path`. Returns (reloaded, failed).
    pub fn reload_scripts(&mut self, path: &Path) -> (usize, usize) {
        let path = normalize_watch_path(path);
        let mut reloaded = 0;
        let mut failed = 0;
        for (entity, name, outcome) in self.scene.reload_scripts_from(&path, &self.bindings) {
            match outcome {
                Ok(()) => {
                    reloaded += 1;
                    self.events.push(EngineEvent::BehaviorReloaded { entity, name });
                }
                Err(err) => {
                    failed += 1;
                    log::error!(target: "behavior", "[behavior:{name}] reload failed, keeping previous version: {err}");
                }
            }
        }
        (reloaded, failed)
    }

    pub fn add_script(&mut self, entity: Entity, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        self.scene
            .add_script(entity, path, &self.bindings)
            .with_context(|| format!("attaching {} to {entity:?}", path.display()))
    }

    /// Starts the import worker pool with a custom importer. Without a call
    /// to this, the first `import_model` starts one using glTF.
    pub fn start_importer(&mut self, import: ImportFn) -> Result<()> {
        let worker = ModelImportWorker::new(
            self.config.assets.import_workers,
            self.config.assets.queue_depth,
            import,
            self.tasks.sender(),
        )?;
        self.importer = Some(worker);
        Ok(())
    }

    /// Attaches a pending `Model` and queues its import in the background.
    pub fn import_model(&mut self, entity: Entity, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let handle = self.scene.entity(entity).ok_or_else(|| anyhow!("entity {entity:?} does not exist"))?;
        handle.add_component(Model::pending(path.to_string_lossy()));
        if self.importer.is_none() {
            self.start_importer(gltf_importer())?;
        }
        let importer = self.importer.as_ref().ok_or_else(|| anyhow!("model importer unavailable"))?;
        importer.submit(entity, path)
    }

    pub fn load_scene(&mut self, path: impl AsRef<Path>) -> Result<SceneLoadReport> {
        let path = path.as_ref();
        let document = SceneDocument::load_from_path(path)?;
        let base_dir = path.parent().map(Path::to_path_buf);
        let report = document.instantiate(&mut self.scene, &self.bindings, base_dir.as_deref());
        for (entity, model) in &report.models {
            let model_path = match &base_dir {
                Some(base) if Path::new(model).is_relative() => base.join(model),
                _ => PathBuf::from(model),
            };
            if let Err(err) = self.queue_import(*entity, model_path) {
                log::error!(target: "assets", "could not queue {model}: {err:#}");
            }
        }
        log::info!(
            target: "scene",
            "loaded {} entities from {} ({} behavior failure(s))",
            report.entities.len(),
            path.display(),
            report.failures.len()
        );
        Ok(report)
    }

    fn queue_import(&mut self, entity: Entity, path: PathBuf) -> Result<()> {
        if let Some(handle) = self.scene.entity(entity) {
            handle.with_component_mut(|model: &mut Model| model.path = path.to_string_lossy().into_owned());
        }
        if self.importer.is_none() {
            self.start_importer(gltf_importer())?;
        }
        let importer = self.importer.as_ref().ok_or_else(|| anyhow!("model importer unavailable"))?;
        importer.submit(entity, path)
    }

    pub fn export_scene(&self, base_dir: Option<&Path>) -> SceneDocument {
        SceneDocument::capture(&self.scene, base_dir)
    }

    pub fn save_scene(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.export_scene(path.parent()).save_to_path(path)
    }
}

pub fn default_bindings(config: &RuntimeConfig, input: &InputHandle) -> Result<Rc<ScriptBindings>, BindingError> {
    Ok(ScriptBindings::builder().with_limits(config.scripts.limits()).with_engine_defaults(input)?.build())
}

fn start_watcher(roots: &[PathBuf]) -> Option<ScriptWatcher> {
    let mut watcher = match ScriptWatcher::new() {
        Ok(watcher) => watcher,
        Err(err) => {
            log::warn!(target: "watch", "script hot reload unavailable: {err:#}");
            return None;
        }
    };
    for root in roots {
        if let Err(err) = watcher.watch_root(root) {
            log::warn!(target: "watch", "not watching {}: {err:#}", root.display());
        }
    }
    Some(watcher)
}
