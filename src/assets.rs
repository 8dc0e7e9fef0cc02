use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use bevy_ecs::prelude::Entity;
use glam::Vec3;

use crate::ecs::Model;
use crate::events::EngineEvent;
use crate::scene::Scene;
use crate::tasks::TaskSender;

/// Geometry statistics produced by an import.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportedModel {
    pub mesh_count: usize,
    pub vertex_count: usize,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
}

pub type ImportFn = Arc<dyn Fn(&Path) -> Result<ImportedModel> + Send + Sync>;

pub fn gltf_importer() -> ImportFn {
    Arc::new(import_gltf)
}

pub fn import_gltf(path: &Path) -> Result<ImportedModel> {
    let (document, buffers, _images) =
        gltf::import(path).with_context(|| format!("importing glTF {}", path.display()))?;
    let mut mesh_count = 0;
    let mut vertex_count = 0;
    let mut bounds_min = Vec3::splat(f32::MAX);
    let mut bounds_max = Vec3::splat(f32::MIN);
    for mesh in document.meshes() {
        mesh_count += 1;
        for primitive in mesh.primitives() {
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
            if let Some(positions) = reader.read_positions() {
                for position in positions {
                    let p = Vec3::from(position);
                    bounds_min = bounds_min.min(p);
                    bounds_max = bounds_max.max(p);
                    vertex_count += 1;
                }
            }
        }
    }
    if vertex_count == 0 {
        bounds_min = Vec3::ZERO;
        bounds_max = Vec3::ZERO;
    }
    Ok(ImportedModel { mesh_count, vertex_count, bounds_min, bounds_max })
}

struct ImportJob {
    entity: Entity,
    path: PathBuf,
}

/// Background model import. Workers only parse files; results reach the
/// scene as closures on the main-thread queue.
pub struct ModelImportWorker {
    senders: Vec<mpsc::SyncSender<ImportJob>>,
    next_sender: AtomicUsize,
    handles: Vec<thread::JoinHandle<()>>,
}

impl ModelImportWorker {
    pub fn new(worker_count: usize, queue_depth: usize, import: ImportFn, tasks: TaskSender) -> Result<Self> {
        let worker_count = worker_count.max(1);
        let mut senders = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (tx, rx) = mpsc::sync_channel::<ImportJob>(queue_depth.max(1));
            let import = Arc::clone(&import);
            let tasks = tasks.clone();
            let handle = thread::Builder::new()
                .name(format!("model-import-{index}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        let ImportJob { entity, path } = job;
                        let result = import(&path);
                        tasks.submit(move |scene| apply_import(scene, entity, &path, result));
                    }
                })
                .context("spawning model import worker")?;
            senders.push(tx);
            handles.push(handle);
        }
        Ok(Self { senders, next_sender: AtomicUsize::new(0), handles })
    }

    /// Queues an import without blocking. Fails when every worker queue is full.
    pub fn submit(&self, entity: Entity, path: impl Into<PathBuf>) -> Result<()> {
        let mut job = ImportJob { entity, path: path.into() };
        let len = self.senders.len();
        let start = self.next_sender.fetch_add(1, AtomicOrdering::Relaxed) % len;
        for offset in 0..len {
            let idx = (start + offset) % len;
            match self.senders[idx].try_send(job) {
                Ok(()) => return Ok(()),
                Err(mpsc::TrySendError::Full(returned)) | Err(mpsc::TrySendError::Disconnected(returned)) => {
                    job = returned;
                }
            }
        }
        Err(anyhow!("model import queue full; dropped {}", job.path.display()))
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }
}

impl Drop for ModelImportWorker {
    fn drop(&mut self) {
        self.senders.clear();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!(target: "assets", "model import worker panicked");
            }
        }
    }
}

/// Runs on the main thread. The entity may have been despawned, or its model
/// swapped, while the import was in flight; such results are dropped.
fn apply_import(scene: &mut Scene, entity: Entity, path: &Path, result: Result<ImportedModel>) {
    let Some(handle) = scene.entity(entity) else {
        log::debug!(target: "assets", "entity {entity:?} despawned before {} finished importing", path.display());
        return;
    };
    let Some(model) = handle.try_get_component::<Model>() else {
        log::debug!(target: "assets", "entity {entity:?} no longer has a Model; dropping {}", path.display());
        return;
    };
    if Path::new(&model.path) != path {
        log::debug!(target: "assets", "entity {entity:?} now references {}; dropping {}", model.path, path.display());
        return;
    }
    match result {
        Ok(imported) => {
            handle.with_component_mut(|model: &mut Model| {
                model.loaded = true;
                model.mesh_count = imported.mesh_count;
                model.vertex_count = imported.vertex_count;
                model.bounds_min = imported.bounds_min;
                model.bounds_max = imported.bounds_max;
            });
            log::info!(
                target: "assets",
                "loaded {} ({} mesh(es), {} vertices)",
                path.display(),
                imported.mesh_count,
                imported.vertex_count
            );
            scene.emit(EngineEvent::ModelLoaded { entity, path: model.path });
        }
        Err(err) => log::error!(target: "assets", "failed to import {}: {err:#}", path.display()),
    }
}
