use super::Scene;
use crate::behavior::{Behavior, BehaviorError, ScriptedBehavior};
use crate::ecs::{EntityHandle, Model, Name, Transform};
use crate::scripting::ScriptBindings;
use anyhow::{Context, Result};
use bevy_ecs::prelude::Entity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Persisted form of a scene: entities, their transforms and model paths,
/// and the scripted behaviors attached to them. Native behaviors are
/// registered by code and are not stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default)]
    pub entities: Vec<EntityDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub transform: TransformData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub behaviors: Vec<BehaviorData>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3Data {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<glam::Vec3> for Vec3Data {
    fn from(v: glam::Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<Vec3Data> for glam::Vec3 {
    fn from(v: Vec3Data) -> Self {
        glam::Vec3::new(v.x, v.y, v.z)
    }
}

fn default_scale() -> Vec3Data {
    Vec3Data { x: 1.0, y: 1.0, z: 1.0 }
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformData {
    #[serde(default)]
    pub translation: Vec3Data,
    #[serde(default)]
    pub rotation: Vec3Data,
    #[serde(default = "default_scale")]
    pub scale: Vec3Data,
}

impl Default for TransformData {
    fn default() -> Self {
        Self { translation: Vec3Data::default(), rotation: Vec3Data::default(), scale: default_scale() }
    }
}

impl From<&Transform> for TransformData {
    fn from(t: &Transform) -> Self {
        Self { translation: t.translation.into(), rotation: t.rotation.into(), scale: t.scale.into() }
    }
}

impl From<&TransformData> for Transform {
    fn from(t: &TransformData) -> Self {
        Transform { translation: t.translation.into(), rotation: t.rotation.into(), scale: t.scale.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelData {
    pub path: String,
    #[serde(default = "default_true")]
    pub receive_shadows: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorData {
    pub name: String,
    /// Script path; relative paths resolve against the document's directory.
    pub source: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Outcome of instantiating a document. Behaviors that failed to load are
/// reported and skipped; the rest of the scene still loads.
#[derive(Debug, Default)]
pub struct SceneLoadReport {
    pub entities: Vec<Entity>,
    pub models: Vec<(Entity, String)>,
    pub failures: Vec<(Entity, String, BehaviorError)>,
}

impl SceneDocument {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Reading scene file {}", path.display()))?;
        let document = serde_json::from_slice::<SceneDocument>(&bytes)
            .with_context(|| format!("Parsing scene file {}", path.display()))?;
        Ok(document)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Creating scene directory {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json.as_bytes()).with_context(|| format!("Writing scene file {}", path.display()))?;
        Ok(())
    }

    /// Snapshot of every named entity in `scene`. Script paths under
    /// `base_dir` are stored relative to it.
    pub fn capture(scene: &Scene, base_dir: Option<&Path>) -> Self {
        let ids: Vec<Entity> = {
            let mut world = scene.world().borrow_mut();
            let mut query = world.query_filtered::<Entity, bevy_ecs::query::With<Name>>();
            let mut ids: Vec<Entity> = query.iter(&world).collect();
            ids.sort();
            ids
        };
        let entities = ids
            .into_iter()
            .map(|id| {
                let handle = EntityHandle::new(id, scene.world());
                let behaviors = scene
                    .behaviors(id)
                    .map(|registry| {
                        registry
                            .names()
                            .into_iter()
                            .filter_map(|name| registry.get(&name))
                            .filter_map(|unit| {
                                let unit = unit.borrow();
                                let path = unit.source().script_path()?;
                                Some(BehaviorData {
                                    name: unit.name().to_string(),
                                    source: relative_to(path, base_dir),
                                    enabled: unit.is_enabled(),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                EntityDocument {
                    name: handle.try_get_component::<Name>().map(|n| n.0).unwrap_or_default(),
                    transform: handle
                        .try_get_component::<Transform>()
                        .as_ref()
                        .map(TransformData::from)
                        .unwrap_or_default(),
                    model: handle.try_get_component::<Model>().map(|m| ModelData {
                        path: relative_to(Path::new(&m.path), base_dir),
                        receive_shadows: m.receive_shadows,
                    }),
                    behaviors,
                }
            })
            .collect();
        Self { entities }
    }

    /// Spawns the document's entities into `scene` and loads their scripts.
    pub fn instantiate(
        &self,
        scene: &mut Scene,
        bindings: &Rc<ScriptBindings>,
        base_dir: Option<&Path>,
    ) -> SceneLoadReport {
        let mut report = SceneLoadReport::default();
        for entity in &self.entities {
            let handle = scene.spawn(entity.name.clone(), Transform::from(&entity.transform));
            let id = handle.id();
            report.entities.push(id);
            if let Some(model) = &entity.model {
                handle.add_component(Model {
                    receive_shadows: model.receive_shadows,
                    ..Model::pending(model.path.clone())
                });
                report.models.push((id, model.path.clone()));
            }
            for behavior in &entity.behaviors {
                let source = resolve(&behavior.source, base_dir);
                match ScriptedBehavior::load(behavior.name.clone(), handle.clone(), &source, bindings) {
                    Ok(mut unit) => {
                        unit.set_enabled(behavior.enabled);
                        match scene.attach_behaviors(id) {
                            Ok(registry) => {
                                registry.add_behavior(unit);
                            }
                            Err(err) => report.failures.push((id, behavior.name.clone(), err)),
                        }
                    }
                    Err(err) => {
                        log::error!(target: "scene", "[{}] behavior '{}' not loaded: {err}", entity.name, behavior.name);
                        report.failures.push((id, behavior.name.clone(), err));
                    }
                }
            }
        }
        report
    }
}

fn resolve(source: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(source);
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    }
}

fn relative_to(path: &Path, base_dir: Option<&Path>) -> String {
    let relative = base_dir.and_then(|base| path.strip_prefix(base).ok()).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}
