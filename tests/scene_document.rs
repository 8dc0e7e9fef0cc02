use glam::Vec3;
use kestrel_behaviors::behavior::{Behavior, BehaviorError};
use kestrel_behaviors::config::RuntimeConfig;
use kestrel_behaviors::ecs::{Model, Transform};
use kestrel_behaviors::input::InputState;
use kestrel_behaviors::runtime::Runtime;
use kestrel_behaviors::scene::{BehaviorData, EntityDocument, ModelData, Scene, SceneDocument, TransformData, Vec3Data};
use kestrel_behaviors::scripting::ScriptBindings;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_script(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("script dir");
    }
    fs::write(path, contents).expect("write script");
}

fn sample_document() -> SceneDocument {
    SceneDocument {
        entities: vec![
            EntityDocument {
                name: "crate".into(),
                transform: TransformData {
                    translation: Vec3Data { x: 1.0, y: 2.0, z: 3.0 },
                    ..TransformData::default()
                },
                model: Some(ModelData { path: "models/crate.gltf".into(), receive_shadows: false }),
                behaviors: vec![BehaviorData {
                    name: "Spin".into(),
                    source: "scripts/spin.rhai".into(),
                    enabled: false,
                }],
            },
            EntityDocument { name: "marker".into(), ..EntityDocument::default() },
        ],
    }
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    let document: SceneDocument =
        serde_json::from_str(r#"{ "entities": [ { "name": "bare", "behaviors": [ { "name": "A", "source": "a.rhai" } ] } ] }"#)
            .expect("parse scene");
    let entity = &document.entities[0];
    assert_eq!(entity.transform, TransformData::default());
    assert_eq!(entity.transform.scale, Vec3Data { x: 1.0, y: 1.0, z: 1.0 });
    assert!(entity.model.is_none());
    assert!(entity.behaviors[0].enabled);
}

#[test]
fn instantiate_then_capture_round_trips() {
    let dir = TempDir::new().expect("temp dir");
    write_script(dir.path(), "scripts/spin.rhai", "fn on_update(behavior, dt) { }\n");
    let scene_path = dir.path().join("level.json");
    sample_document().save_to_path(&scene_path).expect("save scene");

    let loaded = SceneDocument::load_from_path(&scene_path).expect("load scene");
    assert_eq!(loaded, sample_document());

    let bindings = ScriptBindings::builder().with_engine_defaults(&InputState::shared()).expect("bindings").build();
    let mut scene = Scene::new();
    let report = loaded.instantiate(&mut scene, &bindings, Some(dir.path()));
    assert_eq!(report.entities.len(), 2);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.models, vec![(report.entities[0], "models/crate.gltf".to_string())]);

    let crate_entity = scene.find_by_name("crate").expect("crate spawned");
    assert_eq!(crate_entity.get_component::<Transform>().translation, Vec3::new(1.0, 2.0, 3.0));
    let model = crate_entity.get_component::<Model>();
    assert!(!model.loaded);
    assert!(!model.receive_shadows);
    let spin = scene.behaviors(crate_entity.id()).and_then(|registry| registry.get("Spin")).expect("Spin attached");
    assert!(!spin.borrow().is_enabled());
    assert_eq!(spin.borrow().source_file(), dir.path().join("scripts/spin.rhai").display().to_string());

    assert_eq!(SceneDocument::capture(&scene, Some(dir.path())), sample_document());
}

#[test]
fn broken_behaviors_are_reported_and_the_rest_loads() {
    let dir = TempDir::new().expect("temp dir");
    write_script(dir.path(), "good.rhai", "fn on_update(behavior, dt) { }\n");
    write_script(dir.path(), "needs_physics.rhai", "import \"physics\" as physics;\n");
    let document = SceneDocument {
        entities: vec![EntityDocument {
            name: "mixed".into(),
            behaviors: vec![
                BehaviorData { name: "Broken".into(), source: "needs_physics.rhai".into(), enabled: true },
                BehaviorData { name: "Good".into(), source: "good.rhai".into(), enabled: true },
                BehaviorData { name: "Gone".into(), source: "missing.rhai".into(), enabled: true },
            ],
            ..EntityDocument::default()
        }],
    };

    let bindings = ScriptBindings::builder().with_engine_defaults(&InputState::shared()).expect("bindings").build();
    let mut scene = Scene::new();
    let report = document.instantiate(&mut scene, &bindings, Some(dir.path()));
    assert_eq!(report.failures.len(), 2);
    assert!(matches!(&report.failures[0].2, BehaviorError::ModuleNotFound { module, .. } if module == "physics"));
    assert!(matches!(&report.failures[1].2, BehaviorError::Io { .. }));

    let registry = scene.behaviors(report.entities[0]).expect("registry exists");
    assert_eq!(registry.names(), vec!["Good".to_string()]);
}

#[test]
fn runtime_saves_and_reloads_scripted_scenes() {
    let dir = TempDir::new().expect("temp dir");
    write_script(
        dir.path(),
        "scripts/mover.rhai",
        "fn on_update(behavior, dt) { behavior.get_component(\"Transform\").translate(1.0, 0.0, 0.0); }\n",
    );
    let mut config = RuntimeConfig::default();
    config.scripts.hot_reload = false;
    let scene_path = dir.path().join("level.json");

    let mut runtime = Runtime::new(config.clone()).expect("runtime");
    let entity = runtime.scene_mut().spawn("walker", Transform::from_translation(Vec3::new(0.0, 0.0, 5.0)));
    let name = runtime.add_script(entity.id(), dir.path().join("scripts/mover.rhai")).expect("attach script");
    assert_eq!(name, "mover");
    runtime.save_scene(&scene_path).expect("save scene");

    let saved = SceneDocument::load_from_path(&scene_path).expect("read saved scene");
    assert_eq!(saved.entities[0].behaviors[0].source, "scripts/mover.rhai");

    let mut restored = Runtime::new(config).expect("runtime");
    let report = restored.load_scene(&scene_path).expect("load scene");
    assert!(report.failures.is_empty());
    let walker = restored.scene().find_by_name("walker").expect("walker restored");
    let frame = restored.frame(0.016);
    assert_eq!(frame.invoked, 1);
    assert_eq!(walker.get_component::<Transform>().translation, Vec3::new(1.0, 0.0, 5.0));
}

#[test]
fn bundled_demo_scene_runs_without_faults() {
    let scene_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/scenes/demo.json");
    let mut config = RuntimeConfig::default();
    config.scripts.hot_reload = false;
    let mut runtime = Runtime::new(config).expect("runtime");
    let report = runtime.load_scene(&scene_path).expect("load demo scene");
    assert_eq!(report.entities.len(), 2);
    assert!(report.failures.is_empty(), "{:?}", report.failures);

    for _ in 0..10 {
        let frame = runtime.frame(1.0 / 60.0);
        assert_eq!(frame.faults, 0, "{:?}", runtime.scene().summaries());
    }
    let bobber = runtime.scene().find_by_name("bobber").expect("bobber spawned");
    assert!(bobber.get_component::<Transform>().translation.y > 0.0);
}
