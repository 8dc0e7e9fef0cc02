use glam::Vec3;
use kestrel_behaviors::assets::{ImportFn, ImportedModel, ModelImportWorker};
use kestrel_behaviors::config::RuntimeConfig;
use kestrel_behaviors::ecs::{Model, Transform};
use kestrel_behaviors::events::EngineEvent;
use kestrel_behaviors::runtime::{FrameReport, Runtime};
use kestrel_behaviors::scene::Scene;
use kestrel_behaviors::tasks::MainThreadQueue;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const DEADLINE: Duration = Duration::from_secs(10);

fn crate_stats() -> ImportedModel {
    ImportedModel { mesh_count: 2, vertex_count: 24, bounds_min: Vec3::splat(-1.0), bounds_max: Vec3::splat(1.0) }
}

/// Importer that blocks until the test releases it.
fn gated_importer() -> (ImportFn, mpsc::Sender<()>) {
    let (release, gate) = mpsc::channel::<()>();
    let gate = Mutex::new(gate);
    let import: ImportFn = Arc::new(move |_path: &Path| -> anyhow::Result<ImportedModel> {
        let _ = gate.lock().expect("gate lock").recv();
        Ok(crate_stats())
    });
    (import, release)
}

fn drain_until(queue: &MainThreadQueue, scene: &mut Scene, expected: usize) -> usize {
    let started = Instant::now();
    let mut ran = 0;
    while ran < expected {
        assert!(started.elapsed() < DEADLINE, "timed out waiting for main-thread tasks");
        ran += queue.drain_once(scene);
        thread::sleep(Duration::from_millis(2));
    }
    ran
}

fn frame_until_tasks(runtime: &mut Runtime) -> FrameReport {
    let started = Instant::now();
    loop {
        assert!(started.elapsed() < DEADLINE, "timed out waiting for import results");
        let report = runtime.frame(0.016);
        if report.tasks_run > 0 {
            return report;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

fn headless_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.scripts.hot_reload = false;
    config.assets.import_workers = 1;
    config
}

#[test]
fn tasks_from_many_producers_run_once_in_producer_order() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 50;
    let queue = MainThreadQueue::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let sender = queue.sender();
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    let seen = Arc::clone(&seen);
                    sender.submit(move |_scene| seen.lock().expect("seen lock").push((producer, seq)));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("producer thread");
    }

    let mut scene = Scene::new();
    assert_eq!(queue.pending(), PRODUCERS * PER_PRODUCER);
    assert_eq!(queue.drain_once(&mut scene), PRODUCERS * PER_PRODUCER);
    assert_eq!(queue.drain_once(&mut scene), 0, "nothing runs twice");

    let seen = seen.lock().expect("seen lock");
    assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
    for producer in 0..PRODUCERS {
        let order: Vec<usize> = seen.iter().filter(|(p, _)| *p == producer).map(|(_, seq)| *seq).collect();
        assert_eq!(order, (0..PER_PRODUCER).collect::<Vec<_>>());
    }
}

#[test]
fn tasks_submitted_while_draining_wait_for_the_next_drain() {
    let queue = MainThreadQueue::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let sender = queue.sender();
    let inner_runs = Arc::clone(&runs);
    queue.submit(move |scene| {
        scene.spawn("first", Transform::default());
        sender.submit(move |scene| {
            inner_runs.fetch_add(1, Ordering::SeqCst);
            scene.spawn("second", Transform::default());
        });
    });

    let mut scene = Scene::new();
    assert_eq!(queue.drain_once(&mut scene), 1);
    assert!(scene.find_by_name("first").is_some());
    assert!(scene.find_by_name("second").is_none());
    assert_eq!(queue.pending(), 1);

    assert_eq!(queue.drain_once(&mut scene), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(scene.find_by_name("second").is_some());
}

#[test]
fn resubmitted_tasks_never_run_in_their_own_drain_under_contention() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 200;
    let queue = MainThreadQueue::new();
    let drain = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));
    let followups = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let sender = queue.sender();
            let drain = Arc::clone(&drain);
            let violations = Arc::clone(&violations);
            let followups = Arc::clone(&followups);
            thread::spawn(move || {
                for _ in 0..PER_PRODUCER {
                    let resubmit = sender.clone();
                    let drain = Arc::clone(&drain);
                    let violations = Arc::clone(&violations);
                    let followups = Arc::clone(&followups);
                    sender.submit(move |_scene| {
                        let submitted_in = drain.load(Ordering::SeqCst);
                        resubmit.submit(move |_scene| {
                            if drain.load(Ordering::SeqCst) == submitted_in {
                                violations.fetch_add(1, Ordering::SeqCst);
                            }
                            followups.fetch_add(1, Ordering::SeqCst);
                        });
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();

    let mut scene = Scene::new();
    let started = Instant::now();
    let total = PRODUCERS * PER_PRODUCER;
    while followups.load(Ordering::SeqCst) < total {
        assert!(started.elapsed() < DEADLINE, "timed out draining under contention");
        drain.fetch_add(1, Ordering::SeqCst);
        queue.drain_once(&mut scene);
    }
    for handle in handles {
        handle.join().expect("producer thread");
    }
    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert_eq!(queue.drain_once(&mut scene), 0);
    assert_eq!(queue.pending(), 0);
}

#[test]
fn finished_import_updates_the_model_and_emits_an_event() {
    let queue = MainThreadQueue::new();
    let import: ImportFn = Arc::new(|_path: &Path| -> anyhow::Result<ImportedModel> { Ok(crate_stats()) });
    let worker = ModelImportWorker::new(2, 4, import, queue.sender()).expect("start workers");
    assert_eq!(worker.worker_count(), 2);

    let mut scene = Scene::new();
    let entity = scene.spawn("crate", Transform::default());
    entity.add_component(Model::pending("crate.gltf"));
    worker.submit(entity.id(), "crate.gltf").expect("queue import");

    drain_until(&queue, &mut scene, 1);
    let model = entity.get_component::<Model>();
    assert!(model.loaded);
    assert_eq!(model.mesh_count, 2);
    assert_eq!(model.vertex_count, 24);
    assert_eq!(model.bounds_max, Vec3::ONE);
    assert_eq!(
        scene.take_emitted(),
        vec![EngineEvent::ModelLoaded { entity: entity.id(), path: "crate.gltf".into() }]
    );
}

#[test]
fn import_for_a_swapped_model_is_dropped() {
    let queue = MainThreadQueue::new();
    let (import, release) = gated_importer();
    let worker = ModelImportWorker::new(1, 4, import, queue.sender()).expect("start worker");

    let mut scene = Scene::new();
    let entity = scene.spawn("crate", Transform::default());
    entity.add_component(Model::pending("old.gltf"));
    worker.submit(entity.id(), "old.gltf").expect("queue import");
    entity.add_component(Model::pending("new.gltf"));
    release.send(()).expect("release importer");

    drain_until(&queue, &mut scene, 1);
    let model = entity.get_component::<Model>();
    assert_eq!(model.path, "new.gltf");
    assert!(!model.loaded);
    assert!(scene.take_emitted().is_empty());
}

#[test]
fn import_finishing_after_despawn_is_ignored() {
    let (import, release) = gated_importer();
    let mut runtime = Runtime::new(headless_config()).expect("runtime");
    runtime.start_importer(import).expect("start importer");
    let entity = runtime.scene_mut().spawn("doomed", Transform::default()).id();
    runtime.import_model(entity, "doomed.gltf").expect("queue import");

    assert!(runtime.scene_mut().despawn(entity));
    let despawn_frame = runtime.frame(0.016);
    assert_eq!(despawn_frame.events, 1, "the despawn notification is dispatched");
    release.send(()).expect("release importer");

    let report = frame_until_tasks(&mut runtime);
    assert_eq!(report.tasks_run, 1);
    assert_eq!(report.events, 0, "no ModelLoaded for a dead entity");
    assert!(!runtime.scene().is_alive(entity));
}

#[test]
fn runtime_applies_imports_on_the_frame_they_arrive() {
    let (import, release) = gated_importer();
    let mut runtime = Runtime::new(headless_config()).expect("runtime");
    runtime.start_importer(import).expect("start importer");
    let entity = runtime.scene_mut().spawn("crate", Transform::default());
    runtime.import_model(entity.id(), "crate.gltf").expect("queue import");

    assert!(!entity.get_component::<Model>().loaded);
    release.send(()).expect("release importer");
    let report = frame_until_tasks(&mut runtime);
    assert_eq!(report.events, 1);
    let model = entity.get_component::<Model>();
    assert!(model.loaded);
    assert_eq!(model.vertex_count, 24);
}
