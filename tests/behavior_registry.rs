use glam::Vec3;
use kestrel_behaviors::behavior::{
    Behavior, BehaviorRegistry, BehaviorState, FaultPolicy, Spinner, NATIVE_SOURCE_LABEL,
};
use kestrel_behaviors::ecs::{EntityHandle, Model, Transform};
use kestrel_behaviors::events::EngineEvent;
use kestrel_behaviors::scene::Scene;
use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

#[derive(Default, Clone)]
struct Tracker {
    updates: Rc<Cell<usize>>,
    events: Rc<Cell<usize>>,
    retired: Rc<Cell<bool>>,
}

struct TrackerBehavior {
    state: BehaviorState,
    tracker: Tracker,
    fail: bool,
    remove_after_update: bool,
}

impl TrackerBehavior {
    fn new(name: &str, entity: &EntityHandle, tracker: &Tracker) -> Self {
        Self {
            state: BehaviorState::native(name, entity.clone()),
            tracker: tracker.clone(),
            fail: false,
            remove_after_update: false,
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn one_shot(mut self) -> Self {
        self.remove_after_update = true;
        self
    }
}

impl Behavior for TrackerBehavior {
    fn state(&self) -> &BehaviorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BehaviorState {
        &mut self.state
    }

    fn on_update(&mut self, _dt: f32) -> anyhow::Result<()> {
        self.tracker.updates.set(self.tracker.updates.get() + 1);
        if self.remove_after_update {
            self.mark_unset();
        }
        if self.fail {
            anyhow::bail!("tracker asked to fail");
        }
        Ok(())
    }

    fn on_event(&mut self, _event: &EngineEvent) -> anyhow::Result<()> {
        self.tracker.events.set(self.tracker.events.get() + 1);
        Ok(())
    }

    fn retire(&mut self) {
        self.tracker.retired.set(true);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn spawn(scene: &mut Scene) -> EntityHandle {
    scene.spawn("tracker", Transform::default())
}

#[test]
fn distinct_names_coexist_and_reused_name_replaces() {
    let mut scene = Scene::new();
    let entity = spawn(&mut scene);
    let (first, second, replacement) = (Tracker::default(), Tracker::default(), Tracker::default());
    let mut registry = BehaviorRegistry::new();

    registry.add_behavior(TrackerBehavior::new("Alpha", &entity, &first));
    registry.add_behavior(TrackerBehavior::new("Beta", &entity, &second));
    assert_eq!(registry.names(), vec!["Alpha".to_string(), "Beta".to_string()]);

    let newest = registry.add_behavior(TrackerBehavior::new("Alpha", &entity, &replacement));
    assert_eq!(registry.len(), 2, "reusing a name must not add a second unit");
    assert!(first.retired.get(), "replaced unit should be retired");
    assert!(!second.retired.get());

    registry.update(0.016, FaultPolicy::default());
    assert_eq!(first.updates.get(), 0, "replaced unit never runs again");
    assert_eq!(replacement.updates.get(), 1);
    assert_eq!(newest.borrow().tracker.updates.get(), 1);
    assert_eq!(newest.borrow().source_file(), NATIVE_SOURCE_LABEL);
    assert!(newest.borrow().is_native());
}

#[test]
fn disabled_units_receive_no_calls() {
    let mut scene = Scene::new();
    let entity = spawn(&mut scene);
    let tracker = Tracker::default();
    let mut registry = BehaviorRegistry::new();
    registry.add_behavior(TrackerBehavior::new("Quiet", &entity, &tracker));
    registry.set_enabled("Quiet", false).expect("unit exists");

    let update = registry.update(0.016, FaultPolicy::default());
    let event = registry.dispatch_event(&EngineEvent::key_pressed("W"), FaultPolicy::default());
    assert_eq!(update.invoked + event.invoked, 0);
    assert_eq!(tracker.updates.get(), 0);
    assert_eq!(tracker.events.get(), 0);

    registry.set_enabled("Quiet", true).expect("unit exists");
    registry.update(0.016, FaultPolicy::default());
    assert_eq!(tracker.updates.get(), 1);
}

#[test]
fn removal_requested_during_a_pass_applies_after_it() {
    let mut scene = Scene::new();
    let entity = spawn(&mut scene);
    let (once, steady) = (Tracker::default(), Tracker::default());
    let mut registry = BehaviorRegistry::new();
    registry.add_behavior(TrackerBehavior::new("Once", &entity, &once).one_shot());
    registry.add_behavior(TrackerBehavior::new("Steady", &entity, &steady));

    let report = registry.update(0.016, FaultPolicy::default());
    assert_eq!(report.invoked, 2, "a unit marking itself still finishes the pass");
    assert_eq!(report.removed, 1);
    assert!(!registry.contains("Once"));
    assert!(once.retired.get());

    registry.update(0.016, FaultPolicy::default());
    assert_eq!(once.updates.get(), 1);
    assert_eq!(steady.updates.get(), 2);
}

#[test]
fn marked_unit_is_skipped_and_swept() {
    let mut scene = Scene::new();
    let entity = spawn(&mut scene);
    let tracker = Tracker::default();
    let mut registry = BehaviorRegistry::new();
    registry.add_behavior(TrackerBehavior::new("Doomed", &entity, &tracker));

    assert!(registry.request_removal("Doomed"));
    assert!(registry.contains("Doomed"), "marking alone does not erase");
    let report = registry.update(0.016, FaultPolicy::default());
    assert_eq!(report.invoked, 0);
    assert_eq!(report.removed, 1);
    assert!(registry.is_empty());
    assert!(!registry.request_removal("Doomed"));
}

#[test]
fn remove_is_idempotent() {
    let mut scene = Scene::new();
    let entity = spawn(&mut scene);
    let tracker = Tracker::default();
    let mut registry = BehaviorRegistry::new();
    registry.add_behavior(TrackerBehavior::new("Gone", &entity, &tracker));

    assert!(registry.remove("Gone"));
    assert!(!registry.remove("Gone"));
    assert!(!registry.remove("NeverThere"));
    assert!(tracker.retired.get());
}

#[test]
fn faults_are_contained_and_siblings_still_run() {
    let mut scene = Scene::new();
    let entity = spawn(&mut scene);
    let (broken, healthy) = (Tracker::default(), Tracker::default());
    let mut registry = BehaviorRegistry::new();
    registry.add_behavior(TrackerBehavior::new("Broken", &entity, &broken).failing());
    registry.add_behavior(TrackerBehavior::new("Healthy", &entity, &healthy));

    let report = registry.update(0.016, FaultPolicy::KeepEnabled);
    assert_eq!(report.faults, 1);
    assert_eq!(healthy.updates.get(), 1);
    let unit = registry.get("Broken").expect("still registered");
    assert!(unit.borrow().is_enabled(), "default policy keeps the unit enabled");

    registry.update(0.016, FaultPolicy::KeepEnabled);
    assert_eq!(broken.updates.get(), 2);
}

#[test]
fn disable_policy_switches_faulty_units_off() {
    let mut scene = Scene::new();
    let entity = spawn(&mut scene);
    let broken = Tracker::default();
    let mut registry = BehaviorRegistry::new();
    registry.add_behavior(TrackerBehavior::new("Broken", &entity, &broken).failing());

    registry.update(0.016, FaultPolicy::Disable);
    registry.update(0.016, FaultPolicy::Disable);
    assert_eq!(broken.updates.get(), 1);
    let summary = &registry.summaries()[0];
    assert!(!summary.enabled);
}

#[test]
fn units_forward_component_access_to_their_entity() {
    let mut scene = Scene::new();
    let entity = spawn(&mut scene);
    let unit = TrackerBehavior::new("Forwarder", &entity, &Tracker::default());

    assert!(unit.has_component::<Transform>());
    assert!(!unit.has_component::<Model>());
    unit.add_component(Model::pending("crate.gltf"));
    assert_eq!(unit.get_component::<Model>().path, "crate.gltf");
    assert_eq!(entity.get_component::<Model>().path, "crate.gltf");
    assert!(unit.remove_component::<Model>());
    assert!(!entity.has_component::<Model>());
}

#[test]
#[should_panic(expected = "has no")]
fn missing_component_access_panics() {
    let mut scene = Scene::new();
    let entity = spawn(&mut scene);
    let unit = TrackerBehavior::new("Reader", &entity, &Tracker::default());
    let _ = unit.get_component::<Model>();
}

#[test]
fn native_spinner_rotates_and_exposes_speed() {
    let mut scene = Scene::new();
    let entity = spawn(&mut scene);
    let registry = scene.attach_behaviors(entity.id()).expect("entity alive");
    let spinner = registry.add_behavior(Spinner::new(entity.clone(), Vec3::Y, 2.0));

    scene.update(0.5, FaultPolicy::default());
    assert!((entity.get_component::<Transform>().rotation.y - 1.0).abs() < 1e-6);

    assert!(spinner.borrow_mut().set_exposed_param("speed", 4.0));
    assert!(!spinner.borrow_mut().set_exposed_param("unknown", 1.0));
    assert_eq!(spinner.borrow().exposed_params(), vec![("speed".to_string(), 4.0)]);
}

#[test]
fn despawning_an_entity_drops_its_registry() {
    let mut scene = Scene::new();
    let entity = spawn(&mut scene);
    let tracker = Tracker::default();
    scene
        .attach_behaviors(entity.id())
        .expect("entity alive")
        .add_behavior(TrackerBehavior::new("Tied", &entity, &tracker));

    assert!(entity.despawn());
    assert_eq!(scene.sweep_despawned(), vec![entity.id()]);
    assert!(scene.behaviors(entity.id()).is_none());
    assert!(tracker.retired.get());
    assert!(scene.attach_behaviors(entity.id()).is_err());
}
