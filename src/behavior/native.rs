use super::{Behavior, BehaviorState};
use crate::ecs::{EntityHandle, Transform};
use glam::Vec3;
use std::any::Any;

/// Rotates the entity's `Transform` around `axis` at `speed` radians per second.
pub struct Spinner {
    state: BehaviorState,
    axis: Vec3,
    speed: f64,
}

impl Spinner {
    pub const NAME: &'static str = "Spinner";

    pub fn new(entity: EntityHandle, axis: Vec3, speed: f64) -> Self {
        Self { state: BehaviorState::native(Self::NAME, entity), axis: axis.normalize_or_zero(), speed }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }
}

impl Behavior for Spinner {
    fn state(&self) -> &BehaviorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BehaviorState {
        &mut self.state
    }

    fn on_update(&mut self, dt: f32) -> anyhow::Result<()> {
        if !self.has_component::<Transform>() {
            anyhow::bail!("entity {:?} has no Transform to spin", self.entity().id());
        }
        let delta = self.axis * (self.speed as f32 * dt);
        self.entity().with_component_mut(|t: &mut Transform| t.rotation += delta);
        Ok(())
    }

    fn exposed_params(&self) -> Vec<(String, f64)> {
        vec![("speed".to_string(), self.speed)]
    }

    fn set_exposed_param(&mut self, name: &str, value: f64) -> bool {
        match name {
            "speed" => {
                self.speed = value;
                true
            }
            _ => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
