use crate::input::InputHandle;
use glam::Vec3;
use rand::Rng;
use rhai::{EvalAltResult, ImmutableString, Module, FLOAT};

pub const ENGINE_MODULE: &str = "engine";
pub const INPUT_MODULE: &str = "input";
pub const MATH_MODULE: &str = "math";

pub fn load_engine_module(module: &mut Module) {
    module.set_native_fn("log", |message: ImmutableString| {
        log::info!(target: "script", "{message}");
        Ok(())
    });
    module.set_native_fn("warn", |message: ImmutableString| {
        log::warn!(target: "script", "{message}");
        Ok(())
    });
    module.set_native_fn("rand", |min: FLOAT, max: FLOAT| {
        if min >= max {
            return Err::<FLOAT, Box<EvalAltResult>>(format!("rand: min {min} must be below max {max}").into());
        }
        Ok(rand::thread_rng().gen_range(min..max))
    });
    module.set_native_fn("version", || Ok(env!("CARGO_PKG_VERSION").to_string()));
}

/// Polled input: `get_key` is true while held, `is_pressed` only on the
/// frame the key went down.
pub fn input_module_loader(input: InputHandle) -> impl Fn(&mut Module) + 'static {
    move |module: &mut Module| {
        let held = input.clone();
        module.set_native_fn("get_key", move |key: ImmutableString| Ok(held.borrow().is_held(&key)));
        let pressed = input.clone();
        module.set_native_fn("is_pressed", move |key: ImmutableString| {
            Ok(pressed.borrow().was_pressed(&key))
        });
        let axes = input.clone();
        module.set_native_fn("get_axis", move |axis: ImmutableString| {
            Ok(axes.borrow().axis(&axis) as FLOAT)
        });
    }
}

pub fn load_math_module(module: &mut Module) {
    module.set_native_fn("vec3", |x: FLOAT, y: FLOAT, z: FLOAT| {
        Ok(Vec3::new(x as f32, y as f32, z as f32))
    });
    module.set_native_fn("dot", |a: Vec3, b: Vec3| Ok(a.dot(b) as FLOAT));
    module.set_native_fn("cross", |a: Vec3, b: Vec3| Ok(a.cross(b)));
    module.set_native_fn("length", |v: Vec3| Ok(v.length() as FLOAT));
    module.set_native_fn("normalize", |v: Vec3| Ok(v.normalize_or_zero()));
    module.set_native_fn("lerp", |a: Vec3, b: Vec3, t: FLOAT| Ok(a.lerp(b, t as f32)));
    module.set_native_fn("lerp", |a: FLOAT, b: FLOAT, t: FLOAT| Ok(a + (b - a) * t));
}
