pub mod assets;
pub mod behavior;
pub mod cli;
pub mod config;
pub mod ecs;
pub mod events;
pub mod harness;
pub mod input;
pub mod runtime;
pub mod scene;
pub mod scripting;
pub mod tasks;
pub mod time;
pub mod watch;

pub use behavior::{Behavior, BehaviorRegistry, BehaviorState, FaultPolicy, ScriptedBehavior};
pub use runtime::Runtime;
pub use scene::Scene;
pub use scripting::{ScriptBindings, ScriptBindingsBuilder};
