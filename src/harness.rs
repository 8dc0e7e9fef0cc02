use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::runtime::{FrameReport, Runtime};
use crate::scene::EntitySummary;
use crate::time::FrameClock;

/// Totals over a headless run plus the final state of every behavior.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub elapsed_seconds: f32,
    pub tasks_run: usize,
    pub reloads: usize,
    pub reload_failures: usize,
    pub events: usize,
    pub invocations: usize,
    pub faults: usize,
    pub removed: usize,
    pub entities: Vec<EntitySummary>,
}

impl RunSummary {
    fn record(&mut self, frame: &FrameReport) {
        self.frames = frame.frame;
        self.tasks_run += frame.tasks_run;
        self.reloads += frame.reloads;
        self.reload_failures += frame.reload_failures;
        self.events += frame.events;
        self.invocations += frame.invoked;
        self.faults += frame.faults;
        self.removed += frame.removed;
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating summary directory '{}'", parent.display()))?;
            }
        }
        let file = File::create(path).with_context(|| format!("writing run summary to '{}'", path.display()))?;
        serde_json::to_writer_pretty(file, self).with_context(|| "serializing run summary")?;
        Ok(())
    }
}

pub fn run_frames(runtime: &mut Runtime, frames: u64, clock: &mut FrameClock) -> RunSummary {
    let mut summary = RunSummary {
        frames: 0,
        elapsed_seconds: 0.0,
        tasks_run: 0,
        reloads: 0,
        reload_failures: 0,
        events: 0,
        invocations: 0,
        faults: 0,
        removed: 0,
        entities: Vec::new(),
    };
    let mut simulated = 0.0;
    for _ in 0..frames {
        let dt = clock.tick();
        simulated += dt;
        let report = runtime.frame(dt);
        if report.faults > 0 {
            log::debug!(target: "harness", "frame {}: {} fault(s)", report.frame, report.faults);
        }
        summary.record(&report);
    }
    summary.elapsed_seconds = simulated;
    summary.entities = runtime.scene().summaries();
    summary
}
