use anyhow::{Context, Result};
use kestrel_behaviors::cli::CliOptions;
use kestrel_behaviors::config::RuntimeConfig;
use kestrel_behaviors::harness::run_frames;
use kestrel_behaviors::runtime::Runtime;
use kestrel_behaviors::time::FrameClock;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let options = match CliOptions::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            log::error!("[cli] {err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(&options) {
        log::error!("Runtime error: {err:?}");
        std::process::exit(1);
    }
}

fn run(options: &CliOptions) -> Result<()> {
    let mut config = match &options.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::load_or_default(options.config_path()),
    };
    let overrides = options.config_overrides();
    if !overrides.is_empty() {
        log::info!("[cli] overriding {}", overrides.applied_fields().join(", "));
        config.apply_overrides(&overrides);
    }

    let mut runtime = Runtime::new(config).context("starting runtime")?;
    if let Some(scene) = &options.scene {
        runtime.load_scene(scene)?;
    }

    let mut clock = FrameClock::fixed(options.dt());
    let summary = run_frames(&mut runtime, options.frames(), &mut clock);
    log::info!(
        "ran {} frame(s): {} invocation(s), {} fault(s), {} reload(s)",
        summary.frames,
        summary.invocations,
        summary.faults,
        summary.reloads
    );
    match &options.summary {
        Some(path) => {
            summary.write_to(path)?;
            log::info!("wrote run summary to {}", path.display());
        }
        None => {
            serde_json::to_writer_pretty(std::io::stdout(), &summary)?;
            println!();
        }
    }
    Ok(())
}
