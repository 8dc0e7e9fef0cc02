use crate::config::RuntimeConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/runtime.json";
pub const DEFAULT_FRAMES: u64 = 60;
pub const DEFAULT_DT: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliOptions {
    pub config: Option<PathBuf>,
    pub scene: Option<PathBuf>,
    pub frames: Option<u64>,
    pub dt: Option<f32>,
    pub hot_reload: Option<bool>,
    pub disable_on_fault: Option<bool>,
    pub summary: Option<PathBuf>,
}

impl CliOptions {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = CliOptions::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if !flag.starts_with("--") {
                bail!("Unexpected argument '{flag}'. Flags take the form --name value.");
            }
            let key = &flag[2..];
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "config" => options.config = Some(PathBuf::from(value)),
                "scene" => options.scene = Some(PathBuf::from(value)),
                "summary" => options.summary = Some(PathBuf::from(value)),
                "frames" => {
                    options.frames =
                        Some(value.parse::<u64>().with_context(|| format!("Invalid frame count '{value}'"))?);
                }
                "dt" => {
                    let dt = value.parse::<f32>().with_context(|| format!("Invalid dt '{value}'"))?;
                    if !(dt.is_finite() && dt > 0.0) {
                        bail!("Invalid dt '{value}'. Use a positive number of seconds.");
                    }
                    options.dt = Some(dt);
                }
                "hot-reload" => options.hot_reload = Some(parse_bool_flag("hot-reload", &value)?),
                "disable-on-fault" => {
                    options.disable_on_fault = Some(parse_bool_flag("disable-on-fault", &value)?)
                }
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --config, --scene, --frames, --dt, --hot-reload, \
                     --disable-on-fault, --summary."
                ),
            }
        }
        Ok(options)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn frames(&self) -> u64 {
        self.frames.unwrap_or(DEFAULT_FRAMES)
    }

    pub fn dt(&self) -> f32 {
        self.dt.unwrap_or(DEFAULT_DT)
    }

    pub fn config_overrides(&self) -> RuntimeConfigOverrides {
        RuntimeConfigOverrides { hot_reload: self.hot_reload, disable_on_fault: self.disable_on_fault }
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}
