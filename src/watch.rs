use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

const SCRIPT_EXTENSIONS: &[&str] = &["rhai"];

/// Watches script roots and reports changed script files.
pub struct ScriptWatcher {
    watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    roots: Vec<PathBuf>,
}

impl ScriptWatcher {
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher
            .configure(
                NotifyConfig::default()
                    .with_compare_contents(false)
                    .with_poll_interval(Duration::from_millis(300)),
            )
            .context("configure script watcher")?;
        Ok(Self { watcher, rx, roots: Vec::new() })
    }

    pub fn watch_root(&mut self, root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        if !root.exists() {
            anyhow::bail!("path '{}' does not exist", root.display());
        }
        let normalized = normalize_watch_path(root);
        if self.roots.iter().any(|existing| *existing == normalized) {
            return Ok(());
        }
        let mode = if normalized.is_dir() { RecursiveMode::Recursive } else { RecursiveMode::NonRecursive };
        self.watcher.watch(&normalized, mode).with_context(|| format!("watch {}", normalized.display()))?;
        log::info!(target: "watch", "watching scripts under {}", normalized.display());
        self.roots.push(normalized);
        Ok(())
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Changed script files since the last call, deduplicated.
    pub fn drain_changes(&mut self) -> Vec<PathBuf> {
        let mut changed = BTreeSet::new();
        while let Ok(event) = self.rx.try_recv() {
            match event {
                Ok(event) => {
                    if !is_relevant(&event.kind) {
                        continue;
                    }
                    for path in event.paths {
                        if is_script(&path) && self.is_watched(&path) {
                            changed.insert(normalize_watch_path(&path));
                        }
                    }
                }
                Err(err) => log::warn!(target: "watch", "script watcher error: {err}"),
            }
        }
        changed.into_iter().collect()
    }

    fn is_watched(&self, path: &Path) -> bool {
        let normalized = normalize_watch_path(path);
        self.roots.iter().any(|root| normalized.starts_with(root))
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Create(_)
    )
}

fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| SCRIPT_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

pub fn normalize_watch_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else if let Ok(cwd) = env::current_dir() {
        cwd.join(path)
    } else {
        path.to_path_buf()
    };
    match fs::canonicalize(&absolute) {
        Ok(canonical) => canonical,
        Err(_) => match (absolute.parent().map(fs::canonicalize), absolute.file_name()) {
            (Some(Ok(parent)), Some(name)) => parent.join(name),
            (Some(Ok(parent)), None) => parent,
            _ => absolute,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_script_files_are_reported() {
        assert!(is_script(Path::new("assets/scripts/move.rhai")));
        assert!(is_script(Path::new("MOVE.RHAI")));
        assert!(!is_script(Path::new("assets/scripts/notes.txt")));
        assert!(!is_script(Path::new("assets/scripts")));
    }

    #[test]
    fn missing_root_is_rejected() {
        let mut watcher = ScriptWatcher::new().expect("watcher");
        let err = watcher.watch_root("definitely/not/here").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
