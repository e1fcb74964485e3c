//! Watches the scheduler settings file and swaps in a new snapshot when it changes.

use arc_swap::ArcSwap;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::settings::SchedulerSettings;
use crate::error::{RelayError, RelayResult};

/// Debounce interval: wait this long after the last filesystem event before reloading.
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Keeps the filesystem watcher alive; dropping it stops reloading.
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Re-reads the file and stores the result. A broken file leaves the old snapshot in place.
pub fn reload(path: &Path, base: &SchedulerSettings, target: &ArcSwap<SchedulerSettings>) -> bool {
    match SchedulerSettings::load(base, path) {
        Ok(settings) => {
            if **target.load() != settings {
                info!(
                    "Scheduler settings reloaded: interval {:?}, chance {}, sleep window {:?}",
                    settings.interval, settings.chance, settings.sleep_window
                );
            }
            target.store(Arc::new(settings));
            true
        }
        Err(e) => {
            warn!("Keeping previous scheduler settings: {}", e);
            false
        }
    }
}

/// Watches the directory holding `path`, so editors that replace the file are noticed too.
pub fn watch_settings(
    path: PathBuf,
    base: SchedulerSettings,
    target: Arc<ArcSwap<SchedulerSettings>>,
) -> RelayResult<SettingsWatcher> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path.file_name().map(|name| name.to_os_string());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        // Receiver gone means the watcher is shutting down.
        let _ = tx.send(res);
    })
    .map_err(|e| RelayError::Config(format!("failed to create settings watcher: {}", e)))?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| RelayError::Config(format!("failed to watch {}: {}", dir.display(), e)))?;
    info!("Settings watch: watching {:?}", path);

    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let relevant = match &event {
                Ok(event) => event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name),
                Err(e) => {
                    debug!("Settings watch: event error: {:?}", e);
                    false
                }
            };
            if !relevant {
                continue;
            }

            // Collapse the burst of events a single save produces.
            loop {
                match tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                    Ok(Some(_)) => continue,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }

            reload(&path, &base, &target);
        }
    });

    Ok(SettingsWatcher {
        _watcher: watcher,
        task,
    })
}
