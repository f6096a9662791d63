//! Settings file watching for live tuning reloads.
//!
//! Editors often write a file in several steps (truncate, write, rename), so
//! events are collected until the file has been quiet for the debounce window
//! and only then is the file re-read.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::EngineSettings;

/// Quiet period before a changed settings file is reloaded.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Errors that can occur during file watching.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    Notify(#[from] notify::Error),

    #[error("Settings directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

/// Returns true if the event touches `file_name` in a way worth reloading.
fn is_settings_event(event: &Event, file_name: &std::ffi::OsStr) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name))
}

/// Re-reads the settings file. A missing file or invalid settings are logged
/// and ignored so the running values stay in effect.
pub fn reload_settings(path: &Path) -> Option<EngineSettings> {
    if !path.is_file() {
        log::warn!(
            "Settings file {} is gone, keeping current tuning",
            path.display()
        );
        return None;
    }

    match EngineSettings::load(path) {
        Ok(settings) => Some(settings),
        Err(e) => {
            log::warn!(
                "Ignoring invalid settings in {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

/// Watches the settings file and calls `on_reload` with each valid version.
///
/// The file does not need to exist yet; its directory does. Runs until the
/// watcher fails.
pub async fn watch_settings<F, Fut>(
    path: impl AsRef<Path>,
    debounce: Duration,
    on_reload: F,
) -> Result<(), WatcherError>
where
    F: Fn(EngineSettings) -> Fut,
    Fut: Future<Output = ()>,
{
    let path = path.as_ref().to_path_buf();
    let watch_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !watch_dir.is_dir() {
        return Err(WatcherError::DirectoryNotFound(watch_dir));
    }
    let file_name = path
        .file_name()
        .map(|s| s.to_owned())
        .ok_or_else(|| WatcherError::DirectoryNotFound(path.clone()))?;

    let (tx, mut rx) = mpsc::channel::<Event>(100);
    let mut watcher = RecommendedWatcher::new(
        move |result: Result<Event, notify::Error>| {
            if let Ok(event) = result {
                // Full channel means a reload is already coming.
                let _ = tx.try_send(event);
            }
        },
        notify::Config::default(),
    )?;
    // Watch the directory so replacements by rename are seen.
    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
    log::info!("Watching settings file: {}", path.display());

    loop {
        let event = rx.recv().await.ok_or(WatcherError::ChannelClosed)?;
        if !is_settings_event(&event, &file_name) {
            continue;
        }
        log::debug!("Settings event: {:?}", event.kind);

        // Wait for the file to go quiet.
        loop {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return Err(WatcherError::ChannelClosed),
                Err(_) => break,
            }
        }

        if let Some(settings) = reload_settings(&path) {
            log::info!("Settings changed, applying new tuning");
            on_reload(settings).await;
        }
    }
}
