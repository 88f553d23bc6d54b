#![cfg(feature = "watch")]
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::ParamLayers;
use crate::control::{ControlHandle, ControlMessage};

/// Keeps the file watcher alive; dropping it stops hot reload.
pub struct ParamsWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl ParamsWatcher {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Watch `params_path` and, whenever it changes, post the parameters
/// resolved through `layers` to the render loop, so `--set` overrides keep
/// winning over the file. Parse errors are logged and the previous
/// parameters stay live.
pub fn watch_params_file(
    params_path: &Path,
    layers: ParamLayers,
    handle: ControlHandle,
) -> Result<ParamsWatcher> {
    let path = canonical_path(params_path);
    let watched = path.clone();
    let mut watcher =
        notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                if should_reload(&event) && event_targets_file(&event, &watched) {
                    reload(&watched, &layers, &handle);
                }
            }
            Err(error) => {
                tracing::warn!(action = "watch_params", %error, "file watcher error");
            }
        })
        .context("failed to create params file watcher")?;

    let watch_root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    watcher
        .watch(&watch_root, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", watch_root.display()))?;
    tracing::info!(action = "watch_params", path = %path.display());

    Ok(ParamsWatcher {
        _watcher: watcher,
        path,
    })
}

fn reload(path: &Path, layers: &ParamLayers, handle: &ControlHandle) {
    // Writers truncate before writing; an empty file is a write in progress.
    if std::fs::metadata(path).is_ok_and(|meta| meta.len() == 0) {
        tracing::debug!(action = "reload_params", path = %path.display(), "skipping empty file");
        return;
    }
    match layers.resolve(Some(path)) {
        Ok(params) => {
            tracing::info!(action = "reload_params", path = %path.display());
            handle.send(ControlMessage::Apply(params));
        }
        Err(error) => {
            tracing::error!(action = "reload_params", path = %path.display(), error = %format!("{error:#}"));
        }
    }
}

fn should_reload(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
    )
}

fn event_targets_file(event: &Event, path: &Path) -> bool {
    if event.paths.is_empty() {
        return true;
    }

    event.paths.iter().any(|candidate| {
        candidate == path
            || std::fs::canonicalize(candidate)
                .map(|resolved| resolved == path)
                .unwrap_or(false)
    })
}

fn canonical_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use notify::{Event, EventKind};

    use super::{event_targets_file, should_reload};

    #[test]
    fn modify_and_create_trigger_reload_but_remove_does_not() {
        assert!(should_reload(&Event::new(EventKind::Modify(ModifyKind::Any))));
        assert!(should_reload(&Event::new(EventKind::Create(CreateKind::File))));
        assert!(!should_reload(&Event::new(EventKind::Remove(RemoveKind::File))));
    }

    #[test]
    fn events_for_sibling_files_are_ignored() {
        let target = PathBuf::from("/tmp/amcp-watch/params.yaml");
        let sibling = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/amcp-watch/other.yaml"));
        let direct = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(target.clone());
        assert!(!event_targets_file(&sibling, &target));
        assert!(event_targets_file(&direct, &target));
        assert!(event_targets_file(&Event::new(EventKind::Any), &target));
    }
}
