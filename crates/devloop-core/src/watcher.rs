//! Filesystem watching.
//!
//! Thin wrapper over `notify`: one recursive watcher feeding raw events
//! into a std mpsc channel the engine blocks on. Delivery is at-least-once
//! and event kinds are not trusted; the engine re-stats every path.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::Result;

/// A live watch; events stop when this is dropped.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    pub events: Receiver<notify::Result<Event>>,
}

/// Watch every root recursively.
pub fn watch(roots: &[PathBuf]) -> Result<WatchHandle> {
    let (tx, rx) = mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        Config::default(),
    )?;
    for root in roots {
        watcher.watch(root, RecursiveMode::Recursive)?;
    }
    Ok(WatchHandle {
        _watcher: watcher,
        events: rx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn delivers_events_for_created_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let handle = watch(&[root.clone()]).unwrap();

        let target = root.join("hello.txt");
        fs::write(&target, "hi").unwrap();

        // The create may arrive split across several events; scan until the
        // target path shows up.
        let mut seen = false;
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            match handle.events.recv_timeout(Duration::from_millis(200)) {
                Ok(Ok(event)) => {
                    if event.paths.iter().any(|p| p == &target) {
                        seen = true;
                        break;
                    }
                }
                Ok(Err(_)) | Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        assert!(seen, "no event for {}", target.display());
    }

    #[test]
    fn missing_root_is_an_error() {
        let result = watch(&[PathBuf::from("/nonexistent/devloop-root")]);
        assert!(result.is_err());
    }
}
