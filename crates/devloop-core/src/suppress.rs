//! Self-event suppression.
//!
//! Every remote-config download is itself a local write to the managed
//! config mirror. Without suppression the resulting watch event would be
//! misread as a user edit and re-uploaded, looping forever. The guard is a
//! plain counter bound to the single mirror path: the loop is
//! single-threaded and marks at most one expected self-event before the
//! matching download completes.

use std::path::{Path, PathBuf};

/// Counter guarding the managed config mirror against self-caused events.
#[derive(Debug)]
pub struct SuppressionGuard {
    config_mirror: PathBuf,
    pending: u32,
}

impl SuppressionGuard {
    pub fn new(config_mirror: PathBuf) -> Self {
        Self {
            config_mirror,
            pending: 0,
        }
    }

    /// Record that the engine is about to write the mirror itself.
    pub fn expect_self_event(&mut self) {
        self.pending += 1;
    }

    /// Whether the event for `path` should be dropped.
    ///
    /// Only the managed config path is ever suppressed; one pending
    /// expectation is consumed per suppressed event.
    pub fn should_suppress(&mut self, path: &Path) -> bool {
        if path == self.config_mirror && self.pending > 0 {
            self.pending -= 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SuppressionGuard {
        SuppressionGuard::new(PathBuf::from("/state/config.json"))
    }

    #[test]
    fn suppresses_exactly_once() {
        let mut g = guard();
        g.expect_self_event();
        assert!(g.should_suppress(Path::new("/state/config.json")));
        assert!(!g.should_suppress(Path::new("/state/config.json")));
    }

    #[test]
    fn nothing_pending_means_no_suppression() {
        let mut g = guard();
        assert!(!g.should_suppress(Path::new("/state/config.json")));
    }

    #[test]
    fn other_paths_never_suppressed() {
        let mut g = guard();
        g.expect_self_event();
        assert!(!g.should_suppress(Path::new("/work/fs/init.js")));
        // The pending expectation is still there for the mirror.
        assert!(g.should_suppress(Path::new("/state/config.json")));
    }

    #[test]
    fn multiple_expectations_consumed_in_order() {
        let mut g = guard();
        g.expect_self_event();
        g.expect_self_event();
        assert!(g.should_suppress(Path::new("/state/config.json")));
        assert!(g.should_suppress(Path::new("/state/config.json")));
        assert!(!g.should_suppress(Path::new("/state/config.json")));
    }
}
