//! Watch-event classification.
//!
//! Maps a raw filesystem event path to exactly one [`SyncAction`] using
//! first-match priority. Pure function of the path string; existence checks
//! happen later, at dispatch time, because the engine re-stats rather than
//! trusting delivered event kinds.

use std::path::Path;

use crate::config::SyncPaths;

/// Semantic action category for a single watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Reboot sentinel touched: reboot the device.
    Reboot,
    /// Managed config mirror changed: push/re-download device config.
    ConfigSync,
    /// A file under `fs/` changed: upload or remove by base name.
    WorkspaceFile,
    /// The firmware artifact appeared: flash it.
    FirmwareReady,
    /// Build sentinel touched: run a local build.
    BuildRequest,
    /// Not ours.
    Ignored,
}

/// Classify an event path against the fixed sync paths.
///
/// Priority: reboot sentinel > config mirror > workspace subtree >
/// firmware artifact > build sentinel > ignored. The fixed paths are
/// disjoint by construction, so at most one arm can match; the ordering
/// still pins the contract down for paths that could ambiguously match
/// (e.g. a config mirror placed inside `fs/`).
pub fn classify(paths: &SyncPaths, path: &Path) -> SyncAction {
    if path == paths.reboot_sentinel {
        SyncAction::Reboot
    } else if path == paths.config_mirror {
        SyncAction::ConfigSync
    } else if path.starts_with(&paths.fs_dir) && path != paths.fs_dir {
        SyncAction::WorkspaceFile
    } else if path == paths.firmware {
        SyncAction::FirmwareReady
    } else if path == paths.build_sentinel {
        SyncAction::BuildRequest
    } else {
        SyncAction::Ignored
    }
}
