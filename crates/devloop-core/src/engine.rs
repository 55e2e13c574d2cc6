//! The sync engine main loop.
//!
//! Owns the console session, the suppression guard and the collaborator
//! handles, and drives classify -> suspend -> act -> resume for every watch
//! event. Startup runs once before watching; after that the loop only ever
//! stops with the process. A failure while handling one event is reported
//! with a `!!` marker and the next event is processed normally.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::classify::{classify, SyncAction};
use crate::config::{DevloopConfig, SyncPaths};
use crate::console::ConsoleSession;
use crate::error::{DevloopError, Result};
use crate::rpc::RemoteActions;
use crate::suppress::SuppressionGuard;
use crate::toolchain::{BuildOptions, Toolchain};
use crate::watcher;

/// Long-running sync engine; one per process.
pub struct SyncEngine {
    paths: SyncPaths,
    watch_roots: Vec<PathBuf>,
    client: Box<dyn RemoteActions>,
    toolchain: Box<dyn Toolchain>,
    console: ConsoleSession,
    guard: SuppressionGuard,
}

impl SyncEngine {
    /// Build an engine over canonicalized roots.
    ///
    /// The state dir is created if missing. The watcher covers the
    /// workspace recursively, plus the state dir when it lives outside the
    /// workspace, so sentinel events arrive either way.
    pub fn new(
        config: &DevloopConfig,
        client: Box<dyn RemoteActions>,
        toolchain: Box<dyn Toolchain>,
        console: ConsoleSession,
    ) -> Result<Self> {
        fs::create_dir_all(&config.state_dir)?;
        let state_dir = config.state_dir.canonicalize()?;
        let workspace = config.workspace.canonicalize()?;

        let paths = SyncPaths::new(&state_dir, &workspace);
        let mut watch_roots = vec![workspace.clone()];
        if !state_dir.starts_with(&workspace) {
            watch_roots.push(state_dir);
        }
        let guard = SuppressionGuard::new(paths.config_mirror.clone());

        Ok(Self {
            paths,
            watch_roots,
            client,
            toolchain,
            console,
            guard,
        })
    }

    /// Startup sequence; must succeed before [`run`](Self::run).
    ///
    /// Reports device status, downloads the config mirror (fatal on
    /// failure: the device is unreachable), starts the console without
    /// blocking, and makes sure both sentinels exist.
    pub fn startup(&mut self) -> Result<()> {
        self.report_status();
        self.client.download_config(&self.paths.config_mirror)?;
        self.console.start(self.client.as_ref(), false)?;
        ensure_sentinel(&self.paths.reboot_sentinel)?;
        ensure_sentinel(&self.paths.build_sentinel)?;
        Ok(())
    }

    /// Watch loop; blocks forever under normal operation.
    pub fn run(&mut self) -> Result<()> {
        let handle = watcher::watch(&self.watch_roots)?;
        for root in &self.watch_roots {
            log::info!("watching {}", root.display());
        }

        loop {
            match handle.events.recv() {
                Ok(Ok(event)) => {
                    for path in &event.paths {
                        self.handle_path(path);
                    }
                }
                Ok(Err(e)) => log::warn!("watcher error: {e}"),
                Err(_) => {
                    return Err(DevloopError::Subordinate(
                        "watch channel closed".to_string(),
                    ))
                }
            }
        }
    }

    /// Process one event path inside the isolated failure boundary.
    fn handle_path(&mut self, path: &Path) {
        let action = classify(&self.paths, path);
        if action == SyncAction::Ignored {
            return;
        }
        log::debug!("{} -> {:?}", path.display(), action);
        if let Err(e) = self.dispatch(action, path) {
            log::error!("!! {e}");
        }
    }

    fn dispatch(&mut self, action: SyncAction, path: &Path) -> Result<()> {
        match action {
            SyncAction::Reboot => self.with_console_suspended(|eng| {
                log::info!("reboot requested");
                eng.client.reboot()?;
                Ok(())
            }),
            SyncAction::ConfigSync => self.handle_config_sync(path),
            SyncAction::WorkspaceFile => self.handle_workspace_file(path),
            SyncAction::FirmwareReady => {
                // Only a present artifact triggers a flash; the delete after
                // a `make clean` is noise.
                if !path.is_file() {
                    return Ok(());
                }
                self.with_console_suspended(|eng| eng.toolchain.flash(path))
            }
            SyncAction::BuildRequest => self.with_console_suspended(|eng| {
                log::info!("build requested");
                eng.toolchain.build(&BuildOptions::default())
            }),
            SyncAction::Ignored => Ok(()),
        }
    }

    /// Stop the console, run the action, always restart the console.
    ///
    /// The restart happens even when the action failed, so a single bad
    /// event never leaves the console down. Uniform across both variants;
    /// for the network stream both stop and the suspension are no-ops.
    fn with_console_suspended<F>(&mut self, act: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.console.stop();
        let result = act(self);
        if let Err(e) = self.console.start(self.client.as_ref(), false) {
            log::warn!("console restart failed: {e}");
        }
        result
    }

    fn handle_config_sync(&mut self, path: &Path) -> Result<()> {
        if self.guard.should_suppress(path) {
            log::debug!("self-caused config write, dropped");
            return Ok(());
        }

        self.with_console_suspended(|eng| {
            if path.is_file() {
                let text = fs::read_to_string(path)?;
                let config: Value =
                    serde_json::from_str(&text).map_err(|source| DevloopError::MalformedConfig {
                        path: path.to_path_buf(),
                        source,
                    })?;

                log::info!("pushing edited device config");
                eng.client.config_set(config)?;
                eng.client.config_save_no_reboot()?;
                eng.client.download_config(&eng.paths.config_mirror)?;
                // Mark only after the download succeeded: a failed download
                // writes nothing, and a leftover mark would swallow the next
                // genuine edit. The loop is single-threaded, so the write's
                // event cannot be observed before the mark lands.
                eng.guard.expect_self_event();
                eng.client.reboot()?;
            } else {
                log::info!("config mirror gone, restoring from device");
                eng.client.download_config(&eng.paths.config_mirror)?;
                eng.guard.expect_self_event();
            }
            Ok(())
        })
    }

    fn handle_workspace_file(&mut self, path: &Path) -> Result<()> {
        // Only the base name travels; the device filesystem is flat.
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(());
        };
        let name = name.to_string();

        self.with_console_suspended(|eng| {
            if path.is_file() {
                let data = fs::read(path)?;
                log::info!("uploading {name} ({} bytes)", data.len());
                eng.client.fs_put(&name, &data)?;
            } else if !path.exists() {
                log::info!("removing {name} from device");
                eng.client.fs_remove(&name)?;
            }
            // A path that exists but is not a file (a directory) matches
            // neither branch and is skipped.
            Ok(())
        })
    }

    /// Step one of startup: a status banner from `Sys.GetInfo`.
    fn report_status(&self) {
        match self.client.get_info() {
            Ok(info) => {
                let fw = info.get("fw_version").and_then(Value::as_str).unwrap_or("?");
                let arch = info.get("arch").and_then(Value::as_str).unwrap_or("?");
                let mac = info.get("mac").and_then(Value::as_str).unwrap_or("?");
                log::info!("device: fw {fw}, arch {arch}, mac {mac}");
            }
            Err(e) => log::warn!("device status unavailable: {e}"),
        }
    }
}

/// Create a sentinel if absent; an existing one is never truncated.
fn ensure_sentinel(path: &Path) -> Result<()> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(())
}
