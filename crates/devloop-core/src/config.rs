//! Runtime configuration for the sync engine.
//!
//! One [`DevloopConfig`] is assembled at startup (CLI flags, optionally
//! overlaid from a JSON file) and passed by reference to every component
//! that needs it. There is no ambient global state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

/// Default UDP port the log receiver listens on.
pub const DEFAULT_LOG_PORT: u16 = 1993;

/// Transport variant derived from the connection string.
///
/// Chosen once at startup and fixed for the session lifetime: a `udp://`
/// URL selects the network log stream, anything else is treated as a local
/// device path for the point-to-point (serial-style) console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Exclusive point-to-point connection, e.g. `/dev/ttyUSB0`.
    Serial { device: String },
    /// Push-based device log stream; we listen on this local port.
    UdpLog { listen_port: u16 },
}

/// Parse a connection string into its transport kind.
///
/// `udp://<host>:<port>` and `udp://:<port>` select the log stream (host is
/// ignored; we always bind locally). A bare `udp://` falls back to
/// [`DEFAULT_LOG_PORT`]. Everything else is a serial device path.
pub fn parse_connection(conn: &str) -> ConnectionKind {
    if let Some(rest) = conn.strip_prefix("udp://") {
        let rest = rest.trim_end_matches('/');
        let listen_port = rest
            .rsplit(':')
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(DEFAULT_LOG_PORT);
        ConnectionKind::UdpLog { listen_port }
    } else {
        ConnectionKind::Serial {
            device: conn.to_string(),
        }
    }
}

/// Settings for the sync engine and its collaborators.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevloopConfig {
    /// Connection string: serial device path or `udp://host:port`.
    pub connection: String,
    /// Directory holding the sentinels and the managed config mirror.
    pub state_dir: PathBuf,
    /// Workspace root; watched recursively.
    pub workspace: PathBuf,
    /// Device CLI binary used for RPC, build and flash.
    pub tool_bin: String,
    /// Host address advertised to the device for the UDP log stream.
    /// Discovered automatically when unset.
    pub log_host: Option<String>,
    /// Directory for the timestamped device-output log file, if any.
    pub device_log_dir: Option<PathBuf>,
}

impl Default for DevloopConfig {
    fn default() -> Self {
        Self {
            connection: "/dev/ttyUSB0".to_string(),
            state_dir: PathBuf::from("."),
            workspace: PathBuf::from("."),
            tool_bin: "fwtool".to_string(),
            log_host: None,
            device_log_dir: None,
        }
    }
}

impl DevloopConfig {
    /// Overlay settings from a JSON file onto `self`.
    ///
    /// The file may specify any subset of fields; missing fields keep their
    /// current values. Unknown fields are rejected so typos surface early.
    pub fn overlay_file(&mut self, path: &Path) -> Result<()> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Overlay {
            connection: Option<String>,
            state_dir: Option<PathBuf>,
            workspace: Option<PathBuf>,
            tool_bin: Option<String>,
            log_host: Option<String>,
            device_log_dir: Option<PathBuf>,
        }

        let contents = fs::read_to_string(path)?;
        let overlay: Overlay = serde_json::from_str(&contents)?;

        if let Some(v) = overlay.connection {
            self.connection = v;
        }
        if let Some(v) = overlay.state_dir {
            self.state_dir = v;
        }
        if let Some(v) = overlay.workspace {
            self.workspace = v;
        }
        if let Some(v) = overlay.tool_bin {
            self.tool_bin = v;
        }
        if let Some(v) = overlay.log_host {
            self.log_host = Some(v);
        }
        if let Some(v) = overlay.device_log_dir {
            self.device_log_dir = Some(v);
        }
        Ok(())
    }

    /// Transport kind derived from the connection string.
    pub fn connection_kind(&self) -> ConnectionKind {
        parse_connection(&self.connection)
    }

    /// Resolve the fixed sync paths from the state dir and workspace.
    pub fn sync_paths(&self) -> SyncPaths {
        SyncPaths::new(&self.state_dir, &self.workspace)
    }
}

/// The fixed set of paths the classifier matches against.
///
/// All paths are absolute once the engine canonicalizes its roots; watch
/// events are compared against these verbatim.
#[derive(Debug, Clone)]
pub struct SyncPaths {
    /// Touch triggers a device reboot. Content ignored.
    pub reboot_sentinel: PathBuf,
    /// Touch triggers a local build. Content ignored.
    pub build_sentinel: PathBuf,
    /// Local mirror of the device's JSON configuration.
    pub config_mirror: PathBuf,
    /// Files here map by base name onto the device filesystem.
    pub fs_dir: PathBuf,
    /// Build output; its appearance triggers a flash.
    pub firmware: PathBuf,
}

impl SyncPaths {
    pub fn new(state_dir: &Path, workspace: &Path) -> Self {
        Self {
            reboot_sentinel: state_dir.join("reboot"),
            build_sentinel: state_dir.join("build"),
            config_mirror: state_dir.join("config.json"),
            fs_dir: workspace.join("fs"),
            firmware: workspace.join("build").join("fw.zip"),
        }
    }
}
