//! devloop: watch the workspace, keep the device in sync.
//!
//! Thin binary over `devloop-core`: parses flags, assembles the config,
//! runs the engine's startup sequence and then blocks on the watch loop.
//! Startup failures (device unreachable) exit non-zero; once the loop is
//! entered the process only ends on termination.

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;

use devloop_core::{ConsoleSession, DeviceTool, DevloopConfig, SyncEngine};

#[derive(Parser, Debug)]
#[command(name = "devloop", version, about = "Embedded dev-loop orchestrator")]
struct Args {
    /// Connection string: serial device path or udp://host:port
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Workspace root to watch recursively
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Directory for the sentinels and the config mirror
    /// (defaults to the workspace root)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Device CLI binary used for RPC, build and flash
    #[arg(long, default_value = "fwtool")]
    tool: String,

    /// Host address advertised to the device for the UDP log stream
    #[arg(long)]
    log_host: Option<String>,

    /// Directory for the timestamped device-output log file
    #[arg(long)]
    device_log_dir: Option<PathBuf>,

    /// JSON settings file overlaid onto the flags
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<DevloopConfig, devloop_core::DevloopError> {
        let mut config = DevloopConfig::default();
        config.connection = self.port;
        config.state_dir = self
            .state_dir
            .unwrap_or_else(|| self.workspace.clone());
        config.workspace = self.workspace;
        config.tool_bin = self.tool;
        config.log_host = self.log_host;
        config.device_log_dir = self.device_log_dir;

        if let Some(path) = self.config {
            config.overlay_file(&path)?;
        }
        Ok(config)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("bad settings: {e}");
            exit(2);
        }
    };

    let client = DeviceTool::new(config.tool_bin.clone(), config.connection.clone());
    let toolchain = client.clone();
    let console = ConsoleSession::from_config(&config);

    let mut engine =
        match SyncEngine::new(&config, Box::new(client), Box::new(toolchain), console) {
            Ok(engine) => engine,
            Err(e) => {
                log::error!("startup failed: {e}");
                exit(1);
            }
        };

    if let Err(e) = engine.startup() {
        log::error!("startup failed: {e}");
        exit(1);
    }

    if let Err(e) = engine.run() {
        log::error!("{e}");
        exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_verify() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["devloop"]).unwrap();
        let config = args.into_config().unwrap();
        assert_eq!(config.connection, "/dev/ttyUSB0");
        assert_eq!(config.tool_bin, "fwtool");
        // State dir defaults to the workspace root.
        assert_eq!(config.state_dir, config.workspace);
    }

    #[test]
    fn udp_port_and_custom_state_dir() {
        let args = Args::try_parse_from([
            "devloop",
            "--port",
            "udp://:1993",
            "--state-dir",
            "/tmp/devloop-state",
        ])
        .unwrap();
        let config = args.into_config().unwrap();
        assert_eq!(config.connection, "udp://:1993");
        assert_eq!(config.state_dir, PathBuf::from("/tmp/devloop-state"));
        assert_eq!(config.workspace, PathBuf::from("."));
    }

    #[test]
    fn settings_file_overlays_flags() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("devloop.json");
        std::fs::write(&file, r#"{"tool_bin": "mytool"}"#).unwrap();

        let args = Args::try_parse_from([
            "devloop",
            "--tool",
            "fwtool",
            "--config",
            file.to_str().unwrap(),
        ])
        .unwrap();
        let config = args.into_config().unwrap();
        assert_eq!(config.tool_bin, "mytool");
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let args =
            Args::try_parse_from(["devloop", "--config", "/nonexistent/devloop.json"]).unwrap();
        assert!(args.into_config().is_err());
    }
}
