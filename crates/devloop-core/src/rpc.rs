//! Remote device actions.
//!
//! The engine talks to the device through the [`RemoteActions`] seam. The
//! shipped implementation, [`DeviceTool`], shells out to the device CLI
//! (`<tool> --port <conn> call <method> [args]`) and parses its stdout as
//! JSON. Everything above `call` is a provided method, so a test double or
//! an alternative transport only has to implement the one entry point.

use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::{json, Value};

use crate::error::{DevloopError, Result};

/// RPC and config operations the engine performs against the device.
pub trait RemoteActions {
    /// Invoke one RPC method, returning the parsed JSON reply.
    fn call(&self, method: &str, args: Option<Value>) -> Result<Value>;

    /// `Sys.GetInfo`: device status snapshot.
    fn get_info(&self) -> Result<Value> {
        self.call("Sys.GetInfo", None)
    }

    /// `Sys.Reboot`.
    fn reboot(&self) -> Result<Value> {
        self.call("Sys.Reboot", None)
    }

    /// `Config.Set` with a full config object.
    fn config_set(&self, config: Value) -> Result<Value> {
        self.call("Config.Set", Some(json!({ "config": config })))
    }

    /// `Config.Save` without rebooting; the engine reboots explicitly
    /// after the mirror has been refreshed.
    fn config_save_no_reboot(&self) -> Result<Value> {
        self.call("Config.Save", Some(json!({ "reboot": false })))
    }

    /// `FS.Put`: store `data` on the device filesystem under `filename`.
    fn fs_put(&self, filename: &str, data: &[u8]) -> Result<Value> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        self.call(
            "FS.Put",
            Some(json!({ "filename": filename, "data": STANDARD.encode(data) })),
        )
    }

    /// `FS.Remove`.
    fn fs_remove(&self, filename: &str) -> Result<Value> {
        self.call("FS.Remove", Some(json!({ "filename": filename })))
    }

    /// Point the device's log stream at a local UDP endpoint.
    fn set_log_destination(&self, dest: &str) -> Result<Value> {
        self.call("Debug.SetLogDestination", Some(json!({ "dest": dest })))
    }

    /// Download the device config into the managed mirror at `dest`.
    ///
    /// The reply must be a JSON object; anything else means the device is
    /// not reachable in a usable state.
    fn download_config(&self, dest: &Path) -> Result<()> {
        let reply = self
            .call("Config.Get", None)
            .map_err(|e| DevloopError::DeviceUnreachable(e.to_string()))?;
        if !reply.is_object() {
            return Err(DevloopError::DeviceUnreachable(format!(
                "Config.Get returned non-object: {reply}"
            )));
        }
        let mut pretty = serde_json::to_string_pretty(&reply)?;
        pretty.push('\n');
        fs::write(dest, pretty)?;
        Ok(())
    }
}

/// Device CLI wrapper: RPC via `<tool> --port <conn> call`.
#[derive(Debug, Clone)]
pub struct DeviceTool {
    tool_bin: String,
    connection: String,
}

impl DeviceTool {
    pub fn new(tool_bin: impl Into<String>, connection: impl Into<String>) -> Self {
        Self {
            tool_bin: tool_bin.into(),
            connection: connection.into(),
        }
    }

    pub(crate) fn bin(&self) -> &str {
        &self.tool_bin
    }

    /// Base command with the connection flag applied.
    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.tool_bin);
        cmd.arg("--port").arg(&self.connection);
        cmd
    }
}

/// Render a command line for logging, shell-quoted.
pub(crate) fn render_command(bin: &str, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(quote(bin));
    for arg in args {
        parts.push(quote(arg));
    }
    parts.join(" ")
}

fn quote(s: &str) -> String {
    shlex::try_quote(s)
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

impl RemoteActions for DeviceTool {
    fn call(&self, method: &str, args: Option<Value>) -> Result<Value> {
        let mut cli_args = vec![
            "--port".to_string(),
            self.connection.clone(),
            "call".to_string(),
            method.to_string(),
        ];
        if let Some(ref args) = args {
            cli_args.push(args.to_string());
        }
        log::debug!("rpc: {}", render_command(&self.tool_bin, &cli_args));

        let mut cmd = self.command();
        cmd.arg("call").arg(method);
        if let Some(args) = args {
            cmd.arg(args.to_string());
        }

        let output = cmd.output().map_err(|e| DevloopError::RemoteCall {
            method: method.to_string(),
            reason: format!("failed to run {}: {e}", self.tool_bin),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DevloopError::RemoteCall {
                method: method.to_string(),
                reason: format!("exit {:?}: {}", output.status.code(), stderr.trim()),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| DevloopError::RemoteCall {
            method: method.to_string(),
            reason: format!("non-JSON reply: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn fake_tool(dir: &Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("faketool");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn render_command_quotes_spaces() {
        let rendered = render_command("fwtool", &["two words".to_string()]);
        assert!(rendered.contains('\'') || rendered.contains('"'));
    }

    #[test]
    fn missing_tool_is_remote_call_error() {
        let client = DeviceTool::new("/nonexistent/tool-bin", "/dev/null");
        let err = client.call("Sys.GetInfo", None).unwrap_err();
        assert!(matches!(err, DevloopError::RemoteCall { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn json_reply_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), r#"echo '{"app": "blink", "uptime": 12}'"#);
        let client = DeviceTool::new(tool.to_str().unwrap(), "/dev/ttyUSB0");

        let reply = client.get_info().unwrap();
        assert_eq!(reply["app"], "blink");
        assert_eq!(reply["uptime"], 12);
    }

    #[test]
    #[cfg(unix)]
    fn non_json_reply_is_remote_call_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "echo not-json");
        let client = DeviceTool::new(tool.to_str().unwrap(), "/dev/ttyUSB0");

        let err = client.call("Sys.GetInfo", None).unwrap_err();
        match err {
            DevloopError::RemoteCall { method, reason } => {
                assert_eq!(method, "Sys.GetInfo");
                assert!(reason.contains("non-JSON"));
            }
            other => panic!("expected RemoteCall, got {other:?}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn failing_tool_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "echo 'device timed out' >&2; exit 3");
        let client = DeviceTool::new(tool.to_str().unwrap(), "/dev/ttyUSB0");

        let err = client.reboot().unwrap_err();
        match err {
            DevloopError::RemoteCall { reason, .. } => {
                assert!(reason.contains("device timed out"));
            }
            other => panic!("expected RemoteCall, got {other:?}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn download_config_writes_pretty_object() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), r#"echo '{"wifi": {"ssid": "lab"}}'"#);
        let client = DeviceTool::new(tool.to_str().unwrap(), "/dev/ttyUSB0");

        let dest = dir.path().join("config.json");
        client.download_config(&dest).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&dest).unwrap()).unwrap();
        assert_eq!(written["wifi"]["ssid"], "lab");
    }

    #[test]
    #[cfg(unix)]
    fn download_config_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "echo '[1, 2, 3]'");
        let client = DeviceTool::new(tool.to_str().unwrap(), "/dev/ttyUSB0");

        let dest = dir.path().join("config.json");
        let err = client.download_config(&dest).unwrap_err();
        assert!(matches!(err, DevloopError::DeviceUnreachable(_)));
        assert!(!dest.exists());
    }
}
