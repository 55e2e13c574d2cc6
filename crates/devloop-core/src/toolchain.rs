//! Local build and flash operations.
//!
//! Thin blocking wrappers around the device CLI's `build` and `flash`
//! subcommands. The engine runs these synchronously with the console
//! suspended, so their output goes straight to the user's terminal.

use std::path::Path;
use std::process::Stdio;

use crate::error::{DevloopError, Result};
use crate::rpc::{render_command, DeviceTool};

/// Options for a firmware build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Build locally instead of via a remote build service.
    pub local: bool,
    /// Keep the device's current configuration across the build.
    pub preserve_config: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            local: true,
            preserve_config: true,
        }
    }
}

impl BuildOptions {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec!["build".to_string()];
        if self.local {
            args.push("--local".to_string());
        }
        if self.preserve_config {
            args.push("--preserve-config".to_string());
        }
        args
    }
}

/// Build and flash operations the engine triggers.
pub trait Toolchain {
    /// Compile the firmware. Blocks until the build finishes.
    fn build(&self, options: &BuildOptions) -> Result<()>;

    /// Flash the firmware artifact at `artifact` onto the device.
    fn flash(&self, artifact: &Path) -> Result<()>;
}

impl Toolchain for DeviceTool {
    fn build(&self, options: &BuildOptions) -> Result<()> {
        let args = options.to_args();
        log::info!("build: {}", render_command(self.bin(), &args));

        let status = self
            .command()
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| DevloopError::Subordinate(format!("failed to run build: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(DevloopError::Subordinate(format!(
                "build failed with exit {:?}",
                status.code()
            )))
        }
    }

    fn flash(&self, artifact: &Path) -> Result<()> {
        log::info!("flashing {}", artifact.display());

        let status = self
            .command()
            .arg("flash")
            .arg(artifact)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| DevloopError::Subordinate(format!("failed to run flash: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(DevloopError::Subordinate(format!(
                "flash failed with exit {:?}",
                status.code()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_preserve_config() {
        let options = BuildOptions::default();
        assert!(options.local);
        assert!(options.preserve_config);
    }

    #[test]
    fn options_render_flags() {
        let args = BuildOptions::default().to_args();
        assert_eq!(args[0], "build");
        assert!(args.contains(&"--local".to_string()));
        assert!(args.contains(&"--preserve-config".to_string()));

        let bare = BuildOptions {
            local: false,
            preserve_config: false,
        }
        .to_args();
        assert_eq!(bare, vec!["build".to_string()]);
    }

    #[test]
    fn failing_build_is_subordinate_error() {
        let tool = DeviceTool::new("false", "/dev/null");
        let err = tool.build(&BuildOptions::default()).unwrap_err();
        assert!(matches!(err, DevloopError::Subordinate(_)));
    }

    #[test]
    #[cfg(unix)]
    fn successful_flash_is_ok() {
        let tool = DeviceTool::new("true", "/dev/null");
        assert!(tool.flash(Path::new("/tmp/fw.zip")).is_ok());
    }
}
