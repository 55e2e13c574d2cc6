//! Device-output logging.
//!
//! The UDP log receiver mirrors everything it forwards to the terminal into
//! an append-only, timestamped log file, so a flaky-boot investigation can
//! scroll back further than the terminal buffer.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::Utc;

/// Thread-safe handle to the append-only device log file.
///
/// `None` inside the mutex means logging to file is disabled; writers treat
/// that as a silent no-op.
pub type LogHandle = Arc<Mutex<Option<File>>>;

/// Open (or create) `{dir}/device.log` and return a shared handle.
///
/// Passing `None` yields a disabled handle.
pub fn open_device_log(dir: Option<&Path>) -> LogHandle {
    let file = dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("device.log"))
            .ok()
    });
    Arc::new(Mutex::new(file))
}

/// Append one timestamped line of device output.
pub fn log_device_line(handle: &LogHandle, line: &str) {
    if let Ok(mut guard) = handle.lock() {
        if let Some(ref mut file) = *guard {
            let ts = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
            let _ = writeln!(file, "[{}] {}", ts, line);
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn open_device_log_creates_file() {
        let dir = tempdir().unwrap();
        let handle = open_device_log(Some(dir.path()));
        assert!(handle.lock().unwrap().is_some());
        assert!(dir.path().join("device.log").exists());
    }

    #[test]
    fn open_device_log_none_is_disabled() {
        let handle = open_device_log(None);
        assert!(handle.lock().unwrap().is_none());
    }

    #[test]
    fn log_device_line_timestamps_output() {
        let dir = tempdir().unwrap();
        let handle = open_device_log(Some(dir.path()));

        log_device_line(&handle, "boot: app=blink");

        let mut contents = String::new();
        File::open(dir.path().join("device.log"))
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert!(contents.contains("boot: app=blink"));
        assert!(contents.contains('T'));
        assert!(contents.contains('Z'));
    }

    #[test]
    fn log_device_line_disabled_does_not_panic() {
        let handle: LogHandle = Arc::new(Mutex::new(None));
        log_device_line(&handle, "dropped");
    }
}
