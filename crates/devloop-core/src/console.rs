//! Console session management.
//!
//! The engine owns exactly one [`ConsoleSession`], picked once from the
//! connection string and fixed for the session lifetime:
//!
//! - [`SerialConsole`] attaches a subordinate console process to the same
//!   point-to-point transport the RPC calls use. It must be stopped before
//!   any remote action and restarted afterwards, because the transport has
//!   exactly one consumer.
//! - [`UdpLogStream`] receives the device's pushed log datagrams on a local
//!   UDP endpoint. The receiver thread is detached and lives for the whole
//!   process; `stop()` is deliberately a no-op since the log stream never
//!   contends with the command channel.

use std::io::Write;
use std::net::UdpSocket;
use std::process::{Child, Command, Stdio};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use crate::config::{ConnectionKind, DevloopConfig};
use crate::error::{DevloopError, Result};
use crate::logging::{log_device_line, open_device_log, LogHandle};
use crate::rpc::RemoteActions;

/// How long `stop()` waits for a graceful console exit before killing.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Live console session, one per engine.
pub enum ConsoleSession {
    PointToPoint(SerialConsole),
    NetworkStream(UdpLogStream),
}

impl ConsoleSession {
    /// Select the variant from the configured connection string.
    pub fn from_config(config: &DevloopConfig) -> Self {
        match config.connection_kind() {
            ConnectionKind::Serial { device } => ConsoleSession::PointToPoint(
                SerialConsole::new(config.tool_bin.clone(), device),
            ),
            ConnectionKind::UdpLog { listen_port } => {
                ConsoleSession::NetworkStream(UdpLogStream::new(
                    listen_port,
                    config.log_host.clone(),
                    open_device_log(config.device_log_dir.as_deref()),
                ))
            }
        }
    }

    /// Bring the console up.
    ///
    /// For the point-to-point variant `wait` blocks until the subordinate
    /// exits; the network variant's start is the synchronous log-redirect
    /// RPC either way, so `wait` adds nothing there.
    pub fn start(&mut self, client: &dyn RemoteActions, wait: bool) -> Result<()> {
        match self {
            ConsoleSession::PointToPoint(console) => console.start(wait),
            ConsoleSession::NetworkStream(stream) => stream.start(client),
        }
    }

    /// Suspend the console for exclusive transport use.
    pub fn stop(&mut self) {
        match self {
            ConsoleSession::PointToPoint(console) => console.stop(),
            // Intentional no-op: the receiver runs for the process lifetime
            // and the log stream does not touch the command channel.
            ConsoleSession::NetworkStream(_) => {}
        }
    }
}

/// Subordinate console process on the point-to-point transport.
pub struct SerialConsole {
    tool_bin: String,
    device: String,
    child: Option<Child>,
}

impl SerialConsole {
    pub fn new(tool_bin: String, device: String) -> Self {
        Self {
            tool_bin,
            device,
            child: None,
        }
    }

    /// Spawn the console subordinate if one is not already tracked.
    ///
    /// A tracked-but-exited child is reaped and replaced, so the console
    /// comes back on the next transition even after a crash.
    pub fn start(&mut self, wait: bool) -> Result<()> {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(None) => return Ok(()),
                Ok(Some(status)) => {
                    log::warn!("console exited with {status}, restarting");
                    self.child = None;
                }
                Err(e) => {
                    log::warn!("console state unknown ({e}), restarting");
                    self.child = None;
                }
            }
        }

        let mut cmd = Command::new(&self.tool_bin);
        cmd.arg("--port")
            .arg(&self.device)
            .arg("console")
            .stdin(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| DevloopError::Subordinate(format!("failed to spawn console: {e}")))?;
        log::debug!("console started (pid {})", child.id());

        if wait {
            let status = child
                .wait()
                .map_err(|e| DevloopError::Subordinate(format!("console wait failed: {e}")))?;
            if !status.success() {
                log::warn!("console exited with {status}");
            }
        } else {
            self.child = Some(child);
        }
        Ok(())
    }

    /// Terminate a tracked subordinate: SIGINT, bounded wait, then kill.
    ///
    /// No-op when nothing is tracked, so calling twice is safe.
    pub fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        #[cfg(unix)]
        {
            unsafe {
                libc::kill(child.id() as i32, libc::SIGINT);
            }
            let deadline = STOP_GRACE.as_millis() / 100;
            for _ in 0..deadline {
                match child.try_wait() {
                    Ok(Some(_)) => return,
                    Ok(None) => thread::sleep(Duration::from_millis(100)),
                    Err(_) => break,
                }
            }
        }

        let _ = child.kill();
        let _ = child.wait();
    }

    /// Whether a live subordinate is tracked.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Pid of the tracked subordinate, if any.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.id())
    }
}

impl Drop for SerialConsole {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Local receiver for the device's UDP log stream.
pub struct UdpLogStream {
    listen_port: u16,
    advertise_host: Option<String>,
    log: LogHandle,
    bound_port: Option<u16>,
}

impl UdpLogStream {
    pub fn new(listen_port: u16, advertise_host: Option<String>, log: LogHandle) -> Self {
        Self {
            listen_port,
            advertise_host,
            log,
            bound_port: None,
        }
    }

    /// Two-phase start: ensure the detached receiver thread is up, then
    /// (re-)instruct the device to send its log stream here. The RPC runs
    /// on every start; the receiver is spawned at most once.
    pub fn start(&mut self, client: &dyn RemoteActions) -> Result<()> {
        let port = self.ensure_receiver()?;
        let host = match &self.advertise_host {
            Some(host) => host.clone(),
            None => local_ip()?,
        };
        client.set_log_destination(&format!("udp://{host}:{port}"))?;
        Ok(())
    }

    /// Whether the receiver thread has been spawned.
    pub fn receiver_running(&self) -> bool {
        self.bound_port.is_some()
    }

    /// Port the receiver actually bound (differs from the configured port
    /// when that was 0).
    pub fn bound_port(&self) -> Option<u16> {
        self.bound_port
    }

    fn ensure_receiver(&mut self) -> Result<u16> {
        if let Some(port) = self.bound_port {
            return Ok(port);
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let requested = self.listen_port;
        let log = Arc::clone(&self.log);
        thread::spawn(move || receiver_loop(requested, ready_tx, log));

        let port = ready_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| DevloopError::Subordinate("log receiver did not report".to_string()))?
            .map_err(|e| DevloopError::Subordinate(format!("log receiver bind failed: {e}")))?;

        log::info!("log receiver listening on udp port {port}");
        self.bound_port = Some(port);
        Ok(port)
    }
}

/// Body of the detached receiver thread.
///
/// Binds the local endpoint, forwards datagrams until the socket errors,
/// then re-binds and carries on, forever. Only the very first bind failure
/// is fatal (reported through `ready`); after that the thread never gives
/// up, surviving interface flaps and externally closed sockets.
fn receiver_loop(
    requested_port: u16,
    ready: mpsc::Sender<std::io::Result<u16>>,
    log: LogHandle,
) {
    let mut ready = Some(ready);
    let mut port = requested_port;
    loop {
        match UdpSocket::bind(("0.0.0.0", port)) {
            Ok(socket) => {
                if let Ok(addr) = socket.local_addr() {
                    port = addr.port();
                }
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Ok(port));
                }
                forward_datagrams(&socket, &log);
            }
            Err(e) => {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(e));
                    return;
                }
                log::warn!("log receiver re-bind failed: {e}");
            }
        }
        thread::sleep(Duration::from_secs(1));
    }
}

/// Forward datagrams to stdout and the device log file until the socket
/// reports an error.
///
/// Stdout gets the raw bytes as they arrive; the log file only gets whole
/// lines. A device log line split across two datagrams is held back until
/// its newline shows up, so it lands as one timestamped entry.
fn forward_datagrams(socket: &UdpSocket, log: &LogHandle) {
    let mut buf = [0u8; 2048];
    let mut pending = String::new();
    loop {
        match socket.recv_from(&mut buf) {
            Ok((len, _)) => {
                let chunk = &buf[..len];
                let mut stdout = std::io::stdout();
                let _ = stdout.write_all(chunk);
                let _ = stdout.flush();

                pending.push_str(&String::from_utf8_lossy(chunk));
                while let Some(idx) = pending.find('\n') {
                    let line: String = pending.drain(..=idx).collect();
                    log_device_line(log, line.trim_end_matches('\n').trim_end_matches('\r'));
                }
            }
            Err(e) => {
                if !pending.is_empty() {
                    log_device_line(log, &pending);
                }
                log::warn!("log receiver socket error: {e}");
                return;
            }
        }
    }
}

/// Discover the local address the device can reach us on.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the
/// outbound interface, whose address we then read back.
fn local_ip() -> Result<String> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:53")?;
    Ok(socket.local_addr()?.ip().to_string())
}
