//! # devloop-core
//!
//! Core logic for devloop, the embedded dev-loop orchestrator.
//!
//! This crate is framework-agnostic: the daemon binary wires it to a CLI,
//! but everything here works against plain trait objects.
//!
//! ## Key Concepts
//!
//! - **SyncEngine**: the watch/classify/dispatch loop
//! - **ConsoleSession**: the live device console, suspended around actions
//!   that need exclusive use of the transport
//! - **SuppressionGuard**: keeps the engine from reacting to filesystem
//!   writes it caused itself

pub mod classify;
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod logging;
pub mod rpc;
pub mod suppress;
pub mod toolchain;
pub mod watcher;

// Re-export commonly used types
pub use classify::{classify, SyncAction};
pub use config::{ConnectionKind, DevloopConfig, SyncPaths};
pub use console::ConsoleSession;
pub use engine::SyncEngine;
pub use error::{DevloopError, Result};
pub use rpc::{DeviceTool, RemoteActions};
pub use toolchain::{BuildOptions, Toolchain};
