// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually creating OS processes, using
//! `tokio::process::Command`, and giving the registry a narrow interface to
//! observe and signal them.
//!
//! - [`launch`] holds `LaunchSpec` and executable / working-directory
//!   resolution.
//! - [`backend`] provides the `Launcher` and `ChildProcess` traits and the
//!   production `OsLauncher`, which tests can replace with a fake.
//! - [`output`] forwards child stdout/stderr lines to `tracing`.

pub mod backend;
pub mod launch;
pub mod output;

pub use backend::{ChildProcess, Launcher, OsLauncher, StopSignal};
pub use launch::{LaunchSpec, ResolvedLaunch};
