//! Reverse mount building blocks.
//!
//! This module provides the components of a reverse sshfs mount:
//!
//! - `mount_table`: Checks whether a path is currently mounted
//! - `pipe`: Pipe pairs wiring the two processes together
//! - `launcher`: Detached process creation per platform
//! - `orchestrator`: Runs an attempt from request to verified mount
//! - `command`, `request`, `config`: What to run and with which settings

pub mod command;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
/// Guest path expansion.
pub mod expand;
pub mod launcher;
pub mod mount_table;
pub mod orchestrator;
pub mod pipe;
pub mod record;
pub mod reporter;
pub mod request;
