//! `kuttai` crate (library surface).
//!
//! The primary entrypoint for end users is the `kuttai` binary (interactive chat + one-shot
//! subcommands). This library module exists so the chat session, command dispatcher and profile
//! store can be embedded and tested without going through a terminal.

pub use kuttai_core as core;

pub mod commands;
pub mod config;
pub mod profile;
pub mod session;
pub mod ui;
