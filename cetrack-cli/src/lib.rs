//! cetrack CLI library.
//!
//! Exposes the command handlers for integration testing.
//! In production, `cetrack` is used as a binary (main.rs).

pub mod cli;
pub mod commands;
pub mod emitter;
pub mod error;
pub mod output;
