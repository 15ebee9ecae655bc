//! crier library crate
//!
//! This module exposes internal types for integration testing.
//! The main binary is in main.rs.

#[macro_use]
extern crate log;

pub mod bot;
pub mod cache;
pub mod chat;
pub mod codec;
pub mod commands;
pub mod config;
pub mod console;
pub mod constants;
pub mod engine;
pub mod monitor;
pub mod player;
pub mod preview;
pub mod queue;
pub mod receive;
pub mod resolver;
pub mod source;
pub mod speech;
pub mod transcode;
pub mod transport;

#[cfg(test)]
mod source_tests;
