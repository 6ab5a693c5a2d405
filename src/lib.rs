//! Claude Relay - Streaming bridge between callers and Claude Code.

pub mod cli;
pub mod config;
pub mod display;
pub mod executor;
pub mod gate;
