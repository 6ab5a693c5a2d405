//! Streaming executor: runs Claude Code and turns its output into a response.

mod aggregate;
mod lifecycle;
mod listener;
mod registry;
mod update;

pub use aggregate::*;
pub use lifecycle::*;
pub use listener::*;
pub use registry::*;
pub use update::*;
