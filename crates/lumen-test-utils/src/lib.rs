#![forbid(unsafe_code)]

//! Shared test utilities for the lumen workspace.

pub mod fixtures;
pub mod host;
pub mod resolver;
pub mod sink;

pub use fixtures::*;
pub use host::{ScriptedClock, ScriptedProbe};
pub use resolver::FakeResolver;
pub use sink::MemorySink;
