//! Swarm Core
//!
//! Shared plumbing for the swarm crates: tracing setup, puffin profiling hooks and the
//! generational arena used to hand out GPU buffer handles.

pub mod alloc;
pub mod logging;
pub mod profiling;

pub use glam;
