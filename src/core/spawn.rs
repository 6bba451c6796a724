//! Runtime-agnostic spawning seam.

use std::future::Future;

/// Abstraction for spawning engine loops and job executions on a runtime.
pub trait Spawn {
    /// Spawn a detached task.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
