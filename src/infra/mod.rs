//! Store backends for the engine.

pub mod store;

pub use store::InMemoryJobStore;
