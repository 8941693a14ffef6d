pub mod config;
pub mod structure;
pub mod synchronizer;

pub use config::ConfigError;
pub use structure::{Structure, StructureError};
pub use synchronizer::{DeleteFailure, Orphan, StructureSynchronizer, SyncReport};
