//! Resumable progress for the ingestion loop
//!
//! Provides the progress documents, their store with atomic writes, and the
//! lock that keeps a second run away.

pub mod lock;
pub mod state;

pub use lock::RunLock;
pub use state::{CursorProgress, EntityProgress, ProgressShape, ProgressStore, ResumeError};
