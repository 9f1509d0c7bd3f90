//! Domain model for callscope
//!
//! Structured error types plus re-exports of the wire-level identifiers so
//! engine code rarely needs to name `callscope_wire` directly.

pub mod errors;

pub use errors::{IngestError, ProtocolError};

// Re-export common wire types for convenience
pub use callscope_wire::{Descriptor, ExitAnnotation, FnId, Message, Timestamp};
