//! Structured error types for callscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use callscope_wire::FnId;
use thiserror::Error;

/// Wire-level violations. Always fatal for the run.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown instrumentation record: {0}")]
    UnknownRecord(String),

    #[error("Stream fragment failed to parse twice in a row: {0}")]
    FragmentReassembly(String),
}

/// Errors that end a profiling run.
///
/// Resolution failures are deliberately *not* here: a stack frame with no
/// registered mapping resolves to [`FnId::UNKNOWN`] and flows through as a
/// legitimate, if opaque, node.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Descriptor {fnid} never arrived within the retry budget ({attempts} attempts)")]
    OrderingTimeout { fnid: FnId, attempts: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_timeout_display() {
        let err = IngestError::OrderingTimeout { fnid: FnId(42), attempts: 300 };
        assert_eq!(
            err.to_string(),
            "Descriptor fn#42 never arrived within the retry budget (300 attempts)"
        );
    }

    #[test]
    fn test_protocol_error_is_ingest_error() {
        let err: IngestError = ProtocolError::UnknownRecord("{\"type\":\"x\"}".to_string()).into();
        assert!(err.to_string().contains("Unknown instrumentation record"));
    }
}
