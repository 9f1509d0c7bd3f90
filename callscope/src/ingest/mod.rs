//! Event ingestion: the terminal of the wire protocol.
//!
//! One TCP connection per profiling run. The [`server`] owns the socket and
//! drives the [`framing`] reassembler and the [`Receiver`]; the receiver
//! routes records, resolves stack frames, and exclusively owns the call
//! graph, the static [`registry`], the frame resolver, and the flat index
//! until [`Receiver::finish`] hands them over as a [`ProfileRun`].
//!
//! Descriptor batches and function-exit events travel independently, so an
//! exit may reference an id the registry has not seen yet; such operations
//! park in a deferred queue drained on descriptor arrival and aged by the
//! server's retry ticker (see [`RetryPolicy`]).

pub mod framing;
pub mod receiver;
pub mod registry;
pub mod server;

pub use framing::LineAssembler;
pub use receiver::{IngestStats, ProfileRun, Receiver, RetryPolicy};
pub use registry::DescriptorRegistry;
pub use server::ProfilerServer;
