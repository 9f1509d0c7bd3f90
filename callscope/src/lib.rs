//! # callscope - Runtime Call-Graph Profiler Engine
//!
//! callscope ingests a stream of function-entry/exit and call-site events
//! emitted by instrumented code running in a (possibly separate) process,
//! reconstructs a hierarchical call graph annotated with timing, and
//! classifies each parent→child call edge as synchronous or asynchronous so
//! that time spent blocking a caller can be distinguished from time spent in
//! deferred, callback-driven work.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Instrumented Process                       │
//! │          (source rewritten by the upstream step)            │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ newline-delimited JSON over TCP
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  callscope (this crate)                     │
//! │                                                             │
//! │  ┌──────────┐   ┌──────────┐   ┌───────────────────┐        │
//! │  │  Server  │──▶│ Receiver │──▶│  Call Graph Tree  │        │
//! │  │ (ingest) │   │          │   │   + Flat Index    │        │
//! │  └──────────┘   └────┬─────┘   └────────┬──────────┘        │
//! │                      │                  │                   │
//! │                      ▼                  ▼                   │
//! │               ┌──────────────┐   ┌──────────────────┐       │
//! │               │    Frame     │   │ Accumulate       │       │
//! │               │   Resolver   │   │ Collapse         │       │
//! │               └──────────────┘   │ Roll-up          │       │
//! │                                  └────────┬─────────┘       │
//! │                                           ▼                 │
//! │                                  ┌──────────────────┐       │
//! │                                  │  Snapshot Export │       │
//! │                                  └──────────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`ingest`]: wire-protocol terminal - TCP server, fragment reassembly,
//!   the [`Receiver`](ingest::Receiver) event router, and the static
//!   descriptor registry. Ingestion exclusively owns all mutable state;
//!   [`Receiver::finish`](ingest::Receiver::finish) hands it over as an
//!   immutable-by-convention [`ProfileRun`](ingest::ProfileRun).
//!
//! - [`resolve`]: fuzzy (nearest-column) mapping from raw stack-frame text
//!   to registered descriptor ids.
//!
//! - [`callgraph`]: the path-sensitive call tree plus the three analysis
//!   passes - time accumulation, frame collapsing, and the per-function
//!   subcall roll-up - and the path-independent flat index.
//!
//! - [`export`]: read-only snapshot of a finished run as plain nested data
//!   for external formatters.
//!
//! - [`domain`]: error types and re-exports of the wire-level identifiers.
//!
//! ## Typical Usage
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use callscope::{accumulate_call_times, collapse_frames, rollup_subcalls};
//! use callscope::{CollapseRequest, ProfilerServer, RunSnapshot};
//!
//! let server = ProfilerServer::bind("127.0.0.1:0").await?;
//! // hand server.local_addr()? to the instrumented process, then:
//! let mut run = server.serve().await?;
//!
//! accumulate_call_times(&mut run.graph);
//! collapse_frames(&mut run.graph, &CollapseRequest::module_loaders());
//! let rollup = rollup_subcalls(&run.graph);
//!
//! RunSnapshot::new(&run).with_rollup(&rollup).write_json(std::io::stdout())?;
//! # Ok(())
//! # }
//! ```
//!
//! Sync/async classification is a best-effort heuristic built from interval
//! nesting and recorded async boundaries, not a formally verified trace.

pub mod callgraph;
pub mod domain;
pub mod export;
pub mod ingest;
pub mod resolve;

pub use callgraph::accumulate::accumulate_call_times;
pub use callgraph::collapse::{collapse_frames, CollapseRequest};
pub use callgraph::flat::{FlatCall, FlatIndex};
pub use callgraph::rollup::{rollup_subcalls, FrameSummary, Rollup};
pub use callgraph::tree::{CallGraph, CallNode, CallRecord};
pub use domain::{IngestError, ProtocolError};
pub use export::RunSnapshot;
pub use ingest::{IngestStats, ProfileRun, ProfilerServer, Receiver, RetryPolicy};
pub use resolve::FrameResolver;

pub use callscope_wire as wire;
