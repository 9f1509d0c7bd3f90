//! The call-graph tree and its analysis passes.
//!
//! The [`tree`] is built by the receiver while an event stream is active and
//! is read/rewritten afterward by three single-threaded passes, in order:
//!
//! 1. [`accumulate::accumulate_call_times`] - self / sync-children /
//!    async-children time attribution per node
//! 2. [`collapse::collapse_frames`] - remove chosen frames, re-parenting
//!    their children while preserving call and time accounting
//! 3. [`rollup::rollup_subcalls`] - flatten the tree into one record per
//!    frame name for path-independent reporting
//!
//! [`flat`] is the path-independent per-function index the receiver keeps
//! alongside the tree.

pub mod accumulate;
pub mod collapse;
pub mod flat;
pub mod rollup;
pub mod tree;

pub use accumulate::accumulate_call_times;
pub use collapse::{collapse_frames, CollapseRequest};
pub use flat::{FlatCall, FlatIndex};
pub use rollup::{rollup_subcalls, ChildStats, EdgeCalls, FrameSummary, Rollup};
pub use tree::{CallGraph, CallNode, CallRecord};
