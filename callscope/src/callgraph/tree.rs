//! The path-sensitive call-graph tree.
//!
//! Nodes are keyed by frame name in their parent's `subcalls` map; the same
//! function reached through different call paths is a different node. The
//! root has no frame name and represents the entry point. Each node is
//! exclusively owned by its parent's map - no back-pointers, no cycles.

use callscope_wire::{FnId, Timestamp};
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// One invocation interval, plus the share of the interval spent waiting
/// synchronously on children (written by the time accumulator).
///
/// Serialized as a `[start, end, childrenSync]` triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallRecord {
    /// Start of the invocation, monotonic milliseconds.
    pub start: f64,
    /// End of the invocation; `start <= end`.
    pub end: f64,
    /// Time inside this interval attributed to synchronous children.
    pub children_sync: f64,
}

impl CallRecord {
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end, children_sync: 0.0 }
    }

    #[must_use]
    pub fn elapsed(&self) -> f64 {
        self.end - self.start
    }
}

impl Serialize for CallRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.start)?;
        seq.serialize_element(&self.end)?;
        seq.serialize_element(&self.children_sync)?;
        seq.end()
    }
}

/// One frame in the call graph.
///
/// `calls` counts synchronous invocations observed at this edge during
/// ingestion; `async_calls` is only ever produced by collapsing. The derived
/// `*_time` fields are populated by the time accumulator.
#[derive(Debug, Serialize)]
pub struct CallNode {
    /// Descriptor id backing this frame; unknown for uninstrumented frames.
    pub fnid: FnId,

    pub calls: u64,

    #[serde(rename = "asyncCalls")]
    pub async_calls: u64,

    /// Intervals recorded when this frame was the terminal of an exit event.
    /// Non-empty whenever `calls > 0`.
    #[serde(rename = "callRecords", skip_serializing_if = "Vec::is_empty")]
    pub call_records: Vec<CallRecord>,

    /// Self time: total elapsed over this node's own intervals.
    #[serde(rename = "callTimesTotal")]
    pub call_times_total: f64,

    /// Longest single invocation.
    #[serde(rename = "maxSyncTime")]
    pub max_sync_time: f64,

    /// Self time divided by `calls` (0 when there are no calls).
    #[serde(rename = "avgSyncTime")]
    pub avg_sync_time: f64,

    /// Time spent in children that blocked this frame.
    #[serde(rename = "childrenSyncTime")]
    pub children_sync_time: f64,

    /// Time spent in the asynchronous subtree below this frame, recursively.
    #[serde(rename = "childrenAsyncTime")]
    pub children_async_time: f64,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub subcalls: HashMap<String, CallNode>,
}

impl Default for CallNode {
    fn default() -> Self {
        Self {
            fnid: FnId::UNKNOWN,
            calls: 0,
            async_calls: 0,
            call_records: Vec::new(),
            call_times_total: 0.0,
            max_sync_time: 0.0,
            avg_sync_time: 0.0,
            children_sync_time: 0.0,
            children_async_time: 0.0,
            subcalls: HashMap::new(),
        }
    }
}

impl CallNode {
    /// Synchronous plus asynchronous invocation count.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.calls + self.async_calls
    }

    /// Child node by frame name.
    #[must_use]
    pub fn child(&self, frame_name: &str) -> Option<&CallNode> {
        self.subcalls.get(frame_name)
    }
}

/// The call-graph tree for one profiling run.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct CallGraph {
    pub root: CallNode,
}

impl CallGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observed invocation: walk (creating as needed) the chain
    /// of nodes named by `frames` (outer → inner), stamp each node's
    /// descriptor id, and record the interval at the terminal frame.
    pub fn record_call(&mut self, frames: &[(String, FnId)], start: Timestamp, end: Timestamp) {
        if frames.is_empty() {
            return;
        }
        let terminal = frames.len() - 1;
        let mut node = &mut self.root;
        for (depth, (frame_name, fnid)) in frames.iter().enumerate() {
            node = node.subcalls.entry(frame_name.clone()).or_default();
            node.fnid = *fnid;
            if depth == terminal {
                node.calls += 1;
                node.call_records.push(CallRecord::new(start.0, end.0));
            }
        }
    }

    /// Navigate a chain of frame names from the root.
    #[must_use]
    pub fn node(&self, path: &[&str]) -> Option<&CallNode> {
        let mut node = &self.root;
        for frame_name in path {
            node = node.subcalls.get(*frame_name)?;
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: &str, id: i64) -> (String, FnId) {
        (name.to_string(), FnId(id))
    }

    #[test]
    fn test_record_call_builds_path() {
        let mut graph = CallGraph::new();
        graph.record_call(
            &[frame("a", 1), frame("b", 2)],
            Timestamp(10.0),
            Timestamp(30.0),
        );

        let a = graph.node(&["a"]).unwrap();
        assert_eq!(a.fnid, FnId(1));
        assert_eq!(a.calls, 0);
        assert!(a.call_records.is_empty());

        let b = graph.node(&["a", "b"]).unwrap();
        assert_eq!(b.fnid, FnId(2));
        assert_eq!(b.calls, 1);
        assert_eq!(b.call_records, vec![CallRecord::new(10.0, 30.0)]);
    }

    #[test]
    fn test_same_function_different_paths_is_different_node() {
        let mut graph = CallGraph::new();
        graph.record_call(&[frame("a", 1), frame("c", 3)], Timestamp(0.0), Timestamp(1.0));
        graph.record_call(&[frame("b", 2), frame("c", 3)], Timestamp(2.0), Timestamp(3.0));

        assert_eq!(graph.node(&["a", "c"]).unwrap().calls, 1);
        assert_eq!(graph.node(&["b", "c"]).unwrap().calls, 1);
    }

    #[test]
    fn test_single_frame_stack_records_at_terminal() {
        let mut graph = CallGraph::new();
        graph.record_call(&[frame("main", 1)], Timestamp(0.0), Timestamp(5.0));

        let main = graph.node(&["main"]).unwrap();
        assert_eq!(main.calls, 1);
        assert_eq!(main.call_records.len(), 1);
    }

    #[test]
    fn test_call_record_serializes_as_triple() {
        let mut rec = CallRecord::new(1.5, 4.0);
        rec.children_sync = 0.5;
        assert_eq!(serde_json::to_string(&rec).unwrap(), "[1.5,4.0,0.5]");
    }
}
