//! Path-independent roll-up of the call-graph tree.
//!
//! Every distinct frame name anywhere in the (accumulated, optionally
//! collapsed) tree gets exactly one aggregate record merging its statistics
//! across all tree positions, together with its callers and callees. The
//! output feeds flat, gprof-style reports directly.

use crate::callgraph::tree::{CallGraph, CallNode};
use serde::Serialize;
use std::collections::HashMap;

/// Call count along one caller→callee edge.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EdgeCalls {
    pub calls: u64,
}

/// Per-callee statistics as seen from one aggregated frame.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ChildStats {
    pub calls: u64,
    #[serde(rename = "selfTime")]
    pub self_time: f64,
    #[serde(rename = "childrenSyncTime")]
    pub children_sync_time: f64,
    #[serde(rename = "childrenAsyncTime")]
    pub children_async_time: f64,
}

/// Aggregate statistics for one frame name across every tree position.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameSummary {
    #[serde(rename = "selfTime")]
    pub self_time: f64,
    #[serde(rename = "childrenSyncTime")]
    pub children_sync_time: f64,
    #[serde(rename = "childrenAsyncTime")]
    pub children_async_time: f64,
    pub calls: u64,
    #[serde(rename = "asyncCalls")]
    pub async_calls: u64,
    /// Self plus synchronous and asynchronous children time; the sort
    /// metric for flat reports.
    #[serde(rename = "totalTime")]
    pub total_time: f64,
    /// Caller frame name → calls made through that edge.
    pub parents: HashMap<String, EdgeCalls>,
    /// Callee frame name → aggregated edge statistics.
    pub children: HashMap<String, ChildStats>,
}

/// The full roll-up: one summary per frame name, plus the name sequence
/// sorted descending by total time.
#[derive(Debug, Default, Serialize)]
pub struct Rollup {
    pub frames: HashMap<String, FrameSummary>,
    pub order: Vec<String>,
}

impl Rollup {
    #[must_use]
    pub fn get(&self, frame_name: &str) -> Option<&FrameSummary> {
        self.frames.get(frame_name)
    }

    /// Summaries in descending total-time order.
    pub fn iter_sorted(&self) -> impl Iterator<Item = (&str, &FrameSummary)> {
        self.order.iter().map(|name| (name.as_str(), &self.frames[name]))
    }
}

/// Flatten the tree into one record per frame name. The nameless root gets
/// no entry and is not reported as a parent.
#[must_use]
pub fn rollup_subcalls(graph: &CallGraph) -> Rollup {
    let mut frames: HashMap<String, FrameSummary> = HashMap::new();
    walk(None, &graph.root, &mut frames);

    let mut order: Vec<String> = frames.keys().cloned().collect();
    order.sort_by(|a, b| {
        frames[b]
            .total_time
            .total_cmp(&frames[a].total_time)
            .then_with(|| a.cmp(b))
    });

    Rollup { frames, order }
}

fn walk(frame_name: Option<&str>, node: &CallNode, out: &mut HashMap<String, FrameSummary>) {
    if let Some(frame_name) = frame_name {
        {
            let entry = out.entry(frame_name.to_string()).or_default();
            entry.self_time += node.call_times_total;
            entry.children_sync_time += node.children_sync_time;
            entry.children_async_time += node.children_async_time;
            entry.calls += node.calls;
            entry.async_calls += node.async_calls;
            entry.total_time +=
                node.call_times_total + node.children_sync_time + node.children_async_time;
        }

        for (child_name, child) in &node.subcalls {
            {
                let entry = out.entry(frame_name.to_string()).or_default();
                let edge = entry.children.entry(child_name.clone()).or_default();
                edge.calls += child.calls;
                edge.self_time += child.call_times_total;
                edge.children_sync_time += child.children_sync_time;
                edge.children_async_time += child.children_async_time;
            }

            let child_entry = out.entry(child_name.clone()).or_default();
            child_entry
                .parents
                .entry(frame_name.to_string())
                .or_default()
                .calls += child.calls;
        }
    }

    for (child_name, child) in &node.subcalls {
        walk(Some(child_name), child, out);
    }
}
