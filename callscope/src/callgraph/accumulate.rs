//! Time attribution over the call-graph tree.
//!
//! Walks the tree bottom-up and populates, per node: self time, the longest
//! and average invocation, time spent in synchronously-nested children, and
//! the asynchronous time of the entire subtree.
//!
//! A child interval is synchronous relative to a parent interval when it is
//! strictly nested inside it; each child interval is attributed at most once,
//! to the first enclosing parent interval. A child interval nested in no
//! parent interval is asynchronous, decided while examining the last parent
//! interval so repeated invocations do not double count it.
//!
//! Frames without recorded intervals (uninstrumented/native frames that only
//! ever appear mid-stack) fold in via their already-accumulated totals: an
//! interval-less *node* treats each child's self time as synchronous (the
//! children executed inside an opaque native caller); an interval-less
//! *child* contributes its synchronous-subtree time as asynchronous when its
//! frame name carries the async marker, synchronously otherwise.

// Dividing self time by a call count intentionally converts u64 to f64
#![allow(clippy::cast_precision_loss)]

use crate::callgraph::tree::{CallGraph, CallNode};
use callscope_wire::is_async_frame;
use std::collections::HashSet;

/// Populate the derived timing fields on every node of the tree, in place.
///
/// Runs strictly after ingestion completes. Safe to re-run only while
/// `call_records` are intact; typical usage is exactly once per tree
/// snapshot.
pub fn accumulate_call_times(graph: &mut CallGraph) {
    accumulate_node(&mut graph.root);
}

fn accumulate_node(node: &mut CallNode) {
    for child in node.subcalls.values_mut() {
        accumulate_node(child);
    }

    // The nesting scan below assumes intervals ordered by start time.
    node.call_records.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut time_self = 0.0;
    let mut max_sync = 0.0_f64;
    let mut children_sync = 0.0;
    let mut children_async = 0.0;

    let records = &mut node.call_records;
    let subcalls = &node.subcalls;
    let record_count = records.len();

    // (child frame name, interval index) pairs already attributed as
    // synchronous; whatever never lands here is asynchronous.
    let mut attributed: HashSet<(&str, usize)> = HashSet::new();

    for i in 0..record_count {
        let last = i + 1 == record_count;
        records[i].children_sync = 0.0;
        let elapsed = records[i].elapsed();
        time_self += elapsed;
        if elapsed > max_sync {
            max_sync = elapsed;
        }

        for (child_name, child) in subcalls {
            for (j, child_record) in child.call_records.iter().enumerate() {
                if attributed.contains(&(child_name.as_str(), j)) {
                    continue;
                }
                // Nested time includes the child's own synchronous subtree.
                let child_time = child_record.elapsed() + child_record.children_sync;
                let nested =
                    child_record.start > records[i].start && child_record.end < records[i].end;
                if nested {
                    attributed.insert((child_name.as_str(), j));
                    records[i].children_sync += child_time;
                    children_sync += child_time;
                } else if last {
                    children_async += child_time;
                }
            }
        }
    }

    let mut descendants_async = 0.0;
    for (child_name, child) in subcalls {
        // A node's asynchronous total reflects its entire async subtree.
        descendants_async += child.children_async_time;

        if record_count == 0 {
            children_sync += child.call_times_total;
        }
        if child.call_records.is_empty() {
            if is_async_frame(child_name) {
                children_async += child.children_sync_time;
            } else {
                children_sync += child.children_sync_time;
            }
        }
    }

    node.call_times_total = time_self;
    node.max_sync_time = max_sync;
    node.avg_sync_time = if node.calls > 0 { time_self / node.calls as f64 } else { 0.0 };
    node.children_sync_time = children_sync;
    node.children_async_time = children_async + descendants_async;
}
