//! Frame collapsing.
//!
//! Removes chosen frames from the tree and re-parents their children onto
//! the grandparent, preserving aggregate call counts and times:
//! `a → loader → b`, collapsing `loader`, yields `a → b`.
//!
//! A removed frame classified as fully asynchronous turns all of its direct
//! children's calls asynchronous at the merged level; deeper descendants
//! keep whatever sync/async split they already carried. A partially
//! asynchronous removed frame caps each grandchild's synchronous calls at
//! its own - a child cannot have been called synchronously more times than
//! its removed parent was.
//!
//! Malformed requests (the root, or names that appear nowhere) are no-ops.

use crate::callgraph::tree::{CallGraph, CallNode};
use callscope_wire::is_async_frame;
use std::collections::HashSet;

/// Module-loader frames of the instrumented runtime; graphs are routinely
/// dominated by these without them saying anything useful.
const MODULE_LOAD_FRAMES: &[&str] = &[
    "Module.require (module.js:364:17)",
    "Function.Module._load (module.js:312:12)",
    "Module._load (module.js:312:12)",
    "Module.load (module.js:356:32)",
    "require (module.js:380:17)",
    "Object.Module._extensions.(anonymous function) [as .js] (/node_modules/node-hook/index.js:52:14)",
    "Module._compile (module.js:456:26)",
];

/// Which frames to remove from a tree.
#[derive(Debug, Clone, Default)]
pub struct CollapseRequest {
    /// Exact frame names to remove wherever they occur.
    pub frames: Vec<String>,
    /// Additionally remove the stock module-loader frames.
    pub module_load_frames: bool,
}

impl CollapseRequest {
    /// Remove the listed frame names.
    #[must_use]
    pub fn named<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { frames: frames.into_iter().map(Into::into).collect(), module_load_frames: false }
    }

    /// Remove only the stock module-loader frames.
    #[must_use]
    pub fn module_loaders() -> Self {
        Self { frames: Vec::new(), module_load_frames: true }
    }
}

/// Remove the requested frames from the tree in place, merging their
/// subtrees into the grandparents.
pub fn collapse_frames(graph: &mut CallGraph, request: &CollapseRequest) {
    let mut remove: HashSet<String> = request.frames.iter().cloned().collect();
    if request.module_load_frames {
        remove.extend(MODULE_LOAD_FRAMES.iter().map(|frame| (*frame).to_string()));
    }
    if remove.is_empty() {
        return;
    }
    collapse_node(&mut graph.root, &remove);
}

/// Depth-first: a removed frame's own subtree is collapsed before its
/// children are merged into this node.
fn collapse_node(node: &mut CallNode, remove: &HashSet<String>) {
    let frame_names: Vec<String> = node.subcalls.keys().cloned().collect();
    for frame_name in frame_names {
        if remove.contains(&frame_name) {
            let Some(mut doomed) = node.subcalls.remove(&frame_name) else {
                continue;
            };
            collapse_node(&mut doomed, remove);
            merge_subcalls(node, doomed, is_async_frame(&frame_name));
        } else if let Some(child) = node.subcalls.get_mut(&frame_name) {
            collapse_node(child, remove);
        }
    }
}

/// Merge the children of the removed frame `ext` into `base`.
///
/// `force_async` holds only for the direct children of the frame being
/// removed; the recursion always passes `false` so deeper descendants keep
/// their own classification.
fn merge_subcalls(base: &mut CallNode, mut ext: CallNode, force_async: bool) {
    let fully_async = force_async || (base.async_calls > 0 && ext.calls == 0);
    let parent_sync = ext.calls;
    let parent_async = ext.async_calls;

    for (frame_name, mut sub_ext) in std::mem::take(&mut ext.subcalls) {
        let sub = base.subcalls.entry(frame_name).or_default();

        if !sub.fnid.is_known() {
            sub.fnid = sub_ext.fnid;
        }
        sub.max_sync_time += sub_ext.max_sync_time;
        sub.call_times_total += sub_ext.call_times_total;
        sub.children_sync_time += sub_ext.children_sync_time;
        sub.children_async_time += sub_ext.children_async_time;

        if fully_async {
            // Parent was purely asynchronous: everything under it was too.
            sub.async_calls += sub_ext.calls + sub_ext.async_calls;
        } else {
            sub.calls += sub_ext.calls;
            sub.async_calls += sub_ext.async_calls;

            // The removed parent was partially async; our synchronous calls
            // cannot outnumber its own.
            let parent_total = parent_sync + parent_async;
            if parent_async > 0 && parent_total <= sub.total_calls() {
                let capped = parent_sync.min(sub.calls);
                let excess = sub.calls - capped;
                sub.calls = capped;
                sub.async_calls += excess;
            }
        }

        if !sub_ext.call_records.is_empty() {
            sub.call_records.append(&mut sub_ext.call_records);
            sub.call_records.sort_by(|a, b| a.start.total_cmp(&b.start));
        }

        merge_subcalls(sub, sub_ext, false);
    }
}
