//! Snapshot export for formatters.
//!
//! External renderers (flat tables, call-graph listings, dashboards) consume
//! a finished run as plain nested data: the fully accumulated, optionally
//! collapsed call graph, the flat per-function index, the descriptor
//! registry, and - when one was built - the subcall roll-up. Formatters only
//! read, never mutate; the snapshot borrows everything.

use crate::callgraph::flat::FlatIndex;
use crate::callgraph::rollup::Rollup;
use crate::callgraph::tree::CallGraph;
use crate::ingest::receiver::ProfileRun;
use crate::ingest::registry::DescriptorRegistry;
use serde::Serialize;

/// Read-only, serializable view of a finished profiling run.
#[derive(Debug, Serialize)]
pub struct RunSnapshot<'a> {
    #[serde(rename = "elapsedTimeTotal")]
    pub elapsed_time_total: f64,

    pub callgraph: &'a CallGraph,

    pub flatcalls: &'a FlatIndex,

    #[serde(rename = "sourceDict")]
    pub source_dict: &'a DescriptorRegistry,

    #[serde(rename = "subcallSummary", skip_serializing_if = "Option::is_none")]
    pub subcall_summary: Option<&'a Rollup>,
}

impl<'a> RunSnapshot<'a> {
    #[must_use]
    pub fn new(run: &'a ProfileRun) -> Self {
        Self {
            elapsed_time_total: run.elapsed_ms,
            callgraph: &run.graph,
            flatcalls: &run.flat,
            source_dict: &run.registry,
            subcall_summary: None,
        }
    }

    /// Attach a subcall roll-up to the snapshot.
    #[must_use]
    pub fn with_rollup(mut self, rollup: &'a Rollup) -> Self {
        self.subcall_summary = Some(rollup);
        self
    }

    /// # Errors
    ///
    /// Serialization or underlying writer failures.
    pub fn write_json<W: std::io::Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(writer, self)
    }

    /// # Errors
    ///
    /// Serialization failures.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callgraph::accumulate::accumulate_call_times;
    use crate::callgraph::rollup::rollup_subcalls;
    use crate::ingest::receiver::Receiver;
    use callscope_wire::{Descriptor, ExitAnnotation, FnId, Message, Timestamp};
    use std::collections::HashMap;

    const MAIN_FRAME: &str = "main (/srv/app.js:1:2)";

    #[test]
    fn test_snapshot_uses_formatter_field_names() {
        let mut receiver = Receiver::new();
        receiver.ingest(Message::Descriptors {
            o: HashMap::from([(
                FnId(1),
                Descriptor {
                    name: Some("main (/srv/app.js:1:0)".to_string()),
                    ..Descriptor::default()
                },
            )]),
        });
        receiver.ingest(Message::FunctionExit {
            i: FnId(1),
            stack: vec![MAIN_FRAME.to_string()],
            t: Timestamp(30.0),
            an: ExitAnnotation { fnid: FnId(1), start_time: Timestamp(0.0) },
        });
        let mut run = receiver.finish().unwrap();
        accumulate_call_times(&mut run.graph);
        let rollup = rollup_subcalls(&run.graph);

        let json = RunSnapshot::new(&run).with_rollup(&rollup).to_json_string().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value["elapsedTimeTotal"].is_number());
        // no frame registrations happened, so the raw frame text is the key
        let node = &value["callgraph"]["subcalls"][MAIN_FRAME];
        assert_eq!(node["calls"], 1);
        assert_eq!(node["callTimesTotal"], 30.0);
        assert_eq!(node["callRecords"][0], serde_json::json!([0.0, 30.0, 0.0]));
        assert_eq!(value["flatcalls"]["1"]["callTimesTotal"], 30.0);
        assert_eq!(value["sourceDict"]["1"]["name"], "main (/srv/app.js:1:0)");
        assert_eq!(value["subcallSummary"]["frames"][MAIN_FRAME]["selfTime"], 30.0);
    }
}
