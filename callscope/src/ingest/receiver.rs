//! The instrumentation event router.
//!
//! Consumes the four wire record kinds and builds the call graph and the
//! flat per-function index, resolving raw stack frames through the
//! [`FrameResolver`].
//!
//! Because descriptor batches and function-exit events travel independently,
//! delivery order across the transport is not guaranteed: an exit may
//! reference a descriptor id not yet registered. Such operations park in a
//! deferred queue keyed by the missing id, drained whenever a matching batch
//! arrives, and aged by [`Receiver::tick`]. The timeout budget scales with
//! the number of other waits in flight - burst load means more acceptable
//! latency - and exhausting it is fatal, since continuing would corrupt
//! timing data silently.

use crate::callgraph::flat::FlatIndex;
use crate::callgraph::tree::CallGraph;
use crate::domain::{IngestError, ProtocolError};
use crate::ingest::registry::DescriptorRegistry;
use crate::resolve::FrameResolver;
use callscope_wire::{
    is_async_frame, ExitAnnotation, FnId, Message, Timestamp, ASYNC_SUFFIX,
};
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Tuning for the deferred-descriptor retry loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// How often the server loop ages the deferred queue.
    pub tick_interval: Duration,
    /// A deferred operation times out after `in_flight * attempt_scale`
    /// ticks, where `in_flight` counts every currently parked operation.
    pub attempt_scale: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { tick_interval: Duration::from_millis(5), attempt_scale: 100 }
    }
}

/// An operation parked until its descriptor id arrives.
#[derive(Debug)]
enum DeferredOp {
    /// `pc`: write the enclosing-function back-reference.
    SetRet { fnid: FnId },
    /// `e`: record the call in the graph and the flat index.
    Exit { stack: Vec<String>, end: Timestamp, an: ExitAnnotation },
}

#[derive(Debug)]
struct Deferred {
    op: DeferredOp,
    attempts: u32,
}

/// Per-run ingest diagnostics.
#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    /// Records routed, all kinds.
    pub records: usize,
    pub descriptor_batches: usize,
    pub descriptors: usize,
    pub frame_registrations: usize,
    pub exits: usize,
    /// Operations that had to wait for a descriptor.
    pub deferred: usize,
    /// Deferred operations completed by a later batch.
    pub drained: usize,
}

/// Everything a finished profiling run produced. Read-only from here on:
/// the analysis passes rewrite the graph in place but nothing ingests into
/// it anymore.
#[derive(Debug)]
pub struct ProfileRun {
    pub graph: CallGraph,
    pub flat: FlatIndex,
    pub registry: DescriptorRegistry,
    pub stats: IngestStats,
    /// Wall-clock length of the ingestion session, milliseconds.
    pub elapsed_ms: f64,
}

/// Terminal of the wire protocol. Exclusively owns all run state while the
/// event stream is active.
pub struct Receiver {
    registry: DescriptorRegistry,
    resolver: FrameResolver,
    graph: CallGraph,
    flat: FlatIndex,
    pending: HashMap<FnId, Vec<Deferred>>,
    /// Ids whose terminal stack frame is already registered; the mapping is
    /// structural, so later `pc`/`f` records for the same id are ignored.
    registered_frames: HashSet<FnId>,
    policy: RetryPolicy,
    started: Instant,
    pub stats: IngestStats,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver {
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    #[must_use]
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            registry: DescriptorRegistry::new(),
            resolver: FrameResolver::new(),
            graph: CallGraph::new(),
            flat: FlatIndex::new(),
            pending: HashMap::new(),
            registered_frames: HashSet::new(),
            policy,
            started: Instant::now(),
            stats: IngestStats::default(),
        }
    }

    /// Route one reassembled JSON record.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnknownRecord`] for any record that is not one of
    /// the four wire kinds - fatal for the run.
    pub fn ingest_value(&mut self, value: Value) -> Result<(), ProtocolError> {
        match Message::deserialize(&value) {
            Ok(message) => {
                self.ingest(message);
                Ok(())
            }
            Err(_) => Err(ProtocolError::UnknownRecord(value.to_string())),
        }
    }

    /// Route one decoded record.
    pub fn ingest(&mut self, message: Message) {
        self.stats.records += 1;
        match message {
            Message::Descriptors { o } => {
                self.stats.descriptor_batches += 1;
                self.stats.descriptors += o.len();
                let arrived = self.registry.merge(o);
                self.drain(&arrived);
            }
            Message::PreCall { i, terminal_stack_frame, fnid } => {
                self.register_frame(i, &terminal_stack_frame);
                self.defer_or_run(i, DeferredOp::SetRet { fnid });
            }
            Message::FunctionEntry { i, terminal_stack_frame } => {
                self.register_frame(i, &terminal_stack_frame);
            }
            Message::FunctionExit { i, stack, t, an } => {
                self.stats.exits += 1;
                self.defer_or_run(i, DeferredOp::Exit { stack, end: t, an });
            }
        }
    }

    /// Age the deferred queue; called by the server loop at
    /// [`RetryPolicy::tick_interval`].
    ///
    /// # Errors
    ///
    /// [`IngestError::OrderingTimeout`] once any parked operation exhausts
    /// its budget.
    pub fn tick(&mut self) -> Result<(), IngestError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let in_flight: u32 = self.pending.values().map(|ops| ops.len() as u32).sum();
        let budget = in_flight * self.policy.attempt_scale;
        for (&id, ops) in &mut self.pending {
            for deferred in ops.iter_mut() {
                deferred.attempts += 1;
                if deferred.attempts > budget {
                    return Err(IngestError::OrderingTimeout {
                        fnid: id,
                        attempts: deferred.attempts,
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether any operation is still waiting on a descriptor.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// End the run: the stream is closed, so descriptors still missing can
    /// never arrive.
    ///
    /// # Errors
    ///
    /// [`IngestError::OrderingTimeout`] if deferred operations remain.
    pub fn finish(self) -> Result<ProfileRun, IngestError> {
        if let Some((&id, ops)) = self.pending.iter().next() {
            let attempts = ops.iter().map(|op| op.attempts).max().unwrap_or(0);
            return Err(IngestError::OrderingTimeout { fnid: id, attempts });
        }
        let stats = self.stats;
        info!(
            "run complete: {} records, {} exits, {} frame registrations, {} deferred ({} drained)",
            stats.records, stats.exits, stats.frame_registrations, stats.deferred, stats.drained
        );
        Ok(ProfileRun {
            graph: self.graph,
            flat: self.flat,
            registry: self.registry,
            elapsed_ms: self.started.elapsed().as_secs_f64() * 1e3,
            stats,
        })
    }

    fn register_frame(&mut self, id: FnId, frame_text: &str) {
        if self.registered_frames.insert(id) {
            self.resolver.register(frame_text, id);
            self.stats.frame_registrations += 1;
        } else {
            debug!("duplicate frame registration for {id} ignored");
        }
    }

    fn defer_or_run(&mut self, id: FnId, op: DeferredOp) {
        if self.registry.contains(id) {
            self.run_op(id, op);
        } else {
            debug!("descriptor {id} not seen yet, deferring");
            self.stats.deferred += 1;
            self.pending.entry(id).or_default().push(Deferred { op, attempts: 0 });
        }
    }

    fn drain(&mut self, arrived: &[FnId]) {
        for &id in arrived {
            if let Some(ops) = self.pending.remove(&id) {
                for deferred in ops {
                    self.stats.drained += 1;
                    self.run_op(id, deferred.op);
                }
            }
        }
    }

    fn run_op(&mut self, id: FnId, op: DeferredOp) {
        match op {
            DeferredOp::SetRet { fnid } => self.registry.set_ret(id, fnid),
            DeferredOp::Exit { stack, end, an } => self.record_exit(id, &stack, end, an),
        }
    }

    fn record_exit(&mut self, id: FnId, stack: &[String], end: Timestamp, an: ExitAnnotation) {
        self.registry.set_ret(id, an.fnid);

        let frames: Vec<(String, FnId)> =
            stack.iter().map(|text| self.frame_identity(text)).collect();
        self.graph.record_call(&frames, an.start_time, end);

        self.flat.record(an.fnid, end - an.start_time);
    }

    /// Map raw frame text to (frame name, descriptor id): resolve the text
    /// to a call-site id, follow its `ret` to the enclosing function, and
    /// prefer that function's registered name over the raw text. An async
    /// suffix on the raw text survives the substitution.
    fn frame_identity(&self, frame_text: &str) -> (String, FnId) {
        let site = self.resolver.resolve(frame_text);
        let fnid = self.registry.ret_of(site).unwrap_or(FnId::UNKNOWN);
        let frame_name = match self.registry.name_of(fnid) {
            Some(name) if is_async_frame(frame_text) && !is_async_frame(name) => {
                format!("{name}{ASYNC_SUFFIX}")
            }
            Some(name) => name.to_string(),
            None => frame_text.to_string(),
        };
        (frame_name, fnid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callscope_wire::Descriptor;

    fn descriptor_batch(entries: &[(i64, Option<&str>)]) -> Message {
        Message::Descriptors {
            o: entries
                .iter()
                .map(|&(id, name)| {
                    (
                        FnId(id),
                        Descriptor {
                            name: name.map(ToString::to_string),
                            ..Descriptor::default()
                        },
                    )
                })
                .collect(),
        }
    }

    fn pre_call(i: i64, frame: &str, fnid: i64) -> Message {
        Message::PreCall {
            i: FnId(i),
            terminal_stack_frame: frame.to_string(),
            fnid: FnId(fnid),
        }
    }

    fn exit(i: i64, stack: &[&str], start: f64, end: f64, fnid: i64) -> Message {
        Message::FunctionExit {
            i: FnId(i),
            stack: stack.iter().map(ToString::to_string).collect(),
            t: Timestamp(end),
            an: ExitAnnotation { fnid: FnId(fnid), start_time: Timestamp(start) },
        }
    }

    /// Registers descriptors and pc mappings for a two-function program:
    /// `main` (id 1) calling `a` (id 2), with call-site ids 10/11 and
    /// exit-site ids 20/21.
    fn seed(receiver: &mut Receiver) {
        receiver.ingest(descriptor_batch(&[
            (1, Some("main (/srv/app.js:1:0)")),
            (2, Some("a (/srv/app.js:2:10)")),
            (10, None),
            (11, None),
            (20, None),
            (21, None),
        ]));
        receiver.ingest(pre_call(10, "main (/srv/app.js:5:8)", 1));
        receiver.ingest(pre_call(11, "a (/srv/app.js:2:12)", 2));
    }

    #[test]
    fn test_exit_builds_named_tree_and_flat_index() {
        let mut receiver = Receiver::new();
        seed(&mut receiver);

        receiver
            .ingest(exit(21, &["main (/srv/app.js:5:8)", "a (/srv/app.js:2:12)"], 10.0, 30.0, 2));
        receiver.ingest(exit(20, &["main (/srv/app.js:5:8)"], 0.0, 100.0, 1));

        let run = receiver.finish().unwrap();
        let main = run.graph.node(&["main (/srv/app.js:1:0)"]).unwrap();
        assert_eq!(main.fnid, FnId(1));
        assert_eq!(main.calls, 1);
        let a = run.graph.node(&["main (/srv/app.js:1:0)", "a (/srv/app.js:2:10)"]).unwrap();
        assert_eq!(a.calls, 1);
        assert!((a.call_records[0].start - 10.0).abs() < 1e-9);

        assert_eq!(run.flat.get(FnId(1)).unwrap().calls, 1);
        assert!((run.flat.get(FnId(2)).unwrap().call_times_total - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_unresolvable_frame_keeps_raw_text() {
        let mut receiver = Receiver::new();
        seed(&mut receiver);

        receiver.ingest(exit(
            21,
            &["main (/srv/app.js:5:8)", "Timer.onTimeout (timers.js:112:15) <async>", "a (/srv/app.js:2:12)"],
            50.0,
            60.0,
            2,
        ));

        let run = receiver.finish().unwrap();
        let timer = run
            .graph
            .node(&["main (/srv/app.js:1:0)", "Timer.onTimeout (timers.js:112:15) <async>"])
            .unwrap();
        assert_eq!(timer.fnid, FnId::UNKNOWN);
        assert_eq!(timer.calls, 0);
        assert!(timer.child("a (/srv/app.js:2:10)").is_some());
    }

    #[test]
    fn test_async_suffix_survives_name_substitution() {
        let mut receiver = Receiver::new();
        seed(&mut receiver);

        receiver.ingest(exit(
            21,
            &["main (/srv/app.js:5:8)", "a (/srv/app.js:2:12) <async>"],
            50.0,
            60.0,
            2,
        ));

        let run = receiver.finish().unwrap();
        let main = run.graph.node(&["main (/srv/app.js:1:0)"]).unwrap();
        assert!(main.child("a (/srv/app.js:2:10) <async>").is_some());
    }

    #[test]
    fn test_exit_before_descriptor_defers_and_drains() {
        let mut receiver = Receiver::new();
        seed(&mut receiver);

        receiver
            .ingest(exit(99, &["main (/srv/app.js:5:8)", "a (/srv/app.js:2:12)"], 10.0, 30.0, 2));
        assert!(receiver.has_pending());
        assert!(receiver.graph.node(&["main (/srv/app.js:1:0)"]).is_none());

        receiver.ingest(descriptor_batch(&[(99, None)]));
        assert!(!receiver.has_pending());

        let run = receiver.finish().unwrap();
        assert_eq!(run.stats.deferred, 1);
        assert_eq!(run.stats.drained, 1);
        assert_eq!(
            run.graph
                .node(&["main (/srv/app.js:1:0)", "a (/srv/app.js:2:10)"])
                .unwrap()
                .calls,
            1
        );
    }

    #[test]
    fn test_tick_budget_exhaustion_is_fatal() {
        let mut receiver = Receiver::with_policy(RetryPolicy {
            tick_interval: Duration::from_millis(1),
            attempt_scale: 3,
        });
        receiver.ingest(exit(99, &["main (/srv/app.js:5:8)"], 0.0, 1.0, 1));

        // one pending op: budget is 3 ticks
        assert!(receiver.tick().is_ok());
        assert!(receiver.tick().is_ok());
        assert!(receiver.tick().is_ok());
        let err = receiver.tick().unwrap_err();
        assert!(matches!(err, IngestError::OrderingTimeout { fnid, .. } if fnid == FnId(99)));
    }

    #[test]
    fn test_budget_scales_with_in_flight_waits() {
        let mut receiver = Receiver::with_policy(RetryPolicy {
            tick_interval: Duration::from_millis(1),
            attempt_scale: 3,
        });
        receiver.ingest(exit(98, &["x (/srv/app.js:1:1)"], 0.0, 1.0, 1));
        receiver.ingest(exit(99, &["y (/srv/app.js:2:1)"], 0.0, 1.0, 1));

        // two pending ops: budget stretches to 6 ticks
        for _ in 0..6 {
            assert!(receiver.tick().is_ok());
        }
        assert!(receiver.tick().is_err());
    }

    #[test]
    fn test_finish_with_pending_is_fatal() {
        let mut receiver = Receiver::new();
        receiver.ingest(exit(99, &["main (/srv/app.js:5:8)"], 0.0, 1.0, 1));
        assert!(matches!(
            receiver.finish(),
            Err(IngestError::OrderingTimeout { fnid, .. }) if fnid == FnId(99)
        ));
    }

    #[test]
    fn test_duplicate_frame_registration_ignored() {
        let mut receiver = Receiver::new();
        receiver.ingest(descriptor_batch(&[(10, None)]));
        receiver.ingest(pre_call(10, "main (/srv/app.js:5:8)", 1));
        receiver.ingest(pre_call(10, "main (/srv/app.js:9:2)", 1));
        assert_eq!(receiver.stats.frame_registrations, 1);
    }

    #[test]
    fn test_unknown_record_kind_is_protocol_error() {
        let mut receiver = Receiver::new();
        let err = receiver
            .ingest_value(serde_json::json!({"type": "c", "i": 1}))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownRecord(_)));
    }

    #[test]
    fn test_pre_call_sets_ret_after_descriptor_arrives() {
        let mut receiver = Receiver::new();
        receiver.ingest(pre_call(10, "main (/srv/app.js:5:8)", 1));
        assert!(receiver.has_pending());

        receiver.ingest(descriptor_batch(&[(10, None)]));
        assert_eq!(receiver.registry.ret_of(FnId(10)), Some(FnId(1)));
    }
}
