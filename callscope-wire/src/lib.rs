//! # Wire Protocol (instrumented process ↔ receiver)
//!
//! Defines the records exchanged between an instrumented process and the
//! callscope receiver over a newline-delimited JSON byte stream, one TCP
//! connection per profiling run.
//!
//! Four record kinds travel on the wire:
//!
//! - [`Message::Descriptors`] (`"s"`) - batch-register static descriptors
//! - [`Message::PreCall`] (`"pc"`) - pre-call frame registration
//! - [`Message::FunctionEntry`] (`"f"`) - function-entry frame registration
//! - [`Message::FunctionExit`] (`"e"`) - function exit with full caller chain
//!
//! Any other `type` value is a fatal protocol error on the receiving side.
//! The upstream instrumenter is expected to have stripped profiler-internal
//! frames from stack traces, leaving only the async-boundary marker that
//! becomes the [`ASYNC_SUFFIX`] on the frame that follows it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Frame-name convention
// ============================================================================

/// Suffix marking a frame whose immediate predecessor on the recorded stack
/// trace was an asynchronous boundary: `"b (/srv/app.js:6:14) <async>"`.
pub const ASYNC_SUFFIX: &str = " <async>";

/// Returns `true` if a frame name carries the asynchronous-boundary marker.
#[must_use]
pub fn is_async_frame(frame_name: &str) -> bool {
    frame_name.contains(ASYNC_SUFFIX.trim_start())
}

// ============================================================================
// Identifiers and timestamps
// ============================================================================

/// Static descriptor id assigned by the instrumentation step.
///
/// Negative values never come off the wire; [`FnId::UNKNOWN`] (-1) is the
/// explicit sentinel for a stack frame that resolves to no registered
/// descriptor. Unknown ids are legitimate, if opaque, everywhere downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FnId(pub i64);

impl FnId {
    /// Resolution-failure sentinel.
    pub const UNKNOWN: FnId = FnId(-1);

    /// Returns `true` unless this is the unknown sentinel.
    #[must_use]
    pub fn is_known(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for FnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

/// Monotonic clock value in milliseconds, with fractional precision.
///
/// The emitter uses a performance-now style clock; values are only
/// meaningful relative to each other within one profiling run.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub f64);

impl Timestamp {
    #[must_use]
    pub fn as_millis(self) -> f64 {
        self.0
    }
}

impl std::ops::Sub for Timestamp {
    type Output = f64;

    /// Elapsed milliseconds between two timestamps of the same run.
    fn sub(self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }
}

// ============================================================================
// Static descriptors
// ============================================================================

/// Static metadata about one instrumented source location.
///
/// Produced exactly once per distinct code location by the instrumentation
/// step; immutable on the wire. The receiver owns the registry of these for
/// the lifetime of one profiling run and fills in `ret` back-references as
/// `pc`/`e` events reveal them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Start column of the instrumented construct.
    #[serde(rename = "sx", skip_serializing_if = "Option::is_none")]
    pub start_col: Option<u32>,

    /// Start line.
    #[serde(rename = "sy", skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,

    /// End column.
    #[serde(rename = "ex", skip_serializing_if = "Option::is_none")]
    pub end_col: Option<u32>,

    /// End line.
    #[serde(rename = "ey", skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,

    /// Human-readable name, `"<fn> (<path>:<line>:<col>)"` for functions.
    #[serde(alias = "n", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Back-reference to the enclosing function's descriptor id.
    ///
    /// Call-site descriptors carry this from the start; function descriptors
    /// learn it from `pc`/`e` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ret: Option<FnId>,

    /// Set (to 1) when this id was generated for a return statement.
    #[serde(rename = "r", skip_serializing_if = "Option::is_none")]
    pub return_site: Option<u8>,
}

impl Descriptor {
    /// Returns `true` for ids generated by return-statement instrumentation.
    #[must_use]
    pub fn is_return_site(&self) -> bool {
        self.return_site.is_some()
    }
}

// ============================================================================
// Wire messages
// ============================================================================

/// Annotation attached to a function-exit record: which function finished
/// and when it started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitAnnotation {
    pub fnid: FnId,
    #[serde(rename = "startTime")]
    pub start_time: Timestamp,
}

/// One newline-delimited record of the instrumentation stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Batch-register static descriptors, keyed by id.
    #[serde(rename = "s")]
    Descriptors {
        #[serde(deserialize_with = "descriptor_batch_keys")]
        o: HashMap<FnId, Descriptor>,
    },

    /// Register the terminal stack frame observed just before a value at
    /// call site `i` executes; `fnid` is the enclosing function.
    #[serde(rename = "pc")]
    PreCall {
        i: FnId,
        #[serde(rename = "terminalStackFrame")]
        terminal_stack_frame: String,
        fnid: FnId,
    },

    /// Register the terminal stack frame observed at function entry.
    #[serde(rename = "f")]
    FunctionEntry {
        i: FnId,
        #[serde(rename = "terminalStackFrame")]
        terminal_stack_frame: String,
    },

    /// Function exit: the full caller chain (outer → inner, each frame
    /// possibly suffixed with [`ASYNC_SUFFIX`]), the end timestamp, and the
    /// annotation carrying the matching start timestamp.
    #[serde(rename = "e")]
    FunctionExit {
        i: FnId,
        stack: Vec<String>,
        t: Timestamp,
        an: ExitAnnotation,
    },
}

/// JSON object keys are always strings; parse them back into ids. Kept
/// explicit because the tagged-record envelope buffers the batch before the
/// map is deserialized, so integer-keyed maps cannot be relied on.
fn descriptor_batch_keys<'de, D>(deserializer: D) -> Result<HashMap<FnId, Descriptor>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = HashMap::<String, Descriptor>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, descriptor)| {
            key.parse::<i64>()
                .map(|id| (FnId(id), descriptor))
                .map_err(|_| serde::de::Error::custom(format!("non-numeric descriptor id: {key}")))
        })
        .collect()
}
