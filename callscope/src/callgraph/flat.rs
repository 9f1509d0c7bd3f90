//! Path-independent per-function call index.
//!
//! Updated on every function-exit regardless of call path; feeds
//! function-centric ("flat", gprof-style) reports directly.

use callscope_wire::FnId;
use serde::Serialize;
use std::collections::HashMap;

/// Aggregate for one function across every call path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatCall {
    #[serde(rename = "i")]
    pub fnid: FnId,

    pub calls: u64,

    /// Total elapsed time across all invocations, milliseconds.
    #[serde(rename = "callTimesTotal")]
    pub call_times_total: f64,
}

/// Descriptor id → aggregate call statistics.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct FlatIndex {
    entries: HashMap<FnId, FlatCall>,
}

impl FlatIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one invocation of `fnid` taking `elapsed` milliseconds.
    pub fn record(&mut self, fnid: FnId, elapsed: f64) {
        let entry = self
            .entries
            .entry(fnid)
            .or_insert(FlatCall { fnid, calls: 0, call_times_total: 0.0 });
        entry.calls += 1;
        entry.call_times_total += elapsed;
    }

    #[must_use]
    pub fn get(&self, fnid: FnId) -> Option<&FlatCall> {
        self.entries.get(&fnid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlatCall> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_aggregates_per_function() {
        let mut index = FlatIndex::new();
        index.record(FnId(1), 10.0);
        index.record(FnId(1), 5.0);
        index.record(FnId(2), 1.0);

        let one = index.get(FnId(1)).unwrap();
        assert_eq!(one.calls, 2);
        assert!((one.call_times_total - 15.0).abs() < 1e-9);
        assert_eq!(index.get(FnId(2)).unwrap().calls, 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_unknown_id_is_a_legitimate_key() {
        let mut index = FlatIndex::new();
        index.record(FnId::UNKNOWN, 2.5);
        assert_eq!(index.get(FnId::UNKNOWN).unwrap().calls, 1);
    }
}
