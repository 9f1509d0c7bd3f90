//! The static descriptor registry.
//!
//! Descriptors are produced exclusively by the instrumentation step and
//! merged here in batches; the receiver owns the registry for the lifetime
//! of one profiling run. Merging is idempotent per id, with one wrinkle: the
//! receiver itself writes `ret` back-references as `pc`/`e` events reveal
//! them, and a re-sent batch entry must not clobber a back-reference the
//! registry already learned.

use callscope_wire::{Descriptor, FnId};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct DescriptorRegistry {
    entries: HashMap<FnId, Descriptor>,
}

impl DescriptorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a descriptor batch. Returns the ids that arrived, so deferred
    /// operations waiting on them can be drained.
    pub fn merge(&mut self, batch: HashMap<FnId, Descriptor>) -> Vec<FnId> {
        let mut arrived = Vec::with_capacity(batch.len());
        for (id, mut descriptor) in batch {
            match self.entries.get(&id) {
                Some(existing) => {
                    if descriptor.ret.is_none() {
                        descriptor.ret = existing.ret;
                    }
                    self.entries.insert(id, descriptor);
                }
                None => {
                    self.entries.insert(id, descriptor);
                }
            }
            arrived.push(id);
        }
        debug!("descriptor registry now holds {} entries", self.entries.len());
        arrived
    }

    #[must_use]
    pub fn contains(&self, id: FnId) -> bool {
        self.entries.contains_key(&id)
    }

    #[must_use]
    pub fn get(&self, id: FnId) -> Option<&Descriptor> {
        self.entries.get(&id)
    }

    /// Registered name of `id`, if any.
    #[must_use]
    pub fn name_of(&self, id: FnId) -> Option<&str> {
        self.entries.get(&id)?.name.as_deref()
    }

    /// Enclosing-function back-reference of `id`, if known.
    #[must_use]
    pub fn ret_of(&self, id: FnId) -> Option<FnId> {
        self.entries.get(&id)?.ret
    }

    /// Write the enclosing-function back-reference for `id`. No-op if the
    /// descriptor is absent (callers defer until it has arrived).
    pub fn set_ret(&mut self, id: FnId, fnid: FnId) {
        if let Some(descriptor) = self.entries.get_mut(&id) {
            descriptor.ret = Some(fnid);
        }
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
