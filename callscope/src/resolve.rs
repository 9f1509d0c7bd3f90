//! Fuzzy stack-frame resolution.
//!
//! Raw stack traces report the column of the *current* sub-expression, which
//! can differ slightly from the column recorded when the enclosing construct
//! was instrumented. Frames are therefore keyed on name+file+line with the
//! column stripped, and a lookup picks the registered column numerically
//! closest to the queried one. This disambiguates multiple call sites
//! defined on a single line.
//!
//! The map is unbounded process-wide state for the duration of one profiling
//! run; runs are single sessions, so nothing is ever evicted.

use callscope_wire::FnId;
use log::debug;
use std::collections::HashMap;

/// Maps terminal stack-frame text to registered descriptor ids.
///
/// Registration stores `"a (/srv/app.js:10:10)" → id` under the key
/// `"a (/srv/app.js:10"` with column `10`; a later lookup for
/// `"a (/srv/app.js:10:16)"` finds the same key and picks the nearest
/// registered column.
#[derive(Debug, Default)]
pub struct FrameResolver {
    /// name+file+line key → registered column → descriptor id.
    columns: HashMap<String, HashMap<u32, FnId>>,
}

impl FrameResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `frame_text` maps to `id` at the column embedded in the
    /// text. Registering the same column again overwrites.
    pub fn register(&mut self, frame_text: &str, id: FnId) {
        let Some((key, col)) = split_frame(frame_text) else {
            debug!("ignoring frame registration without a column: {frame_text}");
            return;
        };
        self.columns.entry(key).or_default().insert(col, id);
    }

    /// Resolve frame text to the registered id whose column is numerically
    /// closest to the queried column.
    ///
    /// Returns [`FnId::UNKNOWN`] when the name+file+line was never
    /// registered or the text carries no column. Ties break toward the
    /// lower column.
    #[must_use]
    pub fn resolve(&self, frame_text: &str) -> FnId {
        let Some((key, col)) = split_frame(frame_text) else {
            return FnId::UNKNOWN;
        };
        let Some(registered) = self.columns.get(&key) else {
            return FnId::UNKNOWN;
        };
        registered
            .iter()
            .min_by_key(|(&c, _)| (c.abs_diff(col), c))
            .map_or(FnId::UNKNOWN, |(_, &id)| id)
    }

    /// Number of distinct name+file+line keys registered so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Split `"a (/srv/app.js:10:16)"` into the column-stripped key
/// `"a (/srv/app.js:10"` and the column `16`. Tolerates a trailing async
/// suffix after the closing parenthesis.
fn split_frame(frame_text: &str) -> Option<(String, u32)> {
    let parts: Vec<&str> = frame_text.split(':').collect();
    if parts.len() < 3 {
        return None;
    }
    let col: u32 = parts[2].split(')').next()?.parse().ok()?;
    Some((parts[..2].join(":"), col))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_nearest_column() {
        let mut resolver = FrameResolver::new();
        resolver.register("a (/srv/app.js:10:10)", FnId(1));
        resolver.register("a (/srv/app.js:10:20)", FnId(2));

        // 16 is closer to 20, 12 is closer to 10
        assert_eq!(resolver.resolve("a (/srv/app.js:10:16)"), FnId(2));
        assert_eq!(resolver.resolve("a (/srv/app.js:10:12)"), FnId(1));
        assert_eq!(resolver.resolve("a (/srv/app.js:10:10)"), FnId(1));
    }

    #[test]
    fn test_tie_breaks_toward_lower_column() {
        let mut resolver = FrameResolver::new();
        resolver.register("a (/srv/app.js:10:10)", FnId(1));
        resolver.register("a (/srv/app.js:10:20)", FnId(2));

        assert_eq!(resolver.resolve("a (/srv/app.js:10:15)"), FnId(1));
    }

    #[test]
    fn test_unregistered_line_is_unknown() {
        let mut resolver = FrameResolver::new();
        resolver.register("a (/srv/app.js:10:10)", FnId(1));

        assert_eq!(resolver.resolve("a (/srv/app.js:11:10)"), FnId::UNKNOWN);
        assert_eq!(resolver.resolve("b (/srv/other.js:10:10)"), FnId::UNKNOWN);
    }

    #[test]
    fn test_frame_without_column_is_unknown() {
        let resolver = FrameResolver::new();
        assert_eq!(resolver.resolve("native code"), FnId::UNKNOWN);
        assert_eq!(resolver.resolve("a (/srv/app.js)"), FnId::UNKNOWN);
    }

    #[test]
    fn test_async_suffix_does_not_disturb_lookup() {
        let mut resolver = FrameResolver::new();
        resolver.register("onTimeout (timers.js:112:15)", FnId(7));

        assert_eq!(resolver.resolve("onTimeout (timers.js:112:17) <async>"), FnId(7));
    }

    #[test]
    fn test_same_line_distinct_registrations() {
        let mut resolver = FrameResolver::new();
        resolver.register("a (/srv/app.js:3:4)", FnId(1));
        resolver.register("b (/srv/app.js:3:4)", FnId(2));

        assert_eq!(resolver.resolve("a (/srv/app.js:3:6)"), FnId(1));
        assert_eq!(resolver.resolve("b (/srv/app.js:3:6)"), FnId(2));
        assert_eq!(resolver.len(), 2);
    }
}
