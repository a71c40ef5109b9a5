// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

use std::cell::Cell;

use crate::tracker::Track;
use crate::{ROOT, Tag};

/// A tracker that does nothing.
///
/// This can be useful for benchmarks that want to have minimum overheads.
/// Unique tags are still allocated so that models relying on distinct tags
/// keep working.
pub struct DevNullTracker {
    next_tag: Cell<u64>,
}

impl DevNullTracker {
    /// Create a new [`DevNullTracker`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_tag: Cell::new(ROOT.0 + 1),
        }
    }
}

impl Default for DevNullTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Track for DevNullTracker {
    fn unique_tag(&self) -> Tag {
        let tag = self.next_tag.get();
        self.next_tag.set(tag + 1);
        Tag(tag)
    }

    fn add_entity(&self, _tag: Tag, _entity_name: &str) {}

    fn is_entity_enabled(&self, _tag: Tag, _level: log::Level) -> bool {
        false
    }

    fn enter(&self, _tag: Tag, _object: Tag) {}
    fn exit(&self, _tag: Tag, _object: Tag) {}
    fn create(&self, _created_by: Tag, _tag: Tag, _name: &str) {}
    fn destroy(&self, _destroyed_by: Tag, _tag: Tag) {}
    fn log(&self, _tag: Tag, _level: log::Level, _msg: std::fmt::Arguments) {}
    fn time(&self, _set_by: Tag, _time_ns: f64) {}
    fn shutdown(&self) {}
}
