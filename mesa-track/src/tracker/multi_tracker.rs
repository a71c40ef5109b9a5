// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

use crate::tracker::Track;
use crate::{Tag, Tracker};

/// A tracker that forwards every event to a set of child trackers.
///
/// Tag allocation is delegated to the first child so that all children see
/// a consistent tag space.
pub struct MultiTracker {
    trackers: Vec<Tracker>,
}

impl MultiTracker {
    /// Create a [`MultiTracker`] from the given children.
    ///
    /// **Panics** if `trackers` is empty.
    #[must_use]
    pub fn new(trackers: Vec<Tracker>) -> Self {
        assert!(!trackers.is_empty(), "MultiTracker requires a child");
        Self { trackers }
    }
}

impl Track for MultiTracker {
    fn unique_tag(&self) -> Tag {
        self.trackers[0].unique_tag()
    }

    fn add_entity(&self, tag: Tag, entity_name: &str) {
        for tracker in &self.trackers {
            tracker.add_entity(tag, entity_name);
        }
    }

    fn is_entity_enabled(&self, tag: Tag, level: log::Level) -> bool {
        self.trackers
            .iter()
            .any(|tracker| tracker.is_entity_enabled(tag, level))
    }

    fn enter(&self, tag: Tag, object: Tag) {
        for tracker in &self.trackers {
            if tracker.is_entity_enabled(tag, log::Level::Trace) {
                tracker.enter(tag, object);
            }
        }
    }

    fn exit(&self, tag: Tag, object: Tag) {
        for tracker in &self.trackers {
            if tracker.is_entity_enabled(tag, log::Level::Trace) {
                tracker.exit(tag, object);
            }
        }
    }

    fn create(&self, created_by: Tag, tag: Tag, name: &str) {
        for tracker in &self.trackers {
            if tracker.is_entity_enabled(created_by, log::Level::Trace) {
                tracker.create(created_by, tag, name);
            }
        }
    }

    fn destroy(&self, destroyed_by: Tag, tag: Tag) {
        for tracker in &self.trackers {
            if tracker.is_entity_enabled(destroyed_by, log::Level::Trace) {
                tracker.destroy(destroyed_by, tag);
            }
        }
    }

    fn log(&self, tag: Tag, level: log::Level, msg: std::fmt::Arguments) {
        for tracker in &self.trackers {
            if tracker.is_entity_enabled(tag, level) {
                tracker.log(tag, level, msg);
            }
        }
    }

    fn time(&self, set_by: Tag, time_ns: f64) {
        for tracker in &self.trackers {
            tracker.time(set_by, time_ns);
        }
    }

    fn shutdown(&self) {
        for tracker in &self.trackers {
            tracker.shutdown();
        }
    }
}
