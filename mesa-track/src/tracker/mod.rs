// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

//! Define the [`Track`] trait and a number of [`Tracker`]s.

/// Include the /dev/null tracker.
pub mod dev_null;
/// Include the multi-tracker.
pub mod multi_tracker;
/// Include the text-based tracker.
pub mod text;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::rc::Rc;

pub use dev_null::DevNullTracker;
pub use multi_tracker::MultiTracker;
use regex::Regex;
pub use text::TextTracker;

use crate::{ROOT, Tag};

/// This is the interface that is supported by all [`Tracker`]s.
pub trait Track {
    /// Allocate a new global tag.
    fn unique_tag(&self) -> Tag;

    /// Register an entity so that its enable state can be resolved.
    fn add_entity(&self, tag: Tag, entity_name: &str);

    /// Determine whether track events at the given level are enabled for an
    /// entity.
    fn is_entity_enabled(&self, tag: Tag, level: log::Level) -> bool;

    /// Track when an object with the given tag arrives.
    fn enter(&self, tag: Tag, object: Tag);

    /// Track when an object with the given tag leaves.
    fn exit(&self, tag: Tag, object: Tag);

    /// Track when an object with the given tag is created.
    fn create(&self, created_by: Tag, tag: Tag, name: &str);

    /// Track when an object with the given tag is destroyed.
    fn destroy(&self, destroyed_by: Tag, tag: Tag);

    /// Track a log message of the given level.
    fn log(&self, tag: Tag, level: log::Level, msg: fmt::Arguments);

    /// Advance the time to the time specified in `ns`.
    fn time(&self, set_by: Tag, time_ns: f64);

    /// Flush any buffered output.
    fn shutdown(&self);
}

/// The type of a [`Tracker`] that is shared across entities.
pub type Tracker = Rc<dyn Track>;

/// Create a [`Tracker`] that prints all track events to `stdout`.
pub fn stdout_tracker() -> Tracker {
    let entity_manager = EntityManager::new(log::Level::Warn);
    let stdout_writer = Box::new(io::BufWriter::new(io::stdout()));
    let tracker: Tracker = Rc::new(TextTracker::new(entity_manager, stdout_writer));
    tracker
}

/// Create a [`Tracker`] that suppresses all track events.
pub fn dev_null_tracker() -> Tracker {
    let tracker: Tracker = Rc::new(DevNullTracker::new());
    tracker
}

/// Error raised when a tracker cannot be configured as requested.
#[derive(Debug)]
pub struct TrackConfigError(
    /// Description of the configuration problem.
    pub String,
);

impl fmt::Display for TrackConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Track configuration error: {}", self.0)
    }
}

impl std::error::Error for TrackConfigError {}

/// The [`EntityManager`] is responsible for determining entity log enable
/// states.
///
/// Entity names are matched against user-supplied regular expressions when
/// the entity is registered; unmatched entities (and free-standing object
/// tags) use the default level. The manager is also used to allocate unique
/// [`Tag`] values and to keep track of the current simulation time.
pub struct EntityManager {
    /// Level of _log_ events to output when no filter matches.
    default_log_level: log::Level,

    /// List of regular expressions mapping entity names to log levels.
    level_filters: Vec<(Regex, log::Level)>,

    /// Used to assign unique tags.
    next_tag: Cell<u64>,

    /// Level resolved for each registered entity.
    levels: RefCell<HashMap<Tag, log::Level>>,

    /// Keep track of the current time.
    current_time: Cell<f64>,
}

impl EntityManager {
    /// Constructor with the default [`log::Level`].
    #[must_use]
    pub fn new(default_log_level: log::Level) -> Self {
        Self {
            default_log_level,
            level_filters: Vec::new(),
            next_tag: Cell::new(ROOT.0 + 1),
            levels: RefCell::new(HashMap::new()),
            current_time: Cell::new(0.0),
        }
    }

    /// Add a level filter regular expression.
    ///
    /// Entities registered after this call whose full name matches the
    /// expression will emit events up to `level` instead of the default.
    ///
    /// # Example
    ///
    /// ```rust
    /// use mesa_track::tracker::EntityManager;
    /// let mut manager = EntityManager::new(log::Level::Warn);
    /// manager.add_entity_level_filter(".*ingress.*", log::Level::Trace).unwrap();
    /// ```
    pub fn add_entity_level_filter(
        &mut self,
        regex_str: &str,
        level: log::Level,
    ) -> Result<(), TrackConfigError> {
        match Regex::new(regex_str) {
            Ok(regex) => {
                self.level_filters.push((regex, level));
                Ok(())
            }
            Err(e) => Err(TrackConfigError(format!(
                "failed to parse regex {regex_str}: {e}"
            ))),
        }
    }

    fn unique_tag(&self) -> Tag {
        let tag = self.next_tag.get();
        self.next_tag.set(tag + 1);
        Tag(tag)
    }

    fn add_entity(&self, tag: Tag, entity_name: &str) {
        let level = self
            .level_filters
            .iter()
            .find(|(regex, _)| regex.is_match(entity_name))
            .map_or(self.default_log_level, |(_, level)| *level);
        self.levels.borrow_mut().insert(tag, level);
    }

    fn is_enabled(&self, tag: Tag, level: log::Level) -> bool {
        let resolved = self
            .levels
            .borrow()
            .get(&tag)
            .copied()
            .unwrap_or(self.default_log_level);
        level <= resolved
    }

    fn time(&self) -> f64 {
        self.current_time.get()
    }

    fn set_time(&self, new_time: f64) {
        assert!(new_time >= self.current_time.get(), "Time moving backwards");
        self.current_time.set(new_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_paths() -> Vec<&'static str> {
        vec!["top", "top::expander", "top::expander::ingress", "top::mem"]
    }

    fn register_all(manager: &EntityManager) -> Vec<Tag> {
        entity_paths()
            .iter()
            .map(|path| {
                let tag = manager.unique_tag();
                manager.add_entity(tag, path);
                tag
            })
            .collect()
    }

    #[test]
    fn no_filters() {
        let manager = EntityManager::new(log::Level::Error);
        let tags = register_all(&manager);

        for tag in tags {
            assert!(manager.is_enabled(tag, log::Level::Error));
            assert!(!manager.is_enabled(tag, log::Level::Warn));
        }
    }

    #[test]
    fn filter_overrides_default() {
        let mut manager = EntityManager::new(log::Level::Error);
        manager
            .add_entity_level_filter(".*ingress.*", log::Level::Trace)
            .unwrap();
        let tags = register_all(&manager);

        assert!(!manager.is_enabled(tags[1], log::Level::Trace));
        assert!(manager.is_enabled(tags[2], log::Level::Trace));
    }

    #[test]
    fn bad_regex_rejected() {
        let mut manager = EntityManager::new(log::Level::Warn);
        assert!(
            manager
                .add_entity_level_filter("*(", log::Level::Trace)
                .is_err()
        );
    }

    #[test]
    fn unregistered_tag_uses_default() {
        let manager = EntityManager::new(log::Level::Info);
        let tag = manager.unique_tag();
        assert!(manager.is_enabled(tag, log::Level::Info));
        assert!(!manager.is_enabled(tag, log::Level::Debug));
    }
}
