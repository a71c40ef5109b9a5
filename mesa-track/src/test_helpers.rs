// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

//! This module provides helper functions for testing logging output.
//!
//! The aim of this module is to provide commonly-used functions that enable
//! the testing of the output that should appear from the logging macros.

use std::cell::{Cell, RefCell};

use regex::Regex;

use crate::{Tag, Track};

/// A tracker that keeps track events in memory.
pub struct TestTracker {
    events: RefCell<Vec<String>>,

    next_tag: Cell<u64>,
}

impl TestTracker {
    /// Create a new [`Tracker`](crate::Tracker) for the tests.
    ///
    /// This keeps the track events in memory for checking later.
    #[must_use]
    pub fn new(initial_tag: u64) -> Self {
        Self {
            events: RefCell::new(Vec::new()),
            next_tag: Cell::new(initial_tag),
        }
    }

    fn add_event(&self, event: String) {
        println!("{event}");
        self.events.borrow_mut().push(event);
    }
}

impl Track for TestTracker {
    fn unique_tag(&self) -> Tag {
        let tag = self.next_tag.get();
        self.next_tag.set(tag + 1);
        Tag(tag)
    }

    fn add_entity(&self, _tag: Tag, _entity_name: &str) {
        // Do nothing - every entity is fully enabled
    }

    fn is_entity_enabled(&self, _tag: Tag, _level: log::Level) -> bool {
        true
    }

    fn enter(&self, tag: Tag, object: Tag) {
        self.add_event(format!("{tag}: enter {object}"));
    }

    fn exit(&self, tag: Tag, object: Tag) {
        self.add_event(format!("{tag}: exit {object}"));
    }

    fn create(&self, created_by: Tag, tag: Tag, name: &str) {
        self.add_event(format!("{created_by}: created {tag}, {name}"));
    }

    fn destroy(&self, destroyed_by: Tag, tag: Tag) {
        self.add_event(format!("{destroyed_by}: destroyed {tag}"));
    }

    fn log(&self, tag: Tag, level: log::Level, msg: std::fmt::Arguments) {
        self.add_event(format!("{tag}:{level}: {msg}"));
    }

    fn time(&self, set_by: Tag, time_ns: f64) {
        self.add_event(format!("{set_by}: set time to {time_ns:.1}ns"));
    }

    fn shutdown(&self) {
        // Do nothing
    }
}

/// Install a [`TestTracker`] that will capture all _track_ events.
///
/// Returns both the concrete tracker (for checking) and the type-erased
/// [`Tracker`](crate::Tracker) (for building entities).
///
/// # Arguments
///
/// * `start_tag` - The tag value to be used as the starting value.
///
/// # Examples
///
/// ```rust
/// use mesa_track::test_helpers;
///
/// let (test_tracker, tracker) = mesa_track::test_init!(10);
/// let top = mesa_track::entity::toplevel(&tracker, "top");
/// test_helpers::check_and_clear(&test_tracker, &["0: created 10, top"]);
/// ```
#[macro_export]
macro_rules! test_init {
    ($start_tag:expr) => {{
        let test_tracker = std::rc::Rc::new($crate::test_helpers::TestTracker::new($start_tag));
        let tracker: $crate::Tracker = test_tracker.clone();
        (test_tracker, tracker)
    }};
}

/// Check and clear the _trace_ and _log_ output.
///
/// This function asserts that the logging output lines seen since the start
/// (or the last time this function was called) match the expected regular
/// expressions, then clears the recorded output.
pub fn check_and_clear(tracker: &TestTracker, expected: &[&str]) {
    let mut events = tracker.events.borrow_mut();

    println!("Checking {:?} matches {:?}", expected, *events);

    assert_eq!(expected.len(), events.len());

    for (expect, actual) in expected.iter().zip(events.iter()) {
        let re = Regex::new(expect).unwrap();
        assert!(re.is_match(actual), "{expect:?} does not match {actual:?}");
    }

    events.clear();
}
