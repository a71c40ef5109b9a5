// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

//! Helpers shared by the engine and model test suites.

use std::io;
use std::rc::Rc;

use mesa_track::Tracker;
use mesa_track::tracker::{EntityManager, TextTracker};

use crate::engine::Engine;

/// Create a [`Tracker`] suitable for tests.
///
/// Warnings and errors are printed to stdout (captured by the test
/// harness); everything else is filtered. `full_filepath` is accepted so
/// tests can pass `file!()` and keep a record of where a trace came from.
#[must_use]
pub fn create_tracker(_full_filepath: &str) -> Tracker {
    let entity_manager = EntityManager::new(log::Level::Warn);
    let writer = Box::new(io::BufWriter::new(io::stdout()));
    Rc::new(TextTracker::new(entity_manager, writer))
}

/// Create an [`Engine`] suitable for tests.
#[must_use]
pub fn start_test(full_filepath: &str) -> Engine {
    Engine::new(&create_tracker(full_filepath))
}
