// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! Library functions to build trackers as defined by the user.

use std::io::BufWriter;
use std::rc::Rc;
use std::{fs, io};

use crate::tracker::{EntityManager, MultiTracker, TextTracker, TrackConfigError};
use crate::{Tracker, Writer};

/// Configuration options for an individual tracker.
pub struct TrackerConfig<'a> {
    /// Enable this tracker.
    pub enable: bool,

    /// Set the level at which this tracker should be enabled.
    pub level: log::Level,

    /// A regular expression to match which entities should have this level
    /// applied.
    pub filter_regex: &'a str,

    /// If required, the name of the file to which the tracker will write.
    pub file: Option<&'a str>,
}

impl Default for TrackerConfig<'_> {
    fn default() -> Self {
        Self {
            enable: true,
            level: log::Level::Warn,
            filter_regex: "",
            file: None,
        }
    }
}

/// Configuration options for all tracking.
#[derive(Default)]
pub struct TrackersConfig<'a> {
    /// Configuration for stdout.
    pub stdout: TrackerConfig<'a>,

    /// Configuration for a text log file.
    pub file: TrackerConfig<'a>,
}

fn build_entity_manager(config: &TrackerConfig) -> Result<EntityManager, TrackConfigError> {
    // With a filter, unmatched entities only report errors.
    let default_level = if config.filter_regex.is_empty() {
        config.level
    } else {
        log::Level::Error
    };

    let mut entity_manager = EntityManager::new(default_level);
    if !config.filter_regex.is_empty() {
        entity_manager.add_entity_level_filter(config.filter_regex, config.level)?;
    }
    Ok(entity_manager)
}

/// Create a tracker that prints to stdout.
///
/// The user can pass a filter regular expression which will set the level
/// only for matching entities and set all other entities to only emit
/// errors.
fn build_stdout_tracker(config: &TrackerConfig) -> Result<Tracker, TrackConfigError> {
    let entity_manager = build_entity_manager(config)?;
    let stdout_writer = Box::new(io::BufWriter::new(io::stdout()));
    Ok(Rc::new(TextTracker::new(entity_manager, stdout_writer)))
}

/// Same as the stdout tracker (see [`build_stdout_tracker`]) except the text
/// output is written to a file.
fn build_file_tracker(config: &TrackerConfig) -> Result<Tracker, TrackConfigError> {
    let entity_manager = build_entity_manager(config)?;
    let file = config
        .file
        .ok_or_else(|| TrackConfigError("file tracker requires a file name".to_string()))?;
    let file_writer: Writer = Box::new(BufWriter::new(fs::File::create(file).map_err(
        |e| TrackConfigError(format!("failed to create {file}: {e}")),
    )?));
    Ok(Rc::new(TextTracker::new(entity_manager, file_writer)))
}

/// Set up stdout/file trackers according to the supplied configuration.
pub fn setup_trackers(config: &TrackersConfig) -> Result<Tracker, TrackConfigError> {
    let mut trackers = Vec::new();
    if config.stdout.enable {
        trackers.push(build_stdout_tracker(&config.stdout)?);
    }
    if config.file.enable {
        trackers.push(build_file_tracker(&config.file)?);
    }

    match trackers.len() {
        0 => Ok(crate::tracker::dev_null_tracker()),
        1 => Ok(trackers.pop().unwrap()),
        _ => Ok(Rc::new(MultiTracker::new(trackers))),
    }
}
