// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! The processing unit attached to the bypass path.
//!
//! The coordinator only needs the unit's activation surface: how many
//! executable contexts it has and how to point one at an entry address and
//! start it. What the unit executes is outside this model.

use std::cell::Cell;
use std::rc::Rc;

use mesa_track::entity::Entity;

/// One executable context of a processing unit.
pub trait ExecContext {
    /// Point the context at the address it should execute from.
    fn set_entry_point(&self, entry: u64);

    /// Is the context currently active?
    fn is_active(&self) -> bool;

    /// Activate the context. Idempotent.
    fn activate(&self);
}

/// A processing unit that can be attached to the bypass coordinator.
pub trait ProcessingUnit {
    /// Name for logging.
    fn name(&self) -> String;

    /// Number of executable contexts this unit exposes.
    fn num_contexts(&self) -> usize;

    /// Access a context by index.
    ///
    /// **Panics** if `index` is out of range.
    fn context(&self, index: usize) -> Rc<dyn ExecContext>;
}

/// Selects the kind of processing unit built for the bypass path.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum UnitKind {
    /// A simple in-order sequencer.
    #[default]
    Sequencer,
}

pub struct SequencerContext {
    entry: Cell<u64>,
    active: Cell<bool>,
}

impl SequencerContext {
    fn new() -> Self {
        Self {
            entry: Cell::new(0),
            active: Cell::new(false),
        }
    }

    #[must_use]
    pub fn entry_point(&self) -> u64 {
        self.entry.get()
    }
}

impl ExecContext for SequencerContext {
    fn set_entry_point(&self, entry: u64) {
        self.entry.set(entry);
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn activate(&self) {
        self.active.set(true);
    }
}

/// A minimal in-order unit with a configurable number of contexts.
pub struct SequencerUnit {
    pub entity: Rc<Entity>,
    contexts: Vec<Rc<SequencerContext>>,
}

impl SequencerUnit {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str, num_contexts: usize) -> Rc<Self> {
        let entity = Rc::new(Entity::new(parent, name));
        let contexts = (0..num_contexts)
            .map(|_| Rc::new(SequencerContext::new()))
            .collect();
        Rc::new(Self { entity, contexts })
    }
}

impl ProcessingUnit for SequencerUnit {
    fn name(&self) -> String {
        self.entity.full_name()
    }

    fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    fn context(&self, index: usize) -> Rc<dyn ExecContext> {
        self.contexts[index].clone()
    }
}
