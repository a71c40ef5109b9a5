// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

use std::fmt::Display;
use std::rc::Rc;

use mesa_engine::sim_error;
use mesa_engine::time::clock::Tick;
use mesa_engine::traits::{SimObject, TotalBytes};
use mesa_engine::types::{AccessType, SimError};
use mesa_track::create_tag;
use mesa_track::entity::Entity;
use mesa_track::tag::{Tag, Tagged};

/// A single memory operation travelling through the simulation.
#[derive(Clone, Debug)]
pub struct MemAccess {
    created_by: Rc<Entity>,
    tag: Tag,
    kind: AccessType,
    addr: u64,
    size_bytes: usize,

    /// When the operation was issued by its originator. Latency samples are
    /// measured against this.
    issued_at: Tick,

    /// Transit delay accumulated on the wire but not yet accounted for.
    /// Each hop strips this and folds it into its own scheduling.
    link_delay_ticks: u64,

    /// Set when an upstream cache has already answered this operation.
    /// Such an operation must never reach the expander.
    cache_responding: bool,
}

impl MemAccess {
    #[must_use]
    pub fn new(
        created_by: &Rc<Entity>,
        kind: AccessType,
        addr: u64,
        size_bytes: usize,
        issued_at: Tick,
    ) -> Self {
        Self {
            created_by: created_by.clone(),
            tag: create_tag!(created_by),
            kind,
            addr,
            size_bytes,
            issued_at,
            link_delay_ticks: 0,
            cache_responding: false,
        }
    }

    #[must_use]
    pub fn kind(&self) -> AccessType {
        self.kind
    }

    #[must_use]
    pub fn addr(&self) -> u64 {
        self.addr
    }

    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    #[must_use]
    pub fn issued_at(&self) -> Tick {
        self.issued_at
    }

    pub fn set_issued_at(&mut self, tick: Tick) {
        self.issued_at = tick;
    }

    #[must_use]
    pub fn expects_response(&self) -> bool {
        self.kind.expects_response()
    }

    #[must_use]
    pub fn is_cache_responding(&self) -> bool {
        self.cache_responding
    }

    pub fn mark_cache_responding(&mut self) {
        self.cache_responding = true;
    }

    /// Remove and return the accumulated transit delay.
    pub fn take_link_delay(&mut self) -> u64 {
        std::mem::take(&mut self.link_delay_ticks)
    }

    pub fn add_link_delay(&mut self, ticks: u64) {
        self.link_delay_ticks += ticks;
    }

    /// Build the completion for a response-expecting operation.
    ///
    /// The tag and issue time are carried over so that the completion can be
    /// correlated with its request.
    pub fn to_response(&self) -> Result<Self, SimError> {
        let response_kind = match self.kind {
            AccessType::ReadRequest => AccessType::ReadResponse,
            AccessType::WriteNonPostedRequest => AccessType::WriteNonPostedResponse,
            AccessType::ReadResponse
            | AccessType::WriteRequest
            | AccessType::WriteNonPostedResponse => {
                return sim_error!("{}: unsupported by to_response()", self.kind);
            }
        };
        Ok(Self {
            created_by: self.created_by.clone(),
            tag: self.tag,
            kind: response_kind,
            addr: self.addr,
            size_bytes: self.size_bytes,
            issued_at: self.issued_at,
            link_delay_ticks: 0,
            cache_responding: false,
        })
    }
}

impl Display for MemAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}@{:#x}", self.kind, self.size_bytes, self.addr)
    }
}

impl TotalBytes for MemAccess {
    fn total_bytes(&self) -> usize {
        self.size_bytes
    }
}

impl Tagged for MemAccess {
    fn tag(&self) -> Tag {
        self.tag
    }
}

impl SimObject for MemAccess {}
