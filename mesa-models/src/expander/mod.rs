// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! A link-attached memory-expansion device.
//!
//! The device bridges a remote link onto a backend memory through an
//! admission-controlled pair of deferred-send queues, and hosts a
//! [bypass](crate::expander::bypass) path through which a co-located
//! processing unit reaches the same backend without any of the protocol
//! machinery.
//!
//! Requests are only admitted when the request queue has room and, for
//! response-expecting requests, a response slot can be reserved. A refused
//! sender holds its request until the device signals a retry. Admitted
//! requests traverse the request queue after the protocol processing delay,
//! and completions traverse the response queue the same way in the other
//! direction.

pub mod bypass;
pub mod deferred;
pub mod forward;
pub mod ingress;
pub mod response;
pub mod stats;
pub mod unit;

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use async_trait::async_trait;
use mesa_components::{port_rx, take_option};
use mesa_engine::engine::Engine;
use mesa_engine::events::repeated::Repeated;
use mesa_engine::executor::Spawner;
use mesa_engine::port::{InPort, PortState};
use mesa_engine::sim_error;
use mesa_engine::time::clock::Clock;
use mesa_engine::traits::Runnable;
use mesa_engine::types::{SimError, SimResult};
use mesa_model_builder::EntityDisplay;
use mesa_track::entity::Entity;
use mesa_track::info;

use crate::expander::bypass::BypassCoordinator;
use crate::expander::forward::ForwardPort;
use crate::expander::ingress::{Admission, AdmissionState, IngressPort};
use crate::expander::response::ReturnPort;
use crate::expander::stats::{BypassStats, LinkStats};
use crate::expander::unit::UnitKind;
use crate::memory::access::MemAccess;
use crate::memory::traits::LinkPeer;
use crate::stats::StatsRegistry;

/// A contiguous address range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddrRange {
    pub start: u64,
    pub size: u64,
}

impl AddrRange {
    #[must_use]
    pub fn new(start: u64, size: u64) -> Self {
        Self { start, size }
    }

    #[must_use]
    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }
}

impl std::fmt::Display for AddrRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end())
    }
}

/// Configuration of the bypass path.
#[derive(Clone, Debug)]
pub struct BypassConfig {
    pub enabled: bool,

    /// Entry address of the workload image in backend memory.
    pub start_addr: u64,

    /// Path to the workload image.
    pub image: PathBuf,

    /// Kind of processing unit to build.
    pub unit_kind: UnitKind,
}

impl Default for BypassConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_addr: 0,
            image: PathBuf::new(),
            unit_kind: UnitKind::default(),
        }
    }
}

/// Configuration of the expander device. Immutable after construction.
#[derive(Clone, Debug)]
pub struct ExpanderConfig {
    /// Protocol processing delay applied per hop, in ticks.
    pub proto_delay_ticks: u64,

    /// Capacity of the request queue toward the backend.
    pub request_queue_limit: usize,

    /// Number of response slots, bounding outstanding responses.
    pub response_slot_limit: usize,

    /// The address range this device serves.
    pub mem_range: AddrRange,

    pub bypass: BypassConfig,
}

/// The memory-expansion device.
#[derive(EntityDisplay)]
pub struct ExpanderDevice {
    pub entity: Rc<Entity>,
    spawner: Spawner,
    config: ExpanderConfig,

    ingress: Rc<IngressPort>,
    forward: Rc<ForwardPort>,
    returner: Rc<ReturnPort>,
    bypass: Rc<BypassCoordinator>,

    /// Completions from the backend arrive here.
    backend_rx: RefCell<Option<InPort<MemAccess>>>,
}

impl ExpanderDevice {
    #[must_use]
    pub fn new_and_register(
        engine: &Engine,
        parent: &Rc<Entity>,
        name: &str,
        clock: Clock,
        config: ExpanderConfig,
        registry: &StatsRegistry,
    ) -> Rc<Self> {
        let entity = Rc::new(Entity::new(parent, name));
        let stats = Rc::new(LinkStats::new(registry));
        let bypass_stats = Rc::new(BypassStats::new(registry));

        let admission = Rc::new(AdmissionState::new(
            config.response_slot_limit,
            stats.clone(),
        ));

        let forward = Rc::new(ForwardPort::new(
            Rc::new(Entity::new(&entity, "egress")),
            clock.clone(),
            config.request_queue_limit,
            admission.clone(),
            stats.clone(),
        ));

        let ingress = Rc::new(IngressPort::new(
            Rc::new(Entity::new(&entity, "ingress")),
            clock.clone(),
            config.proto_delay_ticks,
            admission.clone(),
            forward.clone(),
            stats.clone(),
        ));

        let returner = Rc::new(ReturnPort::new(
            Rc::new(Entity::new(&entity, "return")),
            clock.clone(),
            config.proto_delay_ticks,
            config.response_slot_limit,
            admission,
            forward.clone(),
            stats,
        ));

        let bypass = Rc::new(BypassCoordinator::new(
            Rc::new(Entity::new(&entity, "bypass")),
            clock,
            &config.bypass,
            bypass_stats,
        ));

        let backend_rx = InPort::new(&entity, "backend_rx");

        let rc_self = Rc::new(Self {
            entity,
            spawner: engine.spawner(),
            config,
            ingress,
            forward,
            returner,
            bypass,
            backend_rx: RefCell::new(Some(backend_rx)),
        });
        engine.register(rc_self.clone());
        rc_self
    }

    /// Wire the backend memory connection for the protocol path.
    pub fn connect_backend(&self, peer: Rc<dyn LinkPeer>) {
        self.forward.connect_peer(peer);
    }

    /// Wire the remote side, which receives returned responses.
    pub fn connect_remote(&self, peer: Rc<dyn LinkPeer>) {
        self.returner.connect_peer(peer);
    }

    /// The port backend completions are delivered to.
    #[must_use]
    pub fn port_backend_rx(&self) -> Rc<PortState<MemAccess>> {
        port_rx!(self.backend_rx, state)
    }

    /// Submit a request from the remote side.
    pub fn submit(&self, access: MemAccess) -> Result<Admission, SimError> {
        self.ingress.submit(access)
    }

    /// Event fired when a stalled sender may resubmit.
    #[must_use]
    pub fn resubmit_event(&self) -> Repeated<()> {
        self.ingress.resubmit_event()
    }

    #[must_use]
    pub fn ingress(&self) -> &Rc<IngressPort> {
        &self.ingress
    }

    #[must_use]
    pub fn forward(&self) -> &Rc<ForwardPort> {
        &self.forward
    }

    #[must_use]
    pub fn returner(&self) -> &Rc<ReturnPort> {
        &self.returner
    }

    #[must_use]
    pub fn bypass(&self) -> &Rc<BypassCoordinator> {
        &self.bypass
    }

    #[must_use]
    pub fn outstanding_responses(&self) -> usize {
        self.ingress.outstanding_responses()
    }

    #[must_use]
    pub fn address_range(&self) -> AddrRange {
        self.config.mem_range
    }

    /// Validate the wiring before the simulation proceeds.
    ///
    /// Missing link connections are fatal configuration errors. Bypass
    /// initialisation handles its own degraded states.
    pub fn init(&self) -> SimResult {
        if !self.forward.has_peer() || !self.returner.has_peer() {
            return sim_error!("link port of {} not connected to anything", self.entity);
        }
        info!(self.entity ; "serving {}", self.config.mem_range);
        self.bypass.initialize();
        Ok(())
    }
}

#[async_trait(?Send)]
impl Runnable for ExpanderDevice {
    async fn run(&self) -> SimResult {
        self.init()?;

        {
            let forward = self.forward.clone();
            self.spawner.spawn(forward.run());
        }
        {
            let returner = self.returner.clone();
            self.spawner.spawn(returner.run());
        }
        {
            let bypass = self.bypass.clone();
            self.spawner.spawn(async move { bypass.run().await });
        }

        let backend_rx = take_option!(self.backend_rx);
        loop {
            let completion = backend_rx.get().await;
            self.returner.on_completion(completion)?;
        }
    }
}
