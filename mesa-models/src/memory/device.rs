// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! A backend memory with per-initiator connection points.
//!
//! Each initiator attaches through its own [`MemoryChannel`], which bounds
//! the number of its accesses in flight. Accepted accesses from all
//! channels are serviced strictly in arrival order; there is no fairness
//! policy between channels beyond their own slot limits.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use mesa_components::connect_tx;
use mesa_engine::engine::Engine;
use mesa_engine::events::repeated::Repeated;
use mesa_engine::executor::Spawner;
use mesa_engine::port::{OutPort, PortState};
use mesa_engine::time::clock::Clock;
use mesa_engine::traits::{Event, Runnable};
use mesa_engine::types::{AccessType, SimResult};
use mesa_model_builder::EntityDisplay;
use mesa_track::entity::Entity;
use mesa_track::trace;

use crate::memory::access::MemAccess;
use crate::memory::traits::LinkPeer;

#[derive(Clone, Debug)]
pub struct MemoryConfig {
    pub base_addr: u64,
    pub capacity_bytes: u64,
    pub bw_bytes_per_cycle: u64,
    pub access_delay_ticks: u64,

    /// In-flight accesses each channel may hold.
    pub channel_slots: usize,
}

impl MemoryConfig {
    #[must_use]
    pub fn new(
        base_addr: u64,
        capacity_bytes: u64,
        bw_bytes_per_cycle: u64,
        access_delay_ticks: u64,
        channel_slots: usize,
    ) -> Self {
        Self {
            base_addr,
            capacity_bytes,
            bw_bytes_per_cycle,
            access_delay_ticks,
            channel_slots,
        }
    }
}

/// Accepted accesses from every channel, in arrival order.
struct Arrivals {
    entries: RefCell<VecDeque<(usize, MemAccess)>>,
    changed: Repeated<()>,
}

/// One initiator's connection point.
#[derive(EntityDisplay)]
pub struct MemoryChannel {
    pub entity: Rc<Entity>,
    index: usize,
    free_slots: Cell<usize>,
    slot_limit: usize,
    retry: Repeated<()>,

    /// Completions for this initiator leave through here.
    tx: RefCell<Option<OutPort<MemAccess>>>,

    arrivals: Rc<Arrivals>,
}

impl MemoryChannel {
    pub fn connect_port_tx(&self, port_state: Rc<PortState<MemAccess>>) {
        connect_tx!(self.tx, connect ; port_state);
    }

    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.free_slots.get()
    }

    async fn deliver(&self, response: MemAccess) -> SimResult {
        let put = {
            let tx = self.tx.borrow();
            tx.as_ref()
                .unwrap_or_else(|| panic!("{} has no completion consumer", self.entity))
                .put(response)
        };
        put.await?;
        self.release_slot()
    }

    fn release_slot(&self) -> SimResult {
        assert!(
            self.free_slots.get() < self.slot_limit,
            "{}: slot release underflow",
            self.entity
        );
        self.free_slots.set(self.free_slots.get() + 1);
        self.retry.notify()
    }
}

impl LinkPeer for MemoryChannel {
    fn try_send(&self, access: MemAccess) -> Result<(), MemAccess> {
        if self.free_slots.get() == 0 {
            return Err(access);
        }
        self.free_slots.set(self.free_slots.get() - 1);
        trace!(self.entity ; "accept {}", access);
        self.arrivals
            .entries
            .borrow_mut()
            .push_back((self.index, access));
        self.arrivals.changed.notify().unwrap();
        Ok(())
    }

    fn retry_event(&self) -> Repeated<()> {
        self.retry.clone()
    }
}

#[derive(Clone)]
struct MemoryMetrics {
    bytes_read: u64,
    bytes_written: u64,
}

/// The backend memory.
#[derive(EntityDisplay)]
pub struct MemoryDevice {
    pub entity: Rc<Entity>,
    clock: Clock,
    spawner: Spawner,
    config: MemoryConfig,
    channels: RefCell<Vec<Rc<MemoryChannel>>>,
    arrivals: Rc<Arrivals>,
    metrics: RefCell<MemoryMetrics>,
}

impl MemoryDevice {
    #[must_use]
    pub fn new_and_register(
        engine: &Engine,
        parent: &Rc<Entity>,
        name: &str,
        clock: Clock,
        config: MemoryConfig,
    ) -> Rc<Self> {
        let entity = Rc::new(Entity::new(parent, name));
        let arrivals = Rc::new(Arrivals {
            entries: RefCell::new(VecDeque::new()),
            changed: Repeated::new(()),
        });
        let rc_self = Rc::new(Self {
            entity,
            clock,
            spawner: engine.spawner(),
            config,
            channels: RefCell::new(Vec::new()),
            arrivals,
            metrics: RefCell::new(MemoryMetrics {
                bytes_read: 0,
                bytes_written: 0,
            }),
        });
        engine.register(rc_self.clone());
        rc_self
    }

    /// Create a connection point for one initiator.
    ///
    /// Must be wired to a completion consumer before the simulation runs.
    pub fn channel(&self, name: &str) -> Rc<MemoryChannel> {
        let mut channels = self.channels.borrow_mut();
        let entity = Rc::new(Entity::new(&self.entity, name));
        let tx = OutPort::new(&entity, "tx");
        let channel = Rc::new(MemoryChannel {
            entity,
            index: channels.len(),
            free_slots: Cell::new(self.config.channel_slots),
            slot_limit: self.config.channel_slots,
            retry: Repeated::new(()),
            tx: RefCell::new(Some(tx)),
            arrivals: self.arrivals.clone(),
        });
        channels.push(channel.clone());
        channel
    }

    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.metrics.borrow().bytes_read
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.metrics.borrow().bytes_written
    }

    fn record(&self, access: &MemAccess) {
        let begin = access.addr();
        let end = begin + access.size_bytes() as u64;
        assert!(
            begin >= self.config.base_addr
                && end <= self.config.base_addr + self.config.capacity_bytes,
            "Invalid memory access received: {access}"
        );

        match access.kind() {
            AccessType::ReadRequest => {
                self.metrics.borrow_mut().bytes_read += access.size_bytes() as u64;
            }
            AccessType::WriteRequest | AccessType::WriteNonPostedRequest => {
                self.metrics.borrow_mut().bytes_written += access.size_bytes() as u64;
            }
            AccessType::ReadResponse | AccessType::WriteNonPostedResponse => {
                panic!("Response routed into the backend: {access}");
            }
        }
    }
}

#[async_trait(?Send)]
impl Runnable for MemoryDevice {
    async fn run(&self) -> SimResult {
        loop {
            let next = self.arrivals.entries.borrow_mut().pop_front();
            match next {
                None => {
                    self.arrivals.changed.listen().await;
                }
                Some((index, access)) => {
                    trace!(self.entity ; "service {}", access);
                    self.record(&access);

                    // Occupy the pipe for the transfer itself
                    let service_ticks =
                        (access.size_bytes() as u64).div_ceil(self.config.bw_bytes_per_cycle);
                    self.clock.wait_ticks(service_ticks).await;

                    let channel = self.channels.borrow()[index].clone();
                    if access.expects_response() {
                        // The completion leaves after the fixed access
                        // delay, without blocking the next transfer
                        let response = access.to_response()?;
                        let delay = self.config.access_delay_ticks;
                        let clock = self.clock.clone();
                        self.spawner.spawn(async move {
                            clock.wait_ticks(delay).await;
                            channel.deliver(response).await
                        });
                    } else {
                        channel.release_slot()?;
                    }
                }
            }
        }
    }
}
