// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! The host-side requester driving the protocol path.
//!
//! Pulls generated accesses from its `rx` port, submits them through the
//! expander's admission contract (holding a refused access until the device
//! signals a retry), and receives returned responses as the remote peer of
//! the link, forwarding them to its `responses_tx` port.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use mesa_components::{port_rx, take_option};
use mesa_engine::engine::Engine;
use mesa_engine::events::repeated::Repeated;
use mesa_engine::executor::Spawner;
use mesa_engine::port::{InPort, OutPort, PortState};
use mesa_engine::time::clock::Clock;
use mesa_engine::traits::{Event, Runnable};
use mesa_engine::types::SimResult;
use mesa_model_builder::EntityDisplay;
use mesa_track::entity::Entity;
use mesa_track::trace;

use crate::expander::ExpanderDevice;
use crate::expander::ingress::Admission;
use crate::memory::access::MemAccess;
use crate::memory::traits::LinkPeer;
use crate::stats::{Counter, Distribution, StatsRegistry};

/// Responses accepted from the link, waiting to be forwarded to the sink.
struct Received {
    pending: RefCell<VecDeque<MemAccess>>,
    arrived: Repeated<()>,
}

#[derive(EntityDisplay)]
pub struct Requester {
    pub entity: Rc<Entity>,
    clock: Clock,
    spawner: Spawner,
    device: Rc<ExpanderDevice>,

    rx: RefCell<Option<InPort<MemAccess>>>,
    responses_tx: RefCell<Option<OutPort<MemAccess>>>,

    received: Rc<Received>,
    retry: Repeated<()>,

    /// End-to-end latency of response-expecting accesses.
    latency: Rc<Distribution>,

    requests: Rc<Counter>,
    stalled_submissions: Rc<Counter>,
    num_responses: Cell<usize>,
}

impl Requester {
    #[must_use]
    pub fn new_and_register(
        engine: &Engine,
        parent: &Rc<Entity>,
        name: &str,
        clock: Clock,
        device: Rc<ExpanderDevice>,
        registry: &StatsRegistry,
    ) -> Rc<Self> {
        let entity = Rc::new(Entity::new(parent, name));
        let rx = InPort::new(&entity, "rx");
        let responses_tx = OutPort::new(&entity, "responses_tx");
        let rc_self = Rc::new(Self {
            entity,
            clock,
            spawner: engine.spawner(),
            device,
            rx: RefCell::new(Some(rx)),
            responses_tx: RefCell::new(Some(responses_tx)),
            received: Rc::new(Received {
                pending: RefCell::new(VecDeque::new()),
                arrived: Repeated::new(()),
            }),
            retry: Repeated::new(()),
            latency: registry.distribution("host_access_latency_ticks", 0, 999, 10),
            requests: registry.counter("host_requests"),
            stalled_submissions: registry.counter("host_stalled_submissions"),
            num_responses: Cell::new(0),
        });
        engine.register(rc_self.clone());
        rc_self
    }

    #[must_use]
    pub fn port_rx(&self) -> Rc<PortState<MemAccess>> {
        port_rx!(self.rx, state)
    }

    pub fn connect_port_responses_tx(&self, port_state: Rc<PortState<MemAccess>>) {
        mesa_components::connect_tx!(self.responses_tx, connect ; port_state);
    }

    #[must_use]
    pub fn num_responses(&self) -> usize {
        self.num_responses.get()
    }
}

/// The requester is the remote peer of the expander link: returned
/// responses arrive here. The requester never refuses one.
impl LinkPeer for Requester {
    fn try_send(&self, access: MemAccess) -> Result<(), MemAccess> {
        let latency = self.clock.tick_now() - access.issued_at();
        self.latency.sample(latency);
        self.num_responses.set(self.num_responses.get() + 1);
        trace!(self.entity ; "response {} latency {}", access, latency);

        self.received.pending.borrow_mut().push_back(access);
        self.received.arrived.notify().unwrap();
        Ok(())
    }

    fn retry_event(&self) -> Repeated<()> {
        self.retry.clone()
    }
}

#[async_trait(?Send)]
impl Runnable for Requester {
    async fn run(&self) -> SimResult {
        // Forward received responses out of the requester
        let responses_tx = take_option!(self.responses_tx);
        let received = self.received.clone();
        self.spawner.spawn(async move {
            loop {
                let next = received.pending.borrow_mut().pop_front();
                match next {
                    None => {
                        received.arrived.listen().await;
                    }
                    Some(response) => {
                        responses_tx.put(response).await?;
                    }
                }
            }
        });

        let rx = take_option!(self.rx);
        loop {
            let mut access = rx.get().await;
            access.set_issued_at(self.clock.tick_now());
            self.requests.inc();

            loop {
                match self.device.submit(access)? {
                    Admission::Accepted => break,
                    Admission::Stalled(returned) => {
                        access = returned;
                        self.stalled_submissions.inc();
                        self.device.resubmit_event().listen().await;
                    }
                }
            }
        }
    }
}
