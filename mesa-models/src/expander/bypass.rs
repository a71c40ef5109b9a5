// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! The bypass coordinator.
//!
//! A processing unit placed next to the backend memory reaches it through
//! this coordinator, skipping the link protocol's admission and queueing
//! entirely. The coordinator validates the wiring, starts unit execution,
//! and accounts for every bypass access so the two paths can be compared.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use async_trait::async_trait;
use mesa_engine::port::{InPort, PortState};
use mesa_engine::time::clock::{Clock, Tick};
use mesa_engine::traits::Runnable;
use mesa_engine::types::{SimError, SimResult};
use mesa_model_builder::EntityDisplay;
use mesa_track::entity::Entity;
use mesa_track::{info, trace, warn};

use mesa_components::{port_rx, take_option};

use crate::expander::BypassConfig;
use crate::expander::stats::BypassStats;
use crate::expander::unit::{ExecContext, ProcessingUnit};
use crate::memory::access::MemAccess;
use crate::memory::traits::LinkPeer;

/// The result of a bypass issue attempt.
///
/// A refused access is handed back; the coordinator does not buffer bypass
/// traffic, so the caller must resubmit later.
pub enum BypassIssue {
    Sent,
    Refused(MemAccess),
}

/// Coordinates direct memory access for a co-located processing unit.
#[derive(EntityDisplay)]
pub struct BypassCoordinator {
    pub entity: Rc<Entity>,
    clock: Clock,

    enabled: bool,
    start_addr: u64,
    image: PathBuf,

    /// Direct connection to the backend memory.
    link: RefCell<Option<Rc<dyn LinkPeer>>>,

    /// Completions from the backend arrive here.
    rx: RefCell<Option<InPort<MemAccess>>>,

    /// The attached processing unit, if any. Acquired once; cleared
    /// permanently if the unit turns out to have no executable context.
    unit: RefCell<Option<Rc<dyn ProcessingUnit>>>,
    context: RefCell<Option<Rc<dyn ExecContext>>>,

    executions: Cell<u64>,
    active_since: Cell<Option<Tick>>,

    stats: Rc<BypassStats>,
}

impl BypassCoordinator {
    pub(crate) fn new(
        entity: Rc<Entity>,
        clock: Clock,
        config: &BypassConfig,
        stats: Rc<BypassStats>,
    ) -> Self {
        let rx = InPort::new(&entity, "rx");
        Self {
            entity,
            clock,
            enabled: config.enabled,
            start_addr: config.start_addr,
            image: config.image.clone(),
            link: RefCell::new(None),
            rx: RefCell::new(Some(rx)),
            unit: RefCell::new(None),
            context: RefCell::new(None),
            executions: Cell::new(0),
            active_since: Cell::new(None),
            stats,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Wire the direct connection to the backend memory.
    pub fn connect_link(&self, link: Rc<dyn LinkPeer>) {
        let mut slot = self.link.borrow_mut();
        assert!(slot.is_none(), "{} already connected", self.entity);
        *slot = Some(link);
    }

    /// The port on which backend completions arrive.
    #[must_use]
    pub fn port_rx(&self) -> Rc<PortState<MemAccess>> {
        port_rx!(self.rx, state)
    }

    /// Attach the processing unit. Called once by the configuration layer;
    /// may happen after [`initialize`](BypassCoordinator::initialize), in
    /// which case initialize must be invoked again.
    pub fn attach_unit(&self, unit: Rc<dyn ProcessingUnit>) {
        *self.unit.borrow_mut() = Some(unit);
    }

    /// Validate the bypass wiring.
    ///
    /// Missing pieces are logged and leave the feature unusable rather than
    /// failing the whole device. A unit without any executable context
    /// permanently disables the coordinator.
    pub fn initialize(&self) {
        if !self.enabled {
            trace!(self.entity ; "bypass disabled, skipping initialisation");
            return;
        }

        info!(self.entity ; "initialising bypass unit, image={}, start_addr={:#x}",
            self.image.display(), self.start_addr);

        if self.link.borrow().is_none() {
            warn!(self.entity ; "bypass enabled but no direct memory connection is wired");
            warn!(self.entity ; "the bypass path will stay unusable");
            return;
        }

        let unit = match self.unit.borrow().as_ref() {
            Some(unit) => unit.clone(),
            None => {
                info!(self.entity ; "no processing unit attached yet");
                info!(self.entity ; "the unit may still be attached by the configuration layer");
                return;
            }
        };

        if unit.num_contexts() == 0 {
            warn!(self.entity ; "{} has no executable contexts", unit.name());
            *self.unit.borrow_mut() = None;
            return;
        }

        *self.context.borrow_mut() = Some(unit.context(0));
        info!(self.entity ; "acquired executable context of {}", unit.name());
    }

    /// Point the unit at `entry` and start it running.
    ///
    /// Each call counts one execution, even when the context is already
    /// active.
    pub fn start_execution(&self, entry: u64, stack: u64) {
        if !self.enabled {
            warn!(self.entity ; "attempt to start execution but bypass is disabled");
            return;
        }
        if self.unit.borrow().is_none() {
            warn!(self.entity ; "no processing unit attached, cannot start execution");
            return;
        }
        let context = match self.context.borrow().as_ref() {
            Some(context) => context.clone(),
            None => {
                warn!(self.entity ; "no executable context acquired");
                return;
            }
        };

        self.executions.set(self.executions.get() + 1);
        self.stats.executions.inc();

        context.set_entry_point(entry);
        if !context.is_active() {
            context.activate();
            info!(self.entity ; "context activated");
        }
        self.active_since.set(Some(self.clock.tick_now()));

        info!(self.entity ; "unit executing from entry={entry:#x} stack={stack:#x}");
    }

    /// Issue a memory access directly to the backend, outside the protocol
    /// path.
    ///
    /// There is no local buffering: a refused access is handed back and the
    /// caller resubmits later.
    pub fn issue(&self, mut access: MemAccess) -> Result<BypassIssue, SimError> {
        if !self.enabled {
            warn!(self.entity ; "bypass access received but bypass is disabled");
            return Ok(BypassIssue::Refused(access));
        }
        let link = match self.link.borrow().as_ref() {
            Some(link) => link.clone(),
            None => {
                warn!(self.entity ; "bypass access without a direct memory connection");
                return Ok(BypassIssue::Refused(access));
            }
        };

        access.set_issued_at(self.clock.tick_now());
        trace!(self.entity ; "issue {}", access);
        match link.try_send(access) {
            Ok(()) => Ok(BypassIssue::Sent),
            Err(returned) => {
                trace!(self.entity ; "backend refused, caller must resubmit");
                Ok(BypassIssue::Refused(returned))
            }
        }
    }

    /// Event notified when the backend can take another bypass access after
    /// a refusal.
    #[must_use]
    pub fn backend_retry_event(&self) -> mesa_engine::events::repeated::Repeated<()> {
        self.link
            .borrow()
            .as_ref()
            .expect("retry event without a connected link")
            .retry_event()
    }

    /// Account for a completed bypass access and discard it.
    ///
    /// The sampled value is not delivered into the unit's execution state;
    /// where it would attach is an open integration point.
    pub fn on_completion(&self, access: MemAccess) -> SimResult {
        let now = self.clock.tick_now();
        let latency = now - access.issued_at();
        self.stats.access_latency.sample(latency);

        if access.kind().is_read() {
            self.stats.reads.inc();
            trace!(self.entity ; "read complete: {} latency {}", access, latency);
        } else if access.kind().is_write() {
            self.stats.writes.inc();
            trace!(self.entity ; "write complete: {} latency {}", access, latency);
        }

        if let Some(since) = self.active_since.get() {
            self.stats.active_cycles.set(now - since);
        }
        Ok(())
    }

    /// Number of times execution was started.
    #[must_use]
    pub fn executions(&self) -> u64 {
        self.executions.get()
    }

    /// The entry address configured for the unit's workload image.
    #[must_use]
    pub fn start_addr(&self) -> u64 {
        self.start_addr
    }
}

#[async_trait(?Send)]
impl Runnable for BypassCoordinator {
    async fn run(&self) -> SimResult {
        let rx = take_option!(self.rx);
        loop {
            let access = rx.get().await;
            self.on_completion(access)?;
        }
    }
}
