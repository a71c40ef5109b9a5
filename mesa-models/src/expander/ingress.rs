// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! Admission control for requests arriving from the remote side.

use std::cell::Cell;
use std::rc::Rc;

use mesa_engine::events::repeated::Repeated;
use mesa_engine::sim_error;
use mesa_engine::time::clock::Clock;
use mesa_engine::types::{SimError, SimResult};
use mesa_model_builder::EntityDisplay;
use mesa_track::entity::Entity;
use mesa_track::trace;

use crate::expander::forward::ForwardPort;
use crate::expander::stats::LinkStats;
use crate::memory::access::MemAccess;

/// The result of an admission attempt.
///
/// A stalled submission hands the access back; the caller must hold it and
/// only resubmit once the resubmit event fires.
pub enum Admission {
    Accepted,
    Stalled(MemAccess),
}

/// State shared between the admission boundary and the two send ports.
///
/// The retry flag records that a sender was refused; the outstanding
/// counter tracks admitted requests that still owe a response. Both send
/// ports clear the flag through [`AdmissionState::retry_stalled`] when a
/// successful send frees the capacity the sender was waiting for.
pub(crate) struct AdmissionState {
    retry: Cell<bool>,
    outstanding: Cell<usize>,
    response_limit: usize,
    resubmit: Repeated<()>,
    stats: Rc<LinkStats>,
}

impl AdmissionState {
    pub(crate) fn new(response_limit: usize, stats: Rc<LinkStats>) -> Self {
        Self {
            retry: Cell::new(false),
            outstanding: Cell::new(0),
            response_limit,
            resubmit: Repeated::new(()),
            stats,
        }
    }

    pub(crate) fn retry_pending(&self) -> bool {
        self.retry.get()
    }

    pub(crate) fn set_retry(&self) {
        self.retry.set(true);
    }

    /// If a sender is stalled, clear the flag and signal it to resubmit.
    /// Idempotent when no sender is stalled.
    pub(crate) fn retry_stalled(&self) -> SimResult {
        if self.retry.get() {
            self.retry.set(false);
            self.stats.req_retry_count.inc();
            self.resubmit.notify()?;
        }
        Ok(())
    }

    pub(crate) fn response_slots_full(&self) -> bool {
        self.outstanding.get() == self.response_limit
    }

    pub(crate) fn reserve_response_slot(&self) {
        assert!(
            self.outstanding.get() < self.response_limit,
            "Response slot reservation beyond the configured limit"
        );
        self.outstanding.set(self.outstanding.get() + 1);
        self.stats
            .rsp_outstanding
            .sample(self.outstanding.get() as u64);
    }

    pub(crate) fn release_response_slot(&self) {
        assert_ne!(self.outstanding.get(), 0, "Response slot release underflow");
        self.outstanding.set(self.outstanding.get() - 1);
        self.stats
            .rsp_outstanding
            .sample(self.outstanding.get() as u64);
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.get()
    }

    pub(crate) fn resubmit_event(&self) -> Repeated<()> {
        self.resubmit.clone()
    }
}

/// The remote-facing admission port.
#[derive(EntityDisplay)]
pub struct IngressPort {
    pub entity: Rc<Entity>,
    clock: Clock,
    proto_delay_ticks: u64,
    admission: Rc<AdmissionState>,
    forward: Rc<ForwardPort>,
    stats: Rc<LinkStats>,
}

impl IngressPort {
    pub(crate) fn new(
        entity: Rc<Entity>,
        clock: Clock,
        proto_delay_ticks: u64,
        admission: Rc<AdmissionState>,
        forward: Rc<ForwardPort>,
        stats: Rc<LinkStats>,
    ) -> Self {
        Self {
            entity,
            clock,
            proto_delay_ticks,
            admission,
            forward,
            stats,
        }
    }

    /// Decide whether `access` may enter the device.
    ///
    /// Accepted accesses are queued toward the backend after the protocol
    /// processing delay plus any transit delay still carried by the access.
    /// Stalled submissions will be signalled through
    /// [`resubmit_event`](IngressPort::resubmit_event) once capacity frees.
    pub fn submit(&self, mut access: MemAccess) -> Result<Admission, SimError> {
        if access.is_cache_responding() {
            return sim_error!(
                "{}: {} was already answered upstream and must not be forwarded",
                self.entity,
                access
            );
        }

        if self.admission.retry_pending() {
            // Still stalling an earlier refusal - the sender must wait
            return Ok(Admission::Stalled(access));
        }

        trace!(self.entity ; "submit {} queue {} outstanding {}",
            access, self.forward.queue_len(), self.admission.outstanding());

        // If the request queue is full then there is no hope
        if self.forward.queue_full() {
            trace!(self.entity ; "request queue full");
            self.stats.req_queue_full_events.inc();
            self.admission.set_retry();
            return Ok(Admission::Stalled(access));
        }

        // Only admit a response-expecting request if a response slot can be
        // reserved for it up front
        if access.expects_response() {
            if self.admission.response_slots_full() {
                trace!(self.entity ; "response slots full");
                self.stats.rsp_queue_full_events.inc();
                self.admission.set_retry();
                return Ok(Admission::Stalled(access));
            }
            self.admission.reserve_response_slot();
        }

        let leftover = access.take_link_delay();
        let due = self.clock.tick_now() + self.proto_delay_ticks + leftover;
        self.forward.enqueue(access, due);
        Ok(Admission::Accepted)
    }

    /// Event fired when a stalled sender may resubmit.
    #[must_use]
    pub fn resubmit_event(&self) -> Repeated<()> {
        self.admission.resubmit_event()
    }

    /// Admitted requests that still owe a response.
    #[must_use]
    pub fn outstanding_responses(&self) -> usize {
        self.admission.outstanding()
    }

    /// True while the most recent admission attempt was refused and nothing
    /// has freed the capacity it was waiting for.
    #[must_use]
    pub fn retry_pending(&self) -> bool {
        self.admission.retry_pending()
    }
}
