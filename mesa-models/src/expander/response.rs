// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! The remote-facing response return port.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mesa_engine::sim_error;
use mesa_engine::time::clock::{Clock, Tick};
use mesa_engine::traits::Event;
use mesa_engine::types::{SimError, SimResult};
use mesa_model_builder::EntityDisplay;
use mesa_track::entity::Entity;
use mesa_track::trace;

use crate::expander::deferred::{DeferredEntry, DeferredQueue};
use crate::expander::forward::{ForwardPort, SendOutcome};
use crate::expander::ingress::AdmissionState;
use crate::expander::stats::LinkStats;
use crate::memory::access::MemAccess;
use crate::memory::traits::LinkPeer;

/// Returns backend completions to the remote side.
#[derive(EntityDisplay)]
pub struct ReturnPort {
    pub entity: Rc<Entity>,
    clock: Clock,
    proto_delay_ticks: u64,
    queue: DeferredQueue<MemAccess>,
    peer: RefCell<Option<Rc<dyn LinkPeer>>>,
    admission: Rc<AdmissionState>,
    forward: Rc<ForwardPort>,
    stats: Rc<LinkStats>,

    /// Tick of the previous completion, for the inter-completion gap
    /// diagnostic.
    prev_completion: Cell<Option<Tick>>,
}

impl ReturnPort {
    pub(crate) fn new(
        entity: Rc<Entity>,
        clock: Clock,
        proto_delay_ticks: u64,
        queue_limit: usize,
        admission: Rc<AdmissionState>,
        forward: Rc<ForwardPort>,
        stats: Rc<LinkStats>,
    ) -> Self {
        Self {
            entity,
            clock,
            proto_delay_ticks,
            queue: DeferredQueue::new(queue_limit),
            peer: RefCell::new(None),
            admission,
            forward,
            stats,
            prev_completion: Cell::new(None),
        }
    }

    pub(crate) fn connect_peer(&self, peer: Rc<dyn LinkPeer>) {
        let mut slot = self.peer.borrow_mut();
        assert!(slot.is_none(), "{} already connected", self.entity);
        *slot = Some(peer);
    }

    pub(crate) fn has_peer(&self) -> bool {
        self.peer.borrow().is_some()
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Accept a completion from the backend and queue it toward the remote
    /// side.
    ///
    /// Admission reserved a response slot when the request was accepted, so
    /// there is guaranteed to be room here.
    pub fn on_completion(&self, mut access: MemAccess) -> SimResult {
        let now = self.clock.tick_now();
        trace!(self.entity ; "completion {} queue {}", access, self.queue.len());

        if let Some(prev) = self.prev_completion.get() {
            self.stats.completion_gap.sample(now - prev);
        }
        self.prev_completion.set(Some(now));

        let leftover = access.take_link_delay();
        let due = now + self.proto_delay_ticks + leftover;
        self.queue.push(access, due, now);
        self.stats.rsp_queue_len.sample(self.queue.len() as u64);
        Ok(())
    }

    /// Attempt to send the head completion to the remote side.
    ///
    /// Must only be called once the head entry's due tick has been reached;
    /// an early attempt is a programming error.
    pub fn attempt_send(&self) -> Result<SendOutcome, SimError> {
        let now = self.clock.tick_now();
        let entry = self
            .queue
            .pop()
            .expect("attempt_send on an empty response queue");
        assert!(
            entry.due <= now,
            "{}: send attempted before the scheduled tick",
            self.entity
        );

        let peer = match self.peer.borrow().as_ref() {
            Some(peer) => peer.clone(),
            None => return sim_error!("{}: not connected to the remote side", self.entity),
        };

        match peer.try_send(entry.item) {
            Ok(()) => {
                trace!(self.entity ; "response send succeeded, queue {}", self.queue.len());
                self.stats.rsp_send_ok.inc();
                self.stats.rsp_queue_wait.sample(now - entry.queued_at);
                self.stats.rsp_queue_len.sample(self.queue.len() as u64);

                self.admission.release_response_slot();

                // Freeing a response slot only helps a sender stalled on
                // response space; it must still find request queue room
                if !self.forward.queue_full() {
                    self.admission.retry_stalled()?;
                }
                Ok(SendOutcome::Sent)
            }
            Err(returned) => {
                trace!(self.entity ; "response send failed");
                self.stats.rsp_send_failed.inc();
                self.queue.restore(DeferredEntry {
                    item: returned,
                    due: entry.due,
                    queued_at: entry.queued_at,
                });
                Ok(SendOutcome::Backpressured)
            }
        }
    }

    /// Drive the queue: wait for the head entry's due tick, attempt the
    /// send, and park on the peer's retry event after a refusal.
    pub(crate) async fn run(self: Rc<Self>) -> SimResult {
        loop {
            match self.queue.head_due() {
                None => {
                    self.queue.changed().listen().await;
                }
                Some(due) => {
                    let now = self.clock.tick_now();
                    if due > now {
                        self.clock.wait_until(due).await;
                        continue;
                    }
                    match self.attempt_send()? {
                        SendOutcome::Sent => {}
                        SendOutcome::Backpressured => {
                            let retry = {
                                self.peer
                                    .borrow()
                                    .as_ref()
                                    .expect("retry wait without a connected peer")
                                    .retry_event()
                            };
                            retry.listen().await;
                        }
                    }
                }
            }
        }
    }
}
