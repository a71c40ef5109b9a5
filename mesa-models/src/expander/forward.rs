// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! The backend-facing forwarding port.

use std::cell::RefCell;
use std::rc::Rc;

use mesa_engine::sim_error;
use mesa_engine::time::clock::{Clock, Tick};
use mesa_engine::traits::Event;
use mesa_engine::types::{SimError, SimResult};
use mesa_model_builder::EntityDisplay;
use mesa_track::entity::Entity;
use mesa_track::trace;

use crate::expander::deferred::{DeferredEntry, DeferredQueue};
use crate::expander::ingress::AdmissionState;
use crate::expander::stats::LinkStats;
use crate::memory::access::MemAccess;
use crate::memory::traits::LinkPeer;

/// The result of one send attempt.
pub enum SendOutcome {
    Sent,
    Backpressured,
}

/// Owns the request deferred-send queue toward the backend memory.
#[derive(EntityDisplay)]
pub struct ForwardPort {
    pub entity: Rc<Entity>,
    clock: Clock,
    queue: DeferredQueue<MemAccess>,
    peer: RefCell<Option<Rc<dyn LinkPeer>>>,
    admission: Rc<AdmissionState>,
    stats: Rc<LinkStats>,
}

impl ForwardPort {
    pub(crate) fn new(
        entity: Rc<Entity>,
        clock: Clock,
        queue_limit: usize,
        admission: Rc<AdmissionState>,
        stats: Rc<LinkStats>,
    ) -> Self {
        Self {
            entity,
            clock,
            queue: DeferredQueue::new(queue_limit),
            peer: RefCell::new(None),
            admission,
            stats,
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
    pub fn queue_full(&self) -> bool {
        self.queue.is_full()
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Queue `access` for sending no earlier than `due`.
    ///
    /// Admission control guarantees there is room. Entries are sent in
    /// insertion order, so `due` must not be earlier than that of anything
    /// already queued.
    pub fn enqueue(&self, access: MemAccess, due: Tick) {
        trace!(self.entity ; "enqueue {} due {}", access, due);
        self.queue.push(access, due, self.clock.tick_now());
        self.stats.req_queue_len.sample(self.queue.len() as u64);
    }

    /// Attempt to send the head entry to the backend.
    ///
    /// Must only be called once the head entry's due tick has been reached;
    /// an early attempt is a programming error.
    pub fn attempt_send(&self) -> Result<SendOutcome, SimError> {
        let now = self.clock.tick_now();
        let entry = self
            .queue
            .pop()
            .expect("attempt_send on an empty request queue");
        assert!(
            entry.due <= now,
            "{}: send attempted before the scheduled tick",
            self.entity
        );

        let peer = match self.peer.borrow().as_ref() {
            Some(peer) => peer.clone(),
            None => return sim_error!("{}: not connected to a backend", self.entity),
        };

        match peer.try_send(entry.item) {
            Ok(()) => {
                trace!(self.entity ; "request send succeeded, queue {}", self.queue.len());
                self.stats.req_send_ok.inc();
                self.stats.req_queue_wait.sample(now - entry.queued_at);
                self.stats.req_queue_len.sample(self.queue.len() as u64);

                // A successful forward frees exactly one unit of request
                // queue capacity, so a stalled sender can always be retried
                // here
                self.admission.retry_stalled()?;
                Ok(SendOutcome::Sent)
            }
            Err(returned) => {
                trace!(self.entity ; "request send failed");
                self.stats.req_send_failed.inc();
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
                            let retry = borrow_peer_retry(&self.peer);
                            retry.listen().await;
                        }
                    }
                }
            }
        }
    }
}

fn borrow_peer_retry(
    peer: &RefCell<Option<Rc<dyn LinkPeer>>>,
) -> mesa_engine::events::repeated::Repeated<()> {
    peer.borrow()
        .as_ref()
        .expect("retry wait without a connected peer")
        .retry_event()
}
