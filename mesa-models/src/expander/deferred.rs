// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! The deferred-send queue used by both directions of the expander link.

use std::cell::RefCell;
use std::collections::VecDeque;

use mesa_engine::events::repeated::Repeated;
use mesa_engine::time::clock::Tick;

/// One queued item waiting for its earliest send time.
pub struct DeferredEntry<T> {
    pub item: T,

    /// Earliest tick at which a send may be attempted.
    pub due: Tick,

    /// When the entry was queued, for latency sampling.
    pub queued_at: Tick,
}

/// A capacity-bounded FIFO of items each carrying the earliest tick at
/// which it may be sent.
///
/// Entries leave in insertion order, not due order: callers must only queue
/// items whose due tick is not earlier than anything already queued.
pub struct DeferredQueue<T> {
    limit: usize,
    entries: RefCell<VecDeque<DeferredEntry<T>>>,
    changed: Repeated<usize>,
}

impl<T> DeferredQueue<T> {
    /// **Panics** if `limit` is 0.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        assert_ne!(limit, 0, "Unsupported queue with 0 capacity");
        Self {
            limit,
            entries: RefCell::new(VecDeque::with_capacity(limit)),
            changed: Repeated::new(usize::default()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.borrow().len() == self.limit
    }

    /// The due tick of the head entry, if any.
    #[must_use]
    pub fn head_due(&self) -> Option<Tick> {
        self.entries.borrow().front().map(|entry| entry.due)
    }

    /// Append an entry.
    ///
    /// Admission control must have run first: pushing into a full queue is
    /// a programming error.
    pub fn push(&self, item: T, due: Tick, queued_at: Tick) {
        assert!(!self.is_full(), "Deferred queue overflow");
        self.entries.borrow_mut().push_back(DeferredEntry {
            item,
            due,
            queued_at,
        });
        self.changed.notify_result(self.len()).unwrap();
    }

    /// Remove and return the head entry.
    pub fn pop(&self) -> Option<DeferredEntry<T>> {
        self.entries.borrow_mut().pop_front()
    }

    /// Put a popped entry back at the head after a refused send.
    pub fn restore(&self, entry: DeferredEntry<T>) {
        self.entries.borrow_mut().push_front(entry);
    }

    /// Event notified with the new length whenever an entry is pushed.
    #[must_use]
    pub fn changed(&self) -> Repeated<usize> {
        self.changed.clone()
    }
}
