// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! Helpers shared by the model test suites.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mesa_engine::events::repeated::Repeated;
use mesa_engine::time::clock::Tick;
use mesa_engine::types::AccessType;
use mesa_track::entity::Entity;

use crate::memory::access::MemAccess;
use crate::memory::traits::LinkPeer;

#[must_use]
pub fn create_read(created_by: &Rc<Entity>, addr: u64, size_bytes: usize) -> MemAccess {
    MemAccess::new(created_by, AccessType::ReadRequest, addr, size_bytes, Tick(0))
}

#[must_use]
pub fn create_write(created_by: &Rc<Entity>, addr: u64, size_bytes: usize) -> MemAccess {
    MemAccess::new(created_by, AccessType::WriteRequest, addr, size_bytes, Tick(0))
}

#[must_use]
pub fn create_write_np(created_by: &Rc<Entity>, addr: u64, size_bytes: usize) -> MemAccess {
    MemAccess::new(
        created_by,
        AccessType::WriteNonPostedRequest,
        addr,
        size_bytes,
        Tick(0),
    )
}

/// A scriptable [`LinkPeer`] that accepts a configurable number of sends.
///
/// With `budget = None` every send is accepted. With `Some(n)` only `n`
/// sends are accepted until [`StubLink::grant`] tops the budget up, which
/// also fires the retry event.
pub struct StubLink {
    budget: Cell<Option<usize>>,
    delivered: RefCell<Vec<MemAccess>>,
    retry: Repeated<()>,
}

impl StubLink {
    #[must_use]
    pub fn new(budget: Option<usize>) -> Rc<Self> {
        Rc::new(Self {
            budget: Cell::new(budget),
            delivered: RefCell::new(Vec::new()),
            retry: Repeated::new(()),
        })
    }

    /// Allow `extra` more sends and signal waiting senders to retry.
    pub fn grant(&self, extra: usize) {
        if let Some(budget) = self.budget.get() {
            self.budget.set(Some(budget + extra));
        }
        self.retry.notify().unwrap();
    }

    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.delivered.borrow().len()
    }

    #[must_use]
    pub fn delivered_addrs(&self) -> Vec<u64> {
        self.delivered.borrow().iter().map(MemAccess::addr).collect()
    }

    #[must_use]
    pub fn take_delivered(&self) -> Vec<MemAccess> {
        self.delivered.borrow_mut().drain(..).collect()
    }
}

impl LinkPeer for StubLink {
    fn try_send(&self, access: MemAccess) -> Result<(), MemAccess> {
        match self.budget.get() {
            Some(0) => Err(access),
            Some(budget) => {
                self.budget.set(Some(budget - 1));
                self.delivered.borrow_mut().push(access);
                Ok(())
            }
            None => {
                self.delivered.borrow_mut().push(access);
                Ok(())
            }
        }
    }

    fn retry_event(&self) -> Repeated<()> {
        self.retry.clone()
    }
}
