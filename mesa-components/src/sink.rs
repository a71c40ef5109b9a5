// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! Sink component.
//!
//! Consumes everything that arrives on its `rx` port, keeping a count of
//! the objects and bytes it has swallowed.

use std::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use mesa_engine::engine::Engine;
use mesa_engine::port::{InPort, PortState};
use mesa_engine::traits::{Runnable, SimObject};
use mesa_engine::types::SimResult;
use mesa_model_builder::EntityDisplay;
use mesa_track::enter;
use mesa_track::entity::Entity;

use crate::{port_rx, take_option};

#[derive(EntityDisplay)]
pub struct Sink<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    sunk_count: Cell<usize>,
    sunk_bytes: Cell<usize>,
    rx: RefCell<Option<InPort<T>>>,
}

impl<T> Sink<T>
where
    T: SimObject,
{
    #[must_use]
    pub fn new_and_register(engine: &Engine, parent: &Rc<Entity>, name: &str) -> Rc<Self> {
        let entity = Rc::new(Entity::new(parent, name));
        let rx = InPort::new(&entity, "rx");
        let rc_self = Rc::new(Self {
            entity,
            sunk_count: Cell::new(0),
            sunk_bytes: Cell::new(0),
            rx: RefCell::new(Some(rx)),
        });
        engine.register(rc_self.clone());
        rc_self
    }

    #[must_use]
    pub fn port_rx(&self) -> Rc<PortState<T>> {
        port_rx!(self.rx, state)
    }

    /// Number of objects consumed so far.
    #[must_use]
    pub fn num_sunk(&self) -> usize {
        self.sunk_count.get()
    }

    /// Total bytes consumed so far.
    #[must_use]
    pub fn bytes_sunk(&self) -> usize {
        self.sunk_bytes.get()
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Sink<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        let rx = take_option!(self.rx);
        loop {
            let value = rx.get().await;
            enter!(self.entity ; value.tag());
            self.sunk_count.set(self.sunk_count.get() + 1);
            self.sunk_bytes.set(self.sunk_bytes.get() + value.total_bytes());
        }
    }
}
