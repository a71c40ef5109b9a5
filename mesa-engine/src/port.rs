// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

//! Ports
//!
//! A port pair forms a one-deep rendezvous between two components. The
//! receiving component owns an [`InPort`] and the sending component owns an
//! [`OutPort`] that is connected to the in-port's [`PortState`].
//!
//! A `put` only completes once the receiver has taken the value, so a
//! blocked receiver naturally stalls the sender.

use std::cell::RefCell;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::Future;
use futures::future::FusedFuture;
use mesa_track::entity::Entity;

use crate::traits::SimObject;
use crate::types::SimResult;

/// The shared state of a connected port pair.
pub struct PortState<T>
where
    T: SimObject,
{
    value: RefCell<Option<T>>,
    waiting_get: RefCell<Option<Waker>>,
    waiting_put: RefCell<Option<Waker>>,
}

impl<T> PortState<T>
where
    T: SimObject,
{
    pub fn new() -> Self {
        Self {
            value: RefCell::new(None),
            waiting_get: RefCell::new(None),
            waiting_put: RefCell::new(None),
        }
    }
}

impl<T> Default for PortState<T>
where
    T: SimObject,
{
    fn default() -> Self {
        Self::new()
    }
}

/// The receiving end of a port pair.
pub struct InPort<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    name: String,
    state: Rc<PortState<T>>,
}

impl<T> fmt::Display for InPort<T>
where
    T: SimObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.entity, self.name)
    }
}

impl<T> InPort<T>
where
    T: SimObject,
{
    pub fn new(entity: &Rc<Entity>, name: &str) -> Self {
        Self {
            entity: entity.clone(),
            name: name.to_owned(),
            state: Rc::new(PortState::new()),
        }
    }

    /// The [`PortState`] to pass to the matching [`OutPort::connect`].
    #[must_use]
    pub fn state(&self) -> Rc<PortState<T>> {
        self.state.clone()
    }

    /// Receive the next value.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn get(&self) -> PortGet<T> {
        PortGet {
            state: self.state.clone(),
            done: false,
        }
    }
}

/// The sending end of a port pair.
pub struct OutPort<T>
where
    T: SimObject,
{
    entity: Rc<Entity>,
    name: String,
    state: Option<Rc<PortState<T>>>,
}

impl<T> fmt::Display for OutPort<T>
where
    T: SimObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.entity, self.name)
    }
}

impl<T> OutPort<T>
where
    T: SimObject,
{
    pub fn new(entity: &Rc<Entity>, name: &str) -> Self {
        Self {
            entity: entity.clone(),
            name: name.to_owned(),
            state: None,
        }
    }

    /// Connect this out-port to an in-port's state.
    ///
    /// **Panics** if this port is already connected.
    pub fn connect(&mut self, port_state: Rc<PortState<T>>) {
        match self.state {
            Some(_) => panic!("{}::{} already connected", self.entity, self.name),
            None => {
                self.state = Some(port_state);
            }
        }
    }

    /// Send a value. The returned future completes once the receiver has
    /// taken the value.
    ///
    /// **Panics** if this port has not been connected.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn put(&self, value: T) -> PortPut<T> {
        let state = self
            .state
            .as_ref()
            .unwrap_or_else(|| panic!("{}::{} not connected", self.entity, self.name))
            .clone();
        PortPut {
            state,
            value: RefCell::new(Some(value)),
            done: RefCell::new(false),
        }
    }
}

/// Future which completes a rendezvous from the sending side.
pub struct PortPut<T>
where
    T: SimObject,
{
    state: Rc<PortState<T>>,
    value: RefCell<Option<T>>,
    done: RefCell<bool>,
}

impl<T> Future for PortPut<T>
where
    T: SimObject,
{
    type Output = SimResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.state.value.borrow().is_none() {
            match self.value.take() {
                Some(value) => {
                    // Space in the port - place the value and wake the
                    // receiver, then wait for it to be consumed
                    *self.state.value.borrow_mut() = Some(value);
                    if let Some(waker) = self.state.waiting_get.borrow_mut().take() {
                        waker.wake();
                    }
                    *self.state.waiting_put.borrow_mut() = Some(cx.waker().clone());
                    Poll::Pending
                }
                None => {
                    // Value already sent and consumed
                    *self.done.borrow_mut() = true;
                    Poll::Ready(Ok(()))
                }
            }
        } else {
            // Port occupied - wait for the receiver to consume it
            *self.state.waiting_put.borrow_mut() = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl<T> FusedFuture for PortPut<T>
where
    T: SimObject,
{
    fn is_terminated(&self) -> bool {
        *self.done.borrow()
    }
}

/// Future which completes a rendezvous from the receiving side.
pub struct PortGet<T>
where
    T: SimObject,
{
    state: Rc<PortState<T>>,
    done: bool,
}

impl<T> Future for PortGet<T>
where
    T: SimObject,
{
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let value = self.state.value.borrow_mut().take();
        if let Some(value) = value {
            self.done = true;

            if let Some(waker) = self.state.waiting_put.borrow_mut().take() {
                waker.wake();
            }
            Poll::Ready(value)
        } else {
            if let Some(waker) = self.state.waiting_put.borrow_mut().take() {
                waker.wake();
            }

            *self.state.waiting_get.borrow_mut() = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl<T> FusedFuture for PortGet<T>
where
    T: SimObject,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}
