// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! A counted resource with async acquisition.
//!
//! A [`Resource`] hands out up to `capacity` units at once. Requests beyond
//! the capacity park until a unit is released. Releases beyond what was
//! acquired are an error.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use mesa_engine::sim_error;
use mesa_engine::types::SimResult;

struct State {
    capacity: usize,
    held: usize,

    /// Requests waiting for a unit, woken in arrival order.
    parked: VecDeque<Waker>,
}

impl State {
    fn release_one(&mut self) -> SimResult {
        if self.held == 0 {
            return sim_error!("Invalid release");
        }
        self.held -= 1;
        if let Some(next) = self.parked.pop_front() {
            next.wake();
        }
        Ok(())
    }
}

/// A counted resource that a limited number of users can hold at once.
#[derive(Clone)]
pub struct Resource {
    state: Rc<RefCell<State>>,
}

impl Resource {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                capacity,
                held: 0,
                parked: VecDeque::new(),
            })),
        }
    }

    /// Acquire one unit, waiting for one to free if all are held.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn request(&self) -> ResourceRequest {
        ResourceRequest {
            state: self.state.clone(),
        }
    }

    /// Release one previously acquired unit.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn release(&self) -> ResourceRelease {
        ResourceRelease {
            state: self.state.clone(),
        }
    }

    /// Units currently held.
    #[must_use]
    pub fn count(&self) -> usize {
        self.state.borrow().held
    }

    /// Total units this resource hands out.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.borrow().capacity
    }
}

pub struct ResourceRequest {
    state: Rc<RefCell<State>>,
}

impl Future for ResourceRequest {
    type Output = ();
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        if state.held == state.capacity {
            state.parked.push_back(cx.waker().clone());
            Poll::Pending
        } else {
            state.held += 1;
            Poll::Ready(())
        }
    }
}

pub struct ResourceRelease {
    state: Rc<RefCell<State>>,
}

impl Future for ResourceRelease {
    type Output = SimResult;
    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.state.borrow_mut().release_one()?;
        Poll::Ready(Ok(()))
    }
}

/// Holds one [`Resource`] unit for the guard's lifetime.
pub struct ResourceGuard {
    resource: Resource,
}

impl ResourceGuard {
    pub async fn new(resource: Resource) -> Self {
        resource.request().await;
        Self { resource }
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.resource.state.borrow_mut().release_one().unwrap();
    }
}
