// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

//! Single-threaded task executor.
//!
//! The executor polls every runnable task to completion or suspension. When
//! nothing is runnable the earliest pending clock instant is fired, which
//! wakes the tasks scheduled for it. The simulation ends when no task is
//! runnable and no clock has pending work.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use mesa_track::entity::Entity;

use crate::time::clock::Clock;
use crate::time::simtime::SimTime;
use crate::types::SimResult;

fn no_op(_: *const ()) {}

fn task_raw_waker(task: Rc<Task>) -> RawWaker {
    let vtable = &RawWakerVTable::new(clone_raw_waker, wake_task, no_op, no_op);
    let ptr = Rc::into_raw(task) as *const ();
    RawWaker::new(ptr, vtable)
}

fn waker_for_task(task: Rc<Task>) -> Waker {
    unsafe { Waker::from_raw(task_raw_waker(task)) }
}

unsafe fn clone_raw_waker(data: *const ()) -> RawWaker {
    unsafe {
        // Tasks are always wrapped in a reference counter to allow them to
        // be shared read-only.
        let rc_task = Rc::from_raw(data as *const Task);
        let clone = rc_task.clone();
        let vtable = &RawWakerVTable::new(clone_raw_waker, wake_task, no_op, no_op);
        let ptr = Rc::into_raw(clone) as *const ();
        RawWaker::new(ptr, vtable)
    }
}

unsafe fn wake_task(data: *const ()) {
    unsafe {
        // Waking a task simply places it back on the runnable queue.
        let rc_task = Rc::from_raw(data as *const Task);
        let cloned = rc_task.clone();
        rc_task.executor_state.runnable.borrow_mut().push_back(cloned);
    }
}

struct Task {
    future: RefCell<Pin<Box<dyn Future<Output = SimResult>>>>,
    executor_state: Rc<ExecutorState>,
}

impl Task {
    fn new(future: impl Future<Output = SimResult> + 'static, state: Rc<ExecutorState>) -> Task {
        Task {
            future: RefCell::new(Box::pin(future)),
            executor_state: state,
        }
    }

    fn poll(&self, context: &mut Context) -> Poll<SimResult> {
        self.future.borrow_mut().as_mut().poll(context)
    }
}

struct ExecutorState {
    runnable: RefCell<VecDeque<Rc<Task>>>,
    time: RefCell<SimTime>,
}

impl ExecutorState {
    fn new(top: &Rc<Entity>) -> Self {
        Self {
            runnable: RefCell::new(VecDeque::new()),
            time: RefCell::new(SimTime::new(top)),
        }
    }
}

/// Single-threaded executor.
///
/// This is a thin wrapper (using [`Rc`]) around the real executor state, so
/// that this struct can be cloned and passed around.
#[derive(Clone)]
pub struct Executor {
    pub entity: Rc<Entity>,
    state: Rc<ExecutorState>,
}

impl Executor {
    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        self.state
            .runnable
            .borrow_mut()
            .push_back(Rc::new(Task::new(future, self.state.clone())));
    }

    pub fn run(&self) -> SimResult {
        loop {
            self.step()?;

            if self.state.runnable.borrow().is_empty() {
                if let Some(wakers) = self.state.time.borrow_mut().advance_time() {
                    // No task runnable - fire the next clock instant
                    for waker in wakers.into_iter() {
                        waker.wake();
                    }
                } else {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Poll every task that is currently runnable.
    ///
    /// Tasks woken while this batch is being polled become runnable for the
    /// next step.
    pub fn step(&self) -> SimResult {
        let batch: Vec<Rc<Task>> = self.state.runnable.borrow_mut().drain(..).collect();

        for task in batch {
            let waker = waker_for_task(task.clone());
            let mut context = Context::from_waker(&waker);

            match task.poll(&mut context) {
                Poll::Ready(Err(e)) => {
                    // Error - return early
                    return Err(e);
                }
                Poll::Ready(Ok(())) => {
                    // Task complete - drop it
                }
                Poll::Pending => {
                    // Task has parked itself waiting somewhere
                }
            }
        }
        Ok(())
    }

    pub fn get_clock(&self, freq_mhz: f64) -> Clock {
        self.state.time.borrow_mut().get_clock(freq_mhz)
    }

    pub fn time_now_ns(&self) -> f64 {
        self.state.time.borrow().time_now_ns()
    }
}

/// `Spawner` spawns new futures into the executor.
#[derive(Clone)]
pub struct Spawner {
    state: Rc<ExecutorState>,
}

impl Spawner {
    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        self.state
            .runnable
            .borrow_mut()
            .push_back(Rc::new(Task::new(future, self.state.clone())));
    }
}

pub fn new_executor_and_spawner(top: &Rc<Entity>) -> (Executor, Spawner) {
    let state = Rc::new(ExecutorState::new(top));
    let entity = Rc::new(Entity::new(top, "executor"));
    (
        Executor {
            entity,
            state: state.clone(),
        },
        Spawner { state },
    )
}
