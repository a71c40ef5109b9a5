// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

//! The engine that drives a simulation.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use mesa_track::Tracker;
use mesa_track::entity::{Entity, toplevel};
use mesa_track::tracker::stdout_tracker;

use crate::executor::{self, Executor, Spawner};
use crate::time::clock::Clock;
use crate::traits::Runnable;
use crate::types::SimResult;

/// Use a default clock frequency of 1GHz.
const DEFAULT_CLOCK_MHZ: f64 = 1000.0;

pub struct Engine {
    pub executor: Executor,
    spawner: Spawner,
    toplevel: Rc<Entity>,
    tracker: Tracker,

    /// Components whose `run()` is spawned when the simulation starts.
    registered: RefCell<Vec<Rc<dyn Runnable>>>,
}

impl Engine {
    /// Create a standalone engine.
    #[must_use]
    pub fn new(tracker: &Tracker) -> Self {
        let toplevel = toplevel(tracker, "top");
        let (executor, spawner) = executor::new_executor_and_spawner(&toplevel);
        Self {
            executor,
            spawner,
            toplevel,
            tracker: tracker.clone(),
            registered: RefCell::new(Vec::new()),
        }
    }

    /// Register a component so that its `run()` is spawned by
    /// [`Engine::run`].
    pub fn register(&self, component: Rc<dyn Runnable>) {
        self.registered.borrow_mut().push(component);
    }

    /// Spawn all registered components and run the simulation to
    /// completion.
    pub fn run(&mut self) -> SimResult {
        for component in self.registered.borrow_mut().drain(..) {
            self.executor
                .spawn(async move { component.run().await });
        }
        let result = self.executor.run();
        self.tracker.shutdown();
        result
    }

    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        self.executor.spawn(future);
    }

    #[must_use]
    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    pub fn default_clock(&mut self) -> Clock {
        self.executor.get_clock(DEFAULT_CLOCK_MHZ)
    }

    pub fn clock_mhz(&mut self, freq_mhz: f64) -> Clock {
        self.executor.get_clock(freq_mhz)
    }

    pub fn clock_ghz(&mut self, freq_ghz: f64) -> Clock {
        self.executor.get_clock(freq_ghz * 1000.0)
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.executor.time_now_ns()
    }

    #[must_use]
    pub fn top(&self) -> &Rc<Entity> {
        &self.toplevel
    }

    #[must_use]
    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}

/// Create a default engine that sends track events to stdout.
///
/// This is provided to keep documentation examples simple with fewer
/// concepts to have to consider at once.
impl Default for Engine {
    fn default() -> Self {
        let tracker = stdout_tracker();
        Self::new(&tracker)
    }
}
