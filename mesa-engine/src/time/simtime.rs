// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

//! The overall owner of time within a simulation.

use std::rc::Rc;
use std::task::Waker;

use mesa_track::entity::Entity;
use mesa_track::set_time;

use super::clock::Clock;

/// The overall owner of time within a simulation.
///
/// Contains all Clocks and the current simulation time in ns.
#[derive(Clone)]
pub struct SimTime {
    pub entity: Rc<Entity>,

    current_ns: f64,

    /// Clocks are auto-created as required, one per frequency.
    clocks: Vec<Clock>,
}

impl SimTime {
    #[must_use]
    pub fn new(parent: &Rc<Entity>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "time")),
            current_ns: 0.0,
            clocks: Vec::new(),
        }
    }

    pub fn get_clock(&mut self, freq_mhz: f64) -> Clock {
        for clock in &self.clocks {
            if clock.freq_mhz() == freq_mhz {
                return clock.clone();
            }
        }
        let clock = Clock::new(freq_mhz);
        self.clocks.push(clock.clone());
        clock
    }

    /// Choose the clock with the next pending instant and return the
    /// associated wakers, or `None` when no clock has pending work.
    pub fn advance_time(&mut self) -> Option<Vec<Waker>> {
        let next_clock = self.clocks.iter().min_by(|a, b| a.cmp(b))?;
        let (tick, wakers) = next_clock.take_next()?;

        let next_ns = next_clock.to_ns(tick);
        if self.current_ns != next_ns {
            set_time!(self.entity ; next_ns);
            self.current_ns = next_ns;
        }
        Some(wakers)
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.current_ns
    }
}

#[cfg(test)]
mod tests {
    use mesa_track::entity::toplevel;
    use mesa_track::tracker::dev_null_tracker;

    use super::*;

    #[test]
    fn clock_created_once() {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "top");

        let mut time = SimTime::new(&top);
        let _clk1 = time.get_clock(1000.0);
        assert_eq!(time.clocks.len(), 1);

        let _clk2 = time.get_clock(1000.0);
        assert_eq!(time.clocks.len(), 1);
    }

    #[test]
    fn create_different_clocks() {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "top");

        let mut time = SimTime::new(&top);
        let _clk1 = time.get_clock(1000.0);
        assert_eq!(time.clocks.len(), 1);

        let _clk2 = time.get_clock(1800.0);
        assert_eq!(time.clocks.len(), 2);
    }
}
