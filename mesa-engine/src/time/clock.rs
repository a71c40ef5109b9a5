// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

//! This module represents the time during a simulation.
//!
//! Each [`Clock`] counts whole [`Tick`]s at its own frequency. Futures delay
//! themselves by registering against a tick on the clock's pending wheel.

use core::cmp::Ordering;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::ops::{Add, AddAssign, Sub};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// A whole number of clock cycles since the start of the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(pub u64);

impl Tick {
    /// The cycle count this tick represents.
    #[must_use]
    pub fn ticks(self) -> u64 {
        self.0
    }
}

impl Add<u64> for Tick {
    type Output = Tick;

    fn add(self, rhs: u64) -> Tick {
        Tick(self.0 + rhs)
    }
}

impl AddAssign<u64> for Tick {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

/// The difference between two ticks. The right-hand side must not be later.
impl Sub<Tick> for Tick {
    type Output = u64;

    fn sub(self, rhs: Tick) -> u64 {
        assert!(self >= rhs, "Tick subtraction going backwards");
        self.0 - rhs.0
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared state between futures using a Clock and the Clock itself.
pub struct ClockState {
    now: Cell<Tick>,

    /// Wakers for futures waiting for a tick, keyed by that tick. The map
    /// ordering makes the first entry the next to fire.
    pending: RefCell<BTreeMap<Tick, Vec<Waker>>>,
}

impl ClockState {
    fn schedule(&self, at: Tick, cx: &mut Context<'_>) {
        self.pending
            .borrow_mut()
            .entry(at)
            .or_default()
            .push(cx.waker().clone());
    }

    fn advance(&self, to: Tick) {
        if to != self.now.get() {
            assert!(to >= self.now.get(), "Time moving backwards");
            self.now.set(to);
        }
    }
}

#[derive(Clone)]
/// State representing a clock.
pub struct Clock {
    /// Frequency of the clock in MHz.
    /// *Note*: should never be changed as it is registered at this frequency.
    freq_mhz: f64,

    pub shared_state: Rc<ClockState>,
}

impl Clock {
    /// Create a new [Clock] at the specified frequency.
    #[must_use]
    pub fn new(freq_mhz: f64) -> Self {
        let shared_state = Rc::new(ClockState {
            now: Cell::new(Tick(0)),
            pending: RefCell::new(BTreeMap::new()),
        });

        Self {
            freq_mhz,
            shared_state,
        }
    }

    /// Returns the clock's frequency in MHz.
    #[must_use]
    pub fn freq_mhz(&self) -> f64 {
        self.freq_mhz
    }

    /// Returns the current [Tick].
    #[must_use]
    pub fn tick_now(&self) -> Tick {
        self.shared_state.now.get()
    }

    /// Returns the current time in `ns`.
    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.to_ns(self.tick_now())
    }

    /// Returns the time in `ns` of the next event registered with this
    /// clock, or `f64::MAX` if there is none.
    #[must_use]
    pub fn time_of_next(&self) -> f64 {
        match self.shared_state.pending.borrow().keys().next() {
            Some(tick) => self.to_ns(*tick),
            None => f64::MAX,
        }
    }

    /// Remove and return the next pending instant and its wakers.
    pub(crate) fn take_next(&self) -> Option<(Tick, Vec<Waker>)> {
        self.shared_state.pending.borrow_mut().pop_first()
    }

    /// Convert the given [Tick] to a time in `ns` for this clock.
    #[must_use]
    pub fn to_ns(&self, tick: Tick) -> f64 {
        tick.0 as f64 / self.freq_mhz * 1000.0
    }

    /// Returns a [ClockDelay] future which must be `await`ed to delay the
    /// specified number of ticks.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_ticks(&self, ticks: u64) -> ClockDelay {
        ClockDelay {
            shared_state: self.shared_state.clone(),
            until: self.tick_now() + ticks,
            state: ClockDelayState::Pending,
        }
    }

    /// Returns a [ClockDelay] future that completes once the clock has
    /// reached `tick`. Completes immediately if that time has already
    /// passed.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_until(&self, tick: Tick) -> ClockDelay {
        ClockDelay {
            shared_state: self.shared_state.clone(),
            until: tick,
            state: ClockDelayState::Pending,
        }
    }
}

/// The default clock is simply a 1GHz clock so ticks are 1ns.
impl Default for Clock {
    fn default() -> Self {
        Self::new(1000.0)
    }
}

/// The comparison operators for Clocks - use the next pending instant.
impl PartialEq for Clock {
    fn eq(&self, other: &Self) -> bool {
        self.time_of_next() == other.time_of_next()
    }
}
impl Eq for Clock {}

impl Ord for Clock {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.time_of_next() < other.time_of_next() {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}

impl PartialOrd for Clock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Possible states of a ClockDelay.
enum ClockDelayState {
    Pending,
    Running,
}

/// Future returned by the clock to manage advancing time using async
/// functions.
pub struct ClockDelay {
    shared_state: Rc<ClockState>,
    until: Tick,
    state: ClockDelayState,
}

impl Future for ClockDelay {
    type Output = ();
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.state {
            ClockDelayState::Pending => {
                if self.until <= self.shared_state.now.get() {
                    // Nothing to wait for
                    return Poll::Ready(());
                }
                self.shared_state.schedule(self.until, cx);
                self.state = ClockDelayState::Running;
                Poll::Pending
            }
            ClockDelayState::Running => {
                // This future is woken when its instant fires; the first
                // woken future moves the clock forwards.
                self.shared_state.advance(self.until);
                Poll::Ready(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_to_ns() {
        let clk_ghz = Clock::new(1000.0);
        assert_eq!(1.0, clk_ghz.to_ns(Tick(1)));

        let slow_clk = Clock::new(0.5);
        assert_eq!(2000.0, slow_clk.to_ns(Tick(1)));
    }

    #[test]
    fn tick_arithmetic() {
        let t = Tick(5) + 3;
        assert_eq!(t, Tick(8));
        assert_eq!(t - Tick(5), 3);
    }

    #[test]
    #[should_panic(expected = "Tick subtraction going backwards")]
    fn tick_subtraction_backwards() {
        let _ = Tick(5) - Tick(8);
    }
}
