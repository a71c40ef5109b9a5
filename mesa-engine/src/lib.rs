// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! `MESA` - Memory Expansion Simulation Architecture
//!
//! This library provides the core of the MESA [engine](crate::engine) which
//! executes event driven asynchronous simulation components.
//!
//! # Simple Application
//!
//! A very simple application would look like:
//!
//! ```rust
//! use mesa_components::option_box_repeat;
//! use mesa_components::sink::Sink;
//! use mesa_components::source::Source;
//! use mesa_components::connect_port;
//! use mesa_engine::engine::Engine;
//! use mesa_engine::run_simulation;
//!
//! let mut engine = Engine::default();
//! let top = engine.top().clone();
//! let source = Source::new_and_register(&engine, &top, "source", option_box_repeat!(0x123 ; 10));
//! let sink = Sink::new_and_register(&engine, &top, "sink");
//! connect_port!(source, tx => sink, rx);
//! run_simulation!(engine);
//! assert_eq!(sink.num_sunk(), 10);
//! ```
//!
//! Simulations can be run as purely event driven (where one event triggers
//! one or more others) or the use of clocks can be introduced to model time.
//! The combination of both is the most common.
//!
//! The [engine](crate::engine::Engine) manages the
//! [clocks](crate::time::clock). Components wait for clock ticks with
//! [`Clock::wait_ticks`](crate::time::clock::Clock::wait_ticks) and for each
//! other with [events](crate::events) and [ports](crate::port).

pub mod engine;
pub mod events;
pub mod executor;
pub mod port;
pub mod test_helpers;
pub mod time;
pub mod traits;
pub mod types;

#[macro_export]
/// Run the simulation to completion.
///
/// The two-argument form expects the simulation to end with an error and
/// asserts on its message.
macro_rules! run_simulation {
    ($engine:expr) => {
        $engine.run().unwrap();
    };
    ($engine:expr, $expect:expr) => {
        match $engine.run() {
            Ok(()) => panic!("Expected an error!"),
            Err(e) => assert_eq!(format!("{e}").as_str(), $expect),
        }
    };
}

#[macro_export]
/// Spawn a sub-component that is stored in a `RefCell<Option<>>`.
///
/// This removes the sub-component from the Option and then spawns the
/// `run()` function.
macro_rules! spawn_subcomponent {
    ($($spawner:ident).+ ; $($block:ident).+) => {
        let sub_block = $($block).+.borrow_mut().take().unwrap();
        $($spawner).+.spawn(async move { sub_block.run().await } );
    };
}
