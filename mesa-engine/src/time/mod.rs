// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

//! Simulation time.

pub mod clock;
pub mod simtime;
