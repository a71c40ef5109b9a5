// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! Shared resource primitives.

pub mod base;

pub use base::{Resource, ResourceGuard};
