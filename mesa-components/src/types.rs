// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! Shared component types.

/// The type of generator a [Source](crate::source::Source) pulls its data
/// from.
pub type DataGenerator<T> = Box<dyn Iterator<Item = T>>;
