// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

//! Events that components use to wake each other.

pub mod repeated;
