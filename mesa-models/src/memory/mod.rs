// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! Backend memory.

pub mod access;
pub mod traits;

mod device;

pub use access::MemAccess;
pub use device::{MemoryChannel, MemoryConfig, MemoryDevice};
pub use traits::LinkPeer;
