// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! The capability contract between a deferred sender and its peer.

use mesa_engine::events::repeated::Repeated;

use crate::memory::access::MemAccess;

/// A connection point that accepts timed sends.
///
/// Both the backend memory and the remote side of the link implement this.
/// A refused send returns the access to the caller, which must hold it and
/// only try again after the peer's retry event fires.
pub trait LinkPeer {
    /// Attempt to hand `access` to this peer.
    fn try_send(&self, access: MemAccess) -> Result<(), MemAccess>;

    /// Event notified when a previously refused sender may try again.
    fn retry_event(&self) -> Repeated<()>;
}
