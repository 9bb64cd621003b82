//! Registry lifecycle: `Uninitialized → Connected → Closing → Closed`.

use std::fmt;

use crate::error::{RegistryError, RegistryResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized,
    Connected,
    Closing,
    Closed,
}

impl LifecycleState {
    /// Check that `connect()` may proceed from this state.
    pub fn check_connect(self) -> RegistryResult<()> {
        match self {
            Self::Uninitialized => Ok(()),
            Self::Connected => Err(RegistryError::AlreadyConnected),
            Self::Closing | Self::Closed => Err(RegistryError::AlreadyClosed),
        }
    }

    /// Check that `close()` may proceed from this state.
    ///
    /// Closing a registry that never connected fails with `NotConnected`.
    pub fn check_close(self) -> RegistryResult<()> {
        match self {
            Self::Connected => Ok(()),
            Self::Uninitialized => Err(RegistryError::NotConnected),
            Self::Closing | Self::Closed => Err(RegistryError::AlreadyClosed),
        }
    }

    /// Only a connected registry serves remote requests.
    pub fn accepts_requests(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}
