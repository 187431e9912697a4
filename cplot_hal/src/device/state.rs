//! Device lifecycle.

use serde::Serialize;
use std::fmt;

/// Lifecycle state of a [`Device`](super::Device).
///
/// ```text
/// Uninitialized ──config──▶ Configured ──connect──▶ Connected
///        │                                   ▲          │
///        └───────────connect─────────────────┘      disconnect
///                                                       ▼
///                                                 Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DeviceState {
    /// Defaults applied, no port configured.
    #[default]
    Uninitialized,
    /// Port parameters set, not connected.
    Configured,
    /// Transport open and firmware probed.
    Connected,
    /// Transport closed after a session.
    Disconnected,
}

impl DeviceState {
    /// True in [`DeviceState::Connected`].
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Configured => "configured",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}
