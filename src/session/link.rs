//! Per-peripheral connection state machine

use crate::domain::models::PeripheralRole;
use crate::error::BridgeError;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Discovering,
    Connecting,
    Connected,
    Subscribing,
    /// Controller only
    Calibrating,
    Streaming,
    /// Terminal
    Disconnected,
}

impl LinkState {
    /// The single forward step from `self` for the given peripheral
    fn next(self, role: PeripheralRole) -> Option<LinkState> {
        use LinkState::*;
        match (self, role) {
            (Idle, _) => Some(Discovering),
            (Discovering, _) => Some(Connecting),
            (Connecting, _) => Some(Connected),
            (Connected, _) => Some(Subscribing),
            (Subscribing, PeripheralRole::Controller) => Some(Calibrating),
            (Subscribing, PeripheralRole::Actuator) => Some(Streaming),
            (Calibrating, _) => Some(Streaming),
            (Streaming, _) | (Disconnected, _) => None,
        }
    }
}

/// Lifecycle of one peripheral link: strictly forward, no way back
#[derive(Debug)]
pub struct Link {
    role: PeripheralRole,
    state: LinkState,
}

impl Link {
    pub fn new(role: PeripheralRole) -> Self {
        Self {
            role,
            state: LinkState::Idle,
        }
    }

    pub fn role(&self) -> PeripheralRole {
        self.role
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Move one step forward. Skipping or going back is rejected.
    pub fn advance(&mut self, to: LinkState) -> Result<(), BridgeError> {
        if self.state.next(self.role) != Some(to) {
            return Err(BridgeError::InvalidTransition {
                role: self.role,
                from: self.state,
                to,
            });
        }
        debug!("{} link: {:?} -> {:?}", self.role, self.state, to);
        self.state = to;
        Ok(())
    }

    /// Enter the terminal state from anywhere
    pub fn close(&mut self) {
        if self.state != LinkState::Disconnected {
            debug!("{} link: {:?} -> Disconnected", self.role, self.state);
            self.state = LinkState::Disconnected;
        }
    }

    /// Whether a transport connection may exist and needs releasing
    pub fn holds_connection(&self) -> bool {
        matches!(
            self.state,
            LinkState::Connecting
                | LinkState::Connected
                | LinkState::Subscribing
                | LinkState::Calibrating
                | LinkState::Streaming
        )
    }
}
