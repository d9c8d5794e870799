//! Latest command pair shared between the receive path and the sender loop

use parking_lot::Mutex;

/// One (throttle, steer) pair, each in [-1, 1]
///
/// Kept at full precision; the wire frame rounds straight from these values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommandValue {
    pub throttle: f64,
    pub steer: f64,
}

impl CommandValue {
    pub const NEUTRAL: Self = Self {
        throttle: 0.0,
        steer: 0.0,
    };
}

/// Cell holding the latest [`CommandValue`]
///
/// The pair is replaced as a whole under the lock, so a reader never sees a
/// pair that mixes two different receive events. The lock is held only for
/// the copy.
#[derive(Debug, Default)]
pub struct CommandState {
    value: Mutex<CommandValue>,
}

impl CommandState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, value: CommandValue) {
        *self.value.lock() = value;
    }

    pub fn load(&self) -> CommandValue {
        *self.value.lock()
    }
}
