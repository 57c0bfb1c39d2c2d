//! Executor run state as published to the supervisor.

/// What the executor is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ExecutorState {
    /// Nothing to execute; output holds the last pose.
    #[default]
    Idle = 0,
    /// Executing segments at a non-zero time scale.
    Running = 1,
    /// Paused (or feed 0) and still decelerating.
    Pausing = 2,
    /// Paused with the time scale at zero.
    Paused = 3,
    /// A runtime fault is latched; output holds until reset.
    Faulted = 4,
    /// Stopped short of the end of the published trajectory until the
    /// producer extends it.
    Waiting = 5,
}

impl ExecutorState {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Running),
            2 => Some(Self::Pausing),
            3 => Some(Self::Paused),
            4 => Some(Self::Faulted),
            5 => Some(Self::Waiting),
            _ => None,
        }
    }

    /// Whether setpoints may still move.
    #[inline]
    pub const fn is_moving(self) -> bool {
        matches!(self, Self::Running | Self::Pausing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u8() {
        for state in [
            ExecutorState::Idle,
            ExecutorState::Running,
            ExecutorState::Pausing,
            ExecutorState::Paused,
            ExecutorState::Faulted,
            ExecutorState::Waiting,
        ] {
            assert_eq!(ExecutorState::from_u8(state as u8), Some(state));
        }
        assert_eq!(ExecutorState::from_u8(6), None);
    }

    #[test]
    fn moving_states() {
        assert!(ExecutorState::Running.is_moving());
        assert!(ExecutorState::Pausing.is_moving());
        assert!(!ExecutorState::Paused.is_moving());
        assert!(!ExecutorState::Faulted.is_moving());
        assert!(!ExecutorState::Waiting.is_moving());
    }
}
