//! Records exchanged between the stepper and the device layer.

use serde::Serialize;

/// One timed phase of a planned block, ready for low-level dispatch.
///
/// Step counts are in mixed-axis (A/B) motor steps; speeds are path speeds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PhaseMove {
    /// Path length covered by the phase (mm).
    pub distance_mm: f64,
    /// Path speed at phase start (mm/s).
    pub start_speed: f64,
    /// Path speed at phase end (mm/s).
    pub end_speed: f64,
    /// Motor A steps.
    pub steps_a: i32,
    /// Motor B steps.
    pub steps_b: i32,
    /// Phase duration (s).
    pub duration_s: f64,
}

impl PhaseMove {
    /// True when the phase moves neither motor.
    pub const fn is_empty(&self) -> bool {
        self.steps_a == 0 && self.steps_b == 0
    }
}

/// Microstep mode of one motor (`EM` argument).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum MotorMode {
    /// Driver disabled.
    Disabled = 0,
    /// 1/16 microstepping.
    Step16 = 1,
    /// 1/8 microstepping.
    Step8 = 2,
    /// 1/4 microstepping.
    Step4 = 3,
    /// 1/2 microstepping.
    Step2 = 4,
    /// Full steps.
    Full = 5,
}

impl MotorMode {
    /// Parse a raw firmware code.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Disabled),
            1 => Some(Self::Step16),
            2 => Some(Self::Step8),
            3 => Some(Self::Step4),
            4 => Some(Self::Step2),
            5 => Some(Self::Full),
            _ => None,
        }
    }

    /// Raw firmware code.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_mode_codes_are_stable() {
        for code in 0..=5u8 {
            assert_eq!(MotorMode::from_code(code).map(MotorMode::code), Some(code));
        }
        assert!(MotorMode::from_code(6).is_none());
    }

    #[test]
    fn empty_phase() {
        assert!(PhaseMove::default().is_empty());
        let p = PhaseMove {
            steps_b: -1,
            ..PhaseMove::default()
        };
        assert!(!p.is_empty());
    }
}
