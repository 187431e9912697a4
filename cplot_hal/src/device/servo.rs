//! Pen servo unit conversions.

use cplot_common::consts::{SERVO_MAX, SERVO_MIN, SERVO_SPEED_SCALE};

/// `SC` parameter ids used by settings synchronization.
pub mod param {
    /// Pen lift mechanism (1 = standard servo).
    pub const PEN_MODE: u32 = 1;
    /// Servo position with the pen up.
    pub const PEN_UP_POS: u32 = 4;
    /// Servo position with the pen down.
    pub const PEN_DOWN_POS: u32 = 5;
    /// Servo rate while raising.
    pub const PEN_UP_RATE: u32 = 11;
    /// Servo rate while lowering.
    pub const PEN_DOWN_RATE: u32 = 12;
}

/// Map a 0–100 % position onto the firmware pulse-width range.
///
/// Out-of-range input is clamped; the result always lies in `1..=65535`.
pub fn percent_to_servo(percent: u8) -> u32 {
    let percent = i64::from(percent.min(100));
    let range = i64::from(SERVO_MAX - SERVO_MIN);
    let value = i64::from(SERVO_MIN) + (range * percent + 50) / 100;
    value.clamp(1, 65_535) as u32
}

/// Map a %/s speed onto the firmware servo rate, clamped to 65535.
pub fn speed_to_rate(speed: u32) -> u32 {
    let scale = SERVO_SPEED_SCALE.unsigned_abs();
    speed.saturating_mul(scale).min(65_535)
}

/// Servo power-off timeout in ms, saturating at `u32::MAX`.
pub fn timeout_ms(seconds: u32) -> u32 {
    u32::try_from(u64::from(seconds) * 1000).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_span_pulse_range() {
        assert_eq!(percent_to_servo(0), 7_500);
        assert_eq!(percent_to_servo(100), 28_000);
        assert_eq!(percent_to_servo(60), 19_800);
        // Half-integer rounding: 20500 * 1 / 100 = 205.
        assert_eq!(percent_to_servo(1), 7_705);
        assert_eq!(percent_to_servo(250), 28_000);
    }

    #[test]
    fn speeds_scale_and_clamp() {
        assert_eq!(speed_to_rate(150), 750);
        assert_eq!(speed_to_rate(0), 0);
        assert_eq!(speed_to_rate(20_000), 65_535);
        assert_eq!(speed_to_rate(u32::MAX), 65_535);
    }

    #[test]
    fn timeout_saturates() {
        assert_eq!(timeout_ms(60), 60_000);
        assert_eq!(timeout_ms(u32::MAX), u32::MAX);
    }
}
