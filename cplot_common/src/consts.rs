//! Workspace-wide constants.
//!
//! Single source of truth for firmware limits, device defaults and paths.
//! Imported by all crates, never duplicated.

// ─── EBB firmware limits ────────────────────────────────────────────

/// Largest step count accepted by `SM`/`XM` (24-bit signed magnitude).
pub const EBB_MAX_STEPS: i32 = 16_777_215;

/// Largest duration accepted by `SM`/`XM`, in milliseconds.
pub const EBB_MAX_DURATION_MS: u32 = 16_777_215;

/// Largest step rate accepted by `LM`.
pub const EBB_LM_MAX_RATE: u32 = 2_147_483_647;

/// Lower bound of the `HM` step rate.
pub const EBB_HM_MIN_RATE: u32 = 2;

/// Upper bound of the `HM` step rate.
pub const EBB_HM_MAX_RATE: u32 = 25_000;

/// Largest absolute position accepted by `HM`.
pub const EBB_HM_MAX_POSITION: i32 = 4_294_967;

/// Maximum length of one formatted command, CR excluded.
pub const EBB_CMD_MAX_LEN: usize = 128;

/// Maximum response lines read while waiting for `OK`.
pub const EBB_MAX_READ_ATTEMPTS: u32 = 8;

/// Firmware low-level move interval (40 µs).
pub const EBB_LM_INTERVAL_S: f64 = 0.000_04;

/// Step-rate scale of `LM`: rate = steps/s × 2³¹ × interval.
pub const EBB_LM_RATE_SCALE: f64 = 2_147_483_648.0 * EBB_LM_INTERVAL_S;

// ─── Servo mapping ──────────────────────────────────────────────────

/// Servo pulse width at 0 %.
pub const SERVO_MIN: i32 = 7_500;

/// Servo pulse width at 100 %.
pub const SERVO_MAX: i32 = 28_000;

/// Servo rate units per percent/s.
pub const SERVO_SPEED_SCALE: i32 = 5;

// ─── Device defaults ────────────────────────────────────────────────

/// Serial baud used by the EBB USB CDC endpoint.
pub const DEFAULT_BAUD: u32 = 9_600;

/// Per-command response timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Commands allowed in flight before the queue-depth gate blocks.
pub const DEFAULT_FIFO_LIMIT: usize = 3;

/// Minimum spacing between dispatched commands in milliseconds.
pub const DEFAULT_MIN_INTERVAL_MS: f64 = 5.0;

/// Fallback speed for direct moves when no speed is configured (mm/s).
pub const DEFAULT_JOG_SPEED_MM_S: f64 = 75.0;

/// Poll period of the queue-depth gate in milliseconds.
pub const QUEUE_POLL_MS: u64 = 5;

/// Idle wait budget used after device actions.
pub const IDLE_WAIT_ATTEMPTS: u32 = 200;

/// Pause between idle polls in milliseconds.
pub const IDLE_WAIT_PAUSE_MS: u64 = 20;

// ─── Paths ──────────────────────────────────────────────────────────

/// File name of the cross-process device lock.
pub const LOCK_FILE_NAME: &str = "cplot-axidraw.lock";

/// Directory name under the XDG config home.
pub const CONFIG_DIR_NAME: &str = "cplot";

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn servo_range_is_ordered() {
        assert!(SERVO_MIN < SERVO_MAX);
        assert!(SERVO_MAX <= 65_535);
    }

    #[test]
    fn lm_rate_scale_matches_interval() {
        assert!((EBB_LM_RATE_SCALE - 85_899.345_92).abs() < 1e-6);
    }

    #[test]
    fn home_rate_bounds_are_ordered() {
        assert!(EBB_HM_MIN_RATE < EBB_HM_MAX_RATE);
    }
}
