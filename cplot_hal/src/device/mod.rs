//! Device manager.
//!
//! [`Device`] owns the transport of one connected controller, the live
//! settings and the pacing gates. Motion and pen commands pass the
//! queue-depth and rate gates before they are written; emergency stop and
//! the direct commands (motor enable, queries, clear, reboot) do not.
//!
//! # Module Structure
//!
//! - [`state`] - Lifecycle state machine
//! - [`pacing`] - Queue-depth and rate gates
//! - [`servo`] - Pen servo unit conversions
//! - [`lock`] - Cross-process advisory lock

pub mod lock;
pub mod pacing;
pub mod servo;
pub mod state;

pub use lock::DeviceLock;
pub use pacing::Pacer;
pub use state::DeviceState;

use crate::clock::{Clock, SystemClock};
use crate::drivers::{open_transport, ports};
use crate::ebb::{
    self, ClearFlags, EbbCommand, EbbLink, LowLevelMove, MotionStatus, RetryPolicy, StatusSnapshot,
};
use crate::transport::Transport;
use cplot_common::consts::{
    DEFAULT_BAUD, DEFAULT_JOG_SPEED_MM_S, DEFAULT_TIMEOUT_MS, EBB_MAX_DURATION_MS,
};
use cplot_common::hal::driver::MotionDevice;
use cplot_common::hal::error::{DeviceError, DeviceResult};
use cplot_common::hal::types::{MotorMode, PhaseMove};
use cplot_common::settings::DeviceSettings;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Steps from millimetres, rounded and saturated to `i32`.
fn mm_to_steps(mm: f64, steps_per_mm: f64) -> i32 {
    if !mm.is_finite() {
        warn!("Invalid distance {mm} mm, using 0 steps");
        return 0;
    }
    (mm * steps_per_mm)
        .round()
        .clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

/// Move duration in ms, at least 1 and at most the firmware ceiling.
fn duration_ms(distance_mm: f64, speed_mm_s: f64) -> u32 {
    if !(distance_mm > 0.0) || !(speed_mm_s > 0.0) {
        return 1;
    }
    let ms = (distance_mm / speed_mm_s * 1000.0).ceil();
    ms.clamp(1.0, f64::from(EBB_MAX_DURATION_MS)) as u32
}

/// One AxiDraw-class plotter behind an EBB controller.
pub struct Device<C: Clock = SystemClock> {
    state: DeviceState,
    port_path: String,
    baud: u32,
    timeout: Duration,
    settings: DeviceSettings,
    pacer: Pacer,
    transport: Option<Box<dyn Transport>>,
    clock: C,
}

impl Device<SystemClock> {
    /// Device with factory defaults on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for Device<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Device<C> {
    /// Device with factory defaults on `clock`.
    pub fn with_clock(clock: C) -> Self {
        let settings = DeviceSettings::default();
        let pacer = Pacer::new(settings.fifo_limit, settings.min_cmd_interval_ms);
        let device = Self {
            state: DeviceState::Uninitialized,
            port_path: String::new(),
            baud: DEFAULT_BAUD,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            settings,
            pacer,
            transport: None,
            clock,
        };
        debug!(
            "Device initialized (baud={} timeout={:?} min_interval={:.1} ms)",
            device.baud, device.timeout, device.settings.min_cmd_interval_ms
        );
        device
    }

    /// Close any connection and return to factory defaults.
    pub fn init(&mut self) {
        self.disconnect();
        self.state = DeviceState::Uninitialized;
        self.port_path.clear();
        self.baud = DEFAULT_BAUD;
        self.timeout = Duration::from_millis(DEFAULT_TIMEOUT_MS);
        self.settings = DeviceSettings::default();
        self.pacer = Pacer::new(self.settings.fifo_limit, self.settings.min_cmd_interval_ms);
    }

    /// Set connection parameters before connecting.
    ///
    /// # Arguments
    /// * `port` - Device path; `None` keeps the current one, empty means auto-detect
    /// * `baud` - Serial baud; 0 selects 9600
    /// * `timeout_ms` - Per-command timeout; 0 selects 5000
    /// * `min_interval_ms` - Minimum spacing between dispatches; negative disables
    ///
    /// # Errors
    /// `DeviceError::Config` while connected.
    pub fn config(
        &mut self,
        port: Option<&str>,
        baud: u32,
        timeout_ms: u64,
        min_interval_ms: f64,
    ) -> DeviceResult<()> {
        if self.is_connected() {
            return Err(DeviceError::Config(
                "connection parameters cannot change while connected".to_string(),
            ));
        }
        if let Some(port) = port {
            self.port_path = port.to_string();
        }
        self.baud = if baud > 0 { baud } else { DEFAULT_BAUD };
        self.timeout = Duration::from_millis(if timeout_ms > 0 {
            timeout_ms
        } else {
            DEFAULT_TIMEOUT_MS
        });
        self.settings.min_cmd_interval_ms = min_interval_ms.max(0.0);
        self.pacer
            .set_limits(self.settings.fifo_limit, self.settings.min_cmd_interval_ms);
        self.state = DeviceState::Configured;
        info!(
            "Device configured: port={} baud={} timeout={:?} min_interval={:.1} ms",
            if self.port_path.is_empty() {
                "<auto>"
            } else {
                &self.port_path
            },
            self.baud,
            self.timeout,
            self.settings.min_cmd_interval_ms
        );
        Ok(())
    }

    /// Replace the live settings; synchronizes them when connected.
    pub fn apply_settings(&mut self, settings: DeviceSettings) {
        self.settings = settings;
        self.pacer
            .set_limits(self.settings.fifo_limit, self.settings.min_cmd_interval_ms);
        if self.is_connected() {
            // Failures are logged per field.
            let _ = self.sync_settings();
        }
    }

    // ─── Connection ─────────────────────────────────────────────────

    /// Open the configured port (auto-detecting it when empty) and probe it.
    ///
    /// # Errors
    /// `PortNotSpecified` when detection fails, `Open` when the port cannot
    /// be opened, `ProbeFailed` when the firmware does not answer `V`.
    pub fn connect(&mut self) -> DeviceResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        if self.port_path.is_empty() {
            match ports::guess_port() {
                Some(port) => self.port_path = port,
                None => return Err(DeviceError::PortNotSpecified),
            }
        }
        let transport = open_transport(&self.port_path, self.baud, self.timeout).inspect_err(
            |e| error!("Failed to open {}: {e}", self.port_path),
        )?;
        self.attach(transport)
    }

    /// Connect over an already opened transport.
    pub fn attach(&mut self, mut transport: Box<dyn Transport>) -> DeviceResult<()> {
        if self.is_connected() {
            self.disconnect();
        }
        let endpoint = transport.describe();
        let version = match ebb::probe_version(transport.as_mut(), self.timeout) {
            Ok(version) => version,
            Err(e) => {
                error!("Controller on {endpoint} did not answer V: {e}");
                return Err(DeviceError::ProbeFailed { path: endpoint });
            }
        };
        if self.port_path.is_empty() {
            self.port_path = endpoint;
        }
        self.transport = Some(transport);
        self.state = DeviceState::Connected;
        self.pacer.reset();
        info!("Connected to {} ({version})", self.port_path);
        // Failures are logged per field.
        let _ = self.sync_settings();
        Ok(())
    }

    /// Close the transport; safe to call at any time.
    pub fn disconnect(&mut self) {
        if self.transport.take().is_some() {
            info!("Disconnected from {}", self.port_path);
        }
        if self.state == DeviceState::Connected {
            self.state = DeviceState::Disconnected;
        }
        self.pacer.reset();
    }

    /// True while a probed transport is open.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected() && self.transport.is_some()
    }

    fn require_connection(&self) -> DeviceResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            error!("Device is not connected");
            Err(DeviceError::NotConnected)
        }
    }

    fn link(&mut self) -> DeviceResult<EbbLink<'_>> {
        self.require_connection()?;
        let policy = RetryPolicy::with_timeout(self.timeout);
        match self.transport.as_mut() {
            Some(transport) => Ok(EbbLink::new(transport.as_mut(), policy)),
            None => Err(DeviceError::NotConnected),
        }
    }

    // ─── Settings synchronization ───────────────────────────────────

    /// Push the servo settings to the firmware.
    ///
    /// Servo mode is always enabled; positions, speeds and the power-off
    /// timeout are sent only when set. A rejected field is logged and the
    /// rest are still sent.
    ///
    /// # Returns
    /// Number of fields the firmware rejected.
    pub fn sync_settings(&mut self) -> DeviceResult<usize> {
        let mut commands = vec![EbbCommand::Configure {
            param: servo::param::PEN_MODE,
            value: 1,
        }];
        let s = &self.settings;
        if let Some(pos) = s.pen_up_pos {
            commands.push(EbbCommand::Configure {
                param: servo::param::PEN_UP_POS,
                value: servo::percent_to_servo(pos),
            });
        }
        if let Some(pos) = s.pen_down_pos {
            commands.push(EbbCommand::Configure {
                param: servo::param::PEN_DOWN_POS,
                value: servo::percent_to_servo(pos),
            });
        }
        if let Some(speed) = s.pen_up_speed {
            commands.push(EbbCommand::Configure {
                param: servo::param::PEN_UP_RATE,
                value: servo::speed_to_rate(speed),
            });
        }
        if let Some(speed) = s.pen_down_speed {
            commands.push(EbbCommand::Configure {
                param: servo::param::PEN_DOWN_RATE,
                value: servo::speed_to_rate(speed),
            });
        }
        if let Some(seconds) = s.servo_timeout_s {
            commands.push(EbbCommand::ServoTimeout {
                timeout_ms: servo::timeout_ms(seconds),
                power: Some(true),
            });
        }

        let mut link = self.link()?;
        let mut rejected = 0;
        for cmd in &commands {
            match link.exec(cmd) {
                Ok(()) => debug!("Settings: {:?} applied", cmd),
                Err(e) => {
                    warn!("Settings: {} not applied: {e}", cmd.code());
                    rejected += 1;
                }
            }
        }
        Ok(rejected)
    }

    // ─── Gated dispatch ─────────────────────────────────────────────

    fn wait_slot(&mut self) -> DeviceResult<()> {
        let policy = RetryPolicy::with_timeout(self.timeout);
        let Some(transport) = self.transport.as_mut() else {
            return Err(DeviceError::NotConnected);
        };
        let mut link = EbbLink::new(transport.as_mut(), policy);
        self.pacer
            .wait_queue_slot(&self.clock, self.timeout, || link.query_motion())?;
        self.pacer.wait_interval(&self.clock);
        Ok(())
    }

    fn dispatch(&mut self, cmd: &EbbCommand) -> DeviceResult<()> {
        self.require_connection()?;
        cmd.validate()
            .inspect_err(|e| error!("{} not sent: {e}", cmd.code()))?;
        self.wait_slot()?;
        self.link()?.exec(cmd)?;
        self.pacer.mark_dispatched(self.clock.now());
        debug!("{} dispatched, {} in flight", cmd.code(), self.pacer.in_flight());
        Ok(())
    }

    fn set_pen(&mut self, up: bool) -> DeviceResult<()> {
        let settle_ms = if up {
            self.settings.pen_up_delay_ms
        } else {
            self.settings.pen_down_delay_ms
        };
        debug!("Pen {} (settle {settle_ms} ms)", if up { "up" } else { "down" });
        self.dispatch(&EbbCommand::SetPen {
            up,
            settle_ms,
            pin: None,
        })
    }

    /// Raise the pen.
    pub fn pen_up(&mut self) -> DeviceResult<()> {
        self.set_pen(true)
    }

    /// Lower the pen.
    pub fn pen_down(&mut self) -> DeviceResult<()> {
        self.set_pen(false)
    }

    /// `SM`: timed move in motor steps.
    pub fn move_xy(&mut self, duration_ms: u32, steps_x: i32, steps_y: i32) -> DeviceResult<()> {
        self.dispatch(&EbbCommand::StepperMove {
            duration_ms,
            steps1: steps_x,
            steps2: steps_y,
        })
    }

    /// `XM`: timed move in mixed-axis steps.
    pub fn move_corexy(&mut self, duration_ms: u32, steps_a: i32, steps_b: i32) -> DeviceResult<()> {
        self.dispatch(&EbbCommand::MixedMove {
            duration_ms,
            steps_a,
            steps_b,
        })
    }

    /// `LM`: low-level accelerated move.
    pub fn move_lowlevel(&mut self, lm: &LowLevelMove, clear: Option<ClearFlags>) -> DeviceResult<()> {
        self.dispatch(&lm.command(clear))
    }

    /// `LT`: low-level move over a fixed number of 40 µs intervals.
    pub fn move_lowlevel_time(
        &mut self,
        intervals: u32,
        rates: (i32, i32),
        accels: (i32, i32),
        clear: Option<ClearFlags>,
    ) -> DeviceResult<()> {
        self.dispatch(&EbbCommand::LowLevelTime {
            intervals,
            rate1: rates.0,
            accel1: accels.0,
            rate2: rates.1,
            accel2: accels.1,
            clear,
        })
    }

    /// `HM`: move home, or to an absolute step position.
    pub fn home(&mut self, step_rate: u32, position: Option<(i32, i32)>) -> DeviceResult<()> {
        debug!("Home move: rate={step_rate} position={position:?}");
        self.dispatch(&EbbCommand::HomeMove {
            step_rate,
            position,
        })
    }

    /// Relative move in millimetres.
    ///
    /// Speed falls back to the settings speed, then to 75 mm/s.
    ///
    /// # Errors
    /// `DeviceError::Config` without a usable steps-per-mm.
    pub fn move_mm(&mut self, dx_mm: f64, dy_mm: f64, speed_mm_s: Option<f64>) -> DeviceResult<()> {
        let Some(spmm) = self.settings.steps_per_mm() else {
            error!("Steps per mm is not set, no profile applied");
            return Err(DeviceError::Config("steps_per_mm is not set".to_string()));
        };
        let speed = speed_mm_s
            .filter(|v| *v > 0.0)
            .or_else(|| (self.settings.speed_mm_s > 0.0).then_some(self.settings.speed_mm_s))
            .unwrap_or(DEFAULT_JOG_SPEED_MM_S);
        let duration = duration_ms(dx_mm.hypot(dy_mm), speed);
        self.move_xy(duration, mm_to_steps(dx_mm, spmm), mm_to_steps(dy_mm, spmm))
    }

    // ─── Ungated commands ───────────────────────────────────────────

    /// `ES`: stop immediately, bypassing both gates.
    pub fn emergency_stop(&mut self) -> DeviceResult<()> {
        let result = self.link()?.exec(&EbbCommand::EmergencyStop);
        match result {
            Ok(()) => {
                self.pacer.reset();
                warn!("Emergency stop executed");
                Ok(())
            }
            Err(e) => {
                error!("Emergency stop failed: {e}");
                Err(e)
            }
        }
    }

    /// `EM`: set both motor modes.
    pub fn enable_motors(&mut self, motor1: MotorMode, motor2: MotorMode) -> DeviceResult<()> {
        self.link()?
            .exec(&EbbCommand::enable_motors(motor1, motor2))
    }

    /// `EM,0,0`: release both motors.
    pub fn disable_motors(&mut self) -> DeviceResult<()> {
        self.enable_motors(MotorMode::Disabled, MotorMode::Disabled)
    }

    /// `CS`: zero the global step position.
    pub fn clear_steps(&mut self) -> DeviceResult<()> {
        self.link()?.exec(&EbbCommand::ClearSteps)
    }

    /// `QP`: true when the pen is up.
    pub fn query_pen(&mut self) -> DeviceResult<bool> {
        self.link()?.query_pen()
    }

    /// `QS`: global step position.
    pub fn query_steps(&mut self) -> DeviceResult<(i32, i32)> {
        self.link()?.query_steps()
    }

    /// `QM`: motion status; refreshes the in-flight estimate.
    pub fn query_motion(&mut self) -> DeviceResult<MotionStatus> {
        let status = self.link()?.query_motion()?;
        self.pacer.refresh(&status);
        Ok(status)
    }

    /// `V`: firmware version.
    pub fn query_version(&mut self) -> DeviceResult<String> {
        self.link()?.query_version()
    }

    /// Motion, position, pen, servo and version in one read.
    pub fn status(&mut self) -> DeviceResult<StatusSnapshot> {
        let snapshot = self.link()?.collect_status()?;
        self.pacer.refresh(&snapshot.motion);
        Ok(snapshot)
    }

    /// `RB`: reboot the controller and drop the connection.
    pub fn reboot(&mut self) -> DeviceResult<()> {
        self.link()?.exec(&EbbCommand::Reboot)?;
        info!("Controller rebooting");
        self.disconnect();
        Ok(())
    }

    /// Poll motion status until nothing is executing or queued.
    ///
    /// # Errors
    /// `DeviceError::Timeout` after `attempts` busy polls.
    pub fn wait_for_idle(&mut self, attempts: u32, pause: Duration) -> DeviceResult<()> {
        let start = self.clock.now();
        for _ in 0..attempts {
            if self.query_motion()?.is_idle() {
                return Ok(());
            }
            self.clock.sleep(pause);
        }
        let waited = self.clock.now().saturating_sub(start);
        warn!("Device still busy after {attempts} polls");
        Err(DeviceError::Timeout {
            what: "device idle",
            waited_ms: waited.as_millis() as u64,
        })
    }

    // ─── Accessors ──────────────────────────────────────────────────

    /// Lifecycle state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Live settings.
    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    /// Port path (empty until configured or detected).
    pub fn port(&self) -> &str {
        &self.port_path
    }

    /// Serial baud rate.
    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Per-command timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Commands believed to be queued or executing.
    pub fn in_flight(&self) -> usize {
        self.pacer.in_flight()
    }

    /// Clock driving the gates.
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<C: Clock> Drop for Device<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<C: Clock> MotionDevice for Device<C> {
    fn steps_per_mm(&self) -> Option<f64> {
        self.settings.steps_per_mm()
    }

    fn is_connected(&self) -> bool {
        Device::is_connected(self)
    }

    fn move_phase(&mut self, phase: &PhaseMove) -> DeviceResult<()> {
        match LowLevelMove::from_phase(phase) {
            Some(lm) => {
                debug!(
                    "Phase {:.4} mm {:.3}->{:.3} mm/s: {:?}",
                    phase.distance_mm, phase.start_speed, phase.end_speed, lm
                );
                self.move_lowlevel(&lm, Some(ClearFlags::empty()))
            }
            None => Ok(()),
        }
    }
}
