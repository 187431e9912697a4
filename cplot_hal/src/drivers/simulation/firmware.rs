//! In-process model of the EBB command interpreter.
//!
//! Tracks the state the host can observe (step counters, pen, servo power,
//! motor modes, queue depth) and answers each command line the way the
//! firmware does. Motion completes instantly: every queued move is
//! reported once by `QM` and then retired, unless the FIFO is pinned.

use std::collections::BTreeMap;
use tracing::trace;

/// Version string reported by `V`.
pub const SIM_VERSION: &str = "EBBv13_and_above EB Firmware Version 3.0.2 (simulated)";

const UNKNOWN_COMMAND: &str = "!8 Err: Unknown command";

/// Observable firmware state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FirmwareState {
    /// Global step counter of motor 1.
    pub steps1: i64,
    /// Global step counter of motor 2.
    pub steps2: i64,
    /// Pen raised.
    pub pen_up: bool,
    /// Servo powered.
    pub servo_powered: bool,
    /// Motor 1 microstep mode (0 = disabled).
    pub motor1_mode: u8,
    /// Motor 2 microstep mode (0 = disabled).
    pub motor2_mode: u8,
    /// Moves accepted but not yet reported complete.
    pub queued: u32,
    /// `SC` parameters received.
    pub config: BTreeMap<u8, u32>,
    /// Last `SR` timeout (ms).
    pub servo_timeout_ms: Option<u32>,
    /// Number of reboots received.
    pub reboots: u32,
}

/// Firmware interpreter.
#[derive(Debug, Clone, Default)]
pub struct Firmware {
    state: FirmwareState,
    pinned_fifo: Option<u32>,
    overrides: Vec<(String, Vec<String>)>,
}

impl Firmware {
    /// Fresh controller: pen up, motors off, counters at zero.
    pub fn new() -> Self {
        Self {
            state: FirmwareState {
                pen_up: true,
                ..FirmwareState::default()
            },
            ..Self::default()
        }
    }

    /// Report `pending` queued commands from every `QM`, forever.
    pub fn pin_fifo(&mut self, pending: u32) {
        self.pinned_fifo = Some(pending);
    }

    /// Answer commands starting with `prefix` with `reply` instead.
    pub fn override_reply(&mut self, prefix: &str, reply: Vec<String>) {
        self.overrides.push((prefix.to_string(), reply));
    }

    /// Current state.
    pub fn state(&self) -> &FirmwareState {
        &self.state
    }

    /// Interpret one command line and return the response lines.
    pub fn handle(&mut self, line: &str) -> Vec<String> {
        if let Some((_, reply)) = self
            .overrides
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
        {
            return reply.clone();
        }

        let mut parts = line.split(',');
        let code = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();
        let reply = match self.dispatch(code, &args) {
            Ok(mut lines) => {
                lines.push("OK".to_string());
                lines
            }
            Err(Reply::Silent) => Vec::new(),
            Err(Reply::Error(msg)) => vec![msg],
        };
        trace!("sim: {line} -> {reply:?}");
        reply
    }

    fn dispatch(&mut self, code: &str, args: &[&str]) -> Result<Vec<String>, Reply> {
        let s = &mut self.state;
        match code {
            "V" => Ok(vec![SIM_VERSION.to_string()]),
            "QM" => {
                let pending = self.pinned_fifo.unwrap_or(s.queued);
                let active = u8::from(pending > 0);
                let fifo = pending.saturating_sub(1);
                let line = format!("QM,{active},{active},{active},{fifo}");
                if self.pinned_fifo.is_none() {
                    s.queued = 0;
                }
                Ok(vec![line])
            }
            "QS" => Ok(vec![format!("{},{}", s.steps1, s.steps2)]),
            "QP" => Ok(vec![u8::from(s.pen_up).to_string()]),
            "QR" => Ok(vec![u8::from(s.servo_powered).to_string()]),
            "EM" => {
                let [m1, m2] = ints::<2>(args)?;
                if !(0..=5).contains(&m1) || !(0..=5).contains(&m2) {
                    return Err(Reply::param());
                }
                s.motor1_mode = m1 as u8;
                s.motor2_mode = m2 as u8;
                Ok(Vec::new())
            }
            "SM" => {
                let [_, a, b] = ints::<3>(args)?;
                s.steps1 += a;
                s.steps2 += b;
                s.queued += 1;
                Ok(Vec::new())
            }
            "XM" => {
                let [_, a, b] = ints::<3>(args)?;
                s.steps1 += a + b;
                s.steps2 += a - b;
                s.queued += 1;
                Ok(Vec::new())
            }
            "LM" => {
                if args.len() < 6 {
                    return Err(Reply::param());
                }
                let [_, a, _, _, b, _] = ints::<6>(&args[..6])?;
                s.steps1 += a;
                s.steps2 += b;
                s.queued += 1;
                Ok(Vec::new())
            }
            "LT" => {
                if args.len() < 5 {
                    return Err(Reply::param());
                }
                s.queued += 1;
                Ok(Vec::new())
            }
            "HM" => {
                match args.len() {
                    1 => {
                        s.steps1 = 0;
                        s.steps2 = 0;
                    }
                    3 => {
                        let [_, p1, p2] = ints::<3>(args)?;
                        s.steps1 = p1;
                        s.steps2 = p2;
                    }
                    _ => return Err(Reply::param()),
                }
                s.queued += 1;
                Ok(Vec::new())
            }
            "SP" => {
                let state = args.first().and_then(|v| v.parse::<i64>().ok());
                match state {
                    Some(v @ (0 | 1)) => {
                        s.pen_up = v == 1;
                        s.servo_powered = true;
                        s.queued += 1;
                        Ok(Vec::new())
                    }
                    _ => Err(Reply::param()),
                }
            }
            "SC" => {
                let [p, v] = ints::<2>(args)?;
                s.config.insert(p as u8, v as u32);
                Ok(Vec::new())
            }
            "SR" => {
                let ms = args
                    .first()
                    .and_then(|v| v.parse::<u32>().ok())
                    .ok_or_else(Reply::param)?;
                s.servo_timeout_ms = Some(ms);
                if let Some(state) = args.get(1) {
                    s.servo_powered = *state == "1";
                }
                Ok(Vec::new())
            }
            "CS" => {
                s.steps1 = 0;
                s.steps2 = 0;
                Ok(Vec::new())
            }
            "ES" => {
                let interrupted = u8::from(s.queued > 0);
                s.queued = 0;
                Ok(vec![format!("{interrupted},0,0,0,0")])
            }
            "RB" => {
                let reboots = s.reboots + 1;
                *s = FirmwareState {
                    pen_up: true,
                    reboots,
                    ..FirmwareState::default()
                };
                Err(Reply::Silent)
            }
            _ => Err(Reply::Error(UNKNOWN_COMMAND.to_string())),
        }
    }
}

/// Non-`OK` outcome of a command.
enum Reply {
    /// No response at all.
    Silent,
    /// Firmware error line.
    Error(String),
}

impl Reply {
    fn param() -> Self {
        Reply::Error("!8 Err: Invalid parameter".to_string())
    }
}

fn ints<const N: usize>(args: &[&str]) -> Result<[i64; N], Reply> {
    if args.len() != N {
        return Err(Reply::param());
    }
    let mut out = [0i64; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = arg.trim().parse().map_err(|_| Reply::param())?;
    }
    Ok(out)
}
