//! Serial port discovery.
//!
//! Candidates come from well-known device-node name patterns of the EBB
//! USB CDC endpoint on Linux and macOS. Probing opens each candidate and
//! asks for the firmware version.

use super::serial::SerialPort;
use crate::ebb;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout used when probing candidates.
const PROBE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Baud used when probing candidates.
const PROBE_BAUD: u32 = 9_600;

/// Name matcher for one directory.
struct Pattern {
    dir: &'static str,
    prefix: &'static str,
    contains: &'static [&'static str],
}

const PATTERNS: &[Pattern] = &[
    Pattern { dir: "/dev/serial/by-id", prefix: "usb-", contains: &["EiBotBoard"] },
    Pattern { dir: "/dev/serial/by-id", prefix: "usb-", contains: &["04d8", "FD92"] },
    Pattern { dir: "/dev/serial/by-id", prefix: "usb-", contains: &["04D8", "FD92"] },
    Pattern { dir: "/dev", prefix: "tty.usbserial-EiBotBoard", contains: &[] },
    Pattern { dir: "/dev", prefix: "cu.usbserial-EiBotBoard", contains: &[] },
    Pattern { dir: "/dev", prefix: "cu.usbmodem", contains: &[] },
    Pattern { dir: "/dev", prefix: "cu.usbserial", contains: &[] },
    Pattern { dir: "/dev", prefix: "tty.usbmodem", contains: &[] },
    Pattern { dir: "/dev", prefix: "tty.usbserial", contains: &[] },
    Pattern { dir: "/dev", prefix: "ttyACM", contains: &[] },
    Pattern { dir: "/dev", prefix: "ttyUSB", contains: &[] },
];

/// Node-name prefix tried first by [`guess_port`].
#[cfg(target_os = "macos")]
const PRIMARY_PREFIX: &str = "/dev/tty.usbmodem";
#[cfg(not(target_os = "macos"))]
const PRIMARY_PREFIX: &str = "/dev/ttyACM";

/// One discovered port.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortInfo {
    /// Device node path.
    pub path: String,
    /// Short name (file name of the node).
    pub alias: String,
    /// The controller answered the version probe.
    pub responsive: bool,
    /// Firmware version when responsive.
    pub version: Option<String>,
    /// Failure description when not responsive.
    pub detail: Option<String>,
}

fn pattern_matches(pattern: &Pattern, name: &str) -> bool {
    name.starts_with(pattern.prefix) && pattern.contains.iter().all(|c| name.contains(c))
}

/// Candidate port paths in preference order, without duplicates.
pub fn candidate_ports() -> Vec<String> {
    candidates_in(PATTERNS.iter().map(|p| (Path::new(p.dir), p)))
}

fn candidates_in<'a>(dirs: impl Iterator<Item = (&'a Path, &'a Pattern)>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for (dir, pattern) in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        let mut found: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_str().is_some_and(|n| pattern_matches(pattern, n)))
            .map(|e| e.path().to_string_lossy().into_owned())
            .collect();
        found.sort();
        for path in found {
            if !out.contains(&path) {
                out.push(path);
            }
        }
    }
    out
}

/// Best guess for the plotter port, or `None`.
pub fn guess_port() -> Option<String> {
    let candidates = candidate_ports();
    let guess = candidates
        .iter()
        .find(|p| p.starts_with(PRIMARY_PREFIX))
        .or_else(|| candidates.first())
        .cloned();
    match &guess {
        Some(port) => info!("Auto-detected port {port}"),
        None => warn!("Port auto-detection found nothing"),
    }
    guess
}

/// Enumerate candidates and probe each one.
pub fn list_ports() -> Vec<PortInfo> {
    candidate_ports().into_iter().map(|p| probe_port(&p)).collect()
}

/// Open `path` and ask for the firmware version.
pub fn probe_port(path: &str) -> PortInfo {
    let alias = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    let mut info = PortInfo {
        path: path.to_string(),
        alias,
        responsive: false,
        version: None,
        detail: None,
    };

    let mut port = match SerialPort::open(path, PROBE_BAUD, PROBE_TIMEOUT) {
        Ok(port) => port,
        Err(e) => {
            info.detail = Some(e.to_string());
            return info;
        }
    };
    match ebb::probe_version(&mut port, PROBE_TIMEOUT) {
        Ok(version) => {
            info.responsive = true;
            info.version = Some(version);
        }
        Err(e) => {
            debug!("Probe of {path} failed: {e}");
            info.detail = Some("no response from controller".to_string());
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn patterns_match_known_nodes() {
        let acm = &PATTERNS[9];
        assert!(pattern_matches(acm, "ttyACM0"));
        assert!(!pattern_matches(acm, "ttyS0"));
        let by_id = &PATTERNS[1];
        assert!(pattern_matches(by_id, "usb-SchmalzHaus_04d8_FD92-if00"));
        assert!(!pattern_matches(by_id, "usb-Other_1234-if00"));
    }

    #[test]
    fn candidates_are_sorted_and_unique() {
        let dir = TempDir::new().unwrap();
        for name in ["ttyACM1", "ttyACM0", "ttyS0"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let acm = &PATTERNS[9];
        let found = candidates_in([(dir.path(), acm), (dir.path(), acm)].into_iter());
        let names: Vec<_> = found
            .iter()
            .map(|p| Path::new(p).file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ttyACM0", "ttyACM1"]);
    }

    #[test]
    fn probing_a_silent_file_is_not_responsive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ttyACM7");
        std::fs::write(&path, b"").unwrap();
        let info = probe_port(path.to_str().unwrap());
        assert!(!info.responsive);
        assert_eq!(info.alias, "ttyACM7");
        assert!(info.detail.is_some());
    }
}
