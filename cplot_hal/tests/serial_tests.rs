//! Serial transport tests on regular files.
//!
//! A plain file is not a terminal, so line setup is skipped and the
//! poll/read/write paths run against file contents.

use cplot_hal::drivers::serial::SerialPort;
use cplot_hal::ebb::{self, EbbCommand, EbbLink, RetryPolicy};
use cplot_hal::transport::Transport;
use std::time::Duration;
use tempfile::NamedTempFile;

const SHORT: Duration = Duration::from_millis(50);

fn port_with(content: &[u8]) -> (NamedTempFile, SerialPort) {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), content).unwrap();
    let port = SerialPort::open(file.path().to_str().unwrap(), 9600, SHORT).unwrap();
    (file, port)
}

#[test]
fn lines_split_on_cr_and_lf() {
    let (_file, mut port) = port_with(b"\r\nEBBv13 3.0.2\r\nOK\r\n");
    assert_eq!(port.read_line(SHORT).unwrap().as_deref(), Some("EBBv13 3.0.2"));
    assert_eq!(port.read_line(SHORT).unwrap().as_deref(), Some("OK"));
    assert_eq!(port.read_line(SHORT).unwrap(), None);
}

#[test]
fn unterminated_tail_times_out() {
    let (_file, mut port) = port_with(b"partial");
    assert_eq!(port.read_line(SHORT).unwrap(), None);
}

#[test]
fn write_line_appends_carriage_return() {
    let (file, mut port) = port_with(b"");
    port.write_line("SM,100,5,-5").unwrap();
    drop(port);
    assert_eq!(std::fs::read(file.path()).unwrap(), b"SM,100,5,-5\r");
}

#[test]
fn flush_discards_buffered_input() {
    let (_file, mut port) = port_with(b"junk\r\nmore junk\r\n");
    assert_eq!(port.flush_input().unwrap(), 17);
    assert_eq!(port.read_line(SHORT).unwrap(), None);
}

#[test]
fn byte_reads_return_zero_at_end() {
    let (_file, mut port) = port_with(b"ab");
    let mut buf = [0u8; 8];
    assert_eq!(port.read(&mut buf, SHORT).unwrap(), 2);
    assert_eq!(&buf[..2], b"ab");
    assert_eq!(port.read(&mut buf, SHORT).unwrap(), 0);
}

#[test]
fn invalid_command_leaves_port_untouched() {
    let (file, mut port) = port_with(b"OK\r\n");
    let mut link = EbbLink::new(&mut port, RetryPolicy::with_timeout(SHORT));
    let bad = EbbCommand::StepperMove {
        duration_ms: 0,
        steps1: 1,
        steps2: 1,
    };
    assert!(link.exec(&bad).is_err());
    drop(port);
    assert_eq!(std::fs::read(file.path()).unwrap(), b"OK\r\n");
}

#[test]
fn probe_on_silent_port_fails() {
    let (_file, mut port) = port_with(b"");
    assert!(ebb::probe_version(&mut port, SHORT).is_err());
}
