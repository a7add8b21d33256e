//! Drives a protocol-analyzer sniffer through its vendor library.
//!
//! One run opens a session, waits for the hardware, configures the capture
//! buffer, polls capture and decode to completion and copies the decoded rows
//! to an output sink. The hardware itself is reached through the
//! [`CaptureService`] trait; [`NativeService`] implements it over the vendor
//! shared library.

pub mod error;
pub mod parameters;
pub mod report;
pub mod service;
pub mod session;
pub mod status;

use std::io::Write;
use std::time::Instant;

use chrono::Local;
use tracing::{error, info};

pub use crate::error::{Result, SniffError};
pub use crate::parameters::Parameters;
pub use crate::report::SessionReport;
pub use crate::service::native::NativeService;
pub use crate::service::{CaptureService, Flavor, SessionHandle};
pub use crate::session::{CancelToken, Phase, PollPolicy, Progress, Session, SessionState};
pub use crate::status::HardwareStatus;

/// Runs one full capture session and writes the decoded rows to `sink`.
///
/// The session is torn down on every path out of this function, including
/// hardware failures, timeouts and write errors.
pub fn run_session<S, W, F>(
    service: &mut S,
    parameters: &Parameters,
    cancel: &CancelToken,
    sink: &mut W,
    progress: F,
) -> Result<SessionReport>
where
    S: CaptureService + ?Sized,
    W: Write + ?Sized,
    F: FnMut(Progress),
{
    let clock = Instant::now();
    let flavor = service.flavor();
    let version = service.version();
    info!("Using library version: {}", version);
    let mut report = SessionReport::new(Local::now(), version, flavor);

    let mut session = Session::open(service)?;

    let status = session.await_hardware_ready(parameters.ready_attempts, parameters.ready_interval(), cancel)?;
    report.set_status(session.status());
    match status {
        HardwareStatus::InitOk => {}
        HardwareStatus::SnifferNotFound => {
            error!("Sniffer not found after {} attempts", parameters.ready_attempts);
            session.close();
            return Err(SniffError::HardwareNotFound {
                attempts: parameters.ready_attempts,
            });
        }
        other => {
            error!("Sniffer reported {}", other);
            session.close();
            return Err(SniffError::HardwareFault(other));
        }
    }

    let serial = session.serial();
    if let Some(ref serial) = serial {
        info!("Serial string: {}", serial);
    }
    report.set_serial(serial);

    let outcome = capture_and_extract(&mut session, flavor, parameters, cancel, sink, progress);
    report.set_counts(session.captured(), session.decoded());
    session.close();

    let rows = outcome?;
    report.set_rows(rows, parameters.file_path.clone());
    report.set_elapsed(clock.elapsed());
    info!("{}", report);
    Ok(report)
}

fn capture_and_extract<S, W, F>(
    session: &mut Session<'_, S>,
    flavor: Flavor,
    parameters: &Parameters,
    cancel: &CancelToken,
    sink: &mut W,
    mut progress: F,
) -> Result<u64>
where
    S: CaptureService + ?Sized,
    W: Write + ?Sized,
    F: FnMut(Progress),
{
    if cancel.is_cancelled() {
        return Err(SniffError::Cancelled { phase: Phase::Capture });
    }
    session.configure(parameters.buffer_size)?;

    match flavor {
        Flavor::Phased => {
            let policy = parameters.poll_policy(flavor, Phase::Capture, cancel);
            session.await_capture_complete(&policy, &mut progress)?;
            let policy = parameters.poll_policy(flavor, Phase::Decode, cancel);
            session.await_decode_complete(&policy, &mut progress)?;
        }
        Flavor::Combined => {
            let policy = parameters.poll_policy(flavor, Phase::Combined, cancel);
            session.await_complete(&policy, &mut progress)?;
        }
    }

    session.extract_rows(sink)
}
