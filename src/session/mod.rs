//! The capture session state machine.
//!
//! A [`Session`] owns the handle returned by the service and walks
//! `Opened → HardwareReady → Configured → Capturing → CaptureDone → Decoding →
//! DecodeDone → Extracted`, one state at a time. Calls made out of order fail
//! with [`SniffError::InvalidState`] before anything reaches the service.
//! Dropping a session that was never closed still tears it down.

mod poll;

use std::fmt;
use std::io::Write;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::error::{Result, SniffError};
use crate::service::{row_content, CaptureService, SessionHandle, ROW_BUFFER_LEN};
use crate::status::HardwareStatus;

pub use poll::{CancelToken, PollPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Opened,
    HardwareReady,
    Configured,
    Capturing,
    CaptureDone,
    Decoding,
    DecodeDone,
    Extracted,
    Closed,
}

impl SessionState {
    /// The only state this one may move to, apart from `Closed`
    pub fn successor(&self) -> Option<SessionState> {
        match self {
            SessionState::Unopened => Some(SessionState::Opened),
            SessionState::Opened => Some(SessionState::HardwareReady),
            SessionState::HardwareReady => Some(SessionState::Configured),
            SessionState::Configured => Some(SessionState::Capturing),
            SessionState::Capturing => Some(SessionState::CaptureDone),
            SessionState::CaptureDone => Some(SessionState::Decoding),
            SessionState::Decoding => Some(SessionState::DecodeDone),
            SessionState::DecodeDone => Some(SessionState::Extracted),
            SessionState::Extracted => Some(SessionState::Closed),
            SessionState::Closed => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The polled phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the hardware to attach
    Ready,
    Capture,
    Decode,
    /// Capture and decode reported through one flag
    Combined,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::Ready => write!(f, "hardware wait"),
            Phase::Capture => write!(f, "capture"),
            Phase::Decode => write!(f, "decode"),
            Phase::Combined => write!(f, "capture/decode"),
        }
    }
}

/// Counters observed on one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Capture { captured: u64 },
    Decode { decoded: u64 },
    Combined { captured: u64, decoded: u64 },
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Progress::Capture { captured } => write!(f, "{}", captured),
            Progress::Decode { decoded } => write!(f, "{}", decoded),
            Progress::Combined { captured, decoded } => write!(f, "{}/{}", captured, decoded),
        }
    }
}

/// One open session against a [`CaptureService`]
pub struct Session<'a, S: CaptureService + ?Sized> {
    service: &'a mut S,
    // only `None` once teardown ran, and teardown is reached through `close(self)` or `Drop`
    handle: Option<SessionHandle>,
    state: SessionState,
    status: HardwareStatus,
    captured: u64,
    decoded: u64,
}

impl<'a, S: CaptureService + ?Sized> Session<'a, S> {
    /// Acquires a session handle from the service
    pub fn open(service: &'a mut S) -> Result<Self> {
        let handle = service.init()?;
        info!("Session opened with handle {}", handle);
        Ok(Session {
            service,
            handle: Some(handle),
            state: SessionState::Opened,
            status: HardwareStatus::NotInitialized,
            captured: 0,
            decoded: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Last hardware status observed
    pub fn status(&self) -> HardwareStatus {
        self.status
    }

    pub fn captured(&self) -> u64 {
        self.captured
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Polls the hardware status until it is something other than
    /// SNIFFER_NOT_FOUND, at most `max_attempts` times.
    ///
    /// The OS attaches the device driver asynchronously after `init`, so the
    /// first few queries usually report the sniffer missing. Returns the last
    /// status seen; the session becomes ready only on INIT_OK. `cancel` is
    /// checked before every query.
    pub fn await_hardware_ready(
        &mut self,
        max_attempts: u32,
        interval: Duration,
        cancel: &CancelToken,
    ) -> Result<HardwareStatus> {
        self.expect_state(SessionState::Opened)?;
        let (service, handle) = self.parts();

        let mut status = HardwareStatus::SnifferNotFound;
        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(SniffError::Cancelled { phase: Phase::Ready });
            }
            status = service.hardware_status(handle);
            debug!("Hardware status on attempt {}/{}: {}", attempt, max_attempts, status);
            if status != HardwareStatus::SnifferNotFound {
                break;
            }
            if attempt < max_attempts {
                thread::sleep(interval);
            }
        }

        self.status = status;
        if status.is_ok() {
            self.advance(SessionState::HardwareReady)?;
        } else {
            warn!("Hardware not ready: {}", status);
        }
        Ok(status)
    }

    /// Device serial string, if the library reports one
    pub fn serial(&mut self) -> Option<String> {
        let (service, handle) = self.parts();
        service.serial(handle)
    }

    /// Disconnects, sets the capture buffer size, then reconnects and runs
    pub fn configure(&mut self, buffer_size: u32) -> Result<()> {
        if self.state == SessionState::Opened {
            return Err(SniffError::NotReady(self.status));
        }
        self.expect_state(SessionState::HardwareReady)?;
        let (service, handle) = self.parts();

        service.set_connect(handle, false);
        service.set_needed(handle, buffer_size);
        service.set_run(handle, true);
        info!("Capture running with a {} byte buffer", buffer_size);
        self.advance(SessionState::Configured)
    }

    /// Polls until the hardware reports the capture finished.
    ///
    /// Returns the final captured count.
    pub fn await_capture_complete<F>(&mut self, policy: &PollPolicy, mut progress: F) -> Result<u64>
    where
        F: FnMut(Progress),
    {
        self.expect_state(SessionState::Configured)?;
        self.advance(SessionState::Capturing)?;

        let (service, handle) = self.parts();
        let mut captured = 0;
        policy.run(Phase::Capture, || {
            captured = service.capture_count(handle);
            let done = service.capture_done(handle);
            progress(Progress::Capture { captured });
            done
        })?;

        self.captured = captured;
        info!("Capture complete: {} samples", captured);
        self.advance(SessionState::CaptureDone)?;
        Ok(captured)
    }

    /// Starts the decoder once, then polls until it reports completion.
    ///
    /// Returns the final decoded count.
    pub fn await_decode_complete<F>(&mut self, policy: &PollPolicy, mut progress: F) -> Result<u64>
    where
        F: FnMut(Progress),
    {
        self.expect_state(SessionState::CaptureDone)?;
        let (service, handle) = self.parts();
        service.start_decode(handle);
        self.advance(SessionState::Decoding)?;

        let (service, handle) = self.parts();
        let mut decoded = 0;
        policy.run(Phase::Decode, || {
            decoded = service.decoded_count(handle);
            let done = service.decode_done(handle);
            progress(Progress::Decode { decoded });
            done
        })?;

        self.decoded = decoded;
        info!("Decode complete: {} transactions", decoded);
        self.advance(SessionState::DecodeDone)?;
        Ok(decoded)
    }

    /// Polls the single completion flag of libraries that decode while
    /// capturing. Walks the session through both phases on completion.
    pub fn await_complete<F>(&mut self, policy: &PollPolicy, mut progress: F) -> Result<(u64, u64)>
    where
        F: FnMut(Progress),
    {
        self.expect_state(SessionState::Configured)?;
        self.advance(SessionState::Capturing)?;

        let (service, handle) = self.parts();
        let (mut captured, mut decoded) = (0, 0);
        policy.run(Phase::Combined, || {
            let done = service.done(handle);
            captured = service.capture_count(handle);
            decoded = service.decoded_count(handle);
            progress(Progress::Combined { captured, decoded });
            done
        })?;

        self.captured = captured;
        self.decoded = decoded;
        info!("Capture and decode complete: {} samples, {} transactions", captured, decoded);
        self.advance(SessionState::CaptureDone)?;
        self.advance(SessionState::Decoding)?;
        self.advance(SessionState::DecodeDone)?;
        Ok((captured, decoded))
    }

    /// Copies every decoded row, in index order, into `sink`.
    ///
    /// All rows are fetched into the same scratch buffer; each row is written
    /// out before the next fetch overwrites it. Returns the number of rows.
    pub fn extract_rows<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64> {
        self.expect_state(SessionState::DecodeDone)?;
        let (service, handle) = self.parts();

        let count = service.packet_data_row_count(handle);
        info!("{} decoded rows", count);

        let mut scratch = vec![0u8; ROW_BUFFER_LEN];
        for index in 0..count {
            scratch[0] = 0;
            service.packet_data_row(handle, index, &mut scratch);
            let (row, terminated) = row_content(&scratch);
            if !terminated {
                warn!("Row {} filled the {} byte buffer and was truncated", index, ROW_BUFFER_LEN);
            }
            if std::str::from_utf8(row).is_err() {
                trace!("Row {} is not UTF-8: {}", index, hex::encode(row));
            }
            sink.write_all(row)?;
        }
        sink.flush()?;

        self.advance(SessionState::Extracted)?;
        Ok(count)
    }

    /// Tears the session down. The handle is released and never used again.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(handle) = self.handle.take() {
            info!("Closing session {} from state {}", handle, self.state);
            self.service.end(handle);
        }
        self.state = SessionState::Closed;
    }

    fn parts(&mut self) -> (&mut S, &SessionHandle) {
        match self.handle.as_ref() {
            Some(handle) => (&mut *self.service, handle),
            // the handle is only taken by teardown, which consumes or drops the session
            None => unreachable!("session used after teardown"),
        }
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SniffError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn advance(&mut self, next: SessionState) -> Result<()> {
        match self.state.successor() {
            Some(expected) if expected == next => {
                debug!("Session state {} -> {}", self.state, next);
                self.state = next;
                Ok(())
            }
            _ => Err(SniffError::InvalidState {
                expected: next,
                actual: self.state,
            }),
        }
    }
}

impl<'a, S: CaptureService + ?Sized> Drop for Session<'a, S> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!("Session dropped without close, tearing down");
            self.teardown();
        }
    }
}
