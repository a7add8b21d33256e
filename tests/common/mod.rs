use std::collections::VecDeque;

use sniff_driver::{CancelToken, CaptureService, Flavor, HardwareStatus, SessionHandle, SniffError};

pub const HANDLE: isize = 0x5eed;

/// A call received by the scripted service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Version,
    Init,
    HardwareStatus,
    SetConnect(bool),
    SetNeeded(u32),
    SetRun(bool),
    CaptureCount,
    CaptureDone,
    StartDecode,
    DecodedCount,
    DecodeDone,
    Done,
    RowCount,
    Row(u64),
    Serial,
    End(isize),
}

/// Fake capture service replaying a fixed script
pub struct ScriptedService {
    pub flavor: Flavor,
    pub fail_init: bool,
    /// Status codes returned in order; the last one repeats
    pub statuses: VecDeque<i32>,
    /// Completion polls answered `false` before a phase reports done
    pub capture_polls: usize,
    pub decode_polls: usize,
    pub rows: Vec<Vec<u8>>,
    pub serial: Option<String>,
    /// Rows end with the NUL sentinel; when false they are copied bare
    pub terminate_rows: bool,
    /// Cancels the token once this many status queries were answered
    pub cancel_after_status: Option<(usize, CancelToken)>,
    pub calls: Vec<Call>,
    captured: u64,
    decoded: u64,
}

impl ScriptedService {
    pub fn new(statuses: &[i32]) -> Self {
        ScriptedService {
            flavor: Flavor::Phased,
            fail_init: false,
            statuses: statuses.iter().copied().collect(),
            capture_polls: 2,
            decode_polls: 1,
            rows: Vec::new(),
            serial: None,
            terminate_rows: true,
            cancel_after_status: None,
            calls: Vec::new(),
            captured: 0,
            decoded: 0,
        }
    }

    pub fn with_rows(mut self, rows: &[&str]) -> Self {
        self.rows = rows.iter().map(|r| r.as_bytes().to_vec()).collect();
        self
    }

    pub fn with_raw_rows(mut self, rows: Vec<Vec<u8>>) -> Self {
        self.rows = rows;
        self
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls.iter().position(|c| c == call)
    }

    fn check(&self, handle: &SessionHandle) {
        assert_eq!(handle.raw(), HANDLE, "call with a foreign handle");
        assert!(
            !self.calls.iter().any(|c| matches!(c, Call::End(_))),
            "call issued after teardown"
        );
    }
}

impl CaptureService for ScriptedService {
    fn flavor(&self) -> Flavor {
        self.flavor
    }

    fn version(&mut self) -> String {
        self.calls.push(Call::Version);
        String::from("scripted 1.0")
    }

    fn init(&mut self) -> Result<SessionHandle, SniffError> {
        self.calls.push(Call::Init);
        if self.fail_init {
            return Err(SniffError::ServiceUnavailable(String::from("libsniff_ez.so is missing")));
        }
        Ok(SessionHandle::from_raw(HANDLE))
    }

    fn hardware_status(&mut self, handle: &SessionHandle) -> HardwareStatus {
        self.check(handle);
        self.calls.push(Call::HardwareStatus);
        if let Some((after, cancel)) = &self.cancel_after_status {
            if self.count(&Call::HardwareStatus) >= *after {
                cancel.cancel();
            }
        }
        let code = if self.statuses.len() > 1 {
            self.statuses.pop_front()
        } else {
            self.statuses.front().copied()
        };
        HardwareStatus::from_code(code.unwrap_or(-1))
    }

    fn set_connect(&mut self, handle: &SessionHandle, connect: bool) {
        self.check(handle);
        self.calls.push(Call::SetConnect(connect));
    }

    fn set_needed(&mut self, handle: &SessionHandle, bytes: u32) {
        self.check(handle);
        self.calls.push(Call::SetNeeded(bytes));
    }

    fn set_run(&mut self, handle: &SessionHandle, run: bool) {
        self.check(handle);
        self.calls.push(Call::SetRun(run));
    }

    fn capture_count(&mut self, handle: &SessionHandle) -> u64 {
        self.check(handle);
        self.calls.push(Call::CaptureCount);
        self.captured += 100;
        self.captured
    }

    fn capture_done(&mut self, handle: &SessionHandle) -> bool {
        self.check(handle);
        self.calls.push(Call::CaptureDone);
        self.count(&Call::CaptureDone) > self.capture_polls
    }

    fn start_decode(&mut self, handle: &SessionHandle) {
        self.check(handle);
        self.calls.push(Call::StartDecode);
    }

    fn decoded_count(&mut self, handle: &SessionHandle) -> u64 {
        self.check(handle);
        self.calls.push(Call::DecodedCount);
        self.decoded += 1;
        self.decoded
    }

    fn decode_done(&mut self, handle: &SessionHandle) -> bool {
        self.check(handle);
        self.calls.push(Call::DecodeDone);
        self.count(&Call::DecodeDone) > self.decode_polls
    }

    fn done(&mut self, handle: &SessionHandle) -> bool {
        self.check(handle);
        self.calls.push(Call::Done);
        self.count(&Call::Done) > self.capture_polls
    }

    fn packet_data_row_count(&mut self, handle: &SessionHandle) -> u64 {
        self.check(handle);
        self.calls.push(Call::RowCount);
        self.rows.len() as u64
    }

    fn packet_data_row(&mut self, handle: &SessionHandle, index: u64, buf: &mut [u8]) {
        self.check(handle);
        self.calls.push(Call::Row(index));
        let row = &self.rows[index as usize];
        if self.terminate_rows {
            let len = row.len().min(buf.len() - 1);
            buf[..len].copy_from_slice(&row[..len]);
            buf[len] = 0;
        } else {
            let len = row.len().min(buf.len());
            buf[..len].copy_from_slice(&row[..len]);
        }
    }

    fn serial(&mut self, handle: &SessionHandle) -> Option<String> {
        self.check(handle);
        self.calls.push(Call::Serial);
        self.serial.clone()
    }

    fn end(&mut self, handle: SessionHandle) {
        self.check(&handle);
        self.calls.push(Call::End(handle.raw()));
    }
}
