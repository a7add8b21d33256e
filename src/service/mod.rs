//! The boundary to the vendor capture library.
//!
//! [`CaptureService`] mirrors the flat call surface exported by
//! `libsniff_ez` / `libminisniff`. The session driver only ever talks to this
//! trait, so tests can script a fake while production code goes through
//! [`native::NativeService`].

pub mod native;

use std::ffi::CStr;
use std::fmt;

use crate::error::Result;
use crate::status::HardwareStatus;

/// Size of the buffers used for `version` and `getSerial`
pub const INFO_BUFFER_LEN: usize = 256;

/// Size of the scratch buffer a decoded row is fetched into
pub const ROW_BUFFER_LEN: usize = 10 * 1024;

/// Opaque session handle returned by `sniffInit`.
///
/// It is pointer sized on every target and deliberately neither `Clone` nor
/// `Copy`: the session that opened it owns it, and `end` consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionHandle(isize);

impl SessionHandle {
    pub fn from_raw(raw: isize) -> Self {
        SessionHandle(raw)
    }

    pub fn raw(&self) -> isize {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// How a library reports completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Separate capture and decode phases, decode started explicitly (`libsniff_ez`)
    Phased,
    /// One `getDone` flag, decoding runs alongside capture (`libminisniff`)
    Combined,
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Flavor::Phased => write!(f, "phased"),
            Flavor::Combined => write!(f, "combined"),
        }
    }
}

/// The call surface of a hardware capture service.
///
/// Every call except [`version`](CaptureService::version) and
/// [`init`](CaptureService::init) takes the handle returned by `init`.
pub trait CaptureService {
    fn flavor(&self) -> Flavor;

    /// Library version string
    fn version(&mut self) -> String;

    fn init(&mut self) -> Result<SessionHandle>;

    fn hardware_status(&mut self, handle: &SessionHandle) -> HardwareStatus;

    fn set_connect(&mut self, handle: &SessionHandle, connect: bool);

    /// Requested capture buffer size in bytes
    fn set_needed(&mut self, handle: &SessionHandle, bytes: u32);

    fn set_run(&mut self, handle: &SessionHandle, run: bool);

    fn capture_count(&mut self, handle: &SessionHandle) -> u64;

    fn capture_done(&mut self, handle: &SessionHandle) -> bool;

    fn start_decode(&mut self, handle: &SessionHandle);

    fn decoded_count(&mut self, handle: &SessionHandle) -> u64;

    fn decode_done(&mut self, handle: &SessionHandle) -> bool;

    /// Combined completion flag of the [`Flavor::Combined`] libraries
    fn done(&mut self, handle: &SessionHandle) -> bool;

    fn packet_data_row_count(&mut self, handle: &SessionHandle) -> u64;

    /// Fills `buf` with row `index`, terminated by `\n\0`
    fn packet_data_row(&mut self, handle: &SessionHandle, index: u64, buf: &mut [u8]);

    /// Device serial, when the library can report one
    fn serial(&mut self, handle: &SessionHandle) -> Option<String>;

    fn end(&mut self, handle: SessionHandle);
}

/// Decodes a NUL terminated C string from a caller supplied buffer
pub(crate) fn c_string_lossy(buf: &[u8]) -> String {
    match CStr::from_bytes_until_nul(buf) {
        Ok(s) => s.to_string_lossy().into_owned(),
        Err(_) => String::from_utf8_lossy(buf).into_owned(),
    }
}

/// Bytes of a fetched row up to the NUL sentinel, and whether one was found
pub(crate) fn row_content(buf: &[u8]) -> (&[u8], bool) {
    match buf.iter().position(|b| *b == 0) {
        Some(end) => (&buf[..end], true),
        None => (buf, false),
    }
}
