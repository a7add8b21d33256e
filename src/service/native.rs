//! Runtime binding to the vendor shared library.
//!
//! The library is opened with `dlopen` wrapper containers. The symbols common
//! to both library flavors live in [`CoreApi`]; the completion flags differ
//! per flavor and are probed separately, as is the optional `getSerial`.

#![allow(non_snake_case)]

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use dlopen::wrapper::{Container, WrapperApi};
use dlopen_derive::WrapperApi;
use libc::{c_char, c_int, c_uint, intptr_t, size_t};
use tracing::{debug, info, warn};

use crate::error::{Result, SniffError};
use crate::service::{c_string_lossy, CaptureService, Flavor, SessionHandle, INFO_BUFFER_LEN};
use crate::status::HardwareStatus;

/// Library names tried, in order, when no explicit path is given
pub const DEFAULT_LIBRARIES: [&str; 4] = [
    "libsniff_ez.dll",
    "libsniff_ez.so",
    "libminisniff.dll",
    "libminisniff.so",
];

// the library uses false=0, true=1
#[derive(WrapperApi)]
struct CoreApi {
    version: unsafe extern "C" fn(buf: *mut c_char, len: c_int) -> c_int,
    sniffInit: unsafe extern "C" fn() -> intptr_t,
    getHardwareStatus: unsafe extern "C" fn(handle: intptr_t) -> c_int,
    setConnect: unsafe extern "C" fn(handle: intptr_t, connect: c_int),
    setNeeded: unsafe extern "C" fn(handle: intptr_t, bytes: c_uint),
    setRun: unsafe extern "C" fn(handle: intptr_t, run: c_int),
    getCaptureCount: unsafe extern "C" fn(handle: intptr_t) -> size_t,
    getDecodedCount: unsafe extern "C" fn(handle: intptr_t) -> size_t,
    getPacketDataRowCount: unsafe extern "C" fn(handle: intptr_t) -> size_t,
    getPacketDataRow:
        unsafe extern "C" fn(handle: intptr_t, index: size_t, buf: *mut c_char, len: c_int),
    sniffEnd: unsafe extern "C" fn(handle: intptr_t),
}

#[derive(WrapperApi)]
struct PhasedApi {
    getCaptureDone: unsafe extern "C" fn(handle: intptr_t) -> c_int,
    startDecode: unsafe extern "C" fn(handle: intptr_t),
    getDecodeDone: unsafe extern "C" fn(handle: intptr_t) -> c_int,
}

#[derive(WrapperApi)]
struct CombinedApi {
    getDone: unsafe extern "C" fn(handle: intptr_t) -> c_int,
}

#[derive(WrapperApi)]
struct SerialApi {
    getSerial: unsafe extern "C" fn(handle: intptr_t, buf: *mut c_char, len: c_int) -> c_int,
}

enum Completion {
    Phased(Container<PhasedApi>),
    Combined(Container<CombinedApi>),
}

/// [`CaptureService`] backed by the vendor library loaded at runtime
pub struct NativeService {
    path: PathBuf,
    core: Container<CoreApi>,
    completion: Completion,
    serial: Option<Container<SerialApi>>,
}

impl NativeService {
    /// Loads the library at `path`, or the first of [`DEFAULT_LIBRARIES`] that opens
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidates: Vec<PathBuf> = match path {
            Some(p) => vec![p.to_path_buf()],
            None => DEFAULT_LIBRARIES.iter().map(PathBuf::from).collect(),
        };

        let mut failures = Vec::new();
        for candidate in candidates {
            match Self::load_from(&candidate) {
                Ok(service) => {
                    info!("Loaded capture library {} ({} flavor)", candidate.display(), service.flavor());
                    return Ok(service);
                }
                Err(e) => {
                    debug!("Could not load {}: {}", candidate.display(), e);
                    failures.push(format!("{}: {}", candidate.display(), e));
                }
            }
        }
        Err(SniffError::ServiceUnavailable(failures.join("; ")))
    }

    fn load_from(path: &Path) -> Result<Self> {
        let name: &OsStr = path.as_os_str();
        let core: Container<CoreApi> = unsafe { Container::load(name) }
            .map_err(|e| SniffError::ServiceUnavailable(e.to_string()))?;

        let completion = match unsafe { Container::<PhasedApi>::load(name) } {
            Ok(phased) => Completion::Phased(phased),
            Err(phased_err) => match unsafe { Container::<CombinedApi>::load(name) } {
                Ok(combined) => Completion::Combined(combined),
                Err(combined_err) => {
                    return Err(SniffError::ServiceUnavailable(format!(
                        "no completion flags exported ({}; {})",
                        phased_err, combined_err
                    )))
                }
            },
        };

        let serial = match unsafe { Container::<SerialApi>::load(name) } {
            Ok(serial) => Some(serial),
            Err(e) => {
                debug!("getSerial not exported: {}", e);
                None
            }
        };

        Ok(NativeService {
            path: path.to_path_buf(),
            core,
            completion,
            serial,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn c_bool(value: bool) -> c_int {
    if value {
        1
    } else {
        0
    }
}

fn c_len(buf: &[u8]) -> c_int {
    c_int::try_from(buf.len()).unwrap_or(c_int::MAX)
}

impl CaptureService for NativeService {
    fn flavor(&self) -> Flavor {
        match self.completion {
            Completion::Phased(_) => Flavor::Phased,
            Completion::Combined(_) => Flavor::Combined,
        }
    }

    fn version(&mut self) -> String {
        let mut buf = [0u8; INFO_BUFFER_LEN];
        unsafe { self.core.version(buf.as_mut_ptr() as *mut c_char, c_len(&buf)) };
        c_string_lossy(&buf)
    }

    fn init(&mut self) -> Result<SessionHandle> {
        let raw = unsafe { self.core.sniffInit() };
        Ok(SessionHandle::from_raw(raw as isize))
    }

    fn hardware_status(&mut self, handle: &SessionHandle) -> HardwareStatus {
        let code = unsafe { self.core.getHardwareStatus(handle.raw() as intptr_t) };
        HardwareStatus::from_code(code as i32)
    }

    fn set_connect(&mut self, handle: &SessionHandle, connect: bool) {
        unsafe { self.core.setConnect(handle.raw() as intptr_t, c_bool(connect)) }
    }

    fn set_needed(&mut self, handle: &SessionHandle, bytes: u32) {
        unsafe { self.core.setNeeded(handle.raw() as intptr_t, bytes as c_uint) }
    }

    fn set_run(&mut self, handle: &SessionHandle, run: bool) {
        unsafe { self.core.setRun(handle.raw() as intptr_t, c_bool(run)) }
    }

    fn capture_count(&mut self, handle: &SessionHandle) -> u64 {
        unsafe { self.core.getCaptureCount(handle.raw() as intptr_t) as u64 }
    }

    fn capture_done(&mut self, handle: &SessionHandle) -> bool {
        match &self.completion {
            Completion::Phased(api) => unsafe { api.getCaptureDone(handle.raw() as intptr_t) != 0 },
            Completion::Combined(api) => unsafe { api.getDone(handle.raw() as intptr_t) != 0 },
        }
    }

    fn start_decode(&mut self, handle: &SessionHandle) {
        match &self.completion {
            Completion::Phased(api) => unsafe { api.startDecode(handle.raw() as intptr_t) },
            Completion::Combined(_) => warn!("startDecode is not exported by {}", self.path.display()),
        }
    }

    fn decoded_count(&mut self, handle: &SessionHandle) -> u64 {
        unsafe { self.core.getDecodedCount(handle.raw() as intptr_t) as u64 }
    }

    fn decode_done(&mut self, handle: &SessionHandle) -> bool {
        match &self.completion {
            Completion::Phased(api) => unsafe { api.getDecodeDone(handle.raw() as intptr_t) != 0 },
            Completion::Combined(api) => unsafe { api.getDone(handle.raw() as intptr_t) != 0 },
        }
    }

    fn done(&mut self, handle: &SessionHandle) -> bool {
        if let Completion::Combined(api) = &self.completion {
            return unsafe { api.getDone(handle.raw() as intptr_t) != 0 };
        }
        self.capture_done(handle) && self.decode_done(handle)
    }

    fn packet_data_row_count(&mut self, handle: &SessionHandle) -> u64 {
        unsafe { self.core.getPacketDataRowCount(handle.raw() as intptr_t) as u64 }
    }

    fn packet_data_row(&mut self, handle: &SessionHandle, index: u64, buf: &mut [u8]) {
        unsafe {
            self.core.getPacketDataRow(
                handle.raw() as intptr_t,
                index as size_t,
                buf.as_mut_ptr() as *mut c_char,
                c_len(buf),
            )
        }
    }

    fn serial(&mut self, handle: &SessionHandle) -> Option<String> {
        let api = self.serial.as_ref()?;
        let mut buf = [0u8; INFO_BUFFER_LEN];
        unsafe { api.getSerial(handle.raw() as intptr_t, buf.as_mut_ptr() as *mut c_char, c_len(&buf)) };
        Some(c_string_lossy(&buf))
    }

    fn end(&mut self, handle: SessionHandle) {
        unsafe { self.core.sniffEnd(handle.raw() as intptr_t) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_reports_service_unavailable() {
        let path = Path::new("/nonexistent/libsniff_ez.so");
        match NativeService::load(Some(path)) {
            Err(SniffError::ServiceUnavailable(msg)) => assert!(msg.contains("libsniff_ez.so")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("library should not load"),
        }
    }

    #[test]
    fn booleans_cross_as_integers() {
        assert_eq!(c_bool(true), 1);
        assert_eq!(c_bool(false), 0);
        assert_eq!(c_len(&[0u8; 256]), 256);
    }
}
