use std::fmt;
use num_traits::FromPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Status reported by `getHardwareStatus`
pub enum HardwareStatus {
    /// Hardware found and configured
    InitOk,
    /// No sniffer attached yet, or the OS has not finished loading its driver
    SnifferNotFound,
    CannotConfigureHardware,
    LicenseInvalid,
    NotInitialized,
    BufferAllocationFailed,
    /// A code the library documents nowhere
    Unknown(i32),
}

impl HardwareStatus {
    pub fn from_code(code: i32) -> Self {
        Self::from_i32(code).unwrap_or(HardwareStatus::Unknown(code))
    }

    pub fn code(&self) -> i32 {
        match self {
            HardwareStatus::InitOk => 0,
            HardwareStatus::SnifferNotFound => -1,
            HardwareStatus::CannotConfigureHardware => -2,
            HardwareStatus::LicenseInvalid => -3,
            HardwareStatus::NotInitialized => -4,
            HardwareStatus::BufferAllocationFailed => -5,
            HardwareStatus::Unknown(code) => *code,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == HardwareStatus::InitOk
    }
}

impl FromPrimitive for HardwareStatus {
    fn from_i64(n: i64) -> Option<Self> {
        match n {
            0 => Some(HardwareStatus::InitOk),
            -1 => Some(HardwareStatus::SnifferNotFound),
            -2 => Some(HardwareStatus::CannotConfigureHardware),
            -3 => Some(HardwareStatus::LicenseInvalid),
            -4 => Some(HardwareStatus::NotInitialized),
            -5 => Some(HardwareStatus::BufferAllocationFailed),
            other => i32::from_i64(other).map(HardwareStatus::Unknown),
        }
    }

    fn from_u64(n: u64) -> Option<Self> {
        i64::from_u64(n).and_then(Self::from_i64)
    }
}

impl fmt::Display for HardwareStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            HardwareStatus::InitOk => "INIT_OK",
            HardwareStatus::SnifferNotFound => "SNIFFER_NOT_FOUND",
            HardwareStatus::CannotConfigureHardware => "CANNOT_CONFIGURE_HARDWARE",
            HardwareStatus::LicenseInvalid => "LICENSE_INVALID",
            HardwareStatus::NotInitialized => "NOT_INITIALIZED",
            HardwareStatus::BufferAllocationFailed => "BUFFER_ALLOCATION_FAILED",
            HardwareStatus::Unknown(_) => "UNKNOWN",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_variants() {
        assert_eq!(HardwareStatus::from_code(0), HardwareStatus::InitOk);
        assert_eq!(HardwareStatus::from_code(-1), HardwareStatus::SnifferNotFound);
        assert_eq!(HardwareStatus::from_code(-5), HardwareStatus::BufferAllocationFailed);
        for code in -5..=0 {
            assert_eq!(HardwareStatus::from_code(code).code(), code);
        }
    }

    #[test]
    fn unknown_codes_are_kept() {
        let status = HardwareStatus::from_code(-42);
        assert_eq!(status, HardwareStatus::Unknown(-42));
        assert_eq!(status.code(), -42);
        assert!(!status.is_ok());
        assert_eq!(HardwareStatus::from_i64(i64::MAX), None);
    }

    #[test]
    fn display_shows_name_and_code() {
        assert_eq!(HardwareStatus::LicenseInvalid.to_string(), "LICENSE_INVALID (-3)");
    }
}
