use std::path::PathBuf;
use std::time::Duration;

use crate::service::Flavor;
use crate::session::{CancelToken, Phase, PollPolicy};

/// Default requested capture buffer, easily covers a device setup
pub const DEFAULT_BUFFER_SIZE: u32 = 16 * 1024;

pub const DEFAULT_OUTPUT: &str = "sniff_output.txt";

#[derive(Debug, Clone)]
/// Represents the input parameters of a capture session
pub struct Parameters {
    /// Explicit path of the vendor library, otherwise the default names are tried
    pub library_path: Option<PathBuf>,
    /// The path to the output file
    pub file_path: String,
    /// Capture buffer size requested from the hardware, in bytes
    pub buffer_size: u32,
    /// How many times the hardware status is queried before giving up
    pub ready_attempts: u32,
    /// Pause between hardware status queries, in milliseconds
    pub ready_interval_ms: u64,
    /// Pause between completion polls; the library flavor decides when unset
    pub poll_interval_ms: Option<u64>,
    /// Seconds the capture may take, 0 to wait forever
    pub capture_timeout: u64,
    /// Seconds the decode may take, 0 to wait forever
    pub decode_timeout: u64,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            library_path: None,
            file_path: String::from(DEFAULT_OUTPUT),
            buffer_size: DEFAULT_BUFFER_SIZE,
            ready_attempts: 6,
            ready_interval_ms: 1000,
            poll_interval_ms: None,
            capture_timeout: 3600,
            decode_timeout: 3600,
        }
    }
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_library_path(&mut self, library_path: PathBuf) {
        self.library_path = Some(library_path);
    }

    pub fn set_file_path(&mut self, file_path: String) {
        self.file_path = file_path;
    }

    pub fn set_buffer_size(&mut self, buffer_size: u32) {
        self.buffer_size = buffer_size;
    }

    pub fn set_ready_attempts(&mut self, ready_attempts: u32) {
        self.ready_attempts = ready_attempts;
    }

    pub fn set_ready_interval_ms(&mut self, ready_interval_ms: u64) {
        self.ready_interval_ms = ready_interval_ms;
    }

    pub fn set_poll_interval_ms(&mut self, poll_interval_ms: u64) {
        self.poll_interval_ms = Some(poll_interval_ms);
    }

    pub fn set_capture_timeout(&mut self, capture_timeout: u64) {
        self.capture_timeout = capture_timeout;
    }

    pub fn set_decode_timeout(&mut self, decode_timeout: u64) {
        self.decode_timeout = decode_timeout;
    }

    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }

    /// Interval between completion polls. The combined-flavor library is
    /// polled every 2 s, the phased one every second.
    pub fn poll_interval(&self, flavor: Flavor) -> Duration {
        match (self.poll_interval_ms, flavor) {
            (Some(ms), _) => Duration::from_millis(ms),
            (None, Flavor::Phased) => Duration::from_secs(1),
            (None, Flavor::Combined) => Duration::from_secs(2),
        }
    }

    /// Deadline for a phase. The combined phase gets both budgets.
    pub fn deadline(&self, phase: Phase) -> Option<Duration> {
        let secs = match phase {
            Phase::Ready => 0,
            Phase::Capture => self.capture_timeout,
            Phase::Decode => self.decode_timeout,
            Phase::Combined if self.capture_timeout == 0 || self.decode_timeout == 0 => 0,
            Phase::Combined => self.capture_timeout.saturating_add(self.decode_timeout),
        };
        if secs == 0 {
            None
        } else {
            Some(Duration::from_secs(secs))
        }
    }

    pub fn poll_policy(&self, flavor: Flavor, phase: Phase, cancel: &CancelToken) -> PollPolicy {
        PollPolicy::new(self.poll_interval(flavor))
            .with_deadline(self.deadline(phase))
            .with_cancel(cancel.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_vendor_examples() {
        let parameters = Parameters::new();
        assert_eq!(parameters.buffer_size, 16 * 1024);
        assert_eq!(parameters.ready_attempts, 6);
        assert_eq!(parameters.ready_interval(), Duration::from_secs(1));
        assert_eq!(parameters.poll_interval(Flavor::Phased), Duration::from_secs(1));
        assert_eq!(parameters.poll_interval(Flavor::Combined), Duration::from_secs(2));
    }

    #[test]
    fn explicit_poll_interval_wins() {
        let mut parameters = Parameters::new();
        parameters.set_poll_interval_ms(250);
        assert_eq!(parameters.poll_interval(Flavor::Combined), Duration::from_millis(250));
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let mut parameters = Parameters::new();
        parameters.set_capture_timeout(0);
        parameters.set_decode_timeout(30);
        assert_eq!(parameters.deadline(Phase::Capture), None);
        assert_eq!(parameters.deadline(Phase::Decode), Some(Duration::from_secs(30)));
        assert_eq!(parameters.deadline(Phase::Combined), None);
        assert_eq!(parameters.deadline(Phase::Ready), None);

        parameters.set_capture_timeout(10);
        assert_eq!(parameters.deadline(Phase::Combined), Some(Duration::from_secs(40)));
    }

    #[test]
    fn policy_shares_the_cancel_token() {
        let cancel = CancelToken::new();
        let policy = Parameters::new().poll_policy(Flavor::Phased, Phase::Capture, &cancel);
        cancel.cancel();
        assert!(policy.cancel.is_cancelled());
        assert_eq!(policy.deadline, Some(Duration::from_secs(3600)));
    }
}
