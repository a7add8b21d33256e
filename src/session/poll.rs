use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, SniffError};
use crate::session::Phase;

/// Shared flag that stops a running poll loop between iterations
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How a completion loop polls: sleep between probes, optional deadline,
/// and a cancellation token checked before every probe.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the hardware answers
    pub deadline: Option<Duration>,
    pub cancel: CancelToken,
}

impl PollPolicy {
    pub fn new(interval: Duration) -> Self {
        PollPolicy {
            interval,
            deadline: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Calls `probe` until it returns true, sleeping `interval` in between
    pub(crate) fn run<F>(&self, phase: Phase, mut probe: F) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        let started = Instant::now();
        let mut polls: u64 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(SniffError::Cancelled { phase });
            }
            polls += 1;
            if probe() {
                debug!("{} finished after {} polls", phase, polls);
                return Ok(());
            }
            let waited = started.elapsed();
            if let Some(deadline) = self.deadline {
                if waited >= deadline {
                    return Err(SniffError::Timeout { phase, waited });
                }
            }
            thread::sleep(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_on_first_true_probe() {
        let policy = PollPolicy::new(Duration::ZERO);
        let mut calls = 0;
        policy
            .run(Phase::Capture, || {
                calls += 1;
                calls == 3
            })
            .unwrap();
        assert_eq!(calls, 3);
    }

    #[test]
    fn deadline_turns_a_hang_into_a_timeout() {
        let policy = PollPolicy::new(Duration::from_millis(1)).with_deadline(Some(Duration::from_millis(10)));
        let result = policy.run(Phase::Decode, || false);
        match result {
            Err(SniffError::Timeout { phase, waited }) => {
                assert_eq!(phase, Phase::Decode);
                assert!(waited >= Duration::from_millis(10));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn cancelled_token_stops_before_probing() {
        let cancel = CancelToken::new();
        let policy = PollPolicy::new(Duration::ZERO).with_cancel(cancel.clone());
        cancel.cancel();
        let mut calls = 0;
        let result = policy.run(Phase::Capture, || {
            calls += 1;
            true
        });
        assert!(matches!(result, Err(SniffError::Cancelled { phase: Phase::Capture })));
        assert_eq!(calls, 0);
    }
}
