//! Acknowledgement channel: one token per wait, one single-use channel per token.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Marker value unique to one acknowledgement wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckToken(u64);

impl AckToken {
    fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Satisfied,
    TimedOut,
}

/// Table of waits in flight. Observers hold a clone and call [`AckRegistry::acknowledge`].
#[derive(Debug, Clone, Default)]
pub struct AckRegistry {
    waiters: Arc<Mutex<HashMap<AckToken, Sender<()>>>>,
}

impl AckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a wait that must resolve within `timeout` of now.
    pub fn register(&self, timeout: Duration) -> PendingAck {
        let token = AckToken::next();
        let (tx, rx) = bounded(1);
        self.waiters.lock().insert(token, tx);
        PendingAck {
            token,
            deadline: Instant::now() + timeout,
            rx,
            registry: self.clone(),
        }
    }

    /// Signals the wait for `token`. Returns `false` when nobody is waiting
    /// any more (late marker after a timeout, or a foreign token).
    pub fn acknowledge(&self, token: AckToken) -> bool {
        let Some(tx) = self.waiters.lock().remove(&token) else {
            trace!("Ack for unknown token {}", token.raw());
            return false;
        };
        tx.try_send(()).is_ok()
    }

    pub fn outstanding(&self) -> usize {
        self.waiters.lock().len()
    }

    fn forget(&self, token: AckToken) {
        self.waiters.lock().remove(&token);
    }
}

/// One outstanding "has the target consumed this yet" wait. Removed from
/// the registry when dropped.
#[derive(Debug)]
pub struct PendingAck {
    token: AckToken,
    deadline: Instant,
    rx: Receiver<()>,
    registry: AckRegistry,
}

impl PendingAck {
    pub fn token(&self) -> AckToken {
        self.token
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Blocks until the marker is observed or the deadline passes, calling
    /// `pump` at least once per `poll` so the host event loop keeps running.
    pub fn wait<F: FnMut()>(self, poll: Duration, mut pump: F) -> AckOutcome {
        loop {
            pump();
            match self.rx.try_recv() {
                Ok(()) => return AckOutcome::Satisfied,
                Err(TryRecvError::Disconnected) => return AckOutcome::TimedOut,
                Err(TryRecvError::Empty) => {}
            }

            let now = Instant::now();
            if now >= self.deadline {
                warn!(
                    "Acknowledgement {} timed out; proceeding",
                    self.token.raw()
                );
                return AckOutcome::TimedOut;
            }

            match self.rx.recv_timeout(poll.min(self.deadline - now)) {
                Ok(()) => return AckOutcome::Satisfied,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return AckOutcome::TimedOut,
            }
        }
    }
}

impl Drop for PendingAck {
    fn drop(&mut self) {
        self.registry.forget(self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let reg = AckRegistry::new();
        let a = reg.register(Duration::from_millis(10));
        let b = reg.register(Duration::from_millis(10));
        assert_ne!(a.token(), b.token());
        assert_eq!(reg.outstanding(), 2);
        drop(a);
        drop(b);
        assert_eq!(reg.outstanding(), 0);
    }

    #[test]
    fn test_acknowledged_before_wait() {
        let reg = AckRegistry::new();
        let pending = reg.register(Duration::from_secs(5));
        assert!(reg.acknowledge(pending.token()));
        let start = Instant::now();
        assert_eq!(pending.wait(Duration::from_millis(5), || {}), AckOutcome::Satisfied);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_ack_from_pump() {
        let reg = AckRegistry::new();
        let pending = reg.register(Duration::from_secs(5));
        let token = pending.token();
        let mut pumps = 0;
        let sink = reg.clone();
        let outcome = pending.wait(Duration::from_millis(1), || {
            pumps += 1;
            if pumps == 3 {
                sink.acknowledge(token);
            }
        });
        assert_eq!(outcome, AckOutcome::Satisfied);
        assert_eq!(pumps, 3);
    }

    #[test]
    fn test_timeout_is_bounded() {
        let reg = AckRegistry::new();
        let pending = reg.register(Duration::from_millis(50));
        let start = Instant::now();
        let outcome = pending.wait(Duration::from_millis(5), || {});
        let elapsed = start.elapsed();
        assert_eq!(outcome, AckOutcome::TimedOut);
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(75), "took {:?}", elapsed);
        assert_eq!(reg.outstanding(), 0);
    }

    #[test]
    fn test_late_ack_is_ignored() {
        let reg = AckRegistry::new();
        let pending = reg.register(Duration::ZERO);
        let token = pending.token();
        assert_eq!(pending.wait(Duration::from_millis(1), || {}), AckOutcome::TimedOut);
        assert!(!reg.acknowledge(token));
    }

    #[test]
    fn test_ack_from_other_thread() {
        let reg = AckRegistry::new();
        let pending = reg.register(Duration::from_secs(5));
        let token = pending.token();
        let sink = reg.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            sink.acknowledge(token)
        });
        assert_eq!(pending.wait(Duration::from_millis(2), || {}), AckOutcome::Satisfied);
        assert!(handle.join().unwrap());
    }
}
