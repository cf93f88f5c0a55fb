//! Background task that keeps re-asserting the last pointer state so the
//! target does not treat an idle pointer as having left the window.

use crate::error::SubmitError;
use crate::types::{ButtonMask, Point, TargetHandle};
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Last known pointer state, shared between the session and the keeper thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerRecord {
    pub target: TargetHandle,
    pub position: Point,
    pub buttons: ButtonMask,
}

/// Re-sends a pointer record. Called from the keeper thread.
pub trait PointerSink: Send + Sync {
    fn reassert(&self, record: &PointerRecord) -> Result<(), SubmitError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Pause,
    Resume,
    Stop,
}

struct Worker {
    tx: Sender<Control>,
    handle: JoinHandle<()>,
}

pub struct PointerKeeper {
    record: Arc<Mutex<PointerRecord>>,
    sink: Arc<dyn PointerSink>,
    interval: Duration,
    worker: Option<Worker>,
    paused: bool,
}

impl PointerKeeper {
    pub fn new(record: PointerRecord, sink: Arc<dyn PointerSink>, interval: Duration) -> Self {
        Self {
            record: Arc::new(Mutex::new(record)),
            sink,
            interval,
            worker: None,
            paused: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn record(&self) -> PointerRecord {
        *self.record.lock()
    }

    pub fn update(&self, position: Point, buttons: ButtonMask) {
        let mut rec = self.record.lock();
        rec.position = position;
        rec.buttons = buttons;
    }

    /// Starts the thread. Returns `false` if it was already running or could not be spawned.
    pub fn start(&mut self) -> bool {
        if self.worker.is_some() {
            return false;
        }
        let (tx, rx) = unbounded();
        let record = Arc::clone(&self.record);
        let sink = Arc::clone(&self.sink);
        let interval = self.interval;

        let spawned = std::thread::Builder::new()
            .name("synput-hover".into())
            .spawn(move || {
                let mut paused = false;
                loop {
                    match rx.recv_timeout(interval) {
                        Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Ok(Control::Pause) => paused = true,
                        Ok(Control::Resume) => paused = false,
                        Err(RecvTimeoutError::Timeout) => {
                            if paused {
                                continue;
                            }
                            let rec = *record.lock();
                            if let Err(e) = sink.reassert(&rec) {
                                debug!("Pointer reassert on {} failed: {}", rec.target, e);
                            }
                        }
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                info!("Pointer keeper started ({:?} cadence)", self.interval);
                self.worker = Some(Worker { tx, handle });
                self.paused = false;
                true
            }
            Err(e) => {
                error!("Failed to spawn pointer keeper: {}", e);
                false
            }
        }
    }

    /// Stops and joins the thread. Returns `false` if it was not running.
    pub fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return false;
        };
        let _ = worker.tx.send(Control::Stop);
        if worker.handle.join().is_err() {
            error!("Pointer keeper thread panicked");
        }
        self.paused = false;
        info!("Pointer keeper stopped");
        true
    }

    pub fn pause(&mut self) -> bool {
        self.control(Control::Pause)
    }

    pub fn resume(&mut self) -> bool {
        self.control(Control::Resume)
    }

    fn control(&mut self, msg: Control) -> bool {
        let Some(worker) = &self.worker else {
            return false;
        };
        let want_paused = msg == Control::Pause;
        if self.paused == want_paused {
            return false;
        }
        if worker.tx.send(msg).is_err() {
            return false;
        }
        self.paused = want_paused;
        true
    }
}

impl Drop for PointerKeeper {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicUsize,
        last: Mutex<Option<PointerRecord>>,
    }

    impl PointerSink for CountingSink {
        fn reassert(&self, record: &PointerRecord) -> Result<(), SubmitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = Some(*record);
            Ok(())
        }
    }

    fn record() -> PointerRecord {
        PointerRecord {
            target: TargetHandle::new(1).unwrap(),
            position: Point::new(3, 4),
            buttons: ButtonMask::empty(),
        }
    }

    #[test]
    fn test_start_stop_idempotent() {
        let sink = Arc::new(CountingSink::default());
        let mut keeper = PointerKeeper::new(record(), sink, Duration::from_millis(5));
        assert!(!keeper.stop());
        assert!(keeper.start());
        assert!(!keeper.start());
        assert!(keeper.is_running());
        assert!(keeper.stop());
        assert!(!keeper.stop());
        assert!(!keeper.is_running());
    }

    #[test]
    fn test_pause_resume_need_running() {
        let sink = Arc::new(CountingSink::default());
        let mut keeper = PointerKeeper::new(record(), sink, Duration::from_millis(5));
        assert!(!keeper.pause());
        assert!(!keeper.resume());
        keeper.start();
        assert!(keeper.pause());
        assert!(!keeper.pause());
        assert!(keeper.is_paused());
        assert!(keeper.resume());
        assert!(!keeper.is_paused());
    }

    #[test]
    fn test_reasserts_latest_record() {
        let sink = Arc::new(CountingSink::default());
        let mut keeper = PointerKeeper::new(record(), sink.clone(), Duration::from_millis(2));
        keeper.update(Point::new(40, 50), ButtonMask::empty());
        keeper.start();
        std::thread::sleep(Duration::from_millis(40));
        keeper.stop();
        assert!(sink.calls.load(Ordering::SeqCst) > 0);
        assert_eq!(sink.last.lock().unwrap().position, Point::new(40, 50));
    }

    #[test]
    fn test_paused_keeper_is_silent() {
        let sink = Arc::new(CountingSink::default());
        let mut keeper = PointerKeeper::new(record(), sink.clone(), Duration::from_millis(2));
        keeper.start();
        keeper.pause();
        // Let any tick that raced the pause land first.
        std::thread::sleep(Duration::from_millis(10));
        let before = sink.calls.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(sink.calls.load(Ordering::SeqCst), before);
        keeper.stop();
    }

    #[test]
    fn test_drop_stops_thread() {
        let sink = Arc::new(CountingSink::default());
        {
            let mut keeper = PointerKeeper::new(record(), sink.clone(), Duration::from_millis(2));
            keeper.start();
        }
        let after_drop = sink.calls.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(sink.calls.load(Ordering::SeqCst), after_drop);
    }
}
