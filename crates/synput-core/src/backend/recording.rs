use super::{DeliveryBackend, ObserverHandle};
use crate::ack::{AckRegistry, AckToken};
use crate::error::{InputError, SubmitError};
use crate::hover::{PointerRecord, PointerSink};
use crate::layout::{KeyboardLayout, UsLayout};
use crate::types::{NativeEvent, TargetHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// When the recording backend reports markers as observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    Immediate,
    Never,
    /// Observed on the n-th host pump after submission.
    AfterPumps(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Event(NativeEvent),
    Marker { target: TargetHandle, token: AckToken },
}

struct QueuedMarker {
    observer: u64,
    target: TargetHandle,
    token: AckToken,
    pumps_left: Option<u32>,
}

/// In-memory backend. Records everything it is handed.
pub struct RecordingBackend {
    log: Vec<Submission>,
    reasserted: Arc<Mutex<Vec<PointerRecord>>>,
    policy: AckPolicy,
    fail_at: HashSet<usize>,
    rejected: HashSet<TargetHandle>,
    observers: HashMap<u64, AckRegistry>,
    queued: Vec<QueuedMarker>,
    next_observer: u64,
    events_seen: usize,
    installs: usize,
    uninstalls: usize,
    pumps: usize,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            log: Vec::new(),
            reasserted: Arc::new(Mutex::new(Vec::new())),
            policy: AckPolicy::Immediate,
            fail_at: HashSet::new(),
            rejected: HashSet::new(),
            observers: HashMap::new(),
            queued: Vec::new(),
            next_observer: 1,
            events_seen: 0,
            installs: 0,
            uninstalls: 0,
            pumps: 0,
        }
    }

    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn set_ack_policy(&mut self, policy: AckPolicy) {
        self.policy = policy;
    }

    /// Makes the `index`-th event submission (0-based, markers excluded) fail.
    pub fn fail_submission(&mut self, index: usize) {
        self.fail_at.insert(index);
    }

    pub fn reject_target(&mut self, target: TargetHandle) {
        self.rejected.insert(target);
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.log
    }

    /// Submitted events, markers excluded.
    pub fn events(&self) -> Vec<NativeEvent> {
        self.log
            .iter()
            .filter_map(|s| match s {
                Submission::Event(e) => Some(e.clone()),
                Submission::Marker { .. } => None,
            })
            .collect()
    }

    pub fn marker_count(&self) -> usize {
        self.log
            .iter()
            .filter(|s| matches!(s, Submission::Marker { .. }))
            .count()
    }

    pub fn installs(&self) -> usize {
        self.installs
    }

    pub fn uninstalls(&self) -> usize {
        self.uninstalls
    }

    pub fn active_observers(&self) -> usize {
        self.observers.len()
    }

    pub fn pumps(&self) -> usize {
        self.pumps
    }

    pub fn reassertions(&self) -> Vec<PointerRecord> {
        self.reasserted.lock().clone()
    }

    pub fn clear(&mut self) {
        self.log.clear();
        self.reasserted.lock().clear();
    }

    fn observe(&mut self, marker: QueuedMarker) {
        if let Some(sink) = self.observers.get(&marker.observer) {
            sink.acknowledge(marker.token);
        }
    }
}

impl DeliveryBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn validate_target(&self, target: TargetHandle) -> Result<(), InputError> {
        if self.rejected.contains(&target) {
            return Err(InputError::InvalidTarget(target.raw()));
        }
        Ok(())
    }

    fn layout(&self) -> Arc<dyn KeyboardLayout> {
        Arc::new(UsLayout)
    }

    fn submit(&mut self, event: &NativeEvent) -> Result<(), SubmitError> {
        let index = self.events_seen;
        self.events_seen += 1;
        if self.rejected.contains(&event.target) {
            return Err(SubmitError::TargetGone(event.target.raw()));
        }
        if self.fail_at.contains(&index) {
            return Err(SubmitError::QueueRejected);
        }
        self.log.push(Submission::Event(event.clone()));
        Ok(())
    }

    fn install_observer(
        &mut self,
        target: TargetHandle,
        sink: AckRegistry,
    ) -> Result<ObserverHandle, SubmitError> {
        if self.rejected.contains(&target) {
            return Err(SubmitError::TargetGone(target.raw()));
        }
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.insert(id, sink);
        self.installs += 1;
        debug!("Recording observer {} installed on {}", id, target);
        Ok(ObserverHandle { target, id })
    }

    fn submit_marker(
        &mut self,
        observer: &ObserverHandle,
        token: AckToken,
    ) -> Result<(), SubmitError> {
        if !self.observers.contains_key(&observer.id) {
            return Err(SubmitError::Platform(format!(
                "observer {} is not installed",
                observer.id
            )));
        }
        self.log.push(Submission::Marker {
            target: observer.target,
            token,
        });
        let marker = QueuedMarker {
            observer: observer.id,
            target: observer.target,
            token,
            pumps_left: match self.policy {
                AckPolicy::Immediate | AckPolicy::AfterPumps(0) => Some(0),
                AckPolicy::AfterPumps(n) => Some(n),
                AckPolicy::Never => None,
            },
        };
        if marker.pumps_left == Some(0) {
            self.observe(marker);
        } else {
            self.queued.push(marker);
        }
        Ok(())
    }

    fn uninstall_observer(&mut self, observer: ObserverHandle) {
        if self.observers.remove(&observer.id).is_some() {
            self.uninstalls += 1;
            self.queued.retain(|m| m.observer != observer.id);
            debug!("Recording observer {} uninstalled", observer.id);
        }
    }

    fn pump(&mut self) {
        self.pumps += 1;
        let mut ready = Vec::new();
        self.queued.retain_mut(|m| match &mut m.pumps_left {
            Some(n) if *n <= 1 => {
                ready.push(QueuedMarker {
                    observer: m.observer,
                    target: m.target,
                    token: m.token,
                    pumps_left: Some(0),
                });
                false
            }
            Some(n) => {
                *n -= 1;
                true
            }
            None => true,
        });
        for marker in ready {
            self.observe(marker);
        }
    }

    fn has_pending(&mut self, target: TargetHandle) -> bool {
        self.queued.iter().any(|m| m.target == target)
    }

    fn pointer_sink(&self) -> Option<Arc<dyn PointerSink>> {
        Some(Arc::new(RecordingPointerSink {
            log: Arc::clone(&self.reasserted),
        }))
    }
}

struct RecordingPointerSink {
    log: Arc<Mutex<Vec<PointerRecord>>>,
}

impl PointerSink for RecordingPointerSink {
    fn reassert(&self, record: &PointerRecord) -> Result<(), SubmitError> {
        self.log.lock().push(*record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::AckOutcome;
    use crate::types::{EventClass, KeyCode, Modifiers};
    use std::time::Duration;

    fn target() -> TargetHandle {
        TargetHandle::new(7).unwrap()
    }

    #[test]
    fn test_marker_after_pumps() {
        let mut backend = RecordingBackend::new().with_ack_policy(AckPolicy::AfterPumps(2));
        let reg = AckRegistry::new();
        let obs = backend.install_observer(target(), reg.clone()).unwrap();
        let pending = reg.register(Duration::from_secs(1));
        backend.submit_marker(&obs, pending.token()).unwrap();
        assert!(backend.has_pending(target()));
        backend.pump();
        assert!(backend.has_pending(target()));
        backend.pump();
        assert!(!backend.has_pending(target()));
        assert_eq!(pending.wait(Duration::from_millis(1), || {}), AckOutcome::Satisfied);
    }

    #[test]
    fn test_injected_failure() {
        let mut backend = RecordingBackend::new();
        backend.fail_submission(1);
        let ev = NativeEvent::key(target(), EventClass::KeyDown, KeyCode::new(0x41, false), Modifiers::none());
        assert!(backend.submit(&ev).is_ok());
        assert_eq!(backend.submit(&ev), Err(SubmitError::QueueRejected));
        assert!(backend.submit(&ev).is_ok());
        assert_eq!(backend.events().len(), 2);
    }

    #[test]
    fn test_uninstall_drops_queued_markers() {
        let mut backend = RecordingBackend::new().with_ack_policy(AckPolicy::Never);
        let reg = AckRegistry::new();
        let obs = backend.install_observer(target(), reg.clone()).unwrap();
        let pending = reg.register(Duration::ZERO);
        backend.submit_marker(&obs, pending.token()).unwrap();
        assert!(backend.has_pending(target()));
        backend.uninstall_observer(obs);
        assert!(!backend.has_pending(target()));
        assert_eq!(backend.uninstalls(), 1);
        assert!(backend.submit_marker(&obs, pending.token()).is_err());
    }
}
