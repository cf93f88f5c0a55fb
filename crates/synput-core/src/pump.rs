use crate::ack::{AckOutcome, AckRegistry};
use crate::backend::{DeliveryBackend, ObserverHandle};
use crate::config::EngineConfig;
use crate::pacing::PacingPolicy;
use crate::types::{NativeEvent, TargetHandle};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Per-event delivery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStage {
    Resolved,
    Submitting,
    AwaitingAck,
    Paced,
    Done,
}

/// Outcome of one input sequence. Submission failures are counted, not raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub submitted: usize,
    pub failed: usize,
    pub acknowledged: usize,
    pub timed_out: usize,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    pub fn merge(&mut self, other: DeliveryReport) {
        self.submitted += other.submitted;
        self.failed += other.failed;
        self.acknowledged += other.acknowledged;
        self.timed_out += other.timed_out;
    }
}

/// Drives native events through one backend for the length of one sequence.
pub struct DeliveryPump<'a, B: DeliveryBackend + ?Sized> {
    backend: &'a mut B,
    registry: &'a AckRegistry,
    target: TargetHandle,
    pacing: PacingPolicy,
    ack_timeout: Duration,
    first_ack_timeout: Duration,
    poll: Duration,
    acks_enabled: bool,
    observer: Option<ObserverHandle>,
    stage: DeliveryStage,
    report: DeliveryReport,
}

impl<'a, B: DeliveryBackend + ?Sized> DeliveryPump<'a, B> {
    /// `observer` is one left installed by an earlier sequence on the same target.
    pub fn new(
        backend: &'a mut B,
        registry: &'a AckRegistry,
        config: &EngineConfig,
        target: TargetHandle,
        pacing: PacingPolicy,
        observer: Option<ObserverHandle>,
    ) -> Self {
        Self {
            backend,
            registry,
            target,
            pacing,
            ack_timeout: config.ack_timeout(),
            first_ack_timeout: config.first_ack_timeout(),
            poll: config.ack_poll_interval(),
            acks_enabled: config.require_ack,
            observer,
            stage: DeliveryStage::Done,
            report: DeliveryReport::default(),
        }
    }

    pub fn stage(&self) -> DeliveryStage {
        self.stage
    }

    pub fn report(&self) -> DeliveryReport {
        self.report
    }

    fn advance(&mut self, stage: DeliveryStage) {
        trace!("{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    /// Delivers one event. `first_ack` is the session's "no key acknowledged yet"
    /// flag; it selects the long timeout and is cleared by the first wait.
    pub fn deliver(&mut self, event: &NativeEvent, first_ack: &mut bool) {
        self.advance(DeliveryStage::Resolved);

        let pending = if event.needs_ack && self.ensure_observer() {
            let timeout = if *first_ack {
                self.first_ack_timeout
            } else {
                self.ack_timeout
            };
            *first_ack = false;
            Some(self.registry.register(timeout))
        } else {
            None
        };

        self.advance(DeliveryStage::Submitting);
        if let Err(e) = self.backend.submit(event) {
            warn!("Submitting {:?} to {} failed: {}", event.class, event.target, e);
            self.report.failed += 1;
            self.advance(DeliveryStage::Done);
            return;
        }
        self.report.submitted += 1;

        if let (Some(pending), Some(observer)) = (pending, self.observer) {
            match self.backend.submit_marker(&observer, pending.token()) {
                Ok(()) => {
                    self.advance(DeliveryStage::AwaitingAck);
                    let backend = &mut *self.backend;
                    match pending.wait(self.poll, || backend.pump()) {
                        AckOutcome::Satisfied => self.report.acknowledged += 1,
                        AckOutcome::TimedOut => self.report.timed_out += 1,
                    }
                }
                Err(e) => {
                    warn!("Marker submission to {} failed: {}", observer.target, e);
                    self.report.timed_out += 1;
                }
            }
        }

        self.advance(DeliveryStage::Paced);
        self.pause(self.pacing.delay_for(event.kind));
        self.advance(DeliveryStage::Done);
    }

    pub fn deliver_all<I>(&mut self, events: I, first_ack: &mut bool)
    where
        I: IntoIterator<Item = NativeEvent>,
    {
        for event in events {
            self.deliver(&event, first_ack);
        }
    }

    /// Lazily installs the observation point. A failed install turns the rest
    /// of the sequence into fire-and-forget.
    fn ensure_observer(&mut self) -> bool {
        if !self.acks_enabled {
            return false;
        }
        if self.observer.is_some() {
            return true;
        }
        match self
            .backend
            .install_observer(self.target, self.registry.clone())
        {
            Ok(handle) => {
                debug!("Observer {} installed on {}", handle.id, self.target);
                self.observer = Some(handle);
                true
            }
            Err(e) => {
                warn!(
                    "Could not observe {}: {}; continuing without acknowledgements",
                    self.target, e
                );
                self.acks_enabled = false;
                false
            }
        }
    }

    /// Sleeps for `delay` while keeping the host event loop serviced.
    fn pause(&mut self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let deadline = Instant::now() + delay;
        loop {
            self.backend.pump();
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(self.poll.min(deadline - now));
        }
    }

    /// Ends the sequence. The observer is removed unless markers are still
    /// draining, in which case it is handed back for a later drain check.
    pub fn finish(mut self) -> (DeliveryReport, Option<ObserverHandle>) {
        let lingering = match self.observer.take() {
            Some(observer) => {
                self.backend.pump();
                if self.backend.has_pending(self.target) {
                    debug!("Observer {} left installed while markers drain", observer.id);
                    Some(observer)
                } else {
                    self.backend.uninstall_observer(observer);
                    debug!("Observer {} uninstalled", observer.id);
                    None
                }
            }
            None => None,
        };
        (self.report, lingering)
    }
}
