use crate::ack::AckRegistry;
use crate::backend::{DeliveryBackend, ObserverHandle};
use crate::config::EngineConfig;
use crate::error::InputError;
use crate::hover::{PointerKeeper, PointerRecord};
use crate::keys::{decode_text, LogicalKey};
use crate::pacing::PacingPolicy;
use crate::pump::{DeliveryPump, DeliveryReport};
use crate::synth::{EventSynthesizer, KeyOutput};
use crate::types::{ButtonMask, Modifiers, NativeEvent, Point, PointerButton, TargetHandle};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-session context: everything that used to be process-global lives here.
pub struct InputSession {
    synth: EventSynthesizer,
    pointer: Point,
    buttons: ButtonMask,
    awaiting_first_ack: bool,
    keeper: Option<PointerKeeper>,
}

impl InputSession {
    pub fn target(&self) -> TargetHandle {
        self.synth.target()
    }

    pub fn synthesizer(&self) -> &EventSynthesizer {
        &self.synth
    }

    pub fn pointer(&self) -> Point {
        self.pointer
    }

    pub fn buttons(&self) -> ButtonMask {
        self.buttons
    }

    /// Clears latched modifiers and the first-key state. Held buttons are kept.
    pub fn reset(&mut self) {
        self.synth.begin_session();
        self.awaiting_first_ack = true;
    }

    pub fn is_hovering(&self) -> bool {
        self.keeper.as_ref().is_some_and(PointerKeeper::is_running)
    }

    pub fn stop_hover(&mut self) -> bool {
        self.keeper.as_mut().is_some_and(PointerKeeper::stop)
    }

    pub fn pause_hover(&mut self) -> bool {
        self.keeper.as_mut().is_some_and(PointerKeeper::pause)
    }

    pub fn resume_hover(&mut self) -> bool {
        self.keeper.as_mut().is_some_and(PointerKeeper::resume)
    }

    fn record(&self) -> PointerRecord {
        PointerRecord {
            target: self.target(),
            position: self.pointer,
            buttons: self.buttons,
        }
    }

    fn set_pointer(&mut self, position: Point, buttons: ButtonMask) {
        self.pointer = position;
        self.buttons = buttons;
        if let Some(keeper) = &self.keeper {
            keeper.update(position, buttons);
        }
    }
}

/// Entry points for synthesizing input into one backend.
pub struct InputEngine<B: DeliveryBackend> {
    backend: B,
    config: EngineConfig,
    registry: AckRegistry,
    draining: HashMap<TargetHandle, ObserverHandle>,
}

impl<B: DeliveryBackend> InputEngine<B> {
    pub fn new(backend: B, config: EngineConfig) -> Result<Self, InputError> {
        config.validate()?;
        info!("Input engine ready on {} backend", backend.name());
        Ok(Self {
            backend,
            config,
            registry: AckRegistry::new(),
            draining: HashMap::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Validates `raw` and opens a fresh session on it.
    pub fn open_session(&self, raw: u64) -> Result<InputSession, InputError> {
        let target = TargetHandle::new(raw)?;
        self.backend.validate_target(target)?;
        debug!("Session opened on {}", target);
        Ok(InputSession {
            synth: EventSynthesizer::new(target, self.backend.layout())
                .with_pointer_step(self.config.pointer_step_px),
            pointer: Point::default(),
            buttons: ButtonMask::empty(),
            awaiting_first_ack: true,
            keeper: None,
        })
    }

    /// Types `text` (literal characters plus private-use key codes). Modifiers
    /// latched by `text` itself and still held at the end are released;
    /// ones latched earlier, e.g. through [`Self::press_key`], stay latched.
    pub fn synthesize_keys(
        &mut self,
        session: &mut InputSession,
        text: &str,
        key_delay_ms: Option<u64>,
    ) -> Result<DeliveryReport, InputError> {
        let keys = decode_text(text);
        debug!("Synthesizing {} keys into {}", keys.len(), session.target());
        self.run_keys(session, key_delay_ms, |synth| {
            let before = synth.modifiers().latched();
            let mut events = Vec::new();
            for key in keys {
                let out = synth_key(synth, key, KeyStroke::Full);
                events.extend(expand(synth, out, KeyStroke::Full));
            }
            let latched_here = synth
                .modifiers()
                .latched()
                .difference(before)
                .fold(Modifiers::none(), Modifiers::with);
            events.extend(synth.release_modifiers(latched_here));
            events
        })
    }

    pub fn press_key(
        &mut self,
        session: &mut InputSession,
        key: LogicalKey,
    ) -> Result<DeliveryReport, InputError> {
        self.run_keys(session, None, |synth| {
            let out = synth_key(synth, key, KeyStroke::Down);
            expand(synth, out, KeyStroke::Down)
        })
    }

    pub fn release_key(
        &mut self,
        session: &mut InputSession,
        key: LogicalKey,
    ) -> Result<DeliveryReport, InputError> {
        self.run_keys(session, None, |synth| {
            let out = synth_key(synth, key, KeyStroke::Up);
            expand(synth, out, KeyStroke::Up)
        })
    }

    pub fn click(
        &mut self,
        session: &mut InputSession,
        at: Point,
        button: PointerButton,
    ) -> Result<DeliveryReport, InputError> {
        self.backend.validate_target(session.target())?;
        let events = session.synth.pointer_click(at, button, session.buttons);
        let report = self.run(session, None, events)?;
        session.set_pointer(at, session.buttons);
        Ok(report)
    }

    pub fn double_click(
        &mut self,
        session: &mut InputSession,
        at: Point,
    ) -> Result<DeliveryReport, InputError> {
        self.backend.validate_target(session.target())?;
        let events = session.synth.pointer_double_click(at, session.buttons);
        let report = self.run(session, None, events)?;
        session.set_pointer(at, session.buttons);
        Ok(report)
    }

    pub fn move_pointer(
        &mut self,
        session: &mut InputSession,
        duration: Duration,
        from: Point,
        to: Point,
    ) -> Result<DeliveryReport, InputError> {
        self.backend.validate_target(session.target())?;
        let path = session.synth.pointer_move(from, to, duration, session.buttons);
        debug!("Moving pointer {:?} -> {:?} in {} steps", from, to, path.steps());
        let report = self.run(session, None, path)?;
        session.set_pointer(to, session.buttons);
        Ok(report)
    }

    pub fn press_pointer(
        &mut self,
        session: &mut InputSession,
        at: Point,
        button: PointerButton,
    ) -> Result<DeliveryReport, InputError> {
        self.backend.validate_target(session.target())?;
        let event = session.synth.pointer_press(at, button, session.buttons);
        let held = event.buttons;
        let report = self.run(session, None, [event])?;
        session.set_pointer(at, held);
        Ok(report)
    }

    pub fn release_pointer(
        &mut self,
        session: &mut InputSession,
        at: Point,
        button: PointerButton,
    ) -> Result<DeliveryReport, InputError> {
        self.backend.validate_target(session.target())?;
        let event = session.synth.pointer_release(at, button, session.buttons);
        let held = event.buttons;
        let report = self.run(session, None, [event])?;
        session.set_pointer(at, held);
        Ok(report)
    }

    /// Whether markers sent to `target` are still draining. Removes the
    /// observation point once they have.
    pub fn has_pending_events(&mut self, target: TargetHandle) -> bool {
        self.backend.pump();
        if self.backend.has_pending(target) {
            return true;
        }
        if let Some(observer) = self.draining.remove(&target) {
            self.backend.uninstall_observer(observer);
            debug!("Observer {} on {} drained", observer.id, target);
        }
        false
    }

    /// Starts re-asserting the session's pointer state in the background.
    /// Returns `Ok(false)` when the backend has no pointer sink or the
    /// keeper is already running.
    pub fn start_hover(&self, session: &mut InputSession) -> Result<bool, InputError> {
        self.backend.validate_target(session.target())?;
        if let Some(keeper) = session.keeper.as_mut() {
            return Ok(keeper.start());
        }
        let Some(sink) = self.backend.pointer_sink() else {
            warn!("{} backend cannot re-assert the pointer", self.backend.name());
            return Ok(false);
        };
        let mut keeper = PointerKeeper::new(session.record(), sink, self.config.hover_interval());
        let started = keeper.start();
        session.keeper = Some(keeper);
        Ok(started)
    }

    fn run_keys<F>(
        &mut self,
        session: &mut InputSession,
        key_delay_ms: Option<u64>,
        build: F,
    ) -> Result<DeliveryReport, InputError>
    where
        F: FnOnce(&mut EventSynthesizer) -> Vec<NativeEvent>,
    {
        self.backend.validate_target(session.target())?;
        let events = build(&mut session.synth);
        self.run(session, key_delay_ms, events)
    }

    fn run<I>(
        &mut self,
        session: &mut InputSession,
        key_delay_ms: Option<u64>,
        events: I,
    ) -> Result<DeliveryReport, InputError>
    where
        I: IntoIterator<Item = NativeEvent>,
    {
        let target = session.target();
        let pacing = PacingPolicy::from_config(&self.config, key_delay_ms);
        let observer = self.draining.remove(&target);
        let mut pump = DeliveryPump::new(
            &mut self.backend,
            &self.registry,
            &self.config,
            target,
            pacing,
            observer,
        );
        pump.deliver_all(events, &mut session.awaiting_first_ack);
        let (report, lingering) = pump.finish();
        if let Some(observer) = lingering {
            self.draining.insert(target, observer);
        }

        if report.failed > 0 {
            warn!(
                "{} of {} events to {} failed",
                report.failed,
                report.failed + report.submitted,
                target
            );
        }
        Ok(report)
    }
}

impl<B: DeliveryBackend> Drop for InputEngine<B> {
    fn drop(&mut self) {
        for (_, observer) in self.draining.drain() {
            self.backend.uninstall_observer(observer);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum KeyStroke {
    Full,
    Down,
    Up,
}

fn synth_key(synth: &mut EventSynthesizer, key: LogicalKey, stroke: KeyStroke) -> KeyOutput {
    match stroke {
        KeyStroke::Full => synth.key_action(key),
        KeyStroke::Down => synth.press(key),
        KeyStroke::Up => synth.release(key),
    }
}

/// Resolves the Unicode fallback into events, keeping only the half asked for.
fn expand(synth: &EventSynthesizer, out: KeyOutput, stroke: KeyStroke) -> Vec<NativeEvent> {
    match out {
        KeyOutput::Events(events) => events,
        KeyOutput::Unmapped(c) => {
            let pair = synth.unicode(c);
            match stroke {
                KeyStroke::Full => pair,
                KeyStroke::Down => pair.into_iter().filter(NativeEvent::is_key_down).collect(),
                KeyStroke::Up => pair.into_iter().filter(|e| !e.is_key_down()).collect(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_null_target_rejected() {
        let engine = InputEngine::new(RecordingBackend::new(), EngineConfig::default()).unwrap();
        assert!(matches!(engine.open_session(0), Err(InputError::InvalidTarget(0))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            ack_poll_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            InputEngine::new(RecordingBackend::new(), config),
            Err(InputError::Config(_))
        ));
    }

    #[test]
    fn test_hover_rejects_vanished_target() {
        let mut engine = InputEngine::new(RecordingBackend::new(), EngineConfig::default()).unwrap();
        let mut session = engine.open_session(6).unwrap();
        engine.backend_mut().reject_target(session.target());
        assert!(matches!(
            engine.start_hover(&mut session),
            Err(InputError::InvalidTarget(6))
        ));
        assert!(!session.is_hovering());
    }

    #[test]
    fn test_press_release_unicode_halves() {
        let mut engine = InputEngine::new(RecordingBackend::new(), EngineConfig::default()).unwrap();
        let mut session = engine.open_session(5).unwrap();
        engine.press_key(&mut session, LogicalKey::Char('é')).unwrap();
        engine.release_key(&mut session, LogicalKey::Char('é')).unwrap();
        let events = engine.backend().events();
        assert_eq!(events.len(), 2);
        assert!(events[0].is_key_down() && !events[1].is_key_down());
        assert!(events.iter().all(|e| e.input == crate::types::NativeInput::Unicode('é')));
    }
}
