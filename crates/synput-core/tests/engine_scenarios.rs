use std::time::{Duration, Instant};
use synput_core::backend::{AckPolicy, RecordingBackend, Submission};
use synput_core::keymap;
use synput_core::types::{EventClass, EventKind, NativeEvent, NativeInput};
use synput_core::{
    EngineConfig, InputEngine, InputError, LogicalKey, Modifier, Point, PointerButton, SpecialKey,
};

fn engine_with(backend: RecordingBackend) -> InputEngine<RecordingBackend> {
    InputEngine::new(backend, EngineConfig::default()).unwrap()
}

fn is_modifier(e: &NativeEvent) -> bool {
    e.kind == EventKind::ModifierKey
}

#[test]
fn shift_latched_across_calls_emits_two_modifier_events() {
    let mut engine = engine_with(RecordingBackend::new());
    let mut session = engine.open_session(0x100).unwrap();

    engine
        .press_key(&mut session, LogicalKey::Special(SpecialKey::Shift))
        .unwrap();
    engine.synthesize_keys(&mut session, "a", None).unwrap();
    engine.synthesize_keys(&mut session, "b", None).unwrap();
    assert!(session.synthesizer().modifiers().is_latched(Modifier::Shift));
    engine
        .release_key(&mut session, LogicalKey::Special(SpecialKey::Shift))
        .unwrap();

    let events = engine.backend().events();
    let modifiers: Vec<&NativeEvent> = events.iter().filter(|e| is_modifier(e)).collect();
    assert_eq!(modifiers.len(), 2);
    assert_eq!(events.first(), Some(modifiers[0]));
    assert_eq!(events.last(), Some(modifiers[1]));
    assert_eq!(modifiers[0].class, EventClass::KeyDown);
    assert_eq!(modifiers[1].class, EventClass::KeyUp);
    assert_eq!(modifiers[1].key_code(), Some(Modifier::Shift.key()));

    let keys: Vec<&NativeEvent> = events.iter().filter(|e| !is_modifier(e)).collect();
    assert_eq!(keys.len(), 4);
    assert!(keys.iter().all(|e| e.modifiers.shift));
    assert!(session.synthesizer().modifiers().latched().is_empty());
}

#[test]
fn text_latched_modifier_released_but_earlier_latch_kept() {
    let mut engine = engine_with(RecordingBackend::new());
    let mut session = engine.open_session(0x100).unwrap();

    engine
        .press_key(&mut session, LogicalKey::Special(SpecialKey::Shift))
        .unwrap();
    // Control is latched by the text and left held at its end.
    engine
        .synthesize_keys(&mut session, "\u{E009}c", None)
        .unwrap();

    let latched = session.synthesizer().modifiers().latched();
    assert!(latched.shift);
    assert!(!latched.control);
    let last = engine.backend().events().last().cloned().unwrap();
    assert_eq!(last.class, EventClass::KeyUp);
    assert_eq!(last.key_code(), Some(Modifier::Control.key()));
    assert!(last.modifiers.shift && !last.modifiers.control);
}

#[test]
fn single_latch_period_in_one_sequence() {
    let mut engine = engine_with(RecordingBackend::new());
    let mut session = engine.open_session(0x100).unwrap();

    // shift on, "ab", shift off: exactly one down and one up for shift.
    let report = engine
        .synthesize_keys(&mut session, "\u{E008}ab\u{E008}", None)
        .unwrap();
    assert!(report.is_complete());

    let events = engine.backend().events();
    let shift: Vec<&NativeEvent> = events
        .iter()
        .filter(|e| e.key_code() == Some(Modifier::Shift.key()))
        .collect();
    assert_eq!(shift.len(), 2);
    assert_eq!(shift[0].class, EventClass::KeyDown);
    assert_eq!(shift[1].class, EventClass::KeyUp);
    assert_eq!(events.len(), 6);
}

#[test]
fn trailing_modifiers_are_released() {
    let mut engine = engine_with(RecordingBackend::new());
    let mut session = engine.open_session(0x100).unwrap();

    engine
        .synthesize_keys(&mut session, "\u{E009}\u{E00A}x", None)
        .unwrap();
    let events = engine.backend().events();
    let tail: Vec<(EventClass, u16)> = events[events.len() - 2..]
        .iter()
        .map(|e| (e.class, e.key_code().unwrap().vk))
        .collect();
    assert_eq!(tail, vec![(EventClass::KeyUp, 0x11), (EventClass::KeyUp, 0x12)]);
    assert!(session.synthesizer().modifiers().latched().is_empty());
}

#[test]
fn lowercase_round_trip_through_inverse_table() {
    let mut engine = engine_with(RecordingBackend::new());
    let mut session = engine.open_session(0x100).unwrap();
    let text = "the quick brown fox";

    engine.synthesize_keys(&mut session, text, None).unwrap();
    let decoded: String = engine
        .backend()
        .events()
        .iter()
        .filter(|e| e.is_key_down())
        .filter_map(|e| e.key_code().and_then(keymap::key_to_char))
        .collect();
    assert_eq!(decoded, text);
}

#[test]
fn markers_follow_acknowledged_keys_only() {
    let mut engine = engine_with(RecordingBackend::new());
    let mut session = engine.open_session(0x100).unwrap();

    let report = engine.synthesize_keys(&mut session, "Hi", None).unwrap();
    // One marker per key-down of a non-modifier key.
    assert_eq!(report.acknowledged, 2);
    assert_eq!(engine.backend().marker_count(), 2);

    let subs = engine.backend().submissions();
    for (i, s) in subs.iter().enumerate() {
        if let Submission::Marker { .. } = s {
            let Submission::Event(prev) = &subs[i - 1] else {
                panic!("marker not preceded by an event");
            };
            assert!(prev.needs_ack);
            assert_eq!(prev.class, EventClass::KeyDown);
        }
    }
    // Observer removed once the sequence drained.
    assert_eq!(engine.backend().installs(), 1);
    assert_eq!(engine.backend().active_observers(), 0);
}

#[test]
fn ack_timeout_is_bounded() {
    let config = EngineConfig {
        ack_timeout_ms: 50,
        first_ack_timeout_ms: 50,
        ack_poll_interval_ms: 5,
        ..EngineConfig::default()
    };
    let backend = RecordingBackend::new().with_ack_policy(AckPolicy::Never);
    let mut engine = InputEngine::new(backend, config).unwrap();
    let mut session = engine.open_session(0x100).unwrap();

    let start = Instant::now();
    let report = engine.synthesize_keys(&mut session, "a", None).unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.timed_out, 1);
    assert_eq!(report.submitted, 2);
    assert!(elapsed >= Duration::from_millis(50), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(75), "took {:?}", elapsed);
}

#[test]
fn first_key_uses_long_timeout_then_short() {
    let config = EngineConfig {
        ack_timeout_ms: 10,
        first_ack_timeout_ms: 120,
        ack_poll_interval_ms: 2,
        ..EngineConfig::default()
    };
    let backend = RecordingBackend::new().with_ack_policy(AckPolicy::Never);
    let mut engine = InputEngine::new(backend, config).unwrap();
    let mut session = engine.open_session(0x100).unwrap();

    let start = Instant::now();
    engine.synthesize_keys(&mut session, "a", None).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(120));

    let start = Instant::now();
    engine.synthesize_keys(&mut session, "b", None).unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[test]
fn pending_events_drain_then_observer_is_removed() {
    let config = EngineConfig {
        ack_timeout_ms: 1,
        first_ack_timeout_ms: 1,
        ..EngineConfig::default()
    };
    let backend = RecordingBackend::new().with_ack_policy(AckPolicy::AfterPumps(50));
    let mut engine = InputEngine::new(backend, config).unwrap();
    let mut session = engine.open_session(0x100).unwrap();
    let target = session.target();

    engine.synthesize_keys(&mut session, "z", None).unwrap();
    assert_eq!(engine.backend().active_observers(), 1);

    let mut polls = 0;
    while engine.has_pending_events(target) {
        polls += 1;
        assert!(polls < 100, "markers never drained");
    }
    assert!(polls > 0);
    assert_eq!(engine.backend().active_observers(), 0);
    assert!(!engine.has_pending_events(target));
}

#[test]
fn lingering_observer_is_reused() {
    let config = EngineConfig {
        ack_timeout_ms: 1,
        first_ack_timeout_ms: 1,
        ..EngineConfig::default()
    };
    let backend = RecordingBackend::new().with_ack_policy(AckPolicy::Never);
    let mut engine = InputEngine::new(backend, config).unwrap();
    let mut session = engine.open_session(0x100).unwrap();

    engine.synthesize_keys(&mut session, "a", None).unwrap();
    engine.synthesize_keys(&mut session, "b", None).unwrap();
    assert_eq!(engine.backend().installs(), 1);
    drop(engine);
}

#[test]
fn submission_failure_does_not_abort_sequence() {
    let mut backend = RecordingBackend::new();
    backend.fail_submission(1);
    let mut engine = engine_with(backend);
    let mut session = engine.open_session(0x100).unwrap();

    let report = engine.synthesize_keys(&mut session, "abc", None).unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.submitted, 5);
    assert!(!report.is_complete());
    assert_eq!(engine.backend().events().len(), 5);
}

#[test]
fn invalid_targets_are_rejected_before_synthesis() {
    let mut backend = RecordingBackend::new();
    let gone = synput_core::TargetHandle::new(0x200).unwrap();
    backend.reject_target(gone);
    let mut engine = engine_with(backend);

    assert!(matches!(engine.open_session(0), Err(InputError::InvalidTarget(0))));
    assert!(matches!(
        engine.open_session(0x200),
        Err(InputError::InvalidTarget(0x200))
    ));

    let mut session = engine.open_session(0x100).unwrap();
    engine.backend_mut().reject_target(session.target());
    let err = engine.synthesize_keys(&mut session, "\u{E008}abc", None);
    assert!(matches!(err, Err(InputError::InvalidTarget(0x100))));
    assert!(engine.backend().events().is_empty());
    // Nothing was synthesized, so nothing was latched.
    assert!(session.synthesizer().modifiers().latched().is_empty());
}

#[test]
fn unmapped_character_uses_unicode_injection() {
    let mut engine = engine_with(RecordingBackend::new());
    let mut session = engine.open_session(0x100).unwrap();

    engine.synthesize_keys(&mut session, "a€", None).unwrap();
    let events = engine.backend().events();
    assert_eq!(events.len(), 4);
    assert_eq!(events[2].input, NativeInput::Unicode('€'));
    assert_eq!(events[3].input, NativeInput::Unicode('€'));
}

#[test]
fn pointer_operations_track_session_state() {
    let mut engine = engine_with(RecordingBackend::new());
    let mut session = engine.open_session(0x100).unwrap();

    engine
        .press_pointer(&mut session, Point::new(10, 10), PointerButton::Left)
        .unwrap();
    assert!(session.buttons().contains(PointerButton::Left));

    engine
        .move_pointer(&mut session, Duration::ZERO, Point::new(10, 10), Point::new(60, 10))
        .unwrap();
    assert_eq!(session.pointer(), Point::new(60, 10));

    engine
        .release_pointer(&mut session, Point::new(60, 10), PointerButton::Left)
        .unwrap();
    assert!(session.buttons().is_empty());

    let events = engine.backend().events();
    let moves: Vec<&NativeEvent> = events
        .iter()
        .filter(|e| e.class == EventClass::PointerMove)
        .collect();
    assert_eq!(moves.len(), 5);
    assert!(moves.iter().all(|e| e.buttons.contains(PointerButton::Left)));
    assert_eq!(moves.last().unwrap().position, Some(Point::new(60, 10)));
    assert_eq!(engine.backend().marker_count(), 0);
}

#[test]
fn double_click_delivers_five_events() {
    let mut engine = engine_with(RecordingBackend::new());
    let mut session = engine.open_session(0x100).unwrap();

    let report = engine.double_click(&mut session, Point::new(7, 9)).unwrap();
    assert_eq!(report.submitted, 5);
    let classes: Vec<EventClass> = engine.backend().events().iter().map(|e| e.class).collect();
    assert_eq!(
        classes,
        vec![
            EventClass::PointerDown,
            EventClass::PointerUp,
            EventClass::PointerDown,
            EventClass::PointerDoubleClick,
            EventClass::PointerUp,
        ]
    );
}

#[test]
fn ctrl_click_carries_latched_modifier() {
    let mut engine = engine_with(RecordingBackend::new());
    let mut session = engine.open_session(0x100).unwrap();

    engine
        .press_key(&mut session, LogicalKey::Special(SpecialKey::Control))
        .unwrap();
    engine
        .click(&mut session, Point::new(1, 2), PointerButton::Right)
        .unwrap();
    let events = engine.backend().events();
    assert!(events[1..].iter().all(|e| e.modifiers.control));
}

#[test]
fn hover_reasserts_latest_pointer() {
    let config = EngineConfig {
        hover_interval_ms: 5,
        ..EngineConfig::default()
    };
    let mut engine = InputEngine::new(RecordingBackend::new(), config).unwrap();
    let mut session = engine.open_session(0x100).unwrap();

    engine
        .click(&mut session, Point::new(30, 40), PointerButton::Left)
        .unwrap();
    assert!(engine.start_hover(&mut session).unwrap());
    assert!(session.is_hovering());
    std::thread::sleep(Duration::from_millis(50));
    assert!(session.stop_hover());
    assert!(!session.stop_hover());

    let records = engine.backend().reassertions();
    assert!(!records.is_empty());
    assert!(records.iter().all(|r| r.position == Point::new(30, 40)));
}

#[test]
fn pacing_slows_modified_keys() {
    let mut engine = engine_with(RecordingBackend::new());
    let mut session = engine.open_session(0x100).unwrap();

    // Plain: 2 events x 10ms. Capital: 4 events x 30ms.
    let start = Instant::now();
    engine.synthesize_keys(&mut session, "a", Some(30)).unwrap();
    let plain = start.elapsed();

    let start = Instant::now();
    engine.synthesize_keys(&mut session, "A", Some(30)).unwrap();
    let capital = start.elapsed();

    assert!(plain >= Duration::from_millis(20));
    assert!(capital >= Duration::from_millis(120));
    assert!(capital > plain);
}
