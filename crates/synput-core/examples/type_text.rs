use synput_core::backend::{AckPolicy, RecordingBackend};
use synput_core::{EngineConfig, InputEngine, Point, PointerButton};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let backend = RecordingBackend::new().with_ack_policy(AckPolicy::AfterPumps(2));
    let mut engine = InputEngine::new(backend, EngineConfig::default())?;
    let mut session = engine.open_session(0xBEEF)?;

    // Shift latched around "ab", then a capital with a transient shift.
    let report = engine.synthesize_keys(&mut session, "\u{E008}ab\u{E008}C!\n", Some(30))?;
    println!("keys: {:?}", report);

    let report = engine.click(&mut session, Point::new(120, 48), PointerButton::Left)?;
    println!("click: {:?}", report);

    for event in engine.backend().events() {
        println!("{:?} {:?} mods={:?}", event.class, event.input, event.modifiers);
    }
    println!("pending: {}", engine.has_pending_events(session.target()));
    Ok(())
}
