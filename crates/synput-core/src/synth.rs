use crate::config::default_pointer_step_px;
use crate::keymap::{self, TableEntry};
use crate::keys::LogicalKey;
use crate::layout::KeyboardLayout;
use crate::modifiers::{KeyEdge, ModifierState};
use crate::pacing::PacingPolicy;
use crate::types::{
    ButtonMask, EventClass, EventKind, KeyCode, Modifier, Modifiers, NativeEvent, NativeInput,
    Point, PointerButton, TargetHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Output of a key synthesis.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutput {
    Events(Vec<NativeEvent>),
    /// The layout has no single key for this character; use Unicode injection.
    Unmapped(char),
}

impl KeyOutput {
    pub fn events(&self) -> &[NativeEvent] {
        match self {
            KeyOutput::Events(evs) => evs,
            KeyOutput::Unmapped(_) => &[],
        }
    }

    pub fn is_unmapped(&self) -> bool {
        matches!(self, KeyOutput::Unmapped(_))
    }
}

/// Which half of a key stroke to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stroke {
    Both,
    DownOnly,
    UpOnly,
}

/// Turns logical actions into ordered native event descriptors for one target.
pub struct EventSynthesizer {
    target: TargetHandle,
    state: ModifierState,
    layout: Arc<dyn KeyboardLayout>,
    step_px: u32,
}

impl EventSynthesizer {
    pub fn new(target: TargetHandle, layout: Arc<dyn KeyboardLayout>) -> Self {
        Self {
            target,
            state: ModifierState::new(),
            layout,
            step_px: default_pointer_step_px(),
        }
    }

    /// Pixel distance between interpolated pointer positions.
    pub fn with_pointer_step(mut self, px: u32) -> Self {
        self.step_px = px.max(1);
        self
    }

    pub fn target(&self) -> TargetHandle {
        self.target
    }

    pub fn modifiers(&self) -> &ModifierState {
        &self.state
    }

    pub fn begin_session(&mut self) {
        self.state.reset();
    }

    /// Full key stroke. Named modifiers toggle their latch and emit a single edge.
    pub fn key_action(&mut self, key: LogicalKey) -> KeyOutput {
        match keymap::translate(key) {
            TableEntry::ReleaseAll => KeyOutput::Events(self.release_all()),
            TableEntry::Modifier(m) => {
                let edge = self.state.toggle(m);
                KeyOutput::Events(vec![self.modifier_event(m, edge)])
            }
            TableEntry::Native(code) => {
                KeyOutput::Events(self.stroke(code, Modifiers::none(), Stroke::Both))
            }
            TableEntry::NeedsLayout(c) => match self.layout.lookup(c) {
                Some(m) => KeyOutput::Events(self.stroke(m.key, m.modifiers, Stroke::Both)),
                None => {
                    debug!("No key mapping for {:?}, falling back to Unicode", c);
                    KeyOutput::Unmapped(c)
                }
            },
        }
    }

    /// Key down only. A modifier that is already latched produces nothing.
    pub fn press(&mut self, key: LogicalKey) -> KeyOutput {
        self.half_stroke(key, Stroke::DownOnly)
    }

    /// Key up only. A modifier that is not latched produces nothing.
    pub fn release(&mut self, key: LogicalKey) -> KeyOutput {
        self.half_stroke(key, Stroke::UpOnly)
    }

    fn half_stroke(&mut self, key: LogicalKey, stroke: Stroke) -> KeyOutput {
        match keymap::translate(key) {
            TableEntry::ReleaseAll => KeyOutput::Events(self.release_all()),
            TableEntry::Modifier(m) => {
                let changed = match stroke {
                    Stroke::UpOnly => self.state.unlatch(m),
                    _ => self.state.latch(m),
                };
                if !changed {
                    return KeyOutput::Events(Vec::new());
                }
                let edge = if stroke == Stroke::UpOnly {
                    KeyEdge::Up
                } else {
                    KeyEdge::Down
                };
                KeyOutput::Events(vec![self.modifier_event(m, edge)])
            }
            TableEntry::Native(code) => {
                KeyOutput::Events(self.stroke(code, Modifiers::none(), stroke))
            }
            TableEntry::NeedsLayout(c) => match self.layout.lookup(c) {
                Some(m) => KeyOutput::Events(self.stroke(m.key, m.modifiers, stroke)),
                None => KeyOutput::Unmapped(c),
            },
        }
    }

    /// Releases every latched modifier in `Modifier::ALL` order.
    pub fn release_all(&mut self) -> Vec<NativeEvent> {
        self.release_modifiers(self.state.latched())
    }

    /// Releases the latched modifiers in `mask`. Others stay latched.
    pub fn release_modifiers(&mut self, mask: Modifiers) -> Vec<NativeEvent> {
        let mut down = self.state.latched();
        let held = self.state.release(mask);
        held.into_iter()
            .map(|m| {
                down.set(m, false);
                NativeEvent::key(self.target, EventClass::KeyUp, m.key(), down)
                    .kind(EventKind::ModifierKey)
            })
            .collect()
    }

    /// Unicode injection for a character with no key mapping.
    pub fn unicode(&self, c: char) -> Vec<NativeEvent> {
        let mask = self.state.latched();
        let kind = if mask.is_empty() {
            EventKind::PlainKey
        } else {
            EventKind::ModifiedKey
        };
        [EventClass::KeyDown, EventClass::KeyUp]
            .into_iter()
            .map(|class| {
                let ev = NativeEvent {
                    input: NativeInput::Unicode(c),
                    ..NativeEvent::key(self.target, class, KeyCode::new(0, false), mask)
                }
                .kind(kind);
                if class == EventClass::KeyDown {
                    ev.acknowledged()
                } else {
                    ev
                }
            })
            .collect()
    }

    fn modifier_event(&self, m: Modifier, edge: KeyEdge) -> NativeEvent {
        let class = match edge {
            KeyEdge::Down => EventClass::KeyDown,
            KeyEdge::Up => EventClass::KeyUp,
        };
        NativeEvent::key(self.target, class, m.key(), self.state.latched()).kind(EventKind::ModifierKey)
    }

    /// Key stroke bracketed by the transient modifiers it needs.
    fn stroke(&self, code: KeyCode, required: Modifiers, stroke: Stroke) -> Vec<NativeEvent> {
        let latched = self.state.latched();
        let transient = self.state.transient_for(required);
        let full = latched.union(required);
        let kind = if full.is_empty() {
            EventKind::PlainKey
        } else {
            EventKind::ModifiedKey
        };

        let mut events = Vec::with_capacity(transient.len() * 2 + 2);
        if stroke != Stroke::UpOnly {
            let mut mask = latched;
            for m in &transient {
                mask.set(*m, true);
                events.push(
                    NativeEvent::key(self.target, EventClass::KeyDown, m.key(), mask)
                        .kind(EventKind::ModifierKey),
                );
            }
            events.push(
                NativeEvent::key(self.target, EventClass::KeyDown, code, full)
                    .kind(kind)
                    .acknowledged(),
            );
        }
        if stroke != Stroke::DownOnly {
            events.push(NativeEvent::key(self.target, EventClass::KeyUp, code, full).kind(kind));
            let mut mask = full;
            for m in transient.iter().rev() {
                mask.set(*m, false);
                events.push(
                    NativeEvent::key(self.target, EventClass::KeyUp, m.key(), mask)
                        .kind(EventKind::ModifierKey),
                );
            }
        }
        events
    }

    pub fn pointer_press(&self, at: Point, button: PointerButton, held: ButtonMask) -> NativeEvent {
        NativeEvent::pointer(
            self.target,
            EventClass::PointerDown,
            Some(button),
            at,
            self.state.latched(),
            held.with(button),
        )
    }

    pub fn pointer_release(&self, at: Point, button: PointerButton, held: ButtonMask) -> NativeEvent {
        NativeEvent::pointer(
            self.target,
            EventClass::PointerUp,
            Some(button),
            at,
            self.state.latched(),
            held.without(button),
        )
    }

    /// Down then up at the same coordinates.
    pub fn pointer_click(&self, at: Point, button: PointerButton, held: ButtonMask) -> Vec<NativeEvent> {
        vec![
            self.pointer_press(at, button, held),
            self.pointer_release(at, button, held.with(button)),
        ]
    }

    /// Down, up, down, double-click marker, up: five events at `at`.
    pub fn pointer_double_click(&self, at: Point, held: ButtonMask) -> Vec<NativeEvent> {
        let button = PointerButton::Left;
        let mut events = self.pointer_click(at, button, held);
        events.push(self.pointer_press(at, button, held));
        events.push(NativeEvent::pointer(
            self.target,
            EventClass::PointerDoubleClick,
            Some(button),
            at,
            self.state.latched(),
            held.with(button),
        ));
        events.push(self.pointer_release(at, button, held.with(button)));
        events
    }

    /// Lazily interpolated moves from `from` to `to`, ending exactly on `to`.
    pub fn pointer_move(&self, from: Point, to: Point, duration: Duration, held: ButtonMask) -> PointerPath {
        PointerPath::new(self.target, from, to, self.step_px, duration, self.state.latched(), held)
    }
}

/// Iterator over the pointer-move events of one move.
#[derive(Debug, Clone)]
pub struct PointerPath {
    target: TargetHandle,
    from: Point,
    to: Point,
    steps: usize,
    next: usize,
    step_delay: Duration,
    modifiers: Modifiers,
    buttons: ButtonMask,
}

impl PointerPath {
    fn new(
        target: TargetHandle,
        from: Point,
        to: Point,
        step_px: u32,
        duration: Duration,
        modifiers: Modifiers,
        buttons: ButtonMask,
    ) -> Self {
        let dx = f64::from(to.x) - f64::from(from.x);
        let dy = f64::from(to.y) - f64::from(from.y);
        let distance = (dx * dx + dy * dy).sqrt();
        // At least one interpolated point before the exact destination.
        let steps = ((distance / f64::from(step_px.max(1))).ceil() as usize).max(2);
        Self {
            target,
            from,
            to,
            steps,
            next: 1,
            step_delay: PacingPolicy::pointer_step_delay(duration, steps),
            modifiers,
            buttons,
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    fn point_at(&self, i: usize) -> Point {
        if i >= self.steps {
            return self.to;
        }
        let lerp = |a: i32, b: i32| -> i32 {
            let delta = (i64::from(b) - i64::from(a)) * i as i64;
            let steps = self.steps as i64;
            // Round half away from zero.
            let offset = if delta >= 0 {
                (delta + steps / 2) / steps
            } else {
                (delta - steps / 2) / steps
            };
            (i64::from(a) + offset) as i32
        };
        Point::new(lerp(self.from.x, self.to.x), lerp(self.from.y, self.to.y))
    }
}

impl Iterator for PointerPath {
    type Item = NativeEvent;

    fn next(&mut self) -> Option<NativeEvent> {
        if self.next > self.steps {
            return None;
        }
        let at = self.point_at(self.next);
        self.next += 1;
        Some(
            NativeEvent::pointer(
                self.target,
                EventClass::PointerMove,
                None,
                at,
                self.modifiers,
                self.buttons,
            )
            .kind(EventKind::PointerStep(self.step_delay)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.steps + 1).saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for PointerPath {}
