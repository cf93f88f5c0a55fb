use crate::error::InputError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque identifier of the native window or surface receiving events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetHandle(u64);

impl TargetHandle {
    /// Rejects the null handle before any synthesis happens.
    pub fn new(raw: u64) -> Result<Self, InputError> {
        if raw == 0 {
            return Err(InputError::InvalidTarget(raw));
        }
        Ok(Self(raw))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Native key identifier: a virtual-key code plus the extended flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyCode {
    pub vk: u16,
    pub ext: bool,
}

impl KeyCode {
    pub const fn new(vk: u16, ext: bool) -> Self {
        Self { vk, ext }
    }
}

/// One of the three tracked modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modifier {
    Shift,
    Control,
    Alt,
}

impl Modifier {
    /// Fixed iteration order used wherever several modifiers are emitted at once.
    pub const ALL: [Modifier; 3] = [Modifier::Shift, Modifier::Control, Modifier::Alt];

    pub const fn key(self) -> KeyCode {
        match self {
            Modifier::Shift => KeyCode::new(0x10, false),   // VK_SHIFT
            Modifier::Control => KeyCode::new(0x11, false), // VK_CONTROL
            Modifier::Alt => KeyCode::new(0x12, false),     // VK_MENU
        }
    }

    pub const fn bit(self) -> u8 {
        match self {
            Modifier::Shift => 0b001,
            Modifier::Control => 0b010,
            Modifier::Alt => 0b100,
        }
    }
}

/// Modifier bitmask carried by every native event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const fn none() -> Self {
        Self {
            shift: false,
            control: false,
            alt: false,
        }
    }

    pub const fn is_empty(self) -> bool {
        !(self.shift || self.control || self.alt)
    }

    pub const fn contains(self, m: Modifier) -> bool {
        match m {
            Modifier::Shift => self.shift,
            Modifier::Control => self.control,
            Modifier::Alt => self.alt,
        }
    }

    pub fn set(&mut self, m: Modifier, on: bool) {
        match m {
            Modifier::Shift => self.shift = on,
            Modifier::Control => self.control = on,
            Modifier::Alt => self.alt = on,
        }
    }

    pub fn with(mut self, m: Modifier) -> Self {
        self.set(m, true);
        self
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            shift: self.shift || other.shift,
            control: self.control || other.control,
            alt: self.alt || other.alt,
        }
    }

    /// Modifiers present in `self` but not in `other`, in `Modifier::ALL` order.
    pub fn difference(self, other: Self) -> impl Iterator<Item = Modifier> {
        Modifier::ALL
            .into_iter()
            .filter(move |m| self.contains(*m) && !other.contains(*m))
    }

    pub fn iter(self) -> impl Iterator<Item = Modifier> {
        self.difference(Modifiers::none())
    }

    pub fn bits(self) -> u8 {
        self.iter().fold(0, |acc, m| acc | m.bit())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerButton {
    Left,
    Middle,
    Right,
}

impl PointerButton {
    pub const fn bit(self) -> u8 {
        match self {
            PointerButton::Left => 0b001,
            PointerButton::Middle => 0b010,
            PointerButton::Right => 0b100,
        }
    }
}

/// Buttons currently held down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ButtonMask(u8);

impl ButtonMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, b: PointerButton) -> bool {
        self.0 & b.bit() != 0
    }

    pub const fn with(self, b: PointerButton) -> Self {
        Self(self.0 | b.bit())
    }

    pub const fn without(self, b: PointerButton) -> Self {
        Self(self.0 & !b.bit())
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    KeyDown,
    KeyUp,
    PointerDown,
    PointerUp,
    PointerMove,
    /// Second click of a double click, for event models that report it as its own class.
    PointerDoubleClick,
}

impl EventClass {
    pub const fn is_key(self) -> bool {
        matches!(self, EventClass::KeyDown | EventClass::KeyUp)
    }
}

/// What the event carries besides its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeInput {
    Key(KeyCode),
    /// Unicode injection fallback for characters with no key mapping.
    Unicode(char),
    Button(PointerButton),
    None,
}

/// Pacing classification of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Ordinary key with no modifier asserted.
    PlainKey,
    /// Key typed while a modifier is asserted (latched or transient).
    ModifiedKey,
    /// The modifier key itself, bracketing or explicit.
    ModifierKey,
    PointerButton,
    PointerStep(Duration),
}

/// The unit handed from the synthesizer to the delivery pump.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeEvent {
    pub target: TargetHandle,
    pub class: EventClass,
    pub input: NativeInput,
    pub position: Option<Point>,
    pub modifiers: Modifiers,
    pub buttons: ButtonMask,
    pub needs_ack: bool,
    pub kind: EventKind,
}

impl NativeEvent {
    pub fn key(target: TargetHandle, class: EventClass, key: KeyCode, modifiers: Modifiers) -> Self {
        Self {
            target,
            class,
            input: NativeInput::Key(key),
            position: None,
            modifiers,
            buttons: ButtonMask::empty(),
            needs_ack: false,
            kind: EventKind::PlainKey,
        }
    }

    pub fn pointer(
        target: TargetHandle,
        class: EventClass,
        button: Option<PointerButton>,
        at: Point,
        modifiers: Modifiers,
        buttons: ButtonMask,
    ) -> Self {
        Self {
            target,
            class,
            input: button.map_or(NativeInput::None, NativeInput::Button),
            position: Some(at),
            modifiers,
            buttons,
            needs_ack: false,
            kind: EventKind::PointerButton,
        }
    }

    pub fn acknowledged(mut self) -> Self {
        self.needs_ack = true;
        self
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn key_code(&self) -> Option<KeyCode> {
        match self.input {
            NativeInput::Key(k) => Some(k),
            _ => None,
        }
    }

    pub fn is_key_down(&self) -> bool {
        self.class == EventClass::KeyDown
    }
}
