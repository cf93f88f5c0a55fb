use crate::keys::{LogicalKey, SpecialKey};
use crate::types::{KeyCode, Modifier};
use std::collections::HashMap;

/// Result of consulting the static table for one logical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableEntry {
    /// Named key with a fixed native identifier.
    Native(KeyCode),
    /// Named modifier key; handled by the modifier state machine.
    Modifier(Modifier),
    /// The release-all sentinel.
    ReleaseAll,
    /// Literal character; the keyboard-layout service decides.
    NeedsLayout(char),
}

/// Static translation of a logical key. Literal characters are deferred to the layout.
pub fn translate(key: LogicalKey) -> TableEntry {
    match key {
        LogicalKey::Char(c) => TableEntry::NeedsLayout(c),
        LogicalKey::Special(SpecialKey::ReleaseAll) => TableEntry::ReleaseAll,
        LogicalKey::Special(s) => match s.as_modifier() {
            Some(m) => TableEntry::Modifier(m),
            None => special_key_code(s).map_or(TableEntry::ReleaseAll, TableEntry::Native),
        },
    }
}

/// Native identifier of a named key. `None` only for the release-all sentinel.
pub fn special_key_code(key: SpecialKey) -> Option<KeyCode> {
    let code = match key {
        SpecialKey::ReleaseAll => return None,
        SpecialKey::Cancel => KeyCode::new(0x03, true),
        SpecialKey::Help => KeyCode::new(0x2F, false),
        SpecialKey::Backspace => KeyCode::new(0x08, false),
        SpecialKey::Tab => KeyCode::new(0x09, false),
        SpecialKey::Clear => KeyCode::new(0x0C, false),
        SpecialKey::Return | SpecialKey::Enter => KeyCode::new(0x0D, false),
        SpecialKey::Shift => Modifier::Shift.key(),
        SpecialKey::Control => Modifier::Control.key(),
        SpecialKey::Alt => Modifier::Alt.key(),
        SpecialKey::Pause => KeyCode::new(0x13, false),
        SpecialKey::Escape => KeyCode::new(0x1B, false),
        SpecialKey::Space => KeyCode::new(0x20, false),
        SpecialKey::PageUp => KeyCode::new(0x21, true),
        SpecialKey::PageDown => KeyCode::new(0x22, true),
        SpecialKey::End => KeyCode::new(0x23, true),
        SpecialKey::Home => KeyCode::new(0x24, true),
        SpecialKey::Left => KeyCode::new(0x25, true),
        SpecialKey::Up => KeyCode::new(0x26, true),
        SpecialKey::Right => KeyCode::new(0x27, true),
        SpecialKey::Down => KeyCode::new(0x28, true),
        SpecialKey::Insert => KeyCode::new(0x2D, true),
        SpecialKey::Delete => KeyCode::new(0x2E, true),
        SpecialKey::Semicolon => KeyCode::new(0xBA, false),
        SpecialKey::Equals => KeyCode::new(0xBB, false),
        SpecialKey::Numpad(n) => KeyCode::new(0x60 + u16::from(n.min(9)), false),
        SpecialKey::Multiply => KeyCode::new(0x6A, false),
        SpecialKey::Add => KeyCode::new(0x6B, false),
        SpecialKey::Separator => KeyCode::new(0x6C, false),
        SpecialKey::Subtract => KeyCode::new(0x6D, false),
        SpecialKey::Decimal => KeyCode::new(0x6E, false),
        SpecialKey::Divide => KeyCode::new(0x6F, true),
        SpecialKey::F(n) => KeyCode::new(0x6F + u16::from(n.clamp(1, 12)), false),
    };
    Some(code)
}

/// US-QWERTY printable characters: (char, virtual key, needs shift).
pub const US_QWERTY: &[(char, u16, bool)] = &[
    (' ', 0x20, false),
    ('0', 0x30, false),
    ('1', 0x31, false),
    ('2', 0x32, false),
    ('3', 0x33, false),
    ('4', 0x34, false),
    ('5', 0x35, false),
    ('6', 0x36, false),
    ('7', 0x37, false),
    ('8', 0x38, false),
    ('9', 0x39, false),
    (')', 0x30, true),
    ('!', 0x31, true),
    ('@', 0x32, true),
    ('#', 0x33, true),
    ('$', 0x34, true),
    ('%', 0x35, true),
    ('^', 0x36, true),
    ('&', 0x37, true),
    ('*', 0x38, true),
    ('(', 0x39, true),
    (';', 0xBA, false),
    (':', 0xBA, true),
    ('=', 0xBB, false),
    ('+', 0xBB, true),
    (',', 0xBC, false),
    ('<', 0xBC, true),
    ('-', 0xBD, false),
    ('_', 0xBD, true),
    ('.', 0xBE, false),
    ('>', 0xBE, true),
    ('/', 0xBF, false),
    ('?', 0xBF, true),
    ('`', 0xC0, false),
    ('~', 0xC0, true),
    ('[', 0xDB, false),
    ('{', 0xDB, true),
    ('\\', 0xDC, false),
    ('|', 0xDC, true),
    (']', 0xDD, false),
    ('}', 0xDD, true),
    ('\'', 0xDE, false),
    ('"', 0xDE, true),
];

lazy_static::lazy_static! {
    /// Unshifted character produced by each key on the US layout.
    static ref KEY_TO_CHAR: HashMap<u16, char> = {
        let mut m = HashMap::new();
        for c in 'a'..='z' {
            m.insert(c as u16 - 'a' as u16 + 0x41, c);
        }
        for &(c, vk, shift) in US_QWERTY {
            if !shift {
                m.insert(vk, c);
            }
        }
        m
    };
}

/// Looks up a printable character on the US layout.
pub fn us_lookup(c: char) -> Option<(KeyCode, bool)> {
    match c {
        'a'..='z' => Some((KeyCode::new(c as u16 - 'a' as u16 + 0x41, false), false)),
        'A'..='Z' => Some((KeyCode::new(c as u16 - 'A' as u16 + 0x41, false), true)),
        _ => US_QWERTY
            .iter()
            .find(|(ch, _, _)| *ch == c)
            .map(|&(_, vk, shift)| (KeyCode::new(vk, false), shift)),
    }
}

/// Inverse of the table for unshifted printable keys.
pub fn key_to_char(key: KeyCode) -> Option<char> {
    if key.ext {
        return None;
    }
    KEY_TO_CHAR.get(&key.vk).copied()
}

/// X11 keysym for a virtual-key code.
pub fn x11_keysym(key: KeyCode) -> Option<u32> {
    let sym = match key.vk {
        0x41..=0x5A => u32::from(key.vk) + 0x20, // XK_a..XK_z
        0x30..=0x39 | 0x20 => u32::from(key.vk),
        0x03 => 0xFF69, // XK_Cancel
        0x08 => 0xFF08, // XK_BackSpace
        0x09 => 0xFF09,
        0x0C => 0xFF0B,
        0x0D => 0xFF0D,
        0x10 => 0xFFE1, // XK_Shift_L
        0x11 => 0xFFE3, // XK_Control_L
        0x12 => 0xFFE9, // XK_Alt_L
        0x13 => 0xFF13,
        0x1B => 0xFF1B,
        0x21 => 0xFF55, // XK_Prior
        0x22 => 0xFF56, // XK_Next
        0x23 => 0xFF57,
        0x24 => 0xFF50,
        0x25 => 0xFF51,
        0x26 => 0xFF52,
        0x27 => 0xFF53,
        0x28 => 0xFF54,
        0x2D => 0xFF63,
        0x2E => 0xFFFF,
        0x2F => 0xFF6A, // XK_Help
        0x60..=0x69 => 0xFFB0 + u32::from(key.vk - 0x60), // XK_KP_0..XK_KP_9
        0x6A => 0xFFAA,
        0x6B => 0xFFAB,
        0x6C => 0xFFAC,
        0x6D => 0xFFAD,
        0x6E => 0xFFAE,
        0x6F => 0xFFAF,
        0x70..=0x7B => 0xFFBE + u32::from(key.vk - 0x70), // XK_F1..XK_F12
        0xBA => 0x3B,
        0xBB => 0x3D,
        0xBC => 0x2C,
        0xBD => 0x2D,
        0xBE => 0x2E,
        0xBF => 0x2F,
        0xC0 => 0x60,
        0xDB => 0x5B,
        0xDC => 0x5C,
        0xDD => 0x5D,
        0xDE => 0x27,
        _ => return None,
    };
    Some(sym)
}

/// X11 keysym naming a character directly: Latin-1 as is, anything else
/// in the Unicode keysym range.
pub fn unicode_keysym(c: char) -> u32 {
    match u32::from(c) {
        cp @ (0x20..=0x7E | 0xA0..=0xFF) => cp,
        cp => 0x0100_0000 | cp,
    }
}
