use crate::types::Modifier;

/// First code point of the private-use block used for named keys.
const PUA_BASE: u32 = 0xE000;

/// Named keys addressable through the private-use-area encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKey {
    /// Releases every latched modifier. Never produces a native event itself.
    ReleaseAll,
    Cancel,
    Help,
    Backspace,
    Tab,
    Clear,
    Return,
    Enter,
    Shift,
    Control,
    Alt,
    Pause,
    Escape,
    Space,
    PageUp,
    PageDown,
    End,
    Home,
    Left,
    Up,
    Right,
    Down,
    Insert,
    Delete,
    Semicolon,
    Equals,
    Numpad(u8),
    Multiply,
    Add,
    Separator,
    Subtract,
    Decimal,
    Divide,
    F(u8),
}

impl SpecialKey {
    /// Decodes a private-use code point.
    pub fn from_code_point(c: char) -> Option<Self> {
        let offset = (c as u32).checked_sub(PUA_BASE)?;
        let key = match offset {
            0x00 => SpecialKey::ReleaseAll,
            0x01 => SpecialKey::Cancel,
            0x02 => SpecialKey::Help,
            0x03 => SpecialKey::Backspace,
            0x04 => SpecialKey::Tab,
            0x05 => SpecialKey::Clear,
            0x06 => SpecialKey::Return,
            0x07 => SpecialKey::Enter,
            0x08 => SpecialKey::Shift,
            0x09 => SpecialKey::Control,
            0x0A => SpecialKey::Alt,
            0x0B => SpecialKey::Pause,
            0x0C => SpecialKey::Escape,
            0x0D => SpecialKey::Space,
            0x0E => SpecialKey::PageUp,
            0x0F => SpecialKey::PageDown,
            0x10 => SpecialKey::End,
            0x11 => SpecialKey::Home,
            0x12 => SpecialKey::Left,
            0x13 => SpecialKey::Up,
            0x14 => SpecialKey::Right,
            0x15 => SpecialKey::Down,
            0x16 => SpecialKey::Insert,
            0x17 => SpecialKey::Delete,
            0x18 => SpecialKey::Semicolon,
            0x19 => SpecialKey::Equals,
            0x1A..=0x23 => SpecialKey::Numpad((offset - 0x1A) as u8),
            0x24 => SpecialKey::Multiply,
            0x25 => SpecialKey::Add,
            0x26 => SpecialKey::Separator,
            0x27 => SpecialKey::Subtract,
            0x28 => SpecialKey::Decimal,
            0x29 => SpecialKey::Divide,
            0x31..=0x3C => SpecialKey::F((offset - 0x30) as u8),
            _ => return None,
        };
        Some(key)
    }

    /// Inverse of [`SpecialKey::from_code_point`].
    pub fn code_point(self) -> char {
        let offset = match self {
            SpecialKey::ReleaseAll => 0x00,
            SpecialKey::Cancel => 0x01,
            SpecialKey::Help => 0x02,
            SpecialKey::Backspace => 0x03,
            SpecialKey::Tab => 0x04,
            SpecialKey::Clear => 0x05,
            SpecialKey::Return => 0x06,
            SpecialKey::Enter => 0x07,
            SpecialKey::Shift => 0x08,
            SpecialKey::Control => 0x09,
            SpecialKey::Alt => 0x0A,
            SpecialKey::Pause => 0x0B,
            SpecialKey::Escape => 0x0C,
            SpecialKey::Space => 0x0D,
            SpecialKey::PageUp => 0x0E,
            SpecialKey::PageDown => 0x0F,
            SpecialKey::End => 0x10,
            SpecialKey::Home => 0x11,
            SpecialKey::Left => 0x12,
            SpecialKey::Up => 0x13,
            SpecialKey::Right => 0x14,
            SpecialKey::Down => 0x15,
            SpecialKey::Insert => 0x16,
            SpecialKey::Delete => 0x17,
            SpecialKey::Semicolon => 0x18,
            SpecialKey::Equals => 0x19,
            SpecialKey::Numpad(n) => 0x1A + u32::from(n.min(9)),
            SpecialKey::Multiply => 0x24,
            SpecialKey::Add => 0x25,
            SpecialKey::Separator => 0x26,
            SpecialKey::Subtract => 0x27,
            SpecialKey::Decimal => 0x28,
            SpecialKey::Divide => 0x29,
            SpecialKey::F(n) => 0x30 + u32::from(n.clamp(1, 12)),
        };
        char::from_u32(PUA_BASE + offset).unwrap_or('\u{E000}')
    }

    pub const fn as_modifier(self) -> Option<Modifier> {
        match self {
            SpecialKey::Shift => Some(Modifier::Shift),
            SpecialKey::Control => Some(Modifier::Control),
            SpecialKey::Alt => Some(Modifier::Alt),
            _ => None,
        }
    }

    /// Looks up a key by its lowercase name, e.g. `"pageup"`, `"f5"`, `"numpad3"`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if let Some(n) = name.strip_prefix("numpad") {
            return n.parse::<u8>().ok().filter(|n| *n <= 9).map(SpecialKey::Numpad);
        }
        if let Some(n) = name.strip_prefix('f') {
            if let Ok(n) = n.parse::<u8>() {
                return (1..=12).contains(&n).then_some(SpecialKey::F(n));
            }
        }
        let key = match name.as_str() {
            "null" | "releaseall" => SpecialKey::ReleaseAll,
            "cancel" => SpecialKey::Cancel,
            "help" => SpecialKey::Help,
            "backspace" => SpecialKey::Backspace,
            "tab" => SpecialKey::Tab,
            "clear" => SpecialKey::Clear,
            "return" => SpecialKey::Return,
            "enter" => SpecialKey::Enter,
            "shift" => SpecialKey::Shift,
            "control" | "ctrl" => SpecialKey::Control,
            "alt" => SpecialKey::Alt,
            "pause" => SpecialKey::Pause,
            "escape" | "esc" => SpecialKey::Escape,
            "space" => SpecialKey::Space,
            "pageup" => SpecialKey::PageUp,
            "pagedown" => SpecialKey::PageDown,
            "end" => SpecialKey::End,
            "home" => SpecialKey::Home,
            "left" => SpecialKey::Left,
            "up" => SpecialKey::Up,
            "right" => SpecialKey::Right,
            "down" => SpecialKey::Down,
            "insert" => SpecialKey::Insert,
            "delete" => SpecialKey::Delete,
            "semicolon" => SpecialKey::Semicolon,
            "equals" => SpecialKey::Equals,
            "multiply" => SpecialKey::Multiply,
            "add" => SpecialKey::Add,
            "separator" => SpecialKey::Separator,
            "subtract" => SpecialKey::Subtract,
            "decimal" => SpecialKey::Decimal,
            "divide" => SpecialKey::Divide,
            _ => return None,
        };
        Some(key)
    }
}

/// A key press independent of layout and OS key codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalKey {
    Char(char),
    Special(SpecialKey),
}

impl LogicalKey {
    /// Maps a single code point, folding control characters onto their named keys.
    pub fn from_char(c: char) -> Self {
        match c {
            '\n' | '\r' => LogicalKey::Special(SpecialKey::Enter),
            '\t' => LogicalKey::Special(SpecialKey::Tab),
            '\u{0008}' => LogicalKey::Special(SpecialKey::Backspace),
            _ => SpecialKey::from_code_point(c).map_or(LogicalKey::Char(c), LogicalKey::Special),
        }
    }

    /// Accepts either a key name or a single character.
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(LogicalKey::from_char(c)),
            _ => SpecialKey::from_name(s).map(LogicalKey::Special),
        }
    }

    pub fn as_modifier(self) -> Option<Modifier> {
        match self {
            LogicalKey::Special(k) => k.as_modifier(),
            LogicalKey::Char(_) => None,
        }
    }
}

/// Splits caller text into logical keys. A `\r\n` pair yields one enter.
pub fn decode_text(text: &str) -> Vec<LogicalKey> {
    let mut keys = Vec::with_capacity(text.len());
    let mut prev_cr = false;
    for c in text.chars() {
        if c == '\n' && prev_cr {
            prev_cr = false;
            continue;
        }
        prev_cr = c == '\r';
        keys.push(LogicalKey::from_char(c));
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_point_round_trip() {
        for offset in 0x00..=0x3Cu32 {
            let c = char::from_u32(PUA_BASE + offset).unwrap();
            if let Some(key) = SpecialKey::from_code_point(c) {
                assert_eq!(key.code_point(), c, "offset {:02X}", offset);
            }
        }
    }

    #[test]
    fn test_gap_is_literal() {
        // 0xE02A..=0xE030 are unassigned in the block.
        assert_eq!(SpecialKey::from_code_point('\u{E02A}'), None);
        assert_eq!(LogicalKey::from_char('\u{E030}'), LogicalKey::Char('\u{E030}'));
    }

    #[test]
    fn test_function_and_numpad_keys() {
        assert_eq!(SpecialKey::from_code_point('\u{E031}'), Some(SpecialKey::F(1)));
        assert_eq!(SpecialKey::from_code_point('\u{E03C}'), Some(SpecialKey::F(12)));
        assert_eq!(SpecialKey::from_code_point('\u{E01A}'), Some(SpecialKey::Numpad(0)));
        assert_eq!(SpecialKey::from_code_point('\u{E023}'), Some(SpecialKey::Numpad(9)));
    }

    #[test]
    fn test_decode_text() {
        let keys = decode_text("a\u{E008}B\r\n\t");
        assert_eq!(
            keys,
            vec![
                LogicalKey::Char('a'),
                LogicalKey::Special(SpecialKey::Shift),
                LogicalKey::Char('B'),
                LogicalKey::Special(SpecialKey::Enter),
                LogicalKey::Special(SpecialKey::Tab),
            ]
        );
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(LogicalKey::parse("ctrl"), Some(LogicalKey::Special(SpecialKey::Control)));
        assert_eq!(LogicalKey::parse("F5"), Some(LogicalKey::Special(SpecialKey::F(5))));
        assert_eq!(LogicalKey::parse("f"), Some(LogicalKey::Char('f')));
        assert_eq!(LogicalKey::parse("f13"), None);
        assert_eq!(LogicalKey::parse("numpad7"), Some(LogicalKey::Special(SpecialKey::Numpad(7))));
    }
}
