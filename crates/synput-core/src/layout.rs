//! Keyboard-layout service: Unicode code point to native key plus required modifiers.

use crate::keymap;
use crate::types::{KeyCode, Modifier, Modifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutMapping {
    pub key: KeyCode,
    pub modifiers: Modifiers,
}

/// Maps a character to a single key on some layout. `None` means the caller
/// must fall back to Unicode injection.
pub trait KeyboardLayout: Send + Sync {
    fn lookup(&self, ch: char) -> Option<LayoutMapping>;
}

/// Built-in US-QWERTY layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsLayout;

impl KeyboardLayout for UsLayout {
    fn lookup(&self, ch: char) -> Option<LayoutMapping> {
        let (key, shift) = keymap::us_lookup(ch)?;
        let modifiers = if shift {
            Modifiers::none().with(Modifier::Shift)
        } else {
            Modifiers::none()
        };
        Some(LayoutMapping { key, modifiers })
    }
}

/// Decodes the packed result of `VkKeyScanW`: low byte key, high byte shift state.
/// Returns `None` for the "no mapping" sentinel.
pub fn decode_vk_scan(packed: i16) -> Option<LayoutMapping> {
    if packed == -1 {
        return None;
    }
    let packed = packed as u16;
    let vk = packed & 0xFF;
    let state = (packed >> 8) as u8;
    if vk == 0xFF || state == 0xFF {
        return None;
    }
    Some(LayoutMapping {
        key: KeyCode::new(vk, false),
        modifiers: Modifiers {
            shift: state & 0x01 != 0,
            control: state & 0x02 != 0,
            alt: state & 0x04 != 0,
        },
    })
}

#[cfg(windows)]
pub use self::windows_layout::WindowsLayout;

#[cfg(windows)]
mod windows_layout {
    use super::{decode_vk_scan, KeyboardLayout, LayoutMapping};
    use windows::Win32::UI::Input::KeyboardAndMouse::VkKeyScanW;

    /// Active keyboard layout of the calling thread.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WindowsLayout;

    impl KeyboardLayout for WindowsLayout {
        fn lookup(&self, ch: char) -> Option<LayoutMapping> {
            let mut buf = [0u16; 2];
            // Characters outside the BMP have no single key.
            let [unit] = ch.encode_utf16(&mut buf) else {
                return None;
            };
            decode_vk_scan(unsafe { VkKeyScanW(*unit) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_us_layout_shifted_symbol() {
        let m = UsLayout.lookup('"').unwrap();
        assert_eq!(m.key, KeyCode::new(0xDE, false));
        assert!(m.modifiers.shift);
        assert!(UsLayout.lookup('€').is_none());
    }

    #[test]
    fn test_decode_vk_scan() {
        assert_eq!(decode_vk_scan(-1), None);
        // 'A' on US: VK 0x41 with shift.
        let m = decode_vk_scan(0x0141).unwrap();
        assert_eq!(m.key.vk, 0x41);
        assert!(m.modifiers.shift && !m.modifiers.control);
        // AltGr character: ctrl + alt.
        let m = decode_vk_scan(0x0651).unwrap();
        assert!(m.modifiers.control && m.modifiers.alt && !m.modifiers.shift);
    }
}
