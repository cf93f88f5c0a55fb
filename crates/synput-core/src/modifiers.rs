use crate::types::{Modifier, Modifiers};
use tracing::trace;

/// Edge produced by a latch change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEdge {
    Down,
    Up,
}

/// Latched (held by explicit intent) state of shift, control and alt.
///
/// Transient modifiers used to capitalise a single character never touch
/// this state; see [`ModifierState::transient_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModifierState {
    latched: Modifiers,
}

impl ModifierState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latched(&self) -> Modifiers {
        self.latched
    }

    pub fn is_latched(&self, m: Modifier) -> bool {
        self.latched.contains(m)
    }

    pub fn reset(&mut self) {
        self.latched = Modifiers::none();
    }

    /// Sticky press: inverts the latch and reports which edge to emit.
    pub fn toggle(&mut self, m: Modifier) -> KeyEdge {
        let now = !self.latched.contains(m);
        self.latched.set(m, now);
        trace!("Modifier {:?} latched={}", m, now);
        if now {
            KeyEdge::Down
        } else {
            KeyEdge::Up
        }
    }

    /// Latches `m` if it is not already. Returns `true` when the state changed.
    pub fn latch(&mut self, m: Modifier) -> bool {
        if self.latched.contains(m) {
            return false;
        }
        self.toggle(m);
        true
    }

    /// Unlatches `m` if it is latched. Returns `true` when the state changed.
    pub fn unlatch(&mut self, m: Modifier) -> bool {
        if !self.latched.contains(m) {
            return false;
        }
        self.toggle(m);
        true
    }

    /// Clears the latches in `mask`, returning the ones that were held in `Modifier::ALL` order.
    pub fn release(&mut self, mask: Modifiers) -> Vec<Modifier> {
        let held: Vec<Modifier> = self.latched.iter().filter(|m| mask.contains(*m)).collect();
        for m in &held {
            self.latched.set(*m, false);
        }
        held
    }

    /// Clears every latch, returning the modifiers that were held in `Modifier::ALL` order.
    pub fn release_all(&mut self) -> Vec<Modifier> {
        self.release(self.latched)
    }

    /// Modifiers a key needs that are not already latched, i.e. the ones to
    /// assert transiently around it.
    pub fn transient_for(&self, required: Modifiers) -> Vec<Modifier> {
        required.difference(self.latched).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_twice_restores() {
        let mut s = ModifierState::new();
        assert_eq!(s.toggle(Modifier::Control), KeyEdge::Down);
        assert!(s.is_latched(Modifier::Control));
        assert_eq!(s.toggle(Modifier::Control), KeyEdge::Up);
        assert_eq!(s, ModifierState::new());
    }

    #[test]
    fn test_release_all_is_unconditional() {
        let mut s = ModifierState::new();
        assert!(s.release_all().is_empty());

        s.toggle(Modifier::Alt);
        s.toggle(Modifier::Shift);
        assert_eq!(s.release_all(), vec![Modifier::Shift, Modifier::Alt]);
        assert!(s.latched().is_empty());
    }

    #[test]
    fn test_latch_is_idempotent() {
        let mut s = ModifierState::new();
        assert!(s.latch(Modifier::Shift));
        assert!(!s.latch(Modifier::Shift));
        assert!(s.unlatch(Modifier::Shift));
        assert!(!s.unlatch(Modifier::Shift));
    }

    #[test]
    fn test_transient_skips_latched() {
        let mut s = ModifierState::new();
        let need = Modifiers::none().with(Modifier::Shift).with(Modifier::Control);
        assert_eq!(s.transient_for(need), vec![Modifier::Shift, Modifier::Control]);

        s.toggle(Modifier::Shift);
        assert_eq!(s.transient_for(need), vec![Modifier::Control]);
        // Asking never mutates.
        assert!(s.is_latched(Modifier::Shift));
        assert!(!s.is_latched(Modifier::Control));
    }

    #[test]
    fn test_all_eight_states_reachable() {
        let mut seen = std::collections::HashSet::new();
        for bits in 0u8..8 {
            let mut s = ModifierState::new();
            for m in Modifier::ALL {
                if bits & m.bit() != 0 {
                    s.toggle(m);
                }
            }
            seen.insert(s.latched().bits());
        }
        assert_eq!(seen.len(), 8);
    }
}
