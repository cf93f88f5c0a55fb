use crate::config::EngineConfig;
use crate::types::EventKind;
use std::time::Duration;

/// Inter-event delay policy. Pure function of event classification and configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingPolicy {
    /// Caller-supplied delay for one whole key (down, acknowledgement, up).
    pub key_delay: Duration,
    /// Multiplier on the per-event share for events that carry a modifier.
    pub modifier_factor: f64,
    pub pointer_button_delay: Duration,
}

impl PacingPolicy {
    pub fn new(key_delay: Duration, modifier_factor: f64) -> Self {
        Self {
            key_delay,
            modifier_factor,
            pointer_button_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &EngineConfig, key_delay_ms: Option<u64>) -> Self {
        let ms = key_delay_ms.unwrap_or(config.key_delay_ms);
        Self::new(Duration::from_millis(ms), config.modifier_delay_factor)
    }

    /// One third of the key delay: the down, the wait and the up each get a share.
    pub fn per_event(&self) -> Duration {
        self.key_delay / 3
    }

    pub fn modifier_delay(&self) -> Duration {
        let nanos = self.per_event().as_nanos() as f64 * self.modifier_factor.max(0.0);
        Duration::from_nanos(nanos.round() as u64)
    }

    pub fn delay_for(&self, kind: EventKind) -> Duration {
        match kind {
            EventKind::PlainKey => self.per_event(),
            EventKind::ModifiedKey | EventKind::ModifierKey => self.modifier_delay(),
            EventKind::PointerButton => self.pointer_button_delay,
            EventKind::PointerStep(step) => step,
        }
    }

    /// Delay between interpolated pointer positions.
    pub fn pointer_step_delay(duration: Duration, steps: usize) -> Duration {
        if steps == 0 {
            return Duration::ZERO;
        }
        duration / steps as u32
    }
}
