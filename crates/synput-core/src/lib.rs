pub mod ack;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod hover;
pub mod keymap;
pub mod keys;
pub mod layout;
pub mod modifiers;
pub mod pacing;
pub mod pump;
pub mod synth;
pub mod types;

pub use backend::{BackendKind, DeliveryBackend, RecordingBackend};
pub use config::EngineConfig;
pub use engine::{InputEngine, InputSession};
pub use error::{InputError, SubmitError};
pub use keys::{decode_text, LogicalKey, SpecialKey};
pub use pump::DeliveryReport;
pub use types::{ButtonMask, KeyCode, Modifier, Modifiers, Point, PointerButton, TargetHandle};
