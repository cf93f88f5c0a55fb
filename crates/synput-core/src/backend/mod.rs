//! Event delivery backends.
//!
//! The pump sees every backend through [`DeliveryBackend`]: submit one
//! native event, and optionally run a marker-based observation point that
//! reports processed markers to an [`AckRegistry`].

pub mod recording;
#[cfg(windows)]
pub mod windows;
#[cfg(all(target_os = "linux", feature = "x11"))]
pub mod x11;

use crate::ack::{AckRegistry, AckToken};
use crate::error::{InputError, SubmitError};
use crate::hover::PointerSink;
use crate::layout::KeyboardLayout;
use crate::types::{NativeEvent, TargetHandle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use recording::{AckPolicy, RecordingBackend, Submission};

/// Installed observation point for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle {
    pub target: TargetHandle,
    pub id: u64,
}

/// Delivery mode selector, used by configuration and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Recording,
    /// Window messages posted straight to the target.
    PostMessage,
    /// The OS input queue.
    SendInput,
    XTest,
    XSendEvent,
}

impl std::str::FromStr for BackendKind {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "recording" => Ok(BackendKind::Recording),
            "post-message" | "postmessage" => Ok(BackendKind::PostMessage),
            "send-input" | "sendinput" => Ok(BackendKind::SendInput),
            "xtest" => Ok(BackendKind::XTest),
            "x-send-event" | "xsendevent" => Ok(BackendKind::XSendEvent),
            other => Err(InputError::Backend(format!("unknown backend '{}'", other))),
        }
    }
}

pub trait DeliveryBackend {
    fn name(&self) -> &'static str;

    /// Rejects targets the backend cannot address. Called before any synthesis.
    fn validate_target(&self, target: TargetHandle) -> Result<(), InputError>;

    fn layout(&self) -> Arc<dyn KeyboardLayout>;

    fn submit(&mut self, event: &NativeEvent) -> Result<(), SubmitError>;

    fn install_observer(
        &mut self,
        target: TargetHandle,
        sink: AckRegistry,
    ) -> Result<ObserverHandle, SubmitError>;

    /// Sends a marker that reaches the observer only after everything submitted before it.
    fn submit_marker(&mut self, observer: &ObserverHandle, token: AckToken)
        -> Result<(), SubmitError>;

    fn uninstall_observer(&mut self, observer: ObserverHandle);

    /// Services the host event loop once without blocking.
    fn pump(&mut self);

    /// Whether markers sent to `target` have not been observed yet.
    fn has_pending(&mut self, target: TargetHandle) -> bool;

    /// Sink for the pointer reassertion task, if this backend can serve one.
    fn pointer_sink(&self) -> Option<Arc<dyn PointerSink>> {
        None
    }
}

impl<B: DeliveryBackend + ?Sized> DeliveryBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn validate_target(&self, target: TargetHandle) -> Result<(), InputError> {
        (**self).validate_target(target)
    }

    fn layout(&self) -> Arc<dyn KeyboardLayout> {
        (**self).layout()
    }

    fn submit(&mut self, event: &NativeEvent) -> Result<(), SubmitError> {
        (**self).submit(event)
    }

    fn install_observer(
        &mut self,
        target: TargetHandle,
        sink: AckRegistry,
    ) -> Result<ObserverHandle, SubmitError> {
        (**self).install_observer(target, sink)
    }

    fn submit_marker(&mut self, observer: &ObserverHandle, token: AckToken)
        -> Result<(), SubmitError> {
        (**self).submit_marker(observer, token)
    }

    fn uninstall_observer(&mut self, observer: ObserverHandle) {
        (**self).uninstall_observer(observer)
    }

    fn pump(&mut self) {
        (**self).pump()
    }

    fn has_pending(&mut self, target: TargetHandle) -> bool {
        (**self).has_pending(target)
    }

    fn pointer_sink(&self) -> Option<Arc<dyn PointerSink>> {
        (**self).pointer_sink()
    }
}

/// Opens the backend for `kind` on this platform.
pub fn open(kind: BackendKind) -> Result<Box<dyn DeliveryBackend>, InputError> {
    match kind {
        BackendKind::Recording => Ok(Box::new(RecordingBackend::new())),
        #[cfg(windows)]
        BackendKind::PostMessage => Ok(Box::new(windows::WindowsBackend::new(
            windows::DeliveryMode::PostMessage,
        )?)),
        #[cfg(windows)]
        BackendKind::SendInput => Ok(Box::new(windows::WindowsBackend::new(
            windows::DeliveryMode::SendInput,
        )?)),
        #[cfg(all(target_os = "linux", feature = "x11"))]
        BackendKind::XTest => Ok(Box::new(x11::X11Backend::open(x11::DeliveryMode::XTest)?)),
        #[cfg(all(target_os = "linux", feature = "x11"))]
        BackendKind::XSendEvent => Ok(Box::new(x11::X11Backend::open(
            x11::DeliveryMode::SendEvent,
        )?)),
        #[allow(unreachable_patterns)]
        other => Err(InputError::Backend(format!(
            "{:?} is not available on this platform",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("xtest".parse::<BackendKind>().unwrap(), BackendKind::XTest);
        assert_eq!("Post-Message".parse::<BackendKind>().unwrap(), BackendKind::PostMessage);
        assert!("carrier-pigeon".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_open_recording() {
        let backend = open(BackendKind::Recording).unwrap();
        assert_eq!(backend.name(), "recording");
    }
}
