use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;

use crate::core::hotkey::Accelerator;
use crate::core::lock;
use crate::error::{EngineError, Result};

/// Notifications for the UI layer. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
    MousePositionCaptured { x: i32, y: i32 },
    ScreenRegionCaptured { width: u32, height: u32, pixels: Vec<u8> },
}

/// Fan-out of engine events to any number of subscribers.
#[derive(Default)]
pub struct EventSink {
    subscribers: Mutex<Vec<Sender<EngineEvent>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Deliver to every live subscriber; drop the ones that hung up.
    pub fn emit(&self, event: EngineEvent) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        debug!(subscribers = subscribers.len(), "event emitted");
    }
}

/// Why a hotkey registration failed, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    AlreadyInUse,
    Invalid,
    Other,
}

/// Structured outcome of a hotkey registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotkeyResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl From<Result<Accelerator>> for HotkeyResponse {
    fn from(result: Result<Accelerator>) -> Self {
        match result {
            Ok(accelerator) => Self {
                success: true,
                key: Some(accelerator.to_string()),
                error: None,
                reason: None,
            },
            Err(e) => {
                let reason = match e {
                    EngineError::AcceleratorAlreadyBound(_) => FailureReason::AlreadyInUse,
                    EngineError::InvalidAccelerator(_) | EngineError::UnknownMacro(_) => FailureReason::Invalid,
                    _ => FailureReason::Other,
                };
                Self {
                    success: false,
                    key: None,
                    error: Some(e.to_string()),
                    reason: Some(reason),
                }
            }
        }
    }
}
