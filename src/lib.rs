//! Hotkey-driven game macros with approximate on-screen template search.
//!
//! [`MacroEngine`] is the entry point: build it from a [`Platform`] and
//! [`EngineSettings`], bind hotkeys, then feed it hotkey presses.

pub mod automation;
pub mod core;
pub mod engine;
pub mod error;
pub mod events;
pub mod macros;
pub mod platform;
pub mod settings;

pub use engine::MacroEngine;
pub use error::{EngineError, Result};
pub use events::{EngineEvent, FailureReason, HotkeyResponse};
pub use platform::{create_platform, Platform};
pub use settings::EngineSettings;
