mod capture;
mod hotkey;
mod input;

use std::sync::Arc;

pub use capture::GdiCapture;
pub use hotkey::{hotkey_id, GlobalHotkeys};
pub use input::DesktopInput;

use super::Platform;
use crate::core::clock::SystemClock;
use crate::error::Result;

/// Desktop collaborators. Call from the thread that will pump hotkey messages.
pub fn platform() -> Result<Platform> {
    Ok(Platform {
        capture: Arc::new(GdiCapture),
        input: Arc::new(DesktopInput::new()?),
        hotkeys: Box::new(GlobalHotkeys::new()?),
        clock: Arc::new(SystemClock),
    })
}
