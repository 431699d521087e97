pub mod stub;

#[cfg(windows)]
pub mod win32;

use std::sync::Arc;

use tracing::info;

use crate::core::clock::{Clock, SystemClock};
use crate::core::frame::{Frame, Point, Region};
use crate::core::hotkey::Accelerator;
use crate::core::keys::Key;
use crate::error::Result;

/// Grabs a region of the live screen.
pub trait ScreenCapture: Send + Sync {
    fn capture(&self, region: Region) -> Result<Frame>;
}

/// The only way macros affect the outside world.
pub trait InputSynth: Send + Sync {
    fn press_key(&self, key: Key) -> Result<()>;
    fn release_key(&self, key: Key) -> Result<()>;
    fn move_mouse(&self, to: Point) -> Result<()>;
    fn cursor_position(&self) -> Result<Point>;
}

/// OS-level global shortcuts. Bound to the thread that owns it.
pub trait HotkeyBackend {
    fn register(&mut self, accelerator: &Accelerator) -> Result<()>;
    fn unregister(&mut self, accelerator: &Accelerator) -> Result<()>;
    fn unregister_all(&mut self) -> Result<()>;
}

/// The collaborators the engine is built from.
pub struct Platform {
    pub capture: Arc<dyn ScreenCapture>,
    pub input: Arc<dyn InputSynth>,
    pub hotkeys: Box<dyn HotkeyBackend>,
    pub clock: Arc<dyn Clock>,
}

/// Create the platform appropriate for the current OS.
pub fn create_platform(force_stub: bool) -> Result<Platform> {
    if force_stub {
        info!("using stub platform");
        return Ok(stub::platform(Arc::new(SystemClock)));
    }
    #[cfg(windows)]
    {
        info!("using desktop platform");
        win32::platform()
    }
    #[cfg(not(windows))]
    {
        info!("no desktop backend for this OS, using stub platform");
        Ok(stub::platform(Arc::new(SystemClock)))
    }
}
