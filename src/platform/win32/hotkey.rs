use std::collections::HashMap;

use global_hotkey::hotkey::{Code, HotKey, Modifiers as HotKeyModifiers};
use global_hotkey::{Error as HotKeyError, GlobalHotKeyManager};
use tracing::{debug, warn};

use crate::core::hotkey::{Accelerator, Modifiers};
use crate::core::keys::Key;
use crate::error::{EngineError, Result};
use crate::platform::HotkeyBackend;

/// Global shortcuts through `global-hotkey`. Must stay on the thread that pumps messages.
pub struct GlobalHotkeys {
    manager: GlobalHotKeyManager,
    active: HashMap<Accelerator, HotKey>,
}

impl GlobalHotkeys {
    pub fn new() -> Result<Self> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| EngineError::HotkeyBackend(format!("Failed to create hotkey manager: {}", e)))?;
        Ok(Self {
            manager,
            active: HashMap::new(),
        })
    }
}

impl HotkeyBackend for GlobalHotkeys {
    fn register(&mut self, accelerator: &Accelerator) -> Result<()> {
        let hotkey = hotkey_for(accelerator);
        match self.manager.register(hotkey) {
            Ok(()) => {
                debug!(%accelerator, id = hotkey.id(), "hotkey registered");
                self.active.insert(*accelerator, hotkey);
                Ok(())
            }
            Err(HotKeyError::AlreadyRegistered(_)) | Err(HotKeyError::FailedToRegister(_)) => {
                Err(EngineError::AcceleratorAlreadyBound(accelerator.to_string()))
            }
            Err(e) => Err(EngineError::HotkeyBackend(e.to_string())),
        }
    }

    fn unregister(&mut self, accelerator: &Accelerator) -> Result<()> {
        let Some(hotkey) = self.active.get(accelerator).copied() else {
            return Ok(());
        };
        self.manager
            .unregister(hotkey)
            .map_err(|e| EngineError::HotkeyBackend(e.to_string()))?;
        self.active.remove(accelerator);
        Ok(())
    }

    fn unregister_all(&mut self) -> Result<()> {
        let mut first_error = None;
        let manager = &self.manager;
        self.active.retain(|accelerator, hotkey| match manager.unregister(*hotkey) {
            Ok(()) => false,
            Err(e) => {
                warn!(%accelerator, "failed to unregister hotkey: {}", e);
                first_error.get_or_insert(EngineError::HotkeyBackend(e.to_string()));
                true
            }
        });
        first_error.map_or(Ok(()), Err)
    }
}

/// Id reported by `GlobalHotKeyEvent` for `accelerator`.
pub fn hotkey_id(accelerator: &Accelerator) -> u32 {
    hotkey_for(accelerator).id()
}

fn hotkey_for(accelerator: &Accelerator) -> HotKey {
    let code = key_to_code(accelerator.key);
    let modifiers = modifiers_to_code(accelerator.modifiers);
    if modifiers.is_empty() {
        HotKey::new(None, code)
    } else {
        HotKey::new(Some(modifiers), code)
    }
}

fn modifiers_to_code(modifiers: Modifiers) -> HotKeyModifiers {
    let mut mods = HotKeyModifiers::empty();
    if modifiers.ctrl {
        mods |= HotKeyModifiers::CONTROL;
    }
    if modifiers.alt {
        mods |= HotKeyModifiers::ALT;
    }
    if modifiers.shift {
        mods |= HotKeyModifiers::SHIFT;
    }
    mods
}

fn key_to_code(key: Key) -> Code {
    match key {
        Key::LeftControl => Code::ControlLeft,
        Key::LeftShift => Code::ShiftLeft,
        Key::LeftAlt => Code::AltLeft,
        Key::A => Code::KeyA,
        Key::B => Code::KeyB,
        Key::C => Code::KeyC,
        Key::D => Code::KeyD,
        Key::E => Code::KeyE,
        Key::F => Code::KeyF,
        Key::G => Code::KeyG,
        Key::H => Code::KeyH,
        Key::I => Code::KeyI,
        Key::J => Code::KeyJ,
        Key::K => Code::KeyK,
        Key::L => Code::KeyL,
        Key::M => Code::KeyM,
        Key::N => Code::KeyN,
        Key::O => Code::KeyO,
        Key::P => Code::KeyP,
        Key::Q => Code::KeyQ,
        Key::R => Code::KeyR,
        Key::S => Code::KeyS,
        Key::T => Code::KeyT,
        Key::U => Code::KeyU,
        Key::V => Code::KeyV,
        Key::W => Code::KeyW,
        Key::X => Code::KeyX,
        Key::Y => Code::KeyY,
        Key::Z => Code::KeyZ,
        Key::Digit0 => Code::Digit0,
        Key::Digit1 => Code::Digit1,
        Key::Digit2 => Code::Digit2,
        Key::Digit3 => Code::Digit3,
        Key::Digit4 => Code::Digit4,
        Key::Digit5 => Code::Digit5,
        Key::Digit6 => Code::Digit6,
        Key::Digit7 => Code::Digit7,
        Key::Digit8 => Code::Digit8,
        Key::Digit9 => Code::Digit9,
        Key::F1 => Code::F1,
        Key::F2 => Code::F2,
        Key::F3 => Code::F3,
        Key::F4 => Code::F4,
        Key::F5 => Code::F5,
        Key::F6 => Code::F6,
        Key::F7 => Code::F7,
        Key::F8 => Code::F8,
        Key::F9 => Code::F9,
        Key::F10 => Code::F10,
        Key::F11 => Code::F11,
        Key::F12 => Code::F12,
        Key::F13 => Code::F13,
        Key::F14 => Code::F14,
        Key::F15 => Code::F15,
        Key::F16 => Code::F16,
        Key::F17 => Code::F17,
        Key::F18 => Code::F18,
        Key::F19 => Code::F19,
        Key::F20 => Code::F20,
        Key::F21 => Code::F21,
        Key::F22 => Code::F22,
        Key::F23 => Code::F23,
        Key::F24 => Code::F24,
        Key::Space => Code::Space,
        Key::ArrowUp => Code::ArrowUp,
        Key::ArrowDown => Code::ArrowDown,
        Key::ArrowLeft => Code::ArrowLeft,
        Key::ArrowRight => Code::ArrowRight,
    }
}
