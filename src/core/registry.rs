use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};

use crate::core::hotkey::Accelerator;
use crate::error::{EngineError, Result};
use crate::macros::MacroKind;
use crate::platform::HotkeyBackend;

/// A hotkey slot. Each slot holds at most one accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HotkeyTarget {
    Macro(MacroKind),
    CaptureTemplate,
    StopSearch,
    MousePosition,
}

impl fmt::Display for HotkeyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotkeyTarget::Macro(kind) => f.write_str(kind.id()),
            HotkeyTarget::CaptureTemplate => f.write_str("capture"),
            HotkeyTarget::StopSearch => f.write_str("stop-search"),
            HotkeyTarget::MousePosition => f.write_str("mouse-position"),
        }
    }
}

impl FromStr for HotkeyTarget {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "capture" => Ok(HotkeyTarget::CaptureTemplate),
            "stop-search" => Ok(HotkeyTarget::StopSearch),
            "mouse-position" => Ok(HotkeyTarget::MousePosition),
            other => other.parse().map(HotkeyTarget::Macro),
        }
    }
}

/// Slot-to-accelerator bindings mirrored into the OS.
///
/// The map is a partial injective function: no accelerator is ever bound
/// to two slots.
pub struct HotkeyRegistry {
    backend: Box<dyn HotkeyBackend>,
    bindings: HashMap<HotkeyTarget, Accelerator>,
}

impl HotkeyRegistry {
    pub fn new(backend: Box<dyn HotkeyBackend>) -> Self {
        Self {
            backend,
            bindings: HashMap::new(),
        }
    }

    /// Bind `accelerator` to `target`, replacing the slot's previous binding.
    pub fn register(&mut self, target: HotkeyTarget, accelerator: &str) -> Result<Accelerator> {
        let accelerator = Accelerator::parse(accelerator)?;

        if let Some(owner) = self.owner_of(&accelerator) {
            if owner == target {
                return Ok(accelerator);
            }
            return Err(EngineError::AcceleratorAlreadyBound(accelerator.to_string()));
        }

        let previous = self.bindings.get(&target).copied();
        if let Some(previous) = &previous {
            self.backend.unregister(previous)?;
            self.bindings.remove(&target);
        }

        match self.backend.register(&accelerator) {
            Ok(()) => {
                info!(%target, %accelerator, "hotkey registered");
                self.bindings.insert(target, accelerator);
                Ok(accelerator)
            }
            Err(e) => {
                if let Some(previous) = previous {
                    self.restore(target, previous);
                }
                Err(e)
            }
        }
    }

    /// Remove the slot's binding. A no-op when the slot is empty.
    pub fn unregister(&mut self, target: HotkeyTarget) {
        let Some(accelerator) = self.bindings.get(&target).copied() else {
            return;
        };
        match self.backend.unregister(&accelerator) {
            Ok(()) => {
                self.bindings.remove(&target);
                info!(%target, %accelerator, "hotkey unregistered");
            }
            Err(e) => warn!(%target, %accelerator, error = %e, "failed to release hotkey, binding kept"),
        }
    }

    /// Release every OS-level shortcut.
    pub fn unregister_all(&mut self) {
        self.bindings.clear();
        if let Err(e) = self.backend.unregister_all() {
            warn!(error = %e, "failed to release all hotkeys");
        }
    }

    pub fn resolve(&self, accelerator: &Accelerator) -> Option<HotkeyTarget> {
        self.owner_of(accelerator)
    }

    pub fn binding(&self, target: HotkeyTarget) -> Option<Accelerator> {
        self.bindings.get(&target).copied()
    }

    /// Live bindings, sorted by slot.
    pub fn bindings(&self) -> Vec<(HotkeyTarget, Accelerator)> {
        let mut all: Vec<_> = self.bindings.iter().map(|(t, a)| (*t, *a)).collect();
        all.sort_by_key(|(target, _)| *target);
        all
    }

    fn owner_of(&self, accelerator: &Accelerator) -> Option<HotkeyTarget> {
        self.bindings
            .iter()
            .find(|(_, bound)| *bound == accelerator)
            .map(|(target, _)| *target)
    }

    fn restore(&mut self, target: HotkeyTarget, previous: Accelerator) {
        match self.backend.register(&previous) {
            Ok(()) => {
                self.bindings.insert(target, previous);
            }
            Err(e) => {
                warn!(%target, accelerator = %previous, error = %e, "could not restore previous hotkey");
            }
        }
    }
}
