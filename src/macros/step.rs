use std::time::Duration;

use crate::core::frame::Point;
use crate::core::keys::Key;
use crate::error::{EngineError, Result};
use crate::macros::MacroKind;

/// One instruction of a macro script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroStep {
    /// Press in the given order. Modifiers go first.
    PressKeys(Vec<Key>),
    /// Release in the given order. The primary key goes before its modifiers.
    ReleaseKeys(Vec<Key>),
    Wait(Duration),
    MoveMouseTo(Point),
    /// Keep snapping the pointer back to a point until `UnlockMouse`.
    LockMouseAt(Point),
    UnlockMouse,
    /// Click the stored template until it disappears or a stop is requested.
    SearchAndClickLoop(u8),
}

/// A named, ordered list of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    pub kind: MacroKind,
    pub steps: Vec<MacroStep>,
}

impl MacroDefinition {
    pub fn new(kind: MacroKind, steps: Vec<MacroStep>) -> Self {
        Self { kind, steps }
    }

    /// True when the macro polls the screen and can run for a long time.
    pub fn is_long_running(&self) -> bool {
        self.steps
            .iter()
            .any(|step| matches!(step, MacroStep::SearchAndClickLoop(_)))
    }

    /// Check that the script leaves no key held and no mouse lock engaged.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| EngineError::InvalidMacro(self.kind.id().to_string(), reason);

        let mut held: Vec<Key> = Vec::new();
        let mut locked = false;

        for (index, step) in self.steps.iter().enumerate() {
            match step {
                MacroStep::PressKeys(keys) => {
                    for key in keys {
                        if held.contains(key) {
                            return Err(invalid(format!("step {}: {} pressed twice", index, key)));
                        }
                        held.push(*key);
                    }
                }
                MacroStep::ReleaseKeys(keys) => {
                    for key in keys {
                        let Some(pos) = held.iter().position(|k| k == key) else {
                            return Err(invalid(format!("step {}: {} released but not held", index, key)));
                        };
                        held.remove(pos);
                    }
                }
                MacroStep::LockMouseAt(_) => {
                    if locked {
                        return Err(invalid(format!("step {}: mouse already locked", index)));
                    }
                    locked = true;
                }
                MacroStep::UnlockMouse => {
                    if !locked {
                        return Err(invalid(format!("step {}: unlock without lock", index)));
                    }
                    locked = false;
                }
                MacroStep::Wait(_) | MacroStep::MoveMouseTo(_) | MacroStep::SearchAndClickLoop(_) => {}
            }
        }

        if let Some(key) = held.first() {
            return Err(invalid(format!("{} still held at the end", key)));
        }
        if locked {
            return Err(invalid("mouse still locked at the end".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(steps: Vec<MacroStep>) -> MacroDefinition {
        MacroDefinition::new(MacroKind::Heal, steps)
    }

    #[test]
    fn balanced_script_is_valid() {
        let script = def(vec![
            MacroStep::LockMouseAt(Point::new(1, 2)),
            MacroStep::PressKeys(vec![Key::LeftControl, Key::Digit1]),
            MacroStep::ReleaseKeys(vec![Key::Digit1, Key::LeftControl]),
            MacroStep::Wait(Duration::from_millis(100)),
            MacroStep::UnlockMouse,
        ]);
        assert!(script.validate().is_ok());
        assert!(!script.is_long_running());
    }

    #[test]
    fn held_key_at_end_is_invalid() {
        let script = def(vec![MacroStep::PressKeys(vec![Key::LeftShift, Key::E])]);
        assert!(matches!(script.validate(), Err(EngineError::InvalidMacro(id, _)) if id == "heal"));
    }

    #[test]
    fn unlock_without_lock_is_invalid() {
        assert!(def(vec![MacroStep::UnlockMouse]).validate().is_err());
        assert!(def(vec![MacroStep::LockMouseAt(Point::new(0, 0))]).validate().is_err());
    }

    #[test]
    fn release_of_unheld_key_is_invalid() {
        assert!(def(vec![MacroStep::ReleaseKeys(vec![Key::H])]).validate().is_err());
    }

    #[test]
    fn search_loop_is_long_running() {
        let script = MacroDefinition::new(MacroKind::FindImage, vec![MacroStep::SearchAndClickLoop(30)]);
        assert!(script.is_long_running());
        assert!(script.validate().is_ok());
    }
}
