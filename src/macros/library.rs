use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::frame::Point;
use crate::core::hotkey::{Accelerator, Modifiers};
use crate::core::keys::Key;
use crate::error::Result;
use crate::macros::step::{MacroDefinition, MacroStep};
use crate::macros::MacroKind;
use crate::settings::{MacroSettings, SearchSettings};

/// Pause after each tap so the game registers it.
pub const TAP_SETTLE: Duration = Duration::from_millis(100);

const MAX_COMBO_SLOTS: u8 = 9;

/// Built-in macro scripts, keyed by kind.
pub struct MacroLibrary {
    definitions: BTreeMap<MacroKind, Arc<MacroDefinition>>,
}

impl MacroLibrary {
    pub fn standard(macros: &MacroSettings, search: &SearchSettings) -> Result<Self> {
        let definitions = [
            revive(macros.revive_lock_point),
            tap_macro(MacroKind::Heal, Key::H),
            tap_macro(MacroKind::Buff, Key::J),
            combo(macros.combo_skill_count, Duration::from_millis(macros.combo_press_delay_ms)),
            MacroDefinition::new(MacroKind::FindImage, vec![MacroStep::SearchAndClickLoop(search.tolerance)]),
        ];

        let mut library = BTreeMap::new();
        for definition in definitions {
            definition.validate()?;
            library.insert(definition.kind, Arc::new(definition));
        }
        Ok(Self { definitions: library })
    }

    pub fn get(&self, kind: MacroKind) -> Option<Arc<MacroDefinition>> {
        self.definitions.get(&kind).cloned()
    }
}

/// Press `accelerator`, release it primary-first, then settle.
pub fn tap(accelerator: Accelerator) -> Vec<MacroStep> {
    let chord = accelerator.chord();
    let release: Vec<Key> = chord.iter().rev().copied().collect();
    vec![
        MacroStep::PressKeys(chord),
        MacroStep::ReleaseKeys(release),
        MacroStep::Wait(TAP_SETTLE),
    ]
}

fn with(ctrl: bool, shift: bool, alt: bool, key: Key) -> Accelerator {
    Accelerator::new(Modifiers { ctrl, shift, alt }, key)
}

fn plain(key: Key) -> Accelerator {
    Accelerator::new(Modifiers::default(), key)
}

fn tap_macro(kind: MacroKind, key: Key) -> MacroDefinition {
    MacroDefinition::new(kind, tap(plain(key)))
}

fn revive(lock_point: Point) -> MacroDefinition {
    let sequence = [
        with(true, false, false, Key::Digit1),
        with(false, true, false, Key::Digit0),
        with(true, false, false, Key::Digit1),
        with(false, true, false, Key::S),
        with(false, false, true, Key::Digit3),
    ];

    let mut steps = vec![MacroStep::LockMouseAt(lock_point)];
    steps.extend(sequence.into_iter().flat_map(tap));
    steps.push(MacroStep::UnlockMouse);
    MacroDefinition::new(MacroKind::Revive, steps)
}

fn combo(skill_count: u8, press_delay: Duration) -> MacroDefinition {
    let mut steps = tap(with(false, false, true, Key::Digit1));
    steps.push(MacroStep::Wait(press_delay));

    for slot in 2..=skill_count.min(MAX_COMBO_SLOTS) {
        if let Some(key) = Key::digit(slot) {
            steps.extend(tap(plain(key)));
            steps.push(MacroStep::Wait(press_delay));
        }
    }

    steps.extend(tap(plain(Key::F1)));
    MacroDefinition::new(MacroKind::Combo, steps)
}
