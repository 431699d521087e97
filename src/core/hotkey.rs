use std::fmt;
use std::str::FromStr;

use crate::core::keys::Key;
use crate::error::EngineError;

/// Modifier set of an accelerator. Order in the source string does not matter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        !(self.ctrl || self.shift || self.alt)
    }

    /// Modifier keys in canonical press order.
    pub fn keys(&self) -> Vec<Key> {
        let mut keys = Vec::with_capacity(3);
        if self.ctrl {
            keys.push(Key::LeftControl);
        }
        if self.shift {
            keys.push(Key::LeftShift);
        }
        if self.alt {
            keys.push(Key::LeftAlt);
        }
        keys
    }

    /// Sets the flag for `key`. Returns false if it was already set.
    fn insert(&mut self, key: Key) -> bool {
        let slot = match key {
            Key::LeftControl => &mut self.ctrl,
            Key::LeftShift => &mut self.shift,
            Key::LeftAlt => &mut self.alt,
            _ => return false,
        };
        !std::mem::replace(slot, true)
    }
}

/// A global hotkey such as `Ctrl+Shift+F5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Accelerator {
    pub modifiers: Modifiers,
    pub key: Key,
}

impl Accelerator {
    pub fn new(modifiers: Modifiers, key: Key) -> Self {
        Self { modifiers, key }
    }

    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let invalid = || EngineError::InvalidAccelerator(text.to_string());

        let mut modifiers = Modifiers::default();
        let mut primary: Option<Key> = None;

        for token in text.split('+') {
            let token = token.trim();
            if token.is_empty() {
                return Err(invalid());
            }
            let key = Key::from_token(token).ok_or_else(invalid)?;

            // Nothing may follow the primary key
            if primary.is_some() {
                return Err(invalid());
            }
            if key.is_modifier() {
                if !modifiers.insert(key) {
                    return Err(invalid());
                }
            } else {
                primary = Some(key);
            }
        }

        let key = primary.ok_or_else(invalid)?;
        Ok(Self { modifiers, key })
    }

    /// Keys to inject for this accelerator, modifiers first.
    pub fn chord(&self) -> Vec<Key> {
        let mut keys = self.modifiers.keys();
        keys.push(self.key);
        keys
    }
}

impl FromStr for Accelerator {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Accelerator::parse(s)
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<&'static str> = self.modifiers.keys().into_iter().map(Key::label).collect();
        parts.push(self.key.label());
        f.write_str(&parts.join("+"))
    }
}
