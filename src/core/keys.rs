use std::fmt;

use serde::{Deserialize, Serialize};

/// A key the engine can bind as a hotkey or inject into the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    LeftControl,
    LeftShift,
    LeftAlt,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    Digit0,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    F13,
    F14,
    F15,
    F16,
    F17,
    F18,
    F19,
    F20,
    F21,
    F22,
    F23,
    F24,
    Space,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
}

const LETTERS: [Key; 26] = [
    Key::A, Key::B, Key::C, Key::D, Key::E, Key::F, Key::G, Key::H, Key::I,
    Key::J, Key::K, Key::L, Key::M, Key::N, Key::O, Key::P, Key::Q, Key::R,
    Key::S, Key::T, Key::U, Key::V, Key::W, Key::X, Key::Y, Key::Z,
];

const DIGITS: [Key; 10] = [
    Key::Digit0, Key::Digit1, Key::Digit2, Key::Digit3, Key::Digit4,
    Key::Digit5, Key::Digit6, Key::Digit7, Key::Digit8, Key::Digit9,
];

const FUNCTION_KEYS: [Key; 24] = [
    Key::F1, Key::F2, Key::F3, Key::F4, Key::F5, Key::F6,
    Key::F7, Key::F8, Key::F9, Key::F10, Key::F11, Key::F12,
    Key::F13, Key::F14, Key::F15, Key::F16, Key::F17, Key::F18,
    Key::F19, Key::F20, Key::F21, Key::F22, Key::F23, Key::F24,
];

impl Key {
    pub fn is_modifier(self) -> bool {
        matches!(self, Key::LeftControl | Key::LeftShift | Key::LeftAlt)
    }

    /// Digit key for a number row slot, `None` above 9.
    pub fn digit(n: u8) -> Option<Key> {
        DIGITS.get(n as usize).copied()
    }

    /// Function key `F{n}` for n in 1..=24.
    pub fn function(n: u8) -> Option<Key> {
        let index = (n as usize).checked_sub(1)?;
        FUNCTION_KEYS.get(index).copied()
    }

    /// Parse one accelerator token. Case-insensitive; accepts modifier aliases.
    pub fn from_token(token: &str) -> Option<Key> {
        let upper = token.trim().to_ascii_uppercase();
        match upper.as_str() {
            "CTRL" | "CONTROL" => return Some(Key::LeftControl),
            "SHIFT" => return Some(Key::LeftShift),
            "ALT" => return Some(Key::LeftAlt),
            "SPACE" => return Some(Key::Space),
            "UP" => return Some(Key::ArrowUp),
            "DOWN" => return Some(Key::ArrowDown),
            "LEFT" => return Some(Key::ArrowLeft),
            "RIGHT" => return Some(Key::ArrowRight),
            _ => {}
        }

        let mut chars = upper.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_uppercase() => {
                return Some(LETTERS[(c as u8 - b'A') as usize]);
            }
            (Some(c), None) if c.is_ascii_digit() => {
                return Some(DIGITS[(c as u8 - b'0') as usize]);
            }
            _ => {}
        }

        // F1..F24, no leading zeros
        let number = upper.strip_prefix('F')?;
        if number.starts_with('0') {
            return None;
        }
        number.parse::<u8>().ok().and_then(Key::function)
    }

    pub fn label(self) -> &'static str {
        match self {
            Key::LeftControl => "Ctrl",
            Key::LeftShift => "Shift",
            Key::LeftAlt => "Alt",
            Key::A => "A",
            Key::B => "B",
            Key::C => "C",
            Key::D => "D",
            Key::E => "E",
            Key::F => "F",
            Key::G => "G",
            Key::H => "H",
            Key::I => "I",
            Key::J => "J",
            Key::K => "K",
            Key::L => "L",
            Key::M => "M",
            Key::N => "N",
            Key::O => "O",
            Key::P => "P",
            Key::Q => "Q",
            Key::R => "R",
            Key::S => "S",
            Key::T => "T",
            Key::U => "U",
            Key::V => "V",
            Key::W => "W",
            Key::X => "X",
            Key::Y => "Y",
            Key::Z => "Z",
            Key::Digit0 => "0",
            Key::Digit1 => "1",
            Key::Digit2 => "2",
            Key::Digit3 => "3",
            Key::Digit4 => "4",
            Key::Digit5 => "5",
            Key::Digit6 => "6",
            Key::Digit7 => "7",
            Key::Digit8 => "8",
            Key::Digit9 => "9",
            Key::F1 => "F1",
            Key::F2 => "F2",
            Key::F3 => "F3",
            Key::F4 => "F4",
            Key::F5 => "F5",
            Key::F6 => "F6",
            Key::F7 => "F7",
            Key::F8 => "F8",
            Key::F9 => "F9",
            Key::F10 => "F10",
            Key::F11 => "F11",
            Key::F12 => "F12",
            Key::F13 => "F13",
            Key::F14 => "F14",
            Key::F15 => "F15",
            Key::F16 => "F16",
            Key::F17 => "F17",
            Key::F18 => "F18",
            Key::F19 => "F19",
            Key::F20 => "F20",
            Key::F21 => "F21",
            Key::F22 => "F22",
            Key::F23 => "F23",
            Key::F24 => "F24",
            Key::Space => "Space",
            Key::ArrowUp => "Up",
            Key::ArrowDown => "Down",
            Key::ArrowLeft => "Left",
            Key::ArrowRight => "Right",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<String> for Key {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Key::from_token(&value).ok_or_else(|| format!("unknown key '{}'", value))
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.label().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_case_insensitive() {
        assert_eq!(Key::from_token("a"), Some(Key::A));
        assert_eq!(Key::from_token("ctrl"), Some(Key::LeftControl));
        assert_eq!(Key::from_token("Control"), Some(Key::LeftControl));
        assert_eq!(Key::from_token("space"), Some(Key::Space));
        assert_eq!(Key::from_token("f7"), Some(Key::F7));
    }

    #[test]
    fn function_keys_stop_at_f24() {
        assert_eq!(Key::from_token("F24"), Some(Key::F24));
        assert_eq!(Key::from_token("F25"), None);
        assert_eq!(Key::from_token("F0"), None);
        assert_eq!(Key::from_token("F07"), None);
        assert_eq!(Key::from_token("F"), Some(Key::F));
    }

    #[test]
    fn labels_parse_back_to_the_same_key() {
        for key in LETTERS.iter().chain(DIGITS.iter()).chain(FUNCTION_KEYS.iter()) {
            assert_eq!(Key::from_token(key.label()), Some(*key));
        }
        assert_eq!(Key::from_token(Key::ArrowLeft.label()), Some(Key::ArrowLeft));
    }

    #[test]
    fn rejects_unknown_tokens() {
        assert_eq!(Key::from_token("Meta"), None);
        assert_eq!(Key::from_token("AB"), None);
        assert_eq!(Key::from_token(""), None);
    }

    #[test]
    fn serializes_as_label() {
        let json = serde_json::to_string(&Key::LeftShift).unwrap();
        assert_eq!(json, "\"Shift\"");
        let key: Key = serde_json::from_str("\"e\"").unwrap();
        assert_eq!(key, Key::E);
    }
}
