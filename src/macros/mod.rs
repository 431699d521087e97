pub mod executor;
pub mod library;
pub mod search;
pub mod step;

use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

pub use executor::MacroExecutor;
pub use library::MacroLibrary;
pub use search::{SearchControl, SearchState};
pub use step::{MacroDefinition, MacroStep};

/// The macros the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MacroKind {
    Revive,
    Heal,
    Buff,
    Combo,
    FindImage,
}

impl MacroKind {
    pub const ALL: [MacroKind; 5] = [
        MacroKind::Revive,
        MacroKind::Heal,
        MacroKind::Buff,
        MacroKind::Combo,
        MacroKind::FindImage,
    ];

    /// Stable id used in settings and by the UI layer.
    pub fn id(self) -> &'static str {
        match self {
            MacroKind::Revive => "revive",
            MacroKind::Heal => "heal",
            MacroKind::Buff => "buff",
            MacroKind::Combo => "combo",
            MacroKind::FindImage => "find-image",
        }
    }
}

impl fmt::Display for MacroKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for MacroKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MacroKind::ALL
            .into_iter()
            .find(|kind| kind.id() == s)
            .ok_or_else(|| EngineError::UnknownMacro(s.to_string()))
    }
}
