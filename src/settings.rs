use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::frame::{Point, Region};
use crate::core::keys::Key;
use crate::core::worker::ReentryPolicy;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Slot name (`capture`, `stop-search`, `mouse-position` or a macro id) to accelerator.
    #[serde(default = "default_hotkeys")]
    pub hotkeys: BTreeMap<String, String>,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub capture: CaptureSettings,

    #[serde(default)]
    pub macros: MacroSettings,

    #[serde(default)]
    pub reentry_policy: ReentryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            hotkeys: default_hotkeys(),
            search: SearchSettings::default(),
            capture: CaptureSettings::default(),
            macros: MacroSettings::default(),
            reentry_policy: ReentryPolicy::default(),
        }
    }
}

fn default_hotkeys() -> BTreeMap<String, String> {
    BTreeMap::from([("stop-search".to_string(), "F7".to_string())])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Screen rectangle scanned for the template.
    pub region: Region,
    pub tolerance: u8,
    pub cache_ttl_ms: u64,
    /// Held while moving to and clicking a match.
    pub modifier: Key,
    pub action_key: Key,
    pub step_delay_ms: u64,
    pub retry_delay_ms: u64,
    pub max_capture_failures: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            region: Region::new(660, 240, 600, 600),
            tolerance: 30,
            cache_ttl_ms: 50,
            modifier: Key::LeftShift,
            action_key: Key::E,
            step_delay_ms: 50,
            retry_delay_ms: 100,
            max_capture_failures: 3,
        }
    }
}

impl SearchSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    /// Center the capture on the cursor instead of using `region`.
    pub follow_cursor: bool,
    pub region: Option<Region>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 30,
            height: 30,
            follow_cursor: true,
            region: None,
        }
    }
}

impl CaptureSettings {
    /// Region to grab for a new template given the current cursor position.
    pub fn region_for(&self, cursor: Point) -> Region {
        match self.region {
            Some(region) if !self.follow_cursor => region,
            _ => Region::centered_on(cursor, self.width, self.height),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroSettings {
    pub revive_lock_point: Point,
    /// Skill slots 1..=count; capped at 9.
    pub combo_skill_count: u8,
    pub combo_press_delay_ms: u64,
}

impl Default for MacroSettings {
    fn default() -> Self {
        Self {
            revive_lock_point: Point::new(58, 77),
            combo_skill_count: 5,
            combo_press_delay_ms: 600,
        }
    }
}

impl EngineSettings {
    pub const SETTINGS_FILE: &'static str = "heaven_macro_settings.json";

    /// Load settings from file, or fall back to defaults
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), "settings not readable, using defaults: {}", e);
                return Self::default();
            }
        };
        match serde_json::from_str::<EngineSettings>(&contents) {
            Ok(settings) => {
                info!(path = %path.display(), "settings loaded");
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), "settings malformed, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
