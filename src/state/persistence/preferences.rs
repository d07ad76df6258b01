use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::infra::constants::{PREFERENCES_FILE, STORE_DIR};

/// User preferences, snapshotted at the start of every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub auto_image_search: bool,
    pub auto_video_search: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instructions: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self { auto_image_search: true, auto_video_search: false, system_instructions: None }
    }
}

/// Where preferences come from.
pub trait PreferenceSource: Send + Sync {
    fn load(&self) -> Preferences;
}

/// Fixed preferences.
impl PreferenceSource for Preferences {
    fn load(&self) -> Preferences {
        self.clone()
    }
}

/// Preferences stored as YAML on disk.
pub struct PreferenceFile {
    path: PathBuf,
}

impl PreferenceFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `./.answerline/preferences.yaml`
    pub fn default_location() -> Self {
        Self::new(PathBuf::from(STORE_DIR).join(PREFERENCES_FILE))
    }

    pub fn save(&self, prefs: &Preferences) {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).ok();
        }
        match serde_yaml::to_string(prefs) {
            Ok(yaml) => {
                if let Err(e) = fs::write(&self.path, yaml) {
                    tracing::warn!("could not write {}: {}", self.path.display(), e);
                }
            }
            Err(e) => tracing::warn!("could not serialize preferences: {}", e),
        }
    }
}

impl PreferenceSource for PreferenceFile {
    /// Missing file: write the defaults so they are visible and editable.
    /// Unreadable file: fall back to the defaults without touching it.
    fn load(&self) -> Preferences {
        let Ok(yaml) = fs::read_to_string(&self.path) else {
            let prefs = Preferences::default();
            self.save(&prefs);
            return prefs;
        };
        match serde_yaml::from_str::<Preferences>(&yaml) {
            Ok(prefs) => prefs,
            Err(e) => {
                tracing::warn!("ignoring invalid preferences in {}: {}", self.path.display(), e);
                Preferences::default()
            }
        }
    }
}
