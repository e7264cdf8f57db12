// Persisted operator choices: selected interface and last requested limits

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{Direction, ShapingState};

/// The small record kept between runs. Limits are informational only:
/// kernel shaping state is not restored at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub download_limit_kbps: Option<u64>,
    #[serde(default)]
    pub upload_limit_kbps: Option<u64>,
}

impl Settings {
    /// Copy the limits of `state` for the selected interface.
    pub fn record_state(&mut self, state: &ShapingState) {
        self.download_limit_kbps = state.get(Direction::Download).map(|l| l.kbps);
        self.upload_limit_kbps = state.get(Direction::Upload).map(|l| l.kbps);
    }
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means defaults; a corrupt file is an error.
    pub fn load(&self) -> anyhow::Result<Settings> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => serde_json::from_str(&s)
                .map_err(|e| anyhow::anyhow!("parsing {}: {}", self.path.display(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(anyhow::anyhow!("reading {}: {}", self.path.display(), e)),
        }
    }

    pub fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, json)?;
        tracing::debug!(path = %self.path.display(), operation = "save_settings", "settings saved");
        Ok(())
    }

    /// Load, apply `f`, save. Failures are logged, never propagated.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        let mut settings = self.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "load_settings", "settings unreadable; starting fresh");
            Settings::default()
        });
        f(&mut settings);
        if let Err(e) = self.save(&settings) {
            tracing::warn!(error = %e, operation = "save_settings", "failed to save settings");
        }
    }
}
