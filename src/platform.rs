// Startup capability detection: can this host shape traffic at all?

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::ShapingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_shaping: bool,
}

impl Capabilities {
    pub const fn supported() -> Self {
        Self {
            supports_shaping: true,
        }
    }

    pub const fn unsupported() -> Self {
        Self {
            supports_shaping: false,
        }
    }

    /// Shaping needs Linux traffic control; anything else reports unsupported.
    pub fn detect(config: &ShapingConfig) -> Self {
        if !config.enabled {
            tracing::info!("traffic shaping disabled by config");
            return Self::unsupported();
        }
        if !cfg!(target_os = "linux") {
            tracing::warn!(
                os = std::env::consts::OS,
                "traffic shaping requires Linux tc; limits are unavailable"
            );
            return Self::unsupported();
        }
        match find_binary(&config.tc_binary) {
            Some(path) => {
                tracing::debug!(tc = %path.display(), "found traffic control binary");
                if needs_privilege_warning(config.use_sudo, effective_uid()) {
                    tracing::warn!(
                        "not running as root and shaping.use_sudo is off; \
                         limit changes will be refused until restarted with elevated privileges"
                    );
                }
                Self::supported()
            }
            None => {
                tracing::warn!(
                    tc = %config.tc_binary,
                    "traffic control binary not found (install iproute2); limits are unavailable"
                );
                Self::unsupported()
            }
        }
    }
}

/// Effective UID of this process from `/proc/self/status` (Linux).
pub fn effective_uid() -> Option<u32> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            return parse_effective_uid(&status);
        }
    }
    None
}

/// The `Uid:` line lists real, effective, saved and filesystem UIDs.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_effective_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|ids| ids.split_whitespace().nth(1))
        .and_then(|euid| euid.parse().ok())
}

/// Mutations will fail without root unless commands go through sudo.
/// An unknown UID is not warned about.
fn needs_privilege_warning(use_sudo: bool, euid: Option<u32>) -> bool {
    !use_sudo && euid.is_some_and(|uid| uid != 0)
}

/// Resolve `name` like a shell would: paths are checked directly, bare names via `PATH`.
pub fn find_binary(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
}
