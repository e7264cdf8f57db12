use serde::Deserialize;

use crate::command::Binaries;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub shaping: ShapingConfig,
    pub sampler: SamplingConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShapingConfig {
    /// Turn shaping off entirely; the API then reports it as unsupported.
    pub enabled: bool,
    /// Prefix privileged commands with `sudo -n`. Leave off when running as root.
    pub use_sudo: bool,
    pub redirect_device: String,
    pub tc_binary: String,
    pub ip_binary: String,
    pub modprobe_binary: String,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        let bins = Binaries::default();
        Self {
            enabled: true,
            use_sudo: false,
            redirect_device: "ifb0".into(),
            tc_binary: bins.tc,
            ip_binary: bins.ip,
            modprobe_binary: bins.modprobe,
        }
    }
}

impl ShapingConfig {
    pub fn binaries(&self) -> Binaries {
        Binaries {
            tc: self.tc_binary.clone(),
            ip: self.ip_binary.clone(),
            modprobe: self.modprobe_binary.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    pub sample_interval_ms: u64,
    /// Publish a throughput event every N samples.
    #[serde(default = "default_publish_every")]
    pub publish_every: u64,
    /// Max events kept in the broadcast channel for /ws/throughput (slow clients may lag).
    pub broadcast_capacity: usize,
    /// How often to log sampler stats at INFO level.
    pub stats_log_interval_secs: u64,
}

fn default_publish_every() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    pub path: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: "netthrottle_settings.json".into(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            crate::error::validate_interface(&self.shaping.redirect_device).is_ok(),
            "shaping.redirect_device must be a valid interface name, got {:?}",
            self.shaping.redirect_device
        );
        for (key, value) in [
            ("shaping.tc_binary", &self.shaping.tc_binary),
            ("shaping.ip_binary", &self.shaping.ip_binary),
            ("shaping.modprobe_binary", &self.shaping.modprobe_binary),
        ] {
            anyhow::ensure!(!value.is_empty(), "{} must be non-empty", key);
        }
        anyhow::ensure!(
            self.sampler.sample_interval_ms > 0,
            "sampler.sample_interval_ms must be > 0, got {}",
            self.sampler.sample_interval_ms
        );
        anyhow::ensure!(
            self.sampler.publish_every > 0,
            "sampler.publish_every must be > 0, got {}",
            self.sampler.publish_every
        );
        anyhow::ensure!(
            self.sampler.broadcast_capacity > 0,
            "sampler.broadcast_capacity must be > 0, got {}",
            self.sampler.broadcast_capacity
        );
        anyhow::ensure!(
            self.sampler.stats_log_interval_secs > 0,
            "sampler.stats_log_interval_secs must be > 0, got {}",
            self.sampler.stats_log_interval_secs
        );
        anyhow::ensure!(
            !self.settings.path.is_empty(),
            "settings.path must be non-empty"
        );
        Ok(())
    }
}
