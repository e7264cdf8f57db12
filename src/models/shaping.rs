// Rate limit and per-interface shaping state models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the interface a limit applies to. Serializes to lowercase JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Capped with a root HTB qdisc on the interface itself.
    Download,
    /// Capped on the virtual redirect device fed from the interface's ingress.
    Upload,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "download" => Ok(Direction::Download),
            "upload" => Ok(Direction::Upload),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub direction: Direction,
    pub kbps: u64,
}

impl RateLimit {
    pub fn new(direction: Direction, kbps: u64) -> Self {
        Self { direction, kbps }
    }
}

/// Limits currently installed on one interface, as last confirmed by the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapingState {
    pub download: Option<RateLimit>,
    pub upload: Option<RateLimit>,
}

impl ShapingState {
    pub fn get(&self, direction: Direction) -> Option<RateLimit> {
        match direction {
            Direction::Download => self.download,
            Direction::Upload => self.upload,
        }
    }

    pub fn set(&mut self, direction: Direction, limit: Option<RateLimit>) {
        match direction {
            Direction::Download => self.download = limit,
            Direction::Upload => self.upload = limit,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.download.is_none() && self.upload.is_none()
    }
}
