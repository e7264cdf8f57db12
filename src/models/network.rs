// Network interface, counter and throughput models

use serde::{Deserialize, Serialize};

/// A selectable network device as enumerated from the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    pub name: String,
    pub mac_address: String,
    pub ipv4: Vec<String>,
    pub is_loopback: bool,
    pub has_address: bool,
}

/// Point-in-time counters for one interface. Totals are cumulative since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSample {
    pub timestamp_ms: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
}

/// Throughput derived from two consecutive samples, in bytes per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThroughputEvent {
    pub interface: String,
    pub timestamp_ms: u64,
    /// Received bytes/sec.
    pub download_rate: f64,
    /// Transmitted bytes/sec.
    pub upload_rate: f64,
}
