// Interface enumeration and byte/packet counters via sysinfo

mod linux;

use crate::models::{CounterSample, Interface};
use crate::sampler::CounterSource;
use std::sync::Arc;
use sysinfo::Networks;
use tracing::instrument;

pub struct SysinfoRepo {
    networks: Arc<std::sync::Mutex<Networks>>,
}

impl Default for SysinfoRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Milliseconds since the Unix epoch, 0 if the clock is before it.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}

impl SysinfoRepo {
    pub fn new() -> Self {
        let networks = Networks::new_with_refreshed_list();
        Self {
            networks: Arc::new(std::sync::Mutex::new(networks)),
        }
    }

    /// Interfaces with at least one IPv4 address, loopback excluded, sorted by name.
    pub fn list_interfaces(&self) -> anyhow::Result<Vec<Interface>> {
        let mut networks = self
            .networks
            .lock()
            .map_err(|e| anyhow::anyhow!("sysinfo networks lock poisoned: {}", e))?;
        networks.refresh(true);
        let mut interfaces: Vec<Interface> = networks
            .list()
            .iter()
            .map(|(name, data)| {
                let ipv4: Vec<String> = data
                    .ip_networks()
                    .iter()
                    .filter(|n| n.addr.is_ipv4())
                    .map(|n| n.addr.to_string())
                    .collect();
                Interface {
                    name: name.clone(),
                    mac_address: data.mac_address().to_string(),
                    has_address: !ipv4.is_empty(),
                    ipv4,
                    is_loopback: linux::is_loopback(name),
                }
            })
            .filter(|i| !i.is_loopback && i.has_address)
            .collect();
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(interfaces)
    }

    /// Current cumulative counters for one interface, `None` if it is not in the table.
    pub fn read_counters(&self, interface: &str) -> anyhow::Result<Option<CounterSample>> {
        let mut networks = self
            .networks
            .lock()
            .map_err(|e| anyhow::anyhow!("sysinfo networks lock poisoned: {}", e))?;
        networks.refresh(true);
        let timestamp_ms = now_ms();
        Ok(networks.list().get(interface).map(|data| CounterSample {
            timestamp_ms,
            bytes_sent: data.total_transmitted(),
            bytes_received: data.total_received(),
            packets_sent: data.total_packets_transmitted(),
            packets_received: data.total_packets_received(),
        }))
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_interfaces"))]
    pub async fn get_interfaces(self: &Arc<Self>) -> anyhow::Result<Vec<Interface>> {
        let repo = Arc::clone(self);
        tokio::task::spawn_blocking(move || repo.list_interfaces())
            .await
            .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_counters"))]
    pub async fn get_counters(
        self: &Arc<Self>,
        interface: String,
    ) -> anyhow::Result<Option<CounterSample>> {
        let repo = Arc::clone(self);
        tokio::task::spawn_blocking(move || repo.read_counters(&interface))
            .await
            .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}

impl CounterSource for SysinfoRepo {
    fn sample(&self, interface: &str) -> Option<CounterSample> {
        match self.read_counters(interface) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(error = %e, operation = "read_counters", "counter read failed");
                None
            }
        }
    }
}
