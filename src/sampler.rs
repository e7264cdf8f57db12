// Background throughput sampler.
// Samples counters every tick; publishes a throughput event every `publish_every` samples.

use crate::models::{CounterSample, ThroughputEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::time::{Duration, Instant, interval};
use tracing::Instrument;

/// Rate limit for "no receivers" message (avoid logging every publish when no one is on /ws/throughput)
const NO_RECEIVERS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Read access to per-interface counters.
pub trait CounterSource: Send + Sync {
    /// `None` when the interface is not currently in the counter table.
    fn sample(&self, interface: &str) -> Option<CounterSample>;
}

/// Delta and cadence bookkeeping for one selected interface.
///
/// Exactly one prior sample is kept. The first sample after start, reset or a
/// missing interface only primes `previous`; every later sample produces a
/// delta, and every `publish_every`-th delta is published.
#[derive(Debug, Clone)]
pub struct SamplerState {
    previous: Option<CounterSample>,
    ticks: u64,
    publish_every: u64,
    nominal_interval_ms: u64,
}

impl SamplerState {
    pub fn new(publish_every: u64, nominal_interval_ms: u64) -> Self {
        Self {
            previous: None,
            ticks: 0,
            publish_every: publish_every.max(1),
            nominal_interval_ms: nominal_interval_ms.max(1),
        }
    }

    /// Forget the prior sample, e.g. on interface switch.
    pub fn reset(&mut self) {
        self.previous = None;
        self.ticks = 0;
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    /// Delta-producing samples since the last reset.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn observe(
        &mut self,
        interface: &str,
        sample: Option<CounterSample>,
    ) -> Option<ThroughputEvent> {
        let Some(current) = sample else {
            // Interface gone (unplugged, renamed); start over when it comes back.
            self.reset();
            return None;
        };
        let previous = self.previous.replace(current)?;
        self.ticks += 1;
        if self.ticks % self.publish_every != 0 {
            return None;
        }

        let elapsed_ms = match current.timestamp_ms.saturating_sub(previous.timestamp_ms) {
            0 => self.nominal_interval_ms,
            ms => ms,
        };
        let per_sec = |delta: u64| delta as f64 * 1000.0 / elapsed_ms as f64;
        Some(ThroughputEvent {
            interface: interface.to_string(),
            timestamp_ms: current.timestamp_ms,
            download_rate: per_sec(current.bytes_received.saturating_sub(previous.bytes_received)),
            upload_rate: per_sec(current.bytes_sent.saturating_sub(previous.bytes_sent)),
        })
    }
}

/// Counter source, channels, and shutdown for the sampler.
pub struct SamplerDeps {
    pub source: Arc<dyn CounterSource>,
    /// Interface to sample; `None` pauses sampling.
    pub selected_rx: watch::Receiver<Option<String>>,
    pub tx: broadcast::Sender<ThroughputEvent>,
    pub ws_throughput_connections: Arc<AtomicUsize>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Sampler timing and logging config.
pub struct SamplerConfig {
    pub sample_interval_ms: u64,
    pub publish_every: u64,
    /// How often to log sampler stats (real seconds).
    pub stats_log_interval_secs: u64,
}

pub fn spawn(deps: SamplerDeps, config: SamplerConfig) -> tokio::task::JoinHandle<()> {
    let SamplerDeps {
        source,
        mut selected_rx,
        tx,
        ws_throughput_connections,
        mut shutdown_rx,
    } = deps;
    let SamplerConfig {
        sample_interval_ms,
        publish_every,
        stats_log_interval_secs,
    } = config;

    let sampler_span = tracing::span!(tracing::Level::DEBUG, "sampler", sample_interval_ms);

    tokio::spawn(
        async move {
            let mut tick = interval(Duration::from_millis(sample_interval_ms));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
            stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            let mut state = SamplerState::new(publish_every, sample_interval_ms);
            let mut selected = selected_rx.borrow_and_update().clone();
            let mut samples_total: u64 = 0;
            let mut skipped_total: u64 = 0;
            let mut events_published: u64 = 0;
            let mut last_no_receivers_log: Option<Instant> = None;

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if selected_rx.has_changed().unwrap_or(false) {
                            let next = selected_rx.borrow_and_update().clone();
                            if next != selected {
                                tracing::debug!(from = ?selected, to = ?next, "sampler switched interface");
                                selected = next;
                                state.reset();
                            }
                        }
                        let Some(interface) = selected.clone() else {
                            continue;
                        };

                        let src = source.clone();
                        let name = interface.clone();
                        let sample = match tokio::task::spawn_blocking(move || src.sample(&name)).await {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!(error = %e, operation = "sample_counters", "counter task failed");
                                continue;
                            }
                        };
                        samples_total += 1;
                        if sample.is_none() {
                            skipped_total += 1;
                            tracing::debug!(interface = %interface, "interface unavailable; tick skipped");
                        }

                        if let Some(event) = state.observe(&interface, sample) {
                            events_published += 1;
                            if tx.send(event).is_err() {
                                let should_log = last_no_receivers_log
                                    .is_none_or(|t| t.elapsed() >= NO_RECEIVERS_LOG_INTERVAL);
                                if should_log {
                                    tracing::debug!(
                                        operation = "broadcast_throughput",
                                        "No active WebSocket clients; broadcast channel has no receivers"
                                    );
                                    last_no_receivers_log = Some(Instant::now());
                                }
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Sampler shutting down");
                        break;
                    }
                    _ = stats_log_tick.tick() => {
                        tracing::info!(
                            interface = ?selected,
                            ws_throughput_clients = ws_throughput_connections.load(Ordering::Relaxed),
                            samples_total,
                            skipped_total,
                            events_published,
                            "sampler stats"
                        );
                    }
                }
            }
        }
        .instrument(sampler_span),
    )
}
