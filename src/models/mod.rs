// Domain models: interfaces, counters, throughput and shaping state

mod network;
mod shaping;

pub use network::{CounterSample, Interface, ThroughputEvent};
pub use shaping::{Direction, RateLimit, ShapingState};
