// User-entered rate -> integer kbit/s

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid rate {input:?}: {reason}")]
pub struct InvalidRate {
    pub input: String,
    pub reason: &'static str,
}

impl InvalidRate {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Unit token accompanying a rate value. Serializes to lowercase JSON ("kbps", "mbps").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateUnit {
    Kbps,
    Mbps,
}

impl RateUnit {
    fn multiplier(self) -> f64 {
        match self {
            RateUnit::Kbps => 1.0,
            RateUnit::Mbps => 1000.0,
        }
    }
}

impl fmt::Display for RateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateUnit::Kbps => f.write_str("kbps"),
            RateUnit::Mbps => f.write_str("mbps"),
        }
    }
}

impl FromStr for RateUnit {
    type Err = InvalidRate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kbps" => Ok(RateUnit::Kbps),
            "mbps" => Ok(RateUnit::Mbps),
            _ => Err(InvalidRate::new(s, "unit must be kbps or mbps")),
        }
    }
}

/// Convert `value` in `unit` to whole kbit/s, truncating any fraction.
/// Zero is accepted; negative, non-finite and non-numeric input is rejected.
pub fn convert(value: &str, unit: RateUnit) -> Result<u64, InvalidRate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(InvalidRate::new(value, "empty value"));
    }
    let parsed: f64 = trimmed
        .parse()
        .map_err(|_| InvalidRate::new(value, "not a number"))?;
    if !parsed.is_finite() {
        return Err(InvalidRate::new(value, "not a finite number"));
    }
    if parsed < 0.0 {
        return Err(InvalidRate::new(value, "must not be negative"));
    }
    let kbps = parsed * unit.multiplier();
    if kbps >= u64::MAX as f64 {
        return Err(InvalidRate::new(value, "too large"));
    }
    Ok(kbps.trunc() as u64)
}
