//! Copier configuration.

use std::time::Duration;

use crate::models::{ProductType, TimeInForce};

/// Configuration for the reconciliation loop and mirrored orders.
#[derive(Debug, Clone)]
pub struct CopierConfig {
    /// Seconds between polls of the source order book
    pub poll_interval_secs: u64,

    /// Upper bound on any single brokerage call (seconds)
    pub request_timeout_secs: u64,

    /// Destination quantity = filled quantity × multiplier (always ≥ 1)
    pub quantity_multiplier: u32,

    /// Product type for every mirrored order
    pub product_type: ProductType,

    /// Time-in-force for every mirrored order
    pub time_in_force: TimeInForce,

    /// Prefix for the client order identifier sent to the destination
    pub order_tag_prefix: String,
}

impl Default for CopierConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            request_timeout_secs: 5,
            quantity_multiplier: 1,
            product_type: ProductType::Mis,
            time_in_force: TimeInForce::Day,
            order_tag_prefix: "Z2F".to_string(),
        }
    }
}

impl CopierConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Set the multiplier from a raw configured value; missing or non-positive → 1.
    pub fn with_multiplier(mut self, raw: Option<i64>) -> Self {
        self.quantity_multiplier = clamp_multiplier(raw);
        self
    }
}

/// Clamp a configured multiplier into `1..=u32::MAX`.
pub fn clamp_multiplier(raw: Option<i64>) -> u32 {
    match raw {
        Some(m) if m >= 1 => u32::try_from(m).unwrap_or(u32::MAX),
        _ => 1,
    }
}
