//! Mirroring policy: configuration and symbol resolution.

mod config;
mod resolver;

pub use config::CopierConfig;
pub use resolver::{parse_option_symbol, select_monthly_expiry, InstrumentLookup, InstrumentResolver};
