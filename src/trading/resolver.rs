//! Source symbol → destination instrument translation.
//!
//! Parsing is pure: a Kite option symbol such as `NIFTY25N0425800PE` is decoded
//! into a [`ResolvedInstrument`]. The destination instrument id is then looked up
//! through an [`InstrumentLookup`] collaborator (the destination's symbol
//! directory). Either step failing yields `UnresolvedInstrument`.
//!
//! Accepted grammar:
//!
//! ```text
//! UNDERLYING YY M DD STRIKE (CE|PE)     weekly,  M in J F M A Y H G U S O N D
//! UNDERLYING YY MON STRIKE (CE|PE)      monthly, MON in JAN..DEC
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::error::{CopierError, CopierResult};
use crate::models::{
    DestinationInstrument, ExchangeSegment, ExpiryKind, OptionType, ResolvedInstrument, Series,
};

/// Underlyings traded as index options.
const INDEX_UNDERLYINGS: [&str; 6] = [
    "NIFTY",
    "BANKNIFTY",
    "FINNIFTY",
    "MIDCPNIFTY",
    "SENSEX",
    "BANKEX",
];

/// Underlyings listed on the BSE derivatives segment.
const BSE_UNDERLYINGS: [&str; 2] = ["SENSEX", "BANKEX"];

/// Destination symbol directory.
#[async_trait]
pub trait InstrumentLookup: Send + Sync {
    /// Find the destination instrument for a decoded contract.
    async fn lookup(&self, instrument: &ResolvedInstrument) -> CopierResult<DestinationInstrument>;
}

/// Single-letter weekly month codes.
fn weekly_month(code: char) -> Option<u32> {
    let month = match code {
        'J' => 1,
        'F' => 2,
        'M' => 3,
        'A' => 4,
        'Y' => 5,
        'H' => 6,
        'G' => 7,
        'U' => 8,
        'S' => 9,
        'O' => 10,
        'N' => 11,
        'D' => 12,
        _ => return None,
    };
    Some(month)
}

fn monthly_month(token: &str) -> Option<u32> {
    let month = match token {
        "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AUG" => 8,
        "SEP" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DEC" => 12,
        _ => return None,
    };
    Some(month)
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Series for an underlying, by known-index lookup.
pub fn series_for(underlying: &str) -> Series {
    if INDEX_UNDERLYINGS.contains(&underlying) {
        Series::Optidx
    } else {
        Series::Optstk
    }
}

pub fn exchange_for(underlying: &str) -> ExchangeSegment {
    if BSE_UNDERLYINGS.contains(&underlying) {
        ExchangeSegment::BseFo
    } else {
        ExchangeSegment::NseFo
    }
}

/// Decode a source option symbol.
pub fn parse_option_symbol(symbol: &str) -> CopierResult<ResolvedInstrument> {
    let fail = |reason: &str| CopierError::unresolved(symbol, reason);

    let sym = symbol.trim().to_ascii_uppercase();
    if !sym.is_ascii() {
        return Err(fail("non-ASCII symbol"));
    }

    let split = sym
        .find(|c: char| !c.is_ascii_alphabetic())
        .ok_or_else(|| fail("no expiry after underlying"))?;
    if split == 0 {
        return Err(fail("missing underlying"));
    }
    let (underlying, rest) = sym.split_at(split);

    let (body, option_type) = if let Some(body) = rest.strip_suffix("CE") {
        (body, OptionType::Ce)
    } else if let Some(body) = rest.strip_suffix("PE") {
        (body, OptionType::Pe)
    } else {
        return Err(fail("missing CE/PE option type suffix"));
    };

    let yy = body
        .get(..2)
        .filter(|s| all_digits(s))
        .ok_or_else(|| fail("missing 2-digit expiry year"))?;
    let year = 2000 + yy.parse::<i32>().map_err(|_| fail("bad expiry year"))?;
    let tail = &body[2..];

    let (expiry, expiry_kind, strike_str) = match tail.get(..3).and_then(monthly_month) {
        Some(month) => {
            let date = NaiveDate::from_ymd_opt(year, month, 1)
                .ok_or_else(|| fail("invalid expiry month"))?;
            (date, ExpiryKind::Monthly, &tail[3..])
        }
        None => {
            let code = tail
                .chars()
                .next()
                .ok_or_else(|| fail("missing expiry month"))?;
            let month =
                weekly_month(code).ok_or_else(|| fail(&format!("unknown month code {}", code)))?;
            let dd = tail
                .get(1..3)
                .filter(|s| all_digits(s))
                .ok_or_else(|| fail("missing 2-digit expiry day"))?;
            let day: u32 = dd.parse().map_err(|_| fail("bad expiry day"))?;
            let date = NaiveDate::from_ymd_opt(year, month, day)
                .ok_or_else(|| fail("invalid expiry date"))?;
            (date, ExpiryKind::Weekly, &tail[3..])
        }
    };

    if !all_digits(strike_str) {
        return Err(fail("missing or non-numeric strike"));
    }
    let strike: u32 = strike_str
        .parse()
        .map_err(|_| fail("strike out of range"))?;
    if strike == 0 {
        return Err(fail("zero strike"));
    }

    Ok(ResolvedInstrument {
        series: series_for(underlying),
        underlying: underlying.to_string(),
        expiry,
        expiry_kind,
        option_type,
        strike,
        exchange: exchange_for(underlying),
    })
}

/// Latest listed expiry falling in the same month and year as `placeholder`.
pub fn select_monthly_expiry(listed: &[NaiveDate], placeholder: NaiveDate) -> Option<NaiveDate> {
    listed
        .iter()
        .filter(|d| d.year() == placeholder.year() && d.month() == placeholder.month())
        .max()
        .copied()
}

/// Parses symbols and resolves them against the destination directory.
#[derive(Clone)]
pub struct InstrumentResolver {
    lookup: Arc<dyn InstrumentLookup>,
    timeout: Duration,
}

impl InstrumentResolver {
    pub fn new(lookup: Arc<dyn InstrumentLookup>, timeout: Duration) -> Self {
        Self { lookup, timeout }
    }

    /// Parse `symbol` and look up its destination instrument.
    pub async fn resolve(
        &self,
        symbol: &str,
    ) -> CopierResult<(ResolvedInstrument, DestinationInstrument)> {
        let parsed = parse_option_symbol(symbol)?;
        debug!(symbol = %symbol, parsed = %parsed, "Parsed option symbol");

        let destination = match tokio::time::timeout(self.timeout, self.lookup.lookup(&parsed)).await
        {
            Ok(Ok(instrument)) => instrument,
            Ok(Err(CopierError::UnresolvedInstrument { reason, .. })) => {
                return Err(CopierError::unresolved(symbol, reason))
            }
            Ok(Err(e)) => return Err(CopierError::unresolved(symbol, e.to_string())),
            Err(_) => {
                return Err(CopierError::unresolved(
                    symbol,
                    format!("instrument lookup timed out after {:?}", self.timeout),
                ))
            }
        };

        Ok((parsed, destination))
    }
}
