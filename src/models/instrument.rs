//! Option contract identity decoded from a source trading symbol.

use chrono::NaiveDate;

/// Destination option series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    /// Index options
    Optidx,
    /// Stock options
    Optstk,
}

impl Series {
    pub fn as_str(&self) -> &'static str {
        match self {
            Series::Optidx => "OPTIDX",
            Series::Optstk => "OPTSTK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    Ce,
    Pe,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Ce => "CE",
            OptionType::Pe => "PE",
        }
    }
}

/// Whether the symbol carried an exact expiry day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryKind {
    /// `YY M DD` form: exact date encoded
    Weekly,
    /// `YY MON` form: month only, day is a placeholder (1st)
    Monthly,
}

/// Exchange segment on the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeSegment {
    NseFo,
    BseFo,
}

impl ExchangeSegment {
    /// Segment name used when placing orders.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeSegment::NseFo => "NSEFO",
            ExchangeSegment::BseFo => "BSEFO",
        }
    }

    /// Numeric segment code used by market-data endpoints.
    pub fn code(&self) -> u8 {
        match self {
            ExchangeSegment::NseFo => 2,
            ExchangeSegment::BseFo => 12,
        }
    }
}

/// Decoded option contract. Derived from the symbol; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstrument {
    pub series: Series,
    pub underlying: String,
    pub expiry: NaiveDate,
    pub expiry_kind: ExpiryKind,
    pub option_type: OptionType,
    pub strike: u32,
    pub exchange: ExchangeSegment,
}

impl ResolvedInstrument {
    /// Expiry formatted the way the destination symbol directory expects (04Nov2025).
    pub fn expiry_api_format(&self) -> String {
        format_expiry(self.expiry)
    }

    pub fn is_monthly(&self) -> bool {
        self.expiry_kind == ExpiryKind::Monthly
    }
}

/// `DDMonYYYY`, e.g. `25Nov2025`.
pub fn format_expiry(date: NaiveDate) -> String {
    date.format("%d%b%Y").to_string()
}

impl std::fmt::Display for ResolvedInstrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.series.as_str(),
            self.underlying,
            self.expiry_api_format(),
            self.strike,
            self.option_type.as_str()
        )?;
        if self.is_monthly() {
            f.write_str(" (monthly)")?;
        }
        Ok(())
    }
}
