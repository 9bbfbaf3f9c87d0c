//! Order models on both sides of the mirror.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Some(OrderSide::Buy),
            "SELL" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-owned order status. Only `Complete` is actionable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Complete,
    Open,
    Cancelled,
    Rejected,
    /// Any transitional status ("TRIGGER PENDING", "VALIDATION PENDING", ...)
    Other(String),
}

impl OrderStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "COMPLETE" => Self::Complete,
            "OPEN" => Self::Open,
            "CANCELLED" => Self::Cancelled,
            "REJECTED" => Self::Rejected,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => f.write_str("COMPLETE"),
            Self::Open => f.write_str("OPEN"),
            Self::Cancelled => f.write_str("CANCELLED"),
            Self::Rejected => f.write_str("REJECTED"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// An order as observed on the source account.
#[derive(Debug, Clone)]
pub struct SourceOrder {
    /// Source-assigned identifier, unique per account
    pub order_id: String,

    /// Trading symbol in source format (e.g. NIFTY25N0425800PE)
    pub symbol: String,

    /// Source exchange (NFO, BFO, ...)
    pub exchange: String,

    pub side: OrderSide,

    /// Filled quantity in units (lots × lot size)
    pub filled_quantity: u32,

    pub status: OrderStatus,

    /// Average fill price, informational only
    pub average_price: Decimal,

    /// Exchange-local placement time, when the source reports one
    pub placed_at: Option<NaiveDateTime>,
}

impl SourceOrder {
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }
}

/// Order type on the destination. Mirrors are always market orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
        }
    }
}

/// Destination product type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductType {
    /// Intraday, squared off by the broker at close
    #[default]
    Mis,
    /// Carry-forward for derivatives
    Nrml,
    /// Delivery
    Cnc,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Mis => "MIS",
            ProductType::Nrml => "NRML",
            ProductType::Cnc => "CNC",
        }
    }
}

impl std::str::FromStr for ProductType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MIS" => Ok(Self::Mis),
            "NRML" => Ok(Self::Nrml),
            "CNC" => Ok(Self::Cnc),
            other => Err(format!("unknown product type: {}", other)),
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination time-in-force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    #[default]
    Day,
    Ioc,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Day => "DAY",
            TimeInForce::Ioc => "IOC",
        }
    }
}

impl std::str::FromStr for TimeInForce {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DAY" => Ok(Self::Day),
            "IOC" => Ok(Self::Ioc),
            other => Err(format!("unknown time in force: {}", other)),
        }
    }
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instrument identity on the destination brokerage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationInstrument {
    /// Exchange segment used for order placement (NSEFO, BSEFO)
    pub exchange_segment: String,

    /// Destination-assigned instrument id
    pub instrument_id: i64,
}

/// A market order to be placed on the destination for one source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationOrderRequest {
    pub instrument: DestinationInstrument,
    pub side: OrderSide,
    pub quantity: u64,
    pub order_type: OrderType,
    pub product_type: ProductType,
    pub time_in_force: TimeInForce,

    /// Client order identifier carried to the destination
    pub order_tag: String,
}

impl DestinationOrderRequest {
    /// Build the mirror of `source`, scaled by `multiplier`.
    pub fn mirror(
        source: &SourceOrder,
        instrument: DestinationInstrument,
        multiplier: u32,
        product_type: ProductType,
        time_in_force: TimeInForce,
        tag_prefix: &str,
    ) -> Self {
        Self {
            instrument,
            side: source.side,
            quantity: scaled_quantity(source.filled_quantity, multiplier),
            order_type: OrderType::Market,
            product_type,
            time_in_force,
            order_tag: format!("{}-{}", tag_prefix, source.order_id),
        }
    }
}

/// `filled × multiplier`, with the multiplier floored at 1.
pub fn scaled_quantity(filled: u32, multiplier: u32) -> u64 {
    u64::from(filled) * u64::from(multiplier.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(filled: u32) -> SourceOrder {
        SourceOrder {
            order_id: "250411000123456".to_string(),
            symbol: "NIFTY25N0425800PE".to_string(),
            exchange: "NFO".to_string(),
            side: OrderSide::Sell,
            filled_quantity: filled,
            status: OrderStatus::Complete,
            average_price: dec!(112.35),
            placed_at: None,
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(OrderStatus::parse("complete"), OrderStatus::Complete);
        assert_eq!(OrderStatus::parse("OPEN"), OrderStatus::Open);
        assert_eq!(
            OrderStatus::parse("TRIGGER PENDING"),
            OrderStatus::Other("TRIGGER PENDING".to_string())
        );
        assert!(!OrderStatus::parse("TRIGGER PENDING").is_complete());
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!(OrderSide::parse("buy"), Some(OrderSide::Buy));
        assert_eq!(OrderSide::parse(" SELL "), Some(OrderSide::Sell));
        assert_eq!(OrderSide::parse("SHORT"), None);
    }

    #[test]
    fn test_scaled_quantity() {
        assert_eq!(scaled_quantity(75, 3), 225);
        assert_eq!(scaled_quantity(75, 1), 75);
        assert_eq!(scaled_quantity(75, 0), 75);
        assert_eq!(scaled_quantity(u32::MAX, u32::MAX), u64::from(u32::MAX) * u64::from(u32::MAX));
    }

    #[test]
    fn test_mirror_request() {
        let instrument = DestinationInstrument {
            exchange_segment: "NSEFO".to_string(),
            instrument_id: 45521,
        };
        let req = DestinationOrderRequest::mirror(
            &order(150),
            instrument.clone(),
            2,
            ProductType::Mis,
            TimeInForce::Day,
            "Z2F",
        );

        assert_eq!(req.instrument, instrument);
        assert_eq!(req.side, OrderSide::Sell);
        assert_eq!(req.quantity, 300);
        assert_eq!(req.order_type, OrderType::Market);
        assert_eq!(req.order_tag, "Z2F-250411000123456");
    }

    #[test]
    fn test_product_and_tif_from_str() {
        assert_eq!("nrml".parse::<ProductType>().unwrap(), ProductType::Nrml);
        assert!("FOO".parse::<ProductType>().is_err());
        assert_eq!("ioc".parse::<TimeInForce>().unwrap(), TimeInForce::Ioc);
    }
}
