//! Data models for source orders, destination orders, and option instruments.

mod instrument;
mod order;

pub use instrument::{ExchangeSegment, ExpiryKind, OptionType, ResolvedInstrument, Series};
pub use order::{
    DestinationInstrument, DestinationOrderRequest, OrderSide, OrderStatus,
    OrderType, ProductType, SourceOrder, TimeInForce,
};
