//! Brokerage API clients: Kite Connect (source) and XTS (destination).

mod kite;
mod session;
mod types;
mod xts;

use async_trait::async_trait;

use crate::error::CopierResult;
use crate::models::{DestinationOrderRequest, SourceOrder};

pub use kite::KiteClient;
pub use session::{acquire_session, SessionToken, StaticSession};
pub use xts::XtsClient;

/// Read access to the source account's order book for the current day.
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Every order the source reports, in source order. Errors are `SourceUnavailable`.
    async fn list_orders(&self) -> CopierResult<Vec<SourceOrder>>;
}

/// Order entry on the destination account.
#[async_trait]
pub trait OrderPlacer: Send + Sync {
    /// Place one order and return the destination order id.
    ///
    /// Errors are `PlacementRejected` when the destination answered and
    /// declined, `PlacementTransportError` when no usable answer arrived.
    async fn place(&self, request: &DestinationOrderRequest) -> CopierResult<String>;
}
