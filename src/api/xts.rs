//! XTS client: interactive order entry and the market-data symbol directory.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::{CopierError, CopierResult};
use crate::models::{DestinationInstrument, DestinationOrderRequest, ResolvedInstrument};
use crate::trading::{select_monthly_expiry, InstrumentLookup};

use super::session::SessionToken;
use super::types::{
    parse_expiry_dates, OptionSymbolEntry, PlaceOrderBody, PlaceOrderResult, XtsEnvelope,
};
use super::OrderPlacer;

const XTS_API_BASE: &str = "https://xtsapi.5paisa.com";

/// Client for the XTS interactive and market-data REST APIs.
pub struct XtsClient {
    client: Client,
    base_url: String,
    interactive_token: SessionToken,
    marketdata_token: SessionToken,
}

impl XtsClient {
    pub fn new(
        interactive_token: SessionToken,
        marketdata_token: SessionToken,
        timeout: Duration,
    ) -> CopierResult<Self> {
        Self::with_base_url(
            XTS_API_BASE.to_string(),
            interactive_token,
            marketdata_token,
            timeout,
        )
    }

    /// Create with custom base URL (for testing, or a broker-specific gateway).
    pub fn with_base_url(
        base_url: String,
        interactive_token: SessionToken,
        marketdata_token: SessionToken,
        timeout: Duration,
    ) -> CopierResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CopierError::Auth(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            interactive_token,
            marketdata_token,
        })
    }

    /// Place a market order, returning the destination `AppOrderID`.
    pub async fn place_order(&self, request: &DestinationOrderRequest) -> CopierResult<String> {
        let url = format!("{}/interactive/orders", self.base_url);
        let body = order_body(request);

        debug!(
            url = %url,
            instrument = body.exchange_instrument_id,
            side = %body.order_side,
            qty = body.order_quantity,
            tag = %body.order_unique_identifier,
            "Placing destination order"
        );

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.interactive_token.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| CopierError::PlacementTransportError(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            CopierError::PlacementTransportError(format!("failed to read body: {}", e))
        })?;

        decode_placement(status, &text)
    }

    /// Listed expiries for an underlying, as reported by the symbol directory.
    pub async fn expiry_dates(
        &self,
        instrument: &ResolvedInstrument,
    ) -> CopierResult<Vec<chrono::NaiveDate>> {
        let url = format!(
            "{}/apimarketdata/instruments/instrument/expiryDate",
            self.base_url
        );
        let segment = instrument.exchange.code().to_string();
        let raw: Vec<String> = self
            .marketdata_get(
                &url,
                &[
                    ("exchangeSegment", segment.as_str()),
                    ("series", instrument.series.as_str()),
                    ("symbol", instrument.underlying.as_str()),
                ],
            )
            .await?;
        Ok(parse_expiry_dates(&raw))
    }

    /// Option contracts matching an exact (underlying, expiry, type, strike).
    pub async fn option_symbol(
        &self,
        instrument: &ResolvedInstrument,
    ) -> CopierResult<Vec<OptionSymbolEntry>> {
        let url = format!(
            "{}/apimarketdata/instruments/instrument/optionSymbol",
            self.base_url
        );
        let segment = instrument.exchange.code().to_string();
        let expiry = instrument.expiry_api_format();
        let strike = instrument.strike.to_string();

        self.marketdata_get(
            &url,
            &[
                ("exchangeSegment", segment.as_str()),
                ("series", instrument.series.as_str()),
                ("symbol", instrument.underlying.as_str()),
                ("expiryDate", expiry.as_str()),
                ("optionType", instrument.option_type.as_str()),
                ("strikePrice", strike.as_str()),
            ],
        )
        .await
    }

    async fn marketdata_get<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> CopierResult<T> {
        debug!(url = %url, params = ?params, "Querying symbol directory");

        let symbol = params
            .iter()
            .find(|(k, _)| *k == "symbol")
            .map(|(_, v)| *v)
            .unwrap_or_default();
        let fail = |reason: String| CopierError::unresolved(symbol, reason);

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.marketdata_token.expose())
            .query(params)
            .send()
            .await
            .map_err(|e| fail(format!("symbol directory request failed: {}", e)))?;

        let status = response.status();
        let envelope: XtsEnvelope = response
            .json()
            .await
            .map_err(|e| fail(format!("symbol directory answered {}: {}", status, e)))?;

        envelope
            .into_result()
            .map_err(|f| fail(format!("symbol directory error: {}", f.description)))
    }
}

/// Wire body for a mirrored market order.
fn order_body(request: &DestinationOrderRequest) -> PlaceOrderBody {
    PlaceOrderBody {
        exchange_segment: request.instrument.exchange_segment.clone(),
        exchange_instrument_id: request.instrument.instrument_id,
        product_type: request.product_type.as_str().to_string(),
        order_type: request.order_type.as_str().to_string(),
        order_side: request.side.as_str().to_string(),
        time_in_force: request.time_in_force.as_str().to_string(),
        disclosed_quantity: 0,
        order_quantity: request.quantity,
        limit_price: 0.0,
        stop_price: 0.0,
        order_unique_identifier: request.order_tag.clone(),
    }
}

/// Classify a placement answer: declined by the broker, or no usable answer.
///
/// Server errors and refused sessions (401/403) count as no usable answer.
fn decode_placement(status: StatusCode, body: &str) -> CopierResult<String> {
    let envelope: XtsEnvelope = serde_json::from_str(body).map_err(|e| {
        CopierError::PlacementTransportError(format!(
            "unparseable answer ({}): {} - {}",
            status, e, body
        ))
    })?;

    let result: PlaceOrderResult = envelope.into_result().map_err(|f| {
        let auth_refused = matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN);
        if status.is_server_error() || auth_refused {
            CopierError::PlacementTransportError(format!("{} - {}", status, f.description))
        } else {
            CopierError::PlacementRejected {
                code: f.code,
                message: f.description,
            }
        }
    })?;

    debug!(tag = %result.order_unique_identifier, "Destination accepted order");

    result
        .app_order_id
        .map(|id| id.to_string())
        .ok_or_else(|| {
            CopierError::PlacementTransportError("accepted without an AppOrderID".to_string())
        })
}

#[async_trait]
impl OrderPlacer for XtsClient {
    async fn place(&self, request: &DestinationOrderRequest) -> CopierResult<String> {
        self.place_order(request).await
    }
}

#[async_trait]
impl InstrumentLookup for XtsClient {
    async fn lookup(&self, instrument: &ResolvedInstrument) -> CopierResult<DestinationInstrument> {
        let mut query = instrument.clone();

        if instrument.is_monthly() {
            match self.expiry_dates(instrument).await {
                Ok(listed) => match select_monthly_expiry(&listed, instrument.expiry) {
                    Some(expiry) => query.expiry = expiry,
                    None => warn!(
                        underlying = %instrument.underlying,
                        month = %instrument.expiry.format("%b %Y"),
                        "No listed expiry in month, using placeholder date"
                    ),
                },
                Err(e) => warn!(
                    underlying = %instrument.underlying,
                    error = %e,
                    "Expiry list unavailable, using placeholder date"
                ),
            }
        }

        let entries = self.option_symbol(&query).await?;
        let entry = entries.first().ok_or_else(|| {
            CopierError::unresolved(
                query.underlying.as_str(),
                format!("no destination contract for {}", query),
            )
        })?;

        debug!(
            contract = %query,
            instrument_id = entry.exchange_instrument_id,
            segment = entry.exchange_segment,
            name = %entry.display_name,
            "Destination contract found"
        );

        Ok(DestinationInstrument {
            exchange_segment: query.exchange.as_str().to_string(),
            instrument_id: entry.exchange_instrument_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSide, OrderType, ProductType, TimeInForce};
    use crate::trading::parse_option_symbol;

    fn request() -> DestinationOrderRequest {
        DestinationOrderRequest {
            instrument: DestinationInstrument {
                exchange_segment: "NSEFO".to_string(),
                instrument_id: 45521,
            },
            side: OrderSide::Buy,
            quantity: 150,
            order_type: OrderType::Market,
            product_type: ProductType::Nrml,
            time_in_force: TimeInForce::Day,
            order_tag: "Z2F-251103000012345".to_string(),
        }
    }

    #[test]
    fn test_order_body() {
        let body = order_body(&request());
        assert_eq!(body.exchange_segment, "NSEFO");
        assert_eq!(body.exchange_instrument_id, 45521);
        assert_eq!(body.product_type, "NRML");
        assert_eq!(body.order_type, "MARKET");
        assert_eq!(body.order_side, "BUY");
        assert_eq!(body.order_quantity, 150);
        assert_eq!(body.order_unique_identifier, "Z2F-251103000012345");
    }

    #[test]
    fn test_decode_accepted() {
        let body = r#"{"type": "success", "code": "s-orders-0001", "result": {"AppOrderID": 1100021}}"#;
        assert_eq!(decode_placement(StatusCode::OK, body).unwrap(), "1100021");
    }

    #[test]
    fn test_decode_rejected() {
        let body = r#"{"type": "error", "code": "e-orders-0005", "description": "Insufficient margin"}"#;
        match decode_placement(StatusCode::BAD_REQUEST, body).unwrap_err() {
            CopierError::PlacementRejected { code, message } => {
                assert_eq!(code.as_deref(), Some("e-orders-0005"));
                assert_eq!(message, "Insufficient margin");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_transport_failures() {
        let err = decode_placement(StatusCode::BAD_GATEWAY, "<html></html>").unwrap_err();
        assert!(matches!(err, CopierError::PlacementTransportError(_)));

        let body = r#"{"type": "error", "description": "gateway busy"}"#;
        let err = decode_placement(StatusCode::SERVICE_UNAVAILABLE, body).unwrap_err();
        assert!(matches!(err, CopierError::PlacementTransportError(_)));

        let body = r#"{"type": "success", "result": {}}"#;
        let err = decode_placement(StatusCode::OK, body).unwrap_err();
        assert!(matches!(err, CopierError::PlacementTransportError(_)));
    }

    #[test]
    fn test_decode_session_refused_is_transport() {
        let body = r#"{"type": "error", "code": "e-session-0002", "description": "Invalid Token"}"#;
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err = decode_placement(status, body).unwrap_err();
            assert!(
                matches!(err, CopierError::PlacementTransportError(ref m) if m.contains("Invalid Token")),
                "{} classified as {:?}",
                status,
                err
            );
        }
    }

    fn unreachable_client() -> XtsClient {
        XtsClient::with_base_url(
            "http://127.0.0.1:1".to_string(),
            SessionToken::new("i"),
            SessionToken::new("m"),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unreachable_destination() {
        let err = unreachable_client().place(&request()).await.unwrap_err();
        assert!(matches!(err, CopierError::PlacementTransportError(_)));
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_unresolved() {
        let parsed = parse_option_symbol("NIFTY25N0425800PE").unwrap();
        let err = unreachable_client().lookup(&parsed).await.unwrap_err();
        assert!(matches!(err, CopierError::UnresolvedInstrument { .. }));
    }
}
