//! Wire types for the Kite Connect and XTS REST APIs.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{OrderSide, OrderStatus, SourceOrder};

const KITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const XTS_EXPIRY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ==================== Kite ====================

/// Kite response envelope: `{"status": "success", "data": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct KiteEnvelope<T> {
    pub status: String,
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_type: String,
}

/// Order from `GET /orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct KiteOrder {
    pub order_id: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub tradingsymbol: String,
    #[serde(default)]
    pub transaction_type: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub filled_quantity: u32,
    #[serde(default)]
    pub average_price: Decimal,
    #[serde(default)]
    pub order_timestamp: Option<String>,
}

impl KiteOrder {
    /// Convert to a [`SourceOrder`]; orders with an unknown side are dropped.
    pub fn into_source_order(self) -> Option<SourceOrder> {
        let side = match OrderSide::parse(&self.transaction_type) {
            Some(side) => side,
            None => {
                warn!(
                    order_id = %self.order_id,
                    side = %self.transaction_type,
                    "Unknown transaction type"
                );
                return None;
            }
        };

        let filled_quantity = if self.filled_quantity > 0 {
            self.filled_quantity
        } else {
            self.quantity
        };

        let placed_at = self
            .order_timestamp
            .as_deref()
            .and_then(|ts| NaiveDateTime::parse_from_str(ts, KITE_TIMESTAMP_FORMAT).ok());

        Some(SourceOrder {
            order_id: self.order_id,
            symbol: self.tradingsymbol,
            exchange: self.exchange,
            side,
            filled_quantity,
            status: OrderStatus::parse(self.status.as_deref().unwrap_or_default()),
            average_price: self.average_price,
            placed_at,
        })
    }
}

// ==================== XTS ====================

/// XTS response envelope: `{"type": "success", "code": ..., "result": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct XtsEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

/// Non-success XTS answer.
#[derive(Debug, Clone, PartialEq)]
pub struct XtsFailure {
    pub code: Option<String>,
    pub description: String,
}

impl XtsEnvelope {
    pub fn is_success(&self) -> bool {
        self.kind.eq_ignore_ascii_case("success")
    }

    /// Decode `result` as `T`, or describe why the call failed.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, XtsFailure> {
        if !self.is_success() {
            return Err(XtsFailure {
                code: Some(self.code).filter(|c| !c.is_empty()),
                description: if self.description.is_empty() {
                    format!("response type {}", self.kind)
                } else {
                    self.description
                },
            });
        }

        serde_json::from_value(self.result).map_err(|e| XtsFailure {
            code: None,
            description: format!("unexpected result payload: {}", e),
        })
    }
}

/// Body for `POST /interactive/orders`.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderBody {
    #[serde(rename = "exchangeSegment")]
    pub exchange_segment: String,
    #[serde(rename = "exchangeInstrumentID")]
    pub exchange_instrument_id: i64,
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "orderType")]
    pub order_type: String,
    #[serde(rename = "orderSide")]
    pub order_side: String,
    #[serde(rename = "timeInForce")]
    pub time_in_force: String,
    #[serde(rename = "disclosedQuantity")]
    pub disclosed_quantity: u64,
    #[serde(rename = "orderQuantity")]
    pub order_quantity: u64,
    #[serde(rename = "limitPrice")]
    pub limit_price: f64,
    #[serde(rename = "stopPrice")]
    pub stop_price: f64,
    #[serde(rename = "orderUniqueIdentifier")]
    pub order_unique_identifier: String,
}

/// XTS returns order ids as numbers, some gateways as strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AppOrderId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for AppOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppOrderId::Number(n) => write!(f, "{}", n),
            AppOrderId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderResult {
    #[serde(rename = "AppOrderID", alias = "appOrderID")]
    pub app_order_id: Option<AppOrderId>,
    #[serde(rename = "OrderUniqueIdentifier", default)]
    pub order_unique_identifier: String,
}

/// Entry from `instruments/instrument/optionSymbol`.
#[derive(Debug, Clone, Deserialize)]
pub struct OptionSymbolEntry {
    #[serde(rename = "ExchangeInstrumentID")]
    pub exchange_instrument_id: i64,
    #[serde(rename = "ExchangeSegment", default)]
    pub exchange_segment: i64,
    #[serde(rename = "DisplayName", default)]
    pub display_name: String,
}

/// Parse the `instruments/instrument/expiryDate` list, skipping malformed entries.
pub fn parse_expiry_dates(raw: &[String]) -> Vec<NaiveDate> {
    raw.iter()
        .filter_map(|s| NaiveDateTime::parse_from_str(s, XTS_EXPIRY_FORMAT).ok())
        .map(|dt| dt.date())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kite_orders_payload() {
        let body = r#"{
            "status": "success",
            "data": [
                {
                    "order_id": "251103000012345",
                    "exchange": "NFO",
                    "tradingsymbol": "NIFTY25N0425800PE",
                    "transaction_type": "BUY",
                    "status": "COMPLETE",
                    "quantity": 75,
                    "filled_quantity": 75,
                    "average_price": 112.35,
                    "order_timestamp": "2025-11-03 10:15:32"
                },
                {
                    "order_id": "251103000012346",
                    "exchange": "NFO",
                    "tradingsymbol": "NIFTY25N0425900CE",
                    "transaction_type": "SELL",
                    "status": "TRIGGER PENDING",
                    "quantity": 150,
                    "filled_quantity": 0,
                    "average_price": 0,
                    "order_timestamp": null
                },
                {
                    "order_id": "251103000012347",
                    "tradingsymbol": "X",
                    "transaction_type": "HOLD",
                    "status": "COMPLETE"
                }
            ]
        }"#;

        let envelope: KiteEnvelope<Vec<KiteOrder>> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.status, "success");

        let orders: Vec<SourceOrder> = envelope
            .data
            .unwrap()
            .into_iter()
            .filter_map(KiteOrder::into_source_order)
            .collect();
        assert_eq!(orders.len(), 2);

        let first = &orders[0];
        assert_eq!(first.order_id, "251103000012345");
        assert_eq!(first.side, OrderSide::Buy);
        assert!(first.is_complete());
        assert_eq!(first.filled_quantity, 75);
        assert_eq!(first.average_price, dec!(112.35));
        assert!(first.placed_at.is_some());

        let second = &orders[1];
        assert_eq!(second.status, OrderStatus::Other("TRIGGER PENDING".to_string()));
        // Unfilled: falls back to the order quantity
        assert_eq!(second.filled_quantity, 150);
        assert!(second.placed_at.is_none());
    }

    #[test]
    fn test_kite_error_envelope() {
        let body = r#"{"status": "error", "message": "Incorrect `api_key` or `access_token`.", "error_type": "TokenException", "data": null}"#;
        let envelope: KiteEnvelope<Vec<KiteOrder>> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.error_type, "TokenException");
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_xts_place_order_success() {
        let body = r#"{
            "type": "success",
            "code": "s-orders-0001",
            "description": "Request sent",
            "result": {"AppOrderID": 1100021, "OrderUniqueIdentifier": "Z2F-251103000012345"}
        }"#;
        let envelope: XtsEnvelope = serde_json::from_str(body).unwrap();
        let result: PlaceOrderResult = envelope.into_result().unwrap();
        assert_eq!(result.app_order_id.unwrap().to_string(), "1100021");
        assert_eq!(result.order_unique_identifier, "Z2F-251103000012345");
    }

    #[test]
    fn test_xts_error_envelope() {
        let body = r#"{"type": "error", "code": "e-orders-0005", "description": "Insufficient margin", "result": {}}"#;
        let envelope: XtsEnvelope = serde_json::from_str(body).unwrap();
        let failure = envelope.into_result::<PlaceOrderResult>().unwrap_err();
        assert_eq!(failure.code.as_deref(), Some("e-orders-0005"));
        assert_eq!(failure.description, "Insufficient margin");
    }

    #[test]
    fn test_option_symbol_and_expiry_payloads() {
        let body = r#"{
            "type": "success",
            "result": [{"ExchangeSegment": 2, "ExchangeInstrumentID": 45521, "DisplayName": "NIFTY 04NOV2025 PE 25800"}]
        }"#;
        let envelope: XtsEnvelope = serde_json::from_str(body).unwrap();
        let entries: Vec<OptionSymbolEntry> = envelope.into_result().unwrap();
        assert_eq!(entries[0].exchange_instrument_id, 45521);

        let raw = vec![
            "2025-11-04T14:30:00".to_string(),
            "garbage".to_string(),
            "2025-11-25T14:30:00".to_string(),
        ];
        let dates = parse_expiry_dates(&raw);
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2025, 11, 25).unwrap());
    }

    #[test]
    fn test_place_order_body_field_names() {
        let body = PlaceOrderBody {
            exchange_segment: "NSEFO".to_string(),
            exchange_instrument_id: 45521,
            product_type: "MIS".to_string(),
            order_type: "MARKET".to_string(),
            order_side: "BUY".to_string(),
            time_in_force: "DAY".to_string(),
            disclosed_quantity: 0,
            order_quantity: 150,
            limit_price: 0.0,
            stop_price: 0.0,
            order_unique_identifier: "Z2F-1".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["exchangeInstrumentID"], 45521);
        assert_eq!(json["orderQuantity"], 150);
        assert_eq!(json["orderType"], "MARKET");
    }
}
