//! Kite Connect client for reading the source order book.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use tracing::debug;

use crate::error::{CopierError, CopierResult};
use crate::models::SourceOrder;

use super::session::SessionToken;
use super::types::{KiteEnvelope, KiteOrder};
use super::OrderSource;

const KITE_API_BASE: &str = "https://api.kite.trade";
const KITE_API_VERSION: &str = "3";

/// Client for the Kite Connect REST API (read-only use).
pub struct KiteClient {
    client: Client,
    base_url: String,
}

impl KiteClient {
    /// Create a client against the production API.
    pub fn new(api_key: &str, access_token: SessionToken, timeout: Duration) -> CopierResult<Self> {
        Self::with_base_url(KITE_API_BASE.to_string(), api_key, access_token, timeout)
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(
        base_url: String,
        api_key: &str,
        access_token: SessionToken,
        timeout: Duration,
    ) -> CopierResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(Self::headers(api_key, &access_token)?)
            .build()
            .map_err(|e| CopierError::Auth(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn headers(api_key: &str, access_token: &SessionToken) -> CopierResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Kite-Version", HeaderValue::from_static(KITE_API_VERSION));

        let mut auth = HeaderValue::from_str(&format!(
            "token {}:{}",
            api_key,
            access_token.expose()
        ))
        .map_err(|_| CopierError::Auth("access token contains invalid characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        Ok(headers)
    }

    /// Fetch the day's orders.
    pub async fn get_orders(&self) -> CopierResult<Vec<SourceOrder>> {
        let url = format!("{}/orders", self.base_url);
        debug!(url = %url, "Fetching source orders");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CopierError::SourceUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CopierError::SourceUnavailable(format!("failed to read body: {}", e)))?;

        decode_orders(status, &body)
    }
}

/// Turn a `/orders` HTTP answer into source orders.
fn decode_orders(status: reqwest::StatusCode, body: &str) -> CopierResult<Vec<SourceOrder>> {
    let envelope: KiteEnvelope<Vec<KiteOrder>> = serde_json::from_str(body).map_err(|e| {
        if status.is_success() {
            CopierError::SourceUnavailable(format!("failed to parse orders: {}", e))
        } else {
            CopierError::SourceUnavailable(format!("orders request failed: {} - {}", status, body))
        }
    })?;

    if !status.is_success() || envelope.status != "success" {
        return Err(CopierError::SourceUnavailable(format!(
            "orders request failed: {} {} - {}",
            status, envelope.error_type, envelope.message
        )));
    }

    Ok(envelope
        .data
        .unwrap_or_default()
        .into_iter()
        .filter_map(KiteOrder::into_source_order)
        .collect())
}

#[async_trait]
impl OrderSource for KiteClient {
    async fn list_orders(&self) -> CopierResult<Vec<SourceOrder>> {
        self.get_orders().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_decode_success() {
        let body = r#"{"status": "success", "data": [
            {"order_id": "1", "tradingsymbol": "NIFTY25N0425800PE", "transaction_type": "BUY",
             "status": "COMPLETE", "quantity": 75, "filled_quantity": 75, "average_price": 10.5}
        ]}"#;
        let orders = decode_orders(StatusCode::OK, body).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, "1");
    }

    #[test]
    fn test_decode_empty_book() {
        let body = r#"{"status": "success", "data": []}"#;
        assert!(decode_orders(StatusCode::OK, body).unwrap().is_empty());
    }

    #[test]
    fn test_decode_token_error() {
        let body = r#"{"status": "error", "message": "Invalid session", "error_type": "TokenException"}"#;
        let err = decode_orders(StatusCode::FORBIDDEN, body).unwrap_err();
        match err {
            CopierError::SourceUnavailable(msg) => assert!(msg.contains("TokenException")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode_orders(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, CopierError::SourceUnavailable(_)));

        let err = decode_orders(StatusCode::OK, "not json").unwrap_err();
        assert!(matches!(err, CopierError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_source() {
        let client = KiteClient::with_base_url(
            "http://127.0.0.1:1".to_string(),
            "key",
            SessionToken::new("token"),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.list_orders().await.unwrap_err();
        assert!(matches!(err, CopierError::SourceUnavailable(_)));
    }

    #[test]
    fn test_rejects_bad_token_characters() {
        let result = KiteClient::new("key", SessionToken::new("bad\ntoken"), Duration::from_secs(5));
        assert!(matches!(result, Err(CopierError::Auth(_))));
    }
}
