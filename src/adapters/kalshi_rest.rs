//! Kalshi REST gateway (native Rust, no external SDK dependency).
//!
//! Normalizes Kalshi payloads into domain markets with probability prices,
//! signs authenticated requests with HMAC-SHA256, spaces requests to stay under
//! the configured per-minute limit, and writes synced markets into the repository.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ExchangeConfig;
use crate::domain::{
    Market, MarketDetail, MarketPage, MarketStatus, OrderResult, OrderStatus, SignalDirection,
};
use crate::error::{AugurError, Result};
use crate::exchange::{ExchangeKind, MarketGateway};
use crate::persistence::Repository;

pub const DEFAULT_KALSHI_API_BASE: &str = "https://api.elections.kalshi.com/trade-api/v2";

/// Markets pulled per sync
const SYNC_MARKET_LIMIT: usize = 1000;
const SYNC_PAGE_SIZE: u32 = 200;

type HmacSha256 = Hmac<Sha256>;

pub struct KalshiGateway {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    dry_run: bool,
    repository: Arc<dyn Repository>,
    min_spacing: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl KalshiGateway {
    pub fn new(config: &ExchangeConfig, dry_run: bool, repository: Arc<dyn Repository>) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let http = Client::builder()
            .user_agent("augur-kalshi-gateway/0.1")
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AugurError::Internal(format!("failed to build Kalshi HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            dry_run,
            repository,
            min_spacing: request_spacing(config.rate_limit_per_minute),
            last_request: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_headers(&self, method: &Method, path: &str, body: &str) -> Result<HeaderMap> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| AugurError::Auth("AUGUR_EXCHANGE__API_KEY is required".to_string()))?;
        let secret = self
            .api_secret
            .as_ref()
            .ok_or_else(|| AugurError::Auth("AUGUR_EXCHANGE__API_SECRET is required".to_string()))?;

        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sign_request(secret, &timestamp, method.as_str(), path, body)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("kalshi-access-key"),
            HeaderValue::from_str(key)
                .map_err(|e| AugurError::Auth(format!("invalid Kalshi API key header: {}", e)))?,
        );
        headers.insert(
            HeaderName::from_static("kalshi-access-signature"),
            HeaderValue::from_str(&signature)
                .map_err(|e| AugurError::Auth(format!("invalid Kalshi signature header: {}", e)))?,
        );
        headers.insert(
            HeaderName::from_static("kalshi-access-timestamp"),
            HeaderValue::from_str(&timestamp)
                .map_err(|e| AugurError::Auth(format!("invalid Kalshi timestamp header: {}", e)))?,
        );

        Ok(headers)
    }

    /// Wait until the minimum spacing since the previous request has elapsed
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_spacing {
                tokio::time::sleep(self.min_spacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<Value>,
        require_auth: bool,
    ) -> Result<Value> {
        self.throttle().await;

        let url = format!("{}{}", self.base_url, path);
        let body_text = body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_else(String::new);

        let mut req = self.http.request(method.clone(), &url);

        if let Some(query) = query {
            req = req.query(query);
        }

        if require_auth {
            let headers = self.auth_headers(&method, path, &body_text)?;
            req = req.headers(headers);
        }

        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json").json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if status.as_u16() == 429 {
            return Err(AugurError::RateLimited(format!(
                "Kalshi API rate limited for {} {}",
                method, path
            )));
        }

        if status.as_u16() == 404 && method == Method::GET {
            return Err(AugurError::MarketNotFound(path.to_string()));
        }

        if !status.is_success() {
            return Err(AugurError::MarketDataUnavailable(format!(
                "Kalshi API {} {} failed: status={} body={}",
                method, path, status, text
            )));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text)
            .map_err(|e| AugurError::InvalidMarketData(format!("invalid Kalshi JSON response: {}", e)))
    }

    fn pick_array<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a [Value]> {
        keys.iter()
            .find_map(|key| root.get(*key).and_then(|v| v.as_array()).map(Vec::as_slice))
    }

    fn pick_obj<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a Value> {
        keys.iter().find_map(|key| root.get(*key).filter(|v| !v.is_null()))
    }

    fn pick_str<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a str> {
        Self::pick_obj(root, keys).and_then(|v| v.as_str())
    }

    fn pick_decimal(root: &Value, keys: &[&str]) -> Option<Decimal> {
        Self::pick_obj(root, keys).and_then(Self::parse_decimalish)
    }

    fn parse_decimalish(value: &Value) -> Option<Decimal> {
        match value {
            Value::String(s) => Decimal::from_str_exact(s.trim()).ok(),
            Value::Number(n) => Decimal::from_str_exact(&n.to_string()).ok(),
            _ => None,
        }
    }

    fn from_cents_if_needed(value: Decimal) -> Decimal {
        if value > Decimal::ONE && value <= Decimal::new(100, 0) {
            value / Decimal::new(100, 0)
        } else {
            value
        }
    }

    fn to_cents(price: Decimal) -> u64 {
        (price * Decimal::new(100, 0)).round_dp(0).to_u64().unwrap_or(0)
    }

    fn map_market(value: &Value) -> Option<Market> {
        let id = Self::pick_str(value, &["ticker", "market_ticker", "id"])?.to_string();
        let title = Self::pick_str(value, &["title", "question", "market_title"])
            .map(ToString::to_string)
            .unwrap_or_else(|| id.clone());

        let yes_price = Self::pick_decimal(value, &["yes_price", "last_price", "yes_ask", "yes_bid"])
            .map(Self::from_cents_if_needed)?;
        let no_price = Self::pick_decimal(value, &["no_price", "no_ask"])
            .map(Self::from_cents_if_needed)
            .unwrap_or(Decimal::ONE - yes_price);

        let status = Self::pick_str(value, &["status", "state"])
            .map(MarketStatus::parse)
            .unwrap_or(MarketStatus::Unknown);

        let close_time = Self::pick_str(value, &["close_time", "close_date", "expiration_time"])
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Some(Market {
            id,
            title,
            subtitle: Self::pick_str(value, &["subtitle", "yes_sub_title"]).map(ToString::to_string),
            category: Self::pick_str(value, &["category", "series_category"]).map(ToString::to_string),
            status,
            yes_price,
            no_price,
            volume: Self::pick_decimal(value, &["volume", "volume_24h"]).unwrap_or(Decimal::ZERO),
            open_interest: Self::pick_decimal(value, &["open_interest"]).unwrap_or(Decimal::ZERO),
            close_time,
            updated_at: Utc::now(),
        })
    }

    fn map_order_result(order: &Value, fallback_id: &str, requested: i64) -> OrderResult {
        let order_id = Self::pick_str(order, &["order_id", "id", "client_order_id"])
            .unwrap_or(fallback_id)
            .to_string();

        let status = Self::pick_str(order, &["status", "state"])
            .map(OrderStatus::parse)
            .unwrap_or(OrderStatus::Submitted);

        let filled_quantity = Self::pick_decimal(order, &["filled_count", "fill_count"])
            .and_then(|d| d.round_dp(0).to_i64())
            .or_else(|| {
                Self::pick_decimal(order, &["remaining_count"])
                    .and_then(|d| d.round_dp(0).to_i64())
                    .map(|remaining| (requested - remaining).max(0))
            })
            .unwrap_or(if status == OrderStatus::Filled { requested } else { 0 });

        let avg_fill_price = Self::pick_decimal(
            order,
            &["avg_fill_price", "average_price", "yes_price", "no_price", "price"],
        )
        .map(Self::from_cents_if_needed);

        OrderResult {
            order_id,
            status,
            filled_quantity,
            avg_fill_price,
        }
    }

    fn status_param(status: MarketStatus) -> &'static str {
        match status {
            MarketStatus::Active => "open",
            MarketStatus::Closed => "closed",
            MarketStatus::Settled => "settled",
            MarketStatus::Unknown => "unopened",
        }
    }
}

/// base64(HMAC-SHA256(secret, timestamp + METHOD + path + body))
pub fn sign_request(secret: &str, timestamp: &str, method: &str, path: &str, body: &str) -> Result<String> {
    let payload = format!("{}{}{}{}", timestamp, method.to_uppercase(), path, body);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AugurError::Auth(format!("invalid Kalshi secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

/// Minimum spacing between requests for a per-minute budget
fn request_spacing(rate_limit_per_minute: u32) -> Duration {
    if rate_limit_per_minute == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(60_000 / u64::from(rate_limit_per_minute))
}

#[async_trait]
impl MarketGateway for KalshiGateway {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Kalshi
    }

    async fn ping(&self) -> Result<()> {
        self.request_json(Method::GET, "/exchange/status", None, None, false)
            .await
            .map(|_| ())
    }

    async fn list_markets(
        &self,
        status: Option<MarketStatus>,
        limit: u32,
        cursor: Option<String>,
    ) -> Result<MarketPage> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(status) = status {
            params.push(("status", Self::status_param(status).to_string()));
        }
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }

        let value = self
            .request_json(Method::GET, "/markets", Some(&params), None, false)
            .await?;

        let raw = Self::pick_array(&value, &["markets", "data", "results"]).ok_or_else(|| {
            AugurError::InvalidMarketData("Kalshi /markets response has no markets array".to_string())
        })?;

        let mut markets = Vec::with_capacity(raw.len());
        for entry in raw {
            match Self::map_market(entry) {
                Some(market) => markets.push(market),
                None => debug!(entry = %entry, "skipping Kalshi market without ticker or price"),
            }
        }

        let cursor = Self::pick_str(&value, &["cursor"])
            .filter(|c| !c.trim().is_empty())
            .map(ToString::to_string);

        Ok(MarketPage { markets, cursor })
    }

    async fn get_market(&self, market_id: &str) -> Result<MarketDetail> {
        let path = format!("/markets/{}", market_id);
        let value = self
            .request_json(Method::GET, &path, None, None, false)
            .await?;
        let market = Self::pick_obj(&value, &["market", "data"]).unwrap_or(&value);
        Self::map_market(market).ok_or_else(|| {
            AugurError::InvalidMarketData(format!("Kalshi market {} has no usable price", market_id))
        })
    }

    async fn place_order(
        &self,
        market_id: &str,
        direction: SignalDirection,
        quantity: i64,
        price: Option<Decimal>,
    ) -> Result<OrderResult> {
        // Selling a market is expressed as buying its NO contracts
        let side = match direction {
            SignalDirection::Buy => "yes",
            SignalDirection::Sell => "no",
            SignalDirection::Hold => {
                return Err(AugurError::Validation("cannot place a hold order".to_string()))
            }
        };
        if quantity <= 0 {
            return Err(AugurError::Validation(format!(
                "order quantity must be positive, got {quantity}"
            )));
        }

        let client_order_id = Uuid::new_v4().to_string();

        if self.dry_run {
            let fill_price = match price {
                Some(p) => p,
                None => self
                    .get_market(market_id)
                    .await?
                    .price_for(direction)
                    .unwrap_or(Decimal::ZERO),
            };
            info!(
                "[DRY RUN] Kalshi {} {} {} @ {}",
                direction, quantity, market_id, fill_price
            );
            return Ok(OrderResult::filled(client_order_id, quantity, fill_price));
        }

        let mut body = json!({
            "ticker": market_id,
            "client_order_id": client_order_id,
            "action": "buy",
            "side": side,
            "count": quantity,
            "type": if price.is_some() { "limit" } else { "market" },
        });
        if let Some(limit) = price {
            body[format!("{}_price", side)] = json!(Self::to_cents(limit));
        }

        let value = self
            .request_json(Method::POST, "/portfolio/orders", None, Some(body), true)
            .await?;
        let order = Self::pick_obj(&value, &["order", "data", "result"]).unwrap_or(&value);
        let result = Self::map_order_result(order, &client_order_id, quantity);

        if result.status == OrderStatus::Rejected {
            return Err(AugurError::OrderRejected(format!(
                "Kalshi rejected order {} for {}",
                result.order_id, market_id
            )));
        }

        Ok(result)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }

        let path = format!("/portfolio/orders/{}/cancel", order_id);
        match self
            .request_json(Method::POST, &path, None, Some(json!({})), true)
            .await
        {
            Ok(_) => Ok(()),
            Err(first_err) => {
                let delete_path = format!("/portfolio/orders/{}", order_id);
                self.request_json(Method::DELETE, &delete_path, None, None, true)
                    .await
                    .map(|_| ())
                    .map_err(|_| first_err)
            }
        }
    }

    async fn sync_market_data(&self) -> Result<bool> {
        info!("Starting market data synchronization");

        let mut markets = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .list_markets(Some(MarketStatus::Active), SYNC_PAGE_SIZE, cursor)
                .await?;
            markets.extend(page.markets);
            cursor = page.cursor;
            if cursor.is_none() || markets.len() >= SYNC_MARKET_LIMIT {
                break;
            }
        }
        markets.truncate(SYNC_MARKET_LIMIT);

        if markets.is_empty() {
            warn!("Kalshi returned no active markets");
            return Ok(false);
        }

        let mut failures = 0usize;
        for market in &markets {
            let stored: Result<()> = async {
                self.repository.upsert_market(market).await?;
                self.repository
                    .record_price_point(&market.id, market.yes_price, market.no_price, Some(market.volume))
                    .await
            }
            .await;

            if let Err(e) = stored {
                failures += 1;
                warn!(market_id = %market.id, error = %e, "failed to store synced market");
            }
        }

        info!(
            "Market data synchronization completed: {} markets, {} failures",
            markets.len(),
            failures
        );
        Ok(failures < markets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn from_cents_is_applied_for_small_integer_prices() {
        assert_eq!(KalshiGateway::from_cents_if_needed(dec!(42)), dec!(0.42));
        assert_eq!(KalshiGateway::from_cents_if_needed(dec!(0.42)), dec!(0.42));
        assert_eq!(KalshiGateway::to_cents(dec!(0.425)), 42);
    }

    #[test]
    fn map_market_normalizes_prices_and_status() {
        let raw = json!({
            "ticker": "PRES-2028-DEM",
            "title": "Will the Democratic candidate win the presidential election?",
            "category": "Politics",
            "status": "open",
            "yes_ask": 42,
            "volume": 1200,
            "close_time": "2028-11-07T00:00:00Z"
        });

        let market = KalshiGateway::map_market(&raw).expect("market");
        assert_eq!(market.id, "PRES-2028-DEM");
        assert_eq!(market.yes_price, dec!(0.42));
        assert_eq!(market.no_price, dec!(0.58));
        assert_eq!(market.status, MarketStatus::Active);
        assert!(market.close_time.is_some());

        assert!(KalshiGateway::map_market(&json!({ "title": "no ticker" })).is_none());
    }

    #[test]
    fn map_order_result_derives_fill_from_remaining() {
        let raw = json!({ "order_id": "abc", "status": "executed", "remaining_count": 3, "yes_price": 41 });
        let result = KalshiGateway::map_order_result(&raw, "fallback", 10);
        assert_eq!(result.order_id, "abc");
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.filled_quantity, 7);
        assert_eq!(result.avg_fill_price, Some(dec!(0.41)));
    }

    #[test]
    fn signature_is_deterministic() {
        let a = sign_request("secret", "1700000000000", "post", "/portfolio/orders", "{}").unwrap();
        let b = sign_request("secret", "1700000000000", "POST", "/portfolio/orders", "{}").unwrap();
        assert_eq!(a, b);
        let c = sign_request("other", "1700000000000", "POST", "/portfolio/orders", "{}").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn request_spacing_from_rate_limit() {
        assert_eq!(request_spacing(100), Duration::from_millis(600));
        assert_eq!(request_spacing(0), Duration::ZERO);
    }
}
