//! Low-level Binance USDT-M Futures REST client: rate gating, retries,
//! request signing and response caching. `gateway.rs` wires this onto
//! `fleet_core::ExchangeGateway`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use chrono::Utc;
use fleet_core::ExchangeCredentials;
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;

use crate::signing::sign_query;

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE_MILLIS: u64 = 1000;
const EXCHANGE_INFO_TTL: Duration = Duration::from_secs(30);
const LEVERAGE_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct CachedValue<T: Clone> {
    fetched_at: Instant,
    value: T,
}

pub struct BinanceClient {
    http: Client,
    base_url: String,
    credentials: ExchangeCredentials,
    last_request_at: Mutex<Option<Instant>>,
    exchange_info_cache: Mutex<Option<CachedValue<serde_json::Value>>>,
    leverage_cache: Mutex<HashMap<String, CachedValue<u32>>>,
}

impl BinanceClient {
    #[must_use]
    pub fn new(base_url: String, credentials: ExchangeCredentials) -> Self {
        Self {
            http: Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default(),
            base_url,
            credentials,
            last_request_at: Mutex::new(None),
            exchange_info_cache: Mutex::new(None),
            leverage_cache: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn credentials(&self) -> &ExchangeCredentials {
        &self.credentials
    }

    /// Blocks until at least [`MIN_REQUEST_INTERVAL`] has elapsed since the
    /// last request of any kind (signed or unsigned) across this client.
    async fn wait_for_gate(&self) {
        let mut last = self.last_request_at.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn signed_query(&self, mut params: Vec<(String, String)>) -> String {
        params.push(("timestamp".to_string(), Utc::now().timestamp_millis().to_string()));
        let querystring = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = sign_query(&self.credentials.api_secret, &querystring);
        format!("{querystring}&signature={signature}")
    }

    fn unsigned_query(params: &[(String, String)]) -> String {
        params.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&")
    }

    /// GET an unsigned endpoint. Returns `Ok(None)` for 401/403/451; retries
    /// 429/5xx up to [`MAX_RETRIES`] with exponential backoff.
    ///
    /// # Errors
    /// Returns an error if the request cannot be sent or retries are
    /// exhausted on a transient failure.
    pub async fn get_unsigned(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Option<serde_json::Value>> {
        let query = Self::unsigned_query(params);
        let url = if query.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query}", self.base_url)
        };
        self.execute_with_retry(|| self.http.get(&url)).await
    }

    /// GET a signed endpoint (`X-MBX-APIKEY` header + HMAC-signed querystring).
    ///
    /// # Errors
    /// Returns an error if the request cannot be sent or retries are
    /// exhausted on a transient failure.
    pub async fn get_signed(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<Option<serde_json::Value>> {
        let query = self.signed_query(params);
        let url = format!("{}{path}?{query}", self.base_url);
        let api_key = self.credentials.api_key.clone();
        self.execute_with_retry(|| self.http.get(&url).header("X-MBX-APIKEY", &api_key)).await
    }

    /// POST a signed endpoint with an empty body, parameters carried in the
    /// querystring (Binance Futures convention for `/fapi/v1/order` etc).
    ///
    /// # Errors
    /// Returns an error if the request cannot be sent or retries are
    /// exhausted on a transient failure.
    pub async fn post_signed(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<Option<serde_json::Value>> {
        let query = self.signed_query(params);
        let url = format!("{}{path}?{query}", self.base_url);
        let api_key = self.credentials.api_key.clone();
        self.execute_with_retry(|| self.http.post(&url).header("X-MBX-APIKEY", &api_key)).await
    }

    /// DELETE a signed endpoint.
    ///
    /// # Errors
    /// Returns an error if the request cannot be sent or retries are
    /// exhausted on a transient failure.
    pub async fn delete_signed(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<Option<serde_json::Value>> {
        let query = self.signed_query(params);
        let url = format!("{}{path}?{query}", self.base_url);
        let api_key = self.credentials.api_key.clone();
        self.execute_with_retry(|| self.http.delete(&url).header("X-MBX-APIKEY", &api_key)).await
    }

    async fn execute_with_retry<F>(&self, build: F) -> Result<Option<serde_json::Value>>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            self.wait_for_gate().await;
            let response = build().send().await.context("binance request failed to send")?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED
                || status == StatusCode::FORBIDDEN
                || status.as_u16() == 451
            {
                tracing::warn!(%status, "binance request unavailable, not retrying");
                return Ok(None);
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                attempt += 1;
                if attempt >= MAX_RETRIES {
                    tracing::warn!(%status, attempt, "binance request exhausted retries");
                    return Ok(None);
                }
                let backoff = Duration::from_millis(BACKOFF_BASE_MILLIS * 2u64.pow(attempt - 1));
                tracing::debug!(%status, attempt, ?backoff, "retrying binance request");
                tokio::time::sleep(backoff).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("binance request failed with status {status}: {body}");
            }

            let json = response.json().await.context("binance response was not valid JSON")?;
            return Ok(Some(json));
        }
    }

    /// Fetches `/fapi/v1/exchangeInfo`, caching the raw payload for 30 s.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn exchange_info(&self) -> Result<Option<serde_json::Value>> {
        {
            let cache = self.exchange_info_cache.lock().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < EXCHANGE_INFO_TTL {
                    return Ok(Some(cached.value.clone()));
                }
            }
        }

        let Some(value) = self.get_unsigned("/fapi/v1/exchangeInfo", &[]).await? else {
            return Ok(None);
        };

        let mut cache = self.exchange_info_cache.lock().await;
        *cache = Some(CachedValue { fetched_at: Instant::now(), value: value.clone() });
        Ok(Some(value))
    }

    /// Reads a symbol's cached leverage bracket if fetched within the last
    /// hour.
    pub async fn cached_leverage(&self, symbol: &str) -> Option<u32> {
        let cache = self.leverage_cache.lock().await;
        cache.get(symbol).and_then(|cached| {
            (cached.fetched_at.elapsed() < LEVERAGE_CACHE_TTL).then_some(cached.value)
        })
    }

    pub async fn cache_leverage(&self, symbol: &str, leverage: u32) {
        let mut cache = self.leverage_cache.lock().await;
        cache.insert(symbol.to_string(), CachedValue { fetched_at: Instant::now(), value: leverage });
    }
}
