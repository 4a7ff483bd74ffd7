// ===============================
// src/feed.rs
// ===============================
//
// Market Data adapter (Bybit REST, read-only):
// - fetch_ticker : satu kategori (spot / linear) -> Option<TickerSnapshot>
// - fetch_both   : spot + linear paralel; gagal satu tidak membatalkan yang lain
//
// Semua error transport/HTTP/decode ditelan di sini (di-log + metrics),
// engine hanya pernah melihat `None`.
//
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::bybit::{self, TickersResponse, BROWSER_HEADERS, TICKERS_PATH};
use crate::domain::{Category, TickerSnapshot};
use crate::metrics::FETCHES;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("bybit responded {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
    #[error("request sent but no response: {0}")]
    NoResponse(reqwest::Error),
    #[error("request failed: {0}")]
    Request(reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            FetchError::NoResponse(e)
        } else {
            FetchError::Request(e)
        }
    }
}

#[derive(Clone, Debug)]
pub struct BybitClient {
    http: reqwest::Client,
    rest_base: String,
    quote_asset: String,
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (k, v) in BROWSER_HEADERS {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
            headers.insert(name, value);
        }
    }
    headers
}

impl BybitClient {
    pub fn new(rest_base: &str, quote_asset: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .default_headers(default_headers())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            rest_base: rest_base.trim_end_matches('/').to_string(),
            quote_asset: quote_asset.to_ascii_uppercase(),
        })
    }

    /// "btc" -> "BTCUSDT"
    pub fn pair(&self, base: &str) -> String {
        format!("{}{}", base.trim().to_ascii_uppercase(), self.quote_asset)
    }

    async fn request(&self, pair: &str, category: Category) -> Result<TickersResponse, FetchError> {
        let url = format!("{}{}", self.rest_base, TICKERS_PATH);
        let rsp = self
            .http
            .get(url)
            .query(&[("category", category.as_str()), ("symbol", pair)])
            .send()
            .await?;

        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }
        Ok(rsp.json::<TickersResponse>().await?)
    }

    /// Ambil ticker satu kategori. Error apapun -> None (sudah di-log).
    pub async fn fetch_ticker(&self, base: &str, category: Category) -> Option<TickerSnapshot> {
        let pair = self.pair(base);
        let cat = category.as_str();
        match self.request(&pair, category).await {
            Ok(resp) => {
                let snap = bybit::normalize(category, resp);
                let outcome = if snap.is_some() { "ok" } else { "empty" };
                FETCHES.with_label_values(&[cat, outcome]).inc();
                if snap.is_none() {
                    debug!(%pair, category = cat, "no ticker data");
                }
                snap
            }
            Err(e) => {
                match &e {
                    FetchError::Status { status, body } => {
                        error!(%pair, category = cat, %status, %body, "ticker fetch failed")
                    }
                    FetchError::NoResponse(err) => {
                        warn!(%pair, category = cat, ?err, "ticker fetch: request sent but no response")
                    }
                    FetchError::Request(err) => {
                        error!(%pair, category = cat, %err, "ticker fetch error")
                    }
                }
                FETCHES.with_label_values(&[cat, "error"]).inc();
                None
            }
        }
    }

    /// Spot + futures (linear) secara paralel.
    pub async fn fetch_both(&self, base: &str) -> (Option<TickerSnapshot>, Option<TickerSnapshot>) {
        tokio::join!(
            self.fetch_ticker(base, Category::Spot),
            self.fetch_ticker(base, Category::Linear)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_appends_quote_asset() {
        let c = BybitClient::new("https://api.bybit.com/", "usdt", Duration::from_secs(1)).unwrap();
        assert_eq!(c.pair(" btc "), "BTCUSDT");
        assert_eq!(c.rest_base, "https://api.bybit.com");
    }

    #[test]
    fn default_headers_carry_browser_profile() {
        let h = default_headers();
        assert_eq!(h.len(), BROWSER_HEADERS.len());
        assert_eq!(h.get("accept").unwrap(), "application/json");
        assert_eq!(h.get("origin").unwrap(), "https://www.bybit.com");
    }

    #[tokio::test]
    async fn unreachable_host_yields_none() {
        // port 9 (discard) pada loopback: koneksi ditolak -> None, tidak panic
        let c = BybitClient::new("http://127.0.0.1:9", "USDT", Duration::from_millis(500)).unwrap();
        let (spot, fut) = c.fetch_both("BTC").await;
        assert!(spot.is_none());
        assert!(fut.is_none());
    }
}
