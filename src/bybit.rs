// ===============================
// src/bybit.rs
// ===============================
//
// Bybit v5 REST: model minimal untuk `GET /v5/market/tickers` + normalizer
// ke TickerSnapshot.
//
// Contoh payload (dipangkas):
// {"retCode":0,"retMsg":"OK","result":{"category":"linear","list":[
//   {"symbol":"BTCUSDT","lastPrice":"65000.10","highPrice24h":"66000",
//    "lowPrice24h":"64000","volume24h":"1234.5","price24hPcnt":"0.0123",
//    "fundingRate":"0.0001","openInterest":"55000.1"}]}}
//
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::domain::{Category, TickerSnapshot};

pub const TICKERS_PATH: &str = "/v5/market/tickers";

/// Header "browser-like"; endpoint publik Bybit kadang menolak client tanpa UA.
pub const BROWSER_HEADERS: [(&str, &str); 5] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ),
    ("Accept", "application/json"),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Referer", "https://www.bybit.com/"),
    ("Origin", "https://www.bybit.com"),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickersResponse {
    #[serde(default)]
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    #[serde(default)]
    pub result: Option<TickersResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TickersResult {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub list: Vec<RawTicker>,
}

/// Satu record ticker; semua angka dikirim sebagai string oleh Bybit.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTicker {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub last_price: Option<String>,
    #[serde(default)]
    pub high_price24h: Option<String>,
    #[serde(default)]
    pub low_price24h: Option<String>,
    #[serde(default)]
    pub volume24h: Option<String>,
    #[serde(default)]
    pub price24h_pcnt: Option<String>,
    #[serde(default)]
    pub funding_rate: Option<String>, // linear only
    #[serde(default)]
    pub open_interest: Option<String>, // linear only
}

fn required(field: &'static str, raw: Option<&str>) -> Option<Decimal> {
    let s = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match Decimal::from_str(s) {
        Ok(d) => Some(d),
        Err(e) => {
            debug!(field, value = %s, ?e, "ticker field is not a decimal");
            None
        }
    }
}

// "" atau nilai rusak -> None (bukan error)
fn optional(raw: Option<&str>) -> Option<Decimal> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| Decimal::from_str(s).ok())
}

impl RawTicker {
    /// Konversi ke snapshot; field wajib yang hilang/rusak -> None (tak ada snapshot parsial).
    pub fn into_snapshot(self, category: Category) -> Option<TickerSnapshot> {
        if self.symbol.trim().is_empty() {
            return None;
        }
        let last_price = required("lastPrice", self.last_price.as_deref())?;
        let high24h = required("highPrice24h", self.high_price24h.as_deref())?;
        let low24h = required("lowPrice24h", self.low_price24h.as_deref())?;
        let volume24h = required("volume24h", self.volume24h.as_deref())?;
        let change24h = required("price24hPcnt", self.price24h_pcnt.as_deref())?;

        let (funding_rate, open_interest) = match category {
            Category::Linear => (
                optional(self.funding_rate.as_deref()),
                optional(self.open_interest.as_deref()),
            ),
            Category::Spot => (None, None),
        };

        Some(TickerSnapshot {
            category,
            symbol: self.symbol,
            last_price,
            high24h,
            low24h,
            volume24h,
            change24h,
            funding_rate,
            open_interest,
        })
    }
}

/// Normalizer: ambil record pertama dari response; kosong / retCode != 0 -> None.
pub fn normalize(category: Category, resp: TickersResponse) -> Option<TickerSnapshot> {
    if resp.ret_code != 0 {
        debug!(
            category = category.as_str(),
            ret_code = resp.ret_code,
            ret_msg = %resp.ret_msg,
            "bybit returned non-zero retCode"
        );
        return None;
    }
    let first = resp.result?.list.into_iter().next()?;
    first.into_snapshot(category)
}
