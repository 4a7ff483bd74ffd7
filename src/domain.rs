// ===============================
// src/domain.rs
// ===============================
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bybit market category yang dipakai bot ini
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Spot,
    Linear,
}

impl Category {
    /// Nilai query `category=` di Bybit v5
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Spot => "spot",
            Category::Linear => "linear",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Spot => "📊 Spot market",
            Category::Linear => "📈 Futures market",
        }
    }

    /// Halaman trading Bybit untuk symbol ini
    pub fn trade_url(&self, symbol: &str) -> String {
        match self {
            Category::Spot => format!("https://www.bybit.com/trade/usdt/{symbol}"),
            Category::Linear => format!("https://www.bybit.com/futures/{symbol}"),
        }
    }
}

/// Snapshot ticker 24h yang sudah dinormalisasi (immutable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerSnapshot {
    pub category: Category,
    pub symbol: String,
    pub last_price: Decimal,
    pub high24h: Decimal,
    pub low24h: Decimal,
    pub volume24h: Decimal,
    /// Fraksi, 0.0523 = +5.23%
    pub change24h: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_interest: Option<Decimal>,
}

impl TickerSnapshot {
    /// change24h dalam persen (dikali 100 di Decimal dulu, baru ke f64)
    pub fn change_percent(&self) -> f64 {
        match self.change24h.checked_mul(Decimal::ONE_HUNDRED) {
            Some(pct) => to_f64(pct),
            None => to_f64(self.change24h) * 100.0,
        }
    }
}

/// Parameter posisi user (semua opsional, nilai selalu > 0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionParams {
    pub average_price: Option<Decimal>,
    pub leverage: Option<Decimal>,
    pub target_price: Option<Decimal>,
}

/// Decimal -> f64, hanya dipakai saat hitung rasio/persen
pub fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Pembulatan tampilan: 2 desimal untuk persen/harga, 4 untuk funding rate
pub fn round_to(x: f64, dp: i32) -> f64 {
    let f = 10f64.powi(dp);
    let r = (x * f).round() / f;
    // hindari "-0.0" di JSON
    if r == 0.0 { 0.0 } else { r }
}
