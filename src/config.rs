// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : bybit_insight_bot — Bybit spot/futures ticker insights in Rust
Module  : config.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Fetches Bybit spot & linear tickers, derives heuristic insights
          (range position, funding sentiment, volatility, leverage risk,
          target reachability, trend, recommendation, stop-loss), serves
          them over a JSON API, Slack webhooks and an interactive CLI.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::env;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::PositionParams;

#[derive(Parser, Debug)]
#[command(name = "bybit_insight_bot", version, about = "Bybit ticker insights: API server, Slack bot & CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// HTTP API + Slack webhook (default)
    Serve,
    /// Prompt interaktif: ketik symbol, exit/quit untuk keluar
    Repl,
    /// Sekali jalan: ambil ticker + insight untuk satu symbol
    Quote {
        /// Base asset, mis. BTC
        symbol: String,
        #[arg(long)]
        average_price: Option<String>,
        #[arg(long)]
        leverage: Option<String>,
        #[arg(long)]
        target_price: Option<String>,
        /// Cetak JSON alih-alih teks
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Debug)]
pub struct Args {
    // http api
    pub port: u16,

    // bybit
    pub bybit_rest_url: String,
    pub quote_asset: String,
    pub http_timeout: Duration,

    // slack
    pub slack_webhook_url: Option<String>,
}

pub fn load() -> Args {
    // Pastikan .env dibaca (agar SLACK_WEBHOOK_URL, PORT, dll ter-load)
    let _ = dotenv();

    let port = env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(3000);

    let bybit_rest_url =
        env::var("BYBIT_REST_URL").unwrap_or_else(|_| "https://api.bybit.com".to_string());
    let quote_asset = env::var("QUOTE_ASSET")
        .ok()
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "USDT".to_string());
    let http_timeout_ms = env::var("HTTP_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10_000u64);

    let slack_webhook_url = env::var("SLACK_WEBHOOK_URL")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Args {
        port,
        bybit_rest_url,
        quote_asset,
        http_timeout: Duration::from_millis(http_timeout_ms),
        slack_webhook_url,
    }
}

// ===== Parameter posisi (query / flag / token REPL) =====

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("{name} must be a number, got {value:?}")]
    NotNumber { name: &'static str, value: String },
    #[error("{name} must be greater than zero")]
    NotPositive { name: &'static str },
    #[error("unknown parameter {0:?} (use avg=, lev=, target=)")]
    Unknown(String),
}

/// "" / None -> None; selain itu harus desimal > 0
pub fn parse_positive(name: &'static str, raw: Option<&str>) -> Result<Option<Decimal>, ParamError> {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let d = Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|_| ParamError::NotNumber { name, value: s.to_string() })?;
    if d <= Decimal::ZERO {
        return Err(ParamError::NotPositive { name });
    }
    Ok(Some(d))
}

pub fn position_params(
    average_price: Option<&str>,
    leverage: Option<&str>,
    target_price: Option<&str>,
) -> Result<PositionParams, ParamError> {
    Ok(PositionParams {
        average_price: parse_positive("averagePrice", average_price)?,
        leverage: parse_positive("leverage", leverage)?,
        target_price: parse_positive("targetPrice", target_price)?,
    })
}

/// Token REPL: `avg=65000 lev=10 target=70000`
pub fn position_params_from_tokens<'a, I>(tokens: I) -> Result<PositionParams, ParamError>
where
    I: IntoIterator<Item = &'a str>,
{
    let (mut avg, mut lev, mut target) = (None, None, None);
    for tok in tokens {
        let (k, v) = tok.split_once('=').ok_or_else(|| ParamError::Unknown(tok.to_string()))?;
        match k.trim().to_ascii_lowercase().as_str() {
            "avg" | "average" | "averageprice" => avg = Some(v),
            "lev" | "leverage" => lev = Some(v),
            "target" | "tp" | "targetprice" => target = Some(v),
            _ => return Err(ParamError::Unknown(tok.to_string())),
        }
    }
    position_params(avg, lev, target)
}
