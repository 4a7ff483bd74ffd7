// ===============================
// src/main.rs
// ===============================
/*
 cd /home/kukuhtw/rust/bybit_insight_bot

 # server (default)
 cargo run --release
 curl -s localhost:3000/api/all/btc | jq
 curl -s 'localhost:3000/api/insight/btc?averagePrice=65000&leverage=10&targetPrice=70000' | jq .data.summary
 curl -s localhost:3000/metrics | grep '^ticker_fetches_total'

 # cli
 cargo run -- repl
 cargo run -- quote eth --leverage 5 --json
*/
/*
=============================================================================
Project : bybit_insight_bot — Bybit spot/futures ticker insights in Rust
Module  : main.rs
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
mod domain;
mod config;
mod metrics;
mod bybit;    // wire types + normalisasi ticker
mod feed;     // REST client (spot/linear)
mod insight;
mod render;
mod slack;
mod server;
mod repl;

use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Command};
use crate::feed::BybitClient;
use crate::slack::SlackNotifier;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // ---- Logging ----
    // RUST_LOG override; default info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Load config ----
    let args = config::load();
    let cli = Cli::parse();

    // ---- Metrics ----
    metrics::init();
    metrics::CONFIG_QUOTE_ASSET
        .with_label_values(&[args.quote_asset.as_str()])
        .set(1);

    info!(
        port = args.port,
        bybit_rest = %args.bybit_rest_url,
        quote_asset = %args.quote_asset,
        http_timeout_ms = args.http_timeout.as_millis() as u64,
        slack_enabled = args.slack_webhook_url.is_some(),
        "startup config"
    );

    let client = BybitClient::new(&args.bybit_rest_url, &args.quote_asset, args.http_timeout)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let slack_http = reqwest::Client::builder().timeout(args.http_timeout).build()?;
            let slack = SlackNotifier::new(slack_http, args.slack_webhook_url.clone());
            if !slack.enabled() {
                info!("SLACK_WEBHOOK_URL not set; slack delivery disabled");
            }
            let state = Arc::new(server::AppState { client, slack });
            server::serve(args.port, state).await?;
        }
        Command::Repl => repl::run(client).await?,
        Command::Quote { symbol, average_price, leverage, target_price, json } => {
            let params = config::position_params(
                average_price.as_deref(),
                leverage.as_deref(),
                target_price.as_deref(),
            )?;
            if json {
                let (spot, futures) = client.fetch_both(&symbol).await;
                let report = insight::analyze(spot.as_ref(), futures.as_ref(), &params);
                metrics::observe_report(&report);
                let out = json!({
                    "symbol": client.pair(&symbol),
                    "spot": spot,
                    "futures": futures,
                    "params": params,
                    "insights": &report,
                    "summary": report.to_text(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", repl::lookup(&client, &symbol, &params).await);
            }
        }
    }

    Ok(())
}
