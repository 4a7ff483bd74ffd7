// ===============================
// src/slack.rs
// ===============================
//
// Slack:
// - build_message   : Block Kit payload (spot, futures, insights)
// - SlackNotifier   : POST ke incoming webhook (SLACK_WEBHOOK_URL)
// - extract_symbol  : ambil symbol dari body outgoing webhook / Events API
//
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::domain::{Category, TickerSnapshot};
use crate::insight::InsightReport;
use crate::metrics::SLACK_MESSAGES;
use crate::render::{fmt_amount, fmt_change, fmt_funding, fmt_price};

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("slack webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack webhook responded {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
}

fn ticker_section(snap: Option<&TickerSnapshot>, category: Category, action_id: &str) -> Value {
    let title = format!("*{}*", category.label());
    let Some(s) = snap else {
        return json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("{title}\n❌ Price data is unavailable.") }
        });
    };

    let (emoji, change) = fmt_change(s);
    let mut text = format!(
        "{title}\nLast price: *{}*\n24h high: {}\n24h low: {}\n24h volume: {}\n24h change: {} *{}*",
        fmt_price(s.last_price),
        fmt_price(s.high24h),
        fmt_price(s.low24h),
        fmt_amount(s.volume24h),
        emoji,
        change
    );
    if let Some(fr) = s.funding_rate {
        text.push_str(&format!("\nFunding rate: {}", fmt_funding(fr)));
    }
    if let Some(oi) = s.open_interest {
        text.push_str(&format!("\nOpen interest: {}", fmt_amount(oi)));
    }

    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": text },
        "accessory": {
            "type": "button",
            "text": { "type": "plain_text", "text": "Trade page", "emoji": true },
            "url": s.category.trade_url(&s.symbol),
            "action_id": action_id
        }
    })
}

fn insight_section(report: &InsightReport) -> Value {
    let body = report
        .entries()
        .into_iter()
        .map(|(_, line)| format!("• {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": format!("*💡 Insights*\n{body}") }
    })
}

/// Payload Block Kit lengkap. `pair` = "BTCUSDT".
pub fn build_message(
    pair: &str,
    spot: Option<&TickerSnapshot>,
    futures: Option<&TickerSnapshot>,
    report: Option<&InsightReport>,
) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": format!("📊 {pair} market overview"), "emoji": true }
        }),
        json!({ "type": "divider" }),
        ticker_section(spot, Category::Spot, "button-action"),
        json!({ "type": "divider" }),
        ticker_section(futures, Category::Linear, "button-action-2"),
    ];
    if let Some(r) = report.filter(|r| !r.is_empty()) {
        blocks.push(json!({ "type": "divider" }));
        blocks.push(insight_section(r));
    }
    json!({ "blocks": blocks, "text": format!("{pair} market overview") })
}

/// Ambil symbol: `text` -> `event.text` -> `symbol`.
/// Untuk teks bebas, pakai run huruf A-Z pertama sepanjang 2..=10.
pub fn extract_symbol(body: &Value) -> Option<String> {
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(|s| s.trim().to_ascii_uppercase());

    if let Some(t) = text(body.get("text")) {
        return first_ticker_word(&t);
    }
    if let Some(t) = text(body.get("event").and_then(|e| e.get("text"))) {
        return first_ticker_word(&t);
    }
    text(body.get("symbol")).filter(|s| !s.is_empty())
}

fn first_ticker_word(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_uppercase() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_uppercase() {
                i += 1;
            }
            let len = i - start;
            if len >= 2 {
                // run lebih panjang dari 10 -> ambil 10 pertama
                return Some(s[start..start + len.min(10)].to_string());
            }
        } else {
            i += 1;
        }
    }
    None
}

#[derive(Clone, Debug)]
pub struct SlackNotifier {
    http: reqwest::Client,
    webhook_url: Option<String>,
}

impl SlackNotifier {
    pub fn new(http: reqwest::Client, webhook_url: Option<String>) -> Self {
        Self { http, webhook_url }
    }

    pub fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<(), SlackError> {
        let rsp = self.http.post(url).json(payload).send().await?;
        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            return Err(SlackError::Status { status, body });
        }
        Ok(())
    }

    /// Kirim ringkasan; URL kosong -> skip. Error hanya di-log.
    pub async fn send(
        &self,
        pair: &str,
        spot: Option<&TickerSnapshot>,
        futures: Option<&TickerSnapshot>,
        report: Option<&InsightReport>,
    ) {
        let Some(url) = self.webhook_url.as_deref() else {
            debug!(%pair, "SLACK_WEBHOOK_URL not set, skip");
            SLACK_MESSAGES.with_label_values(&["skipped"]).inc();
            return;
        };
        let payload = build_message(pair, spot, futures, report);
        match self.post(url, &payload).await {
            Ok(()) => {
                info!(%pair, "slack message sent");
                SLACK_MESSAGES.with_label_values(&["ok"]).inc();
            }
            Err(e) => {
                error!(%pair, %e, "slack webhook delivery failed");
                SLACK_MESSAGES.with_label_values(&["error"]).inc();
            }
        }
    }
}
