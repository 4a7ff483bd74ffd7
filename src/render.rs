// ===============================
// src/render.rs
// ===============================
//
// Format tampilan (terminal & Slack): harga dengan pemisah ribuan,
// persen 24h dengan tanda, funding rate 4 desimal.
//
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::{Category, TickerSnapshot};
use crate::insight::InsightReport;

const RULE_WIDTH: usize = 50;

/// 1234567.5 -> "1,234,567.50" (min/max digit pecahan)
pub fn group_thousands(value: Decimal, min_frac: u32, max_frac: u32) -> String {
    let rounded = value
        .round_dp_with_strategy(max_frac, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    let neg = rounded.is_sign_negative() && !rounded.is_zero();
    let raw = rounded.abs().to_string();
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i.to_string(), f.to_string()),
        None => (raw.clone(), String::new()),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let mut frac = frac_part;
    while (frac.len() as u32) < min_frac {
        frac.push('0');
    }

    let mut out = String::new();
    if neg {
        out.push('-');
    }
    out.push_str(&grouped);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(&frac);
    }
    out
}

pub fn fmt_price(d: Decimal) -> String {
    format!("${}", group_thousands(d, 2, 8))
}

pub fn fmt_amount(d: Decimal) -> String {
    group_thousands(d, 0, 3)
}

/// (emoji, "+5.23%") untuk change24h
pub fn fmt_change(snap: &TickerSnapshot) -> (&'static str, String) {
    let pct = snap.change_percent();
    let emoji = if pct >= 0.0 { "🟢" } else { "🔴" };
    let sign = if pct >= 0.0 { "+" } else { "" };
    (emoji, format!("{sign}{:.2}%", pct))
}

pub fn fmt_funding(rate: Decimal) -> String {
    let pct = rate.checked_mul(Decimal::ONE_HUNDRED).unwrap_or(rate);
    format!("{:.4}%", pct.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero))
}

/// Blok teks untuk terminal; snapshot kosong -> pesan "unavailable".
pub fn display_snapshot(snap: Option<&TickerSnapshot>, category: Category) -> String {
    let Some(s) = snap else {
        return format!("❌ {} price data is unavailable.", category.label());
    };
    let rule = "━".repeat(RULE_WIDTH);
    let (emoji, change) = fmt_change(s);
    let mut lines = vec![
        format!("{} ticker", category.label()),
        rule.clone(),
        format!("Symbol: {}", s.symbol),
        format!("Last price: {}", fmt_price(s.last_price)),
        format!("24h high: {}", fmt_price(s.high24h)),
        format!("24h low: {}", fmt_price(s.low24h)),
        format!("24h volume: {}", fmt_amount(s.volume24h)),
        format!("24h change: {} {}", emoji, change),
    ];
    if s.category == Category::Linear {
        if let Some(fr) = s.funding_rate {
            lines.push(format!("Funding rate: {}", fmt_funding(fr)));
        }
        if let Some(oi) = s.open_interest {
            lines.push(format!("Open interest: {}", fmt_amount(oi)));
        }
    }
    lines.push(rule);
    lines.push(format!("URL: {}", s.category.trade_url(&s.symbol)));
    lines.join("\n")
}

pub fn display_report(report: &InsightReport) -> String {
    if report.is_empty() {
        return "ℹ️  No insights available (spot data missing).".to_string();
    }
    format!("💡 Insights\n{}\n{}", "━".repeat(RULE_WIDTH), report.to_text())
}
