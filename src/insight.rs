// ===============================
// src/insight.rs
// ===============================
//
// Insight engine: fungsi murni (tanpa I/O, tanpa state) dari snapshot spot /
// futures + parameter posisi -> InsightReport berisi maksimal 9 facet:
//
//   1) price position      (spot)
//   2) market sentiment    (futures + fundingRate)
//   3) volatility          (spot)
//   4) risk level          (spot + leverage)
//   5) target reachability (spot + averagePrice + targetPrice)
//   6) volume character    (spot)
//   7) price trend         (spot)
//   8) recommendation      (spot)
//   9) stop-loss           (spot + averagePrice + leverage)
//
// Facet yang input-nya tidak lengkap -> None (bukan error).
//
// Kasus degenerate (pembagi nol, range terbalik): facet tetap dikeluarkan,
// rasio yang tak terdefinisi = null, level = band netral facet tsb, dan
// predikat atas rasio tsb selalu false.
//
// Setiap facet = tabel aturan (predicate, level) berurutan; match pertama menang.
//
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{round_to, to_f64, PositionParams, TickerSnapshot};

/// Emoji + saran tetap per level.
pub trait Band: Copy {
    fn emoji(self) -> &'static str;
    fn advice(self) -> &'static str;
}

type Rule<I, B> = (fn(&I) -> bool, B);

fn classify<I, B: Copy>(input: &I, rules: &[Rule<I, B>], otherwise: B) -> B {
    rules
        .iter()
        .find(|(when, _)| when(input))
        .map(|(_, band)| *band)
        .unwrap_or(otherwise)
}

/// Bagian umum setiap facet: level, emoji, deskripsi, saran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict<B> {
    pub level: B,
    pub emoji: &'static str,
    pub description: String,
    pub advice: &'static str,
}

impl<B: Band> Verdict<B> {
    fn new(level: B, description: String) -> Self {
        Self { level, emoji: level.emoji(), description, advice: level.advice() }
    }

    pub fn line(&self) -> String {
        format!("{} {} {}", self.emoji, self.description, self.advice)
    }
}

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionLevel {
    High,
    Mid,
    Low,
}

impl Band for PositionLevel {
    fn emoji(self) -> &'static str {
        match self {
            PositionLevel::High => "🔺",
            PositionLevel::Mid => "➖",
            PositionLevel::Low => "🔻",
        }
    }
    fn advice(self) -> &'static str {
        match self {
            PositionLevel::High => "Be careful chasing a buy this close to the daily high.",
            PositionLevel::Mid => "No edge from the range position; wait for a clearer direction.",
            PositionLevel::Low => "Near the daily low; this can be a buying opportunity.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SentimentLevel {
    OverheatedLong,
    MildLongBias,
    Neutral,
    MildShortBias,
    OverheatedShort,
}

impl Band for SentimentLevel {
    fn emoji(self) -> &'static str {
        match self {
            SentimentLevel::OverheatedLong => "🔥",
            SentimentLevel::MildLongBias => "🟢",
            SentimentLevel::Neutral => "⚪",
            SentimentLevel::MildShortBias => "🔴",
            SentimentLevel::OverheatedShort => "🧊",
        }
    }
    fn advice(self) -> &'static str {
        match self {
            SentimentLevel::OverheatedLong => "Be careful opening new longs; a long squeeze is possible.",
            SentimentLevel::MildLongBias => "Sentiment leans bullish without extreme positioning.",
            SentimentLevel::Neutral => "Longs and shorts are balanced.",
            SentimentLevel::MildShortBias => "Sentiment leans bearish without extreme positioning.",
            SentimentLevel::OverheatedShort => "Be careful opening new shorts; a short squeeze is possible.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolatilityLevel {
    VeryHigh,
    High,
    Normal,
    Low,
}

impl Band for VolatilityLevel {
    fn emoji(self) -> &'static str {
        match self {
            VolatilityLevel::VeryHigh => "🌪️",
            VolatilityLevel::High => "⚡",
            VolatilityLevel::Normal => "🌤️",
            VolatilityLevel::Low => "😴",
        }
    }
    fn advice(self) -> &'static str {
        match self {
            VolatilityLevel::VeryHigh => "Cut position size and keep stops tight.",
            VolatilityLevel::High => "Swings can be sharp; manage risk actively.",
            VolatilityLevel::Normal => "Volatility is in a typical range.",
            VolatilityLevel::Low => "The market is calm; a breakout may follow the squeeze.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    VeryHigh,
    High,
    Moderate,
    Low,
}

impl Band for RiskLevel {
    fn emoji(self) -> &'static str {
        match self {
            RiskLevel::VeryHigh => "🚨",
            RiskLevel::High => "⚠️",
            RiskLevel::Moderate => "🟡",
            RiskLevel::Low => "🟢",
        }
    }
    fn advice(self) -> &'static str {
        match self {
            RiskLevel::VeryHigh => "Lower the leverage now; a normal daily move can liquidate you.",
            RiskLevel::High => "Reduce leverage or tighten the stop-loss.",
            RiskLevel::Moderate => "Keep a stop-loss in place.",
            RiskLevel::Low => "Risk is manageable at this leverage.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reachability {
    Reached,
    High,
    Moderate,
    Low,
}

impl Band for Reachability {
    fn emoji(self) -> &'static str {
        match self {
            Reachability::Reached => "🎯",
            Reachability::High => "🚀",
            Reachability::Moderate => "⏳",
            Reachability::Low => "🐢",
        }
    }
    fn advice(self) -> &'static str {
        match self {
            Reachability::Reached => "Consider taking profit.",
            Reachability::High => "The target looks reachable; hold and trail the stop.",
            Reachability::Moderate => "The target is possible; keep watching momentum.",
            Reachability::Low => "Consider revising the target or reducing the position.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeLevel {
    ActiveRising,
    ActiveFalling,
    Quiet,
    Normal,
}

impl Band for VolumeLevel {
    fn emoji(self) -> &'static str {
        match self {
            VolumeLevel::ActiveRising => "📈",
            VolumeLevel::ActiveFalling => "📉",
            VolumeLevel::Quiet => "💤",
            VolumeLevel::Normal => "📊",
        }
    }
    fn advice(self) -> &'static str {
        match self {
            VolumeLevel::ActiveRising => "Buyers are in control; watch for continuation.",
            VolumeLevel::ActiveFalling => "Selling pressure is strong; avoid catching a falling knife.",
            VolumeLevel::Quiet => "Wait for activity to confirm any move.",
            VolumeLevel::Normal => "No strong activity signal.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrendLevel {
    StrongUptrend,
    Uptrend,
    Sideways,
    Downtrend,
    StrongDowntrend,
}

impl Band for TrendLevel {
    fn emoji(self) -> &'static str {
        match self {
            TrendLevel::StrongUptrend => "🚀",
            TrendLevel::Uptrend => "📈",
            TrendLevel::Sideways => "↔️",
            TrendLevel::Downtrend => "📉",
            TrendLevel::StrongDowntrend => "💥",
        }
    }
    fn advice(self) -> &'static str {
        match self {
            TrendLevel::StrongUptrend => "Trend-following longs are favoured; avoid shorting strength.",
            TrendLevel::Uptrend => "Bias is up; look for pullbacks to enter.",
            TrendLevel::Sideways => "Range-bound; trade the range or wait for a breakout.",
            TrendLevel::Downtrend => "Bias is down; be patient before buying.",
            TrendLevel::StrongDowntrend => "Stay away from longs until the selling stops.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    ConsiderBuy,
    ConsiderSell,
    CautionBuy,
    WaitAndWatch,
    NeutralWatch,
}

impl Band for Recommendation {
    fn emoji(self) -> &'static str {
        match self {
            Recommendation::ConsiderBuy => "💚",
            Recommendation::ConsiderSell => "❤️",
            Recommendation::CautionBuy => "🧡",
            Recommendation::WaitAndWatch => "🤍",
            Recommendation::NeutralWatch => "💙",
        }
    }
    fn advice(self) -> &'static str {
        match self {
            Recommendation::ConsiderBuy => "Consider buying in tranches.",
            Recommendation::ConsiderSell => "Consider taking profit or selling into strength.",
            Recommendation::CautionBuy => "Be careful buying here; wait for a pullback.",
            Recommendation::WaitAndWatch => "Wait for the decline to stabilise before acting.",
            Recommendation::NeutralWatch => "Stay neutral and keep watching.",
        }
    }
}

impl Band for Direction {
    fn emoji(self) -> &'static str {
        "🛑"
    }
    fn advice(self) -> &'static str {
        match self {
            Direction::Long => "Place the stop below your entry and respect it.",
            Direction::Short => "Place the stop above your entry and respect it.",
        }
    }
}

// ---------------------------------------------------------------------------
// Facet results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePosition {
    #[serde(flatten)]
    pub verdict: Verdict<PositionLevel>,
    pub position_from_low: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSentiment {
    #[serde(flatten)]
    pub verdict: Verdict<SentimentLevel>,
    pub funding_rate_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_interest: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volatility {
    #[serde(flatten)]
    pub verdict: Verdict<VolatilityLevel>,
    pub range_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    #[serde(flatten)]
    pub verdict: Verdict<RiskLevel>,
    pub risk_score: f64,
    pub change_percent: f64,
    pub leverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReachability {
    #[serde(flatten)]
    pub verdict: Verdict<Reachability>,
    pub direction: Direction,
    pub distance_to_target: Option<f64>,
    pub distance_from_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeAnalysis {
    #[serde(flatten)]
    pub verdict: Verdict<VolumeLevel>,
    pub change_percent: f64,
    /// Ikut dilaporkan, tapi tidak dipakai untuk klasifikasi.
    pub volume24h: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTrend {
    #[serde(flatten)]
    pub verdict: Verdict<TrendLevel>,
    pub change_percent: f64,
    pub position_from_low: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingRecommendation {
    #[serde(flatten)]
    pub verdict: Verdict<Recommendation>,
    pub position_from_low: Option<f64>,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopLoss {
    #[serde(flatten)]
    pub verdict: Verdict<Direction>,
    pub risk_percent: f64,
    pub stop_loss_percent: f64,
    pub stop_loss_price: f64,
}

/// Hasil engine; facet yang tidak bisa dihitung = None (tidak diserialisasi).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_position: Option<PricePosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_sentiment: Option<MarketSentiment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility: Option<Volatility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_reachability: Option<TargetReachability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_analysis: Option<VolumeAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_trend: Option<PriceTrend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<TradingRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<StopLoss>,
}

impl InsightReport {
    /// (nama facet, baris teks) sesuai urutan facet
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(f) = &self.price_position { out.push(("pricePosition", f.verdict.line())); }
        if let Some(f) = &self.market_sentiment { out.push(("marketSentiment", f.verdict.line())); }
        if let Some(f) = &self.volatility { out.push(("volatility", f.verdict.line())); }
        if let Some(f) = &self.risk_level { out.push(("riskLevel", f.verdict.line())); }
        if let Some(f) = &self.target_reachability { out.push(("targetReachability", f.verdict.line())); }
        if let Some(f) = &self.volume_analysis { out.push(("volumeAnalysis", f.verdict.line())); }
        if let Some(f) = &self.price_trend { out.push(("priceTrend", f.verdict.line())); }
        if let Some(f) = &self.recommendation { out.push(("recommendation", f.verdict.line())); }
        if let Some(f) = &self.stop_loss { out.push(("stopLoss", f.verdict.line())); }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Teks tampilan: satu baris per facet yang ada.
    pub fn to_text(&self) -> String {
        self.entries()
            .into_iter()
            .map(|(_, line)| line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Angka spot yang sudah dikonversi ke f64 sekali di awal.
#[derive(Debug, Clone, Copy)]
struct SpotView {
    last: f64,
    high: f64,
    low: f64,
    change_pct: f64,
    position: Option<f64>,
}

impl SpotView {
    fn from_snapshot(s: &TickerSnapshot) -> Self {
        let last = to_f64(s.last_price);
        let high = to_f64(s.high24h);
        let low = to_f64(s.low24h);
        Self {
            last,
            high,
            low,
            change_pct: s.change_percent(),
            position: position_from_low(last, high, low),
        }
    }

    fn is_low_price(&self) -> bool {
        self.position.map_or(false, |p| p <= 30.0)
    }
    fn is_high_price(&self) -> bool {
        self.position.map_or(false, |p| p >= 70.0)
    }
    fn is_rising(&self) -> bool {
        self.change_pct > 3.0
    }
    fn is_falling(&self) -> bool {
        self.change_pct < -3.0
    }
}

/// Posisi harga dalam range 24h (0 = low, 100 = high), di-clamp ke [0, 100].
/// Range nol / terbalik -> None.
pub fn position_from_low(last: f64, high: f64, low: f64) -> Option<f64> {
    let range = high - low;
    if range.is_nan() || range <= 0.0 {
        return None;
    }
    let pos = (last - low) / range * 100.0;
    pos.is_finite().then(|| pos.clamp(0.0, 100.0))
}

fn opt_round(x: Option<f64>) -> Option<f64> {
    x.map(|v| round_to(v, 2))
}

fn price_position(v: &SpotView) -> PricePosition {
    let rules: [Rule<SpotView, PositionLevel>; 2] = [
        (|v: &SpotView| v.is_high_price(), PositionLevel::High),
        (|v: &SpotView| v.is_low_price(), PositionLevel::Low),
    ];
    let level = classify(v, &rules, PositionLevel::Mid);
    let description = match v.position {
        Some(p) => format!("Price sits at {:.2}% of the 24h range (low {} / high {}).", p, v.low, v.high),
        None => "The 24h range is flat, so the price position is undefined.".to_string(),
    };
    PricePosition { verdict: Verdict::new(level, description), position_from_low: opt_round(v.position) }
}

fn market_sentiment(futures: &TickerSnapshot, rate: Decimal) -> MarketSentiment {
    // band dievaluasi atas fraksi mentah (exact, Decimal): 0.00015 -> mild, 0.02 -> overheated
    let rules: [Rule<Decimal, SentimentLevel>; 4] = [
        (|r: &Decimal| *r > Decimal::new(1, 2), SentimentLevel::OverheatedLong),
        (|r: &Decimal| *r < Decimal::new(-1, 2), SentimentLevel::OverheatedShort),
        (|r: &Decimal| r.is_sign_positive() && !r.is_zero(), SentimentLevel::MildLongBias),
        (|r: &Decimal| r.is_sign_negative() && !r.is_zero(), SentimentLevel::MildShortBias),
    ];
    let level = classify(&rate, &rules, SentimentLevel::Neutral);
    let pct = round_to(to_f64(rate.checked_mul(Decimal::ONE_HUNDRED).unwrap_or(rate)), 4);
    let description = match level {
        SentimentLevel::OverheatedLong => format!("Funding rate is {pct:.4}%: longs pay a heavy premium, the long side looks overheated."),
        SentimentLevel::MildLongBias => format!("Funding rate is {pct:.4}%: a mild long bias."),
        SentimentLevel::Neutral => format!("Funding rate is {pct:.4}%: positioning is neutral."),
        SentimentLevel::MildShortBias => format!("Funding rate is {pct:.4}%: a mild short bias."),
        SentimentLevel::OverheatedShort => format!("Funding rate is {pct:.4}%: shorts pay a heavy premium, the short side looks overheated."),
    };
    MarketSentiment {
        verdict: Verdict::new(level, description),
        funding_rate_percent: pct,
        open_interest: futures.open_interest,
    }
}

fn volatility(v: &SpotView) -> Volatility {
    let range_pct = if v.low > 0.0 {
        let r = (v.high - v.low) / v.low * 100.0;
        r.is_finite().then(|| r.max(0.0))
    } else {
        None
    };
    let rules: [Rule<f64, VolatilityLevel>; 3] = [
        (|r: &f64| *r > 15.0, VolatilityLevel::VeryHigh),
        (|r: &f64| *r > 10.0, VolatilityLevel::High),
        (|r: &f64| *r < 3.0, VolatilityLevel::Low),
    ];
    let (level, description) = match range_pct {
        Some(r) => (
            classify(&r, &rules, VolatilityLevel::Normal),
            format!("The 24h high-low range is {:.2}% of the low.", r),
        ),
        None => (
            VolatilityLevel::Normal,
            "The 24h low is zero, so the range cannot be measured.".to_string(),
        ),
    };
    Volatility { verdict: Verdict::new(level, description), range_percent: opt_round(range_pct) }
}

fn risk_level(v: &SpotView, leverage: f64) -> RiskAssessment {
    let score = v.change_pct.abs() * leverage;
    let rules: [Rule<f64, RiskLevel>; 3] = [
        (|s: &f64| *s > 50.0, RiskLevel::VeryHigh),
        (|s: &f64| *s > 30.0, RiskLevel::High),
        (|s: &f64| *s > 15.0, RiskLevel::Moderate),
    ];
    let level = classify(&score, &rules, RiskLevel::Low);
    let description = format!(
        "Risk score {:.2} (24h move {:.2}% x {}x leverage).",
        score,
        v.change_pct.abs(),
        leverage
    );
    RiskAssessment {
        verdict: Verdict::new(level, description),
        risk_score: round_to(score, 2),
        change_percent: round_to(v.change_pct, 2),
        leverage,
    }
}

#[derive(Debug, Clone, Copy)]
struct TargetView {
    change_pct: f64,
    to_target: f64,
}

fn target_reachability(v: &SpotView, average: f64, target: f64) -> TargetReachability {
    let direction = if target > average { Direction::Long } else { Direction::Short };
    let to_target = (v.last > 0.0).then(|| (target - v.last) / v.last * 100.0).filter(|x| x.is_finite());
    let from_avg = (average > 0.0).then(|| (v.last - average) / average * 100.0).filter(|x| x.is_finite());

    let long_rules: [Rule<TargetView, Reachability>; 3] = [
        (|t: &TargetView| t.to_target < 0.0, Reachability::Reached),
        (|t: &TargetView| t.change_pct > 5.0 && t.to_target < 10.0, Reachability::High),
        (|t: &TargetView| t.change_pct < -5.0 && t.to_target > 20.0, Reachability::Low),
    ];
    let short_rules: [Rule<TargetView, Reachability>; 3] = [
        (|t: &TargetView| t.to_target > 0.0, Reachability::Reached),
        (|t: &TargetView| t.change_pct < -5.0 && t.to_target > -10.0, Reachability::High),
        (|t: &TargetView| t.change_pct > 5.0 && t.to_target < -20.0, Reachability::Low),
    ];

    let level = match to_target {
        Some(d) => {
            let tv = TargetView { change_pct: v.change_pct, to_target: d };
            match direction {
                Direction::Long => classify(&tv, &long_rules, Reachability::Moderate),
                Direction::Short => classify(&tv, &short_rules, Reachability::Moderate),
            }
        }
        None => Reachability::Moderate,
    };

    let side = match direction {
        Direction::Long => "long",
        Direction::Short => "short",
    };
    let description = match (to_target, level) {
        (None, _) => "The last price is zero, so the distance to target is undefined.".to_string(),
        (Some(_), Reachability::Reached) => {
            format!("Target {} for the {} position is already reached (last {}).", target, side, v.last)
        }
        (Some(d), Reachability::High) => {
            format!("Target is {:.2}% away with strong 24h momentum in favour of the {}.", d, side)
        }
        (Some(d), Reachability::Low) => {
            format!("Target is {:.2}% away and the 24h move runs against the {}.", d, side)
        }
        (Some(d), Reachability::Moderate) => {
            let from = from_avg.unwrap_or(0.0);
            let in_profit = match direction {
                Direction::Long => from > 0.0,
                Direction::Short => from < 0.0,
            };
            if in_profit {
                format!("Target is {:.2}% away; the {} is {:.2}% in profit from the average price.", d, side, from.abs())
            } else {
                format!("Target is {:.2}% away; the {} is {:.2}% under water from the average price.", d, side, from.abs())
            }
        }
    };

    TargetReachability {
        verdict: Verdict::new(level, description),
        direction,
        distance_to_target: opt_round(to_target),
        distance_from_average: opt_round(from_avg),
    }
}

// volume24h sengaja tidak dipakai: karakter aktivitas diturunkan dari change% saja
fn volume_analysis(v: &SpotView, volume24h: Decimal) -> VolumeAnalysis {
    let rules: [Rule<f64, VolumeLevel>; 3] = [
        (|c: &f64| *c > 5.0, VolumeLevel::ActiveRising),
        (|c: &f64| *c < -5.0, VolumeLevel::ActiveFalling),
        (|c: &f64| c.abs() < 2.0, VolumeLevel::Quiet),
    ];
    let level = classify(&v.change_pct, &rules, VolumeLevel::Normal);
    let mood = match level {
        VolumeLevel::ActiveRising => "active trading with buyers in control",
        VolumeLevel::ActiveFalling => "active trading with sellers in control",
        VolumeLevel::Quiet => "quiet trading",
        VolumeLevel::Normal => "normal activity",
    };
    VolumeAnalysis {
        verdict: Verdict::new(level, format!("24h change is {:+.2}%: {}.", v.change_pct, mood)),
        change_percent: round_to(v.change_pct, 2),
        volume24h,
    }
}

fn price_trend(v: &SpotView) -> PriceTrend {
    let rules: [Rule<SpotView, TrendLevel>; 4] = [
        (|v: &SpotView| v.change_pct > 5.0 && v.position.map_or(false, |p| p > 60.0), TrendLevel::StrongUptrend),
        (|v: &SpotView| v.change_pct > 5.0, TrendLevel::Uptrend),
        (|v: &SpotView| v.change_pct < -5.0 && v.position.map_or(false, |p| p < 40.0), TrendLevel::StrongDowntrend),
        (|v: &SpotView| v.change_pct < -5.0, TrendLevel::Downtrend),
    ];
    let level = classify(v, &rules, TrendLevel::Sideways);
    let name = match level {
        TrendLevel::StrongUptrend => "Strong uptrend",
        TrendLevel::Uptrend => "Uptrend",
        TrendLevel::Sideways => "Sideways",
        TrendLevel::Downtrend => "Downtrend",
        TrendLevel::StrongDowntrend => "Strong downtrend",
    };
    PriceTrend {
        verdict: Verdict::new(level, format!("{}: {:+.2}% over 24h.", name, v.change_pct)),
        change_percent: round_to(v.change_pct, 2),
        position_from_low: opt_round(v.position),
    }
}

fn recommendation(v: &SpotView) -> TradingRecommendation {
    let rules: [Rule<SpotView, Recommendation>; 4] = [
        (|v: &SpotView| v.is_low_price() && !v.is_falling(), Recommendation::ConsiderBuy),
        (|v: &SpotView| v.is_high_price() && v.is_rising(), Recommendation::ConsiderSell),
        (|v: &SpotView| v.is_high_price() && !v.is_rising(), Recommendation::CautionBuy),
        (|v: &SpotView| v.is_falling(), Recommendation::WaitAndWatch),
    ];
    let level = classify(v, &rules, Recommendation::NeutralWatch);
    let description = match level {
        Recommendation::ConsiderBuy => "Price is near the daily low and is not falling.",
        Recommendation::ConsiderSell => "Price is near the daily high and still rising.",
        Recommendation::CautionBuy => "Price is near the daily high without upward momentum.",
        Recommendation::WaitAndWatch => "Price is falling.",
        Recommendation::NeutralWatch => "No clear edge from price position or momentum.",
    };
    TradingRecommendation {
        verdict: Verdict::new(level, description.to_string()),
        position_from_low: opt_round(v.position),
        change_percent: round_to(v.change_pct, 2),
    }
}

fn stop_loss(v: &SpotView, average: f64, leverage: f64) -> StopLoss {
    let direction = if v.last > average { Direction::Long } else { Direction::Short };
    let risk_pct = 100.0 / leverage;
    let sl_pct = match direction {
        Direction::Long => -risk_pct * 0.5,
        Direction::Short => risk_pct * 0.5,
    };
    let sl_price = average * (1.0 + sl_pct / 100.0);
    let side = match direction {
        Direction::Long => "Long",
        Direction::Short => "Short",
    };
    let description = format!(
        "{} position: suggested stop-loss at {:.2} ({:+.2}% from average {}).",
        side, sl_price, sl_pct, average
    );
    StopLoss {
        verdict: Verdict::new(direction, description),
        risk_percent: round_to(risk_pct, 2),
        stop_loss_percent: round_to(sl_pct, 2),
        stop_loss_price: round_to(sl_price, 2),
    }
}

/// Entry point engine. Murni & deterministik: input sama -> report sama.
pub fn analyze(
    spot: Option<&TickerSnapshot>,
    futures: Option<&TickerSnapshot>,
    params: &PositionParams,
) -> InsightReport {
    let average = params.average_price.map(to_f64).filter(|x| *x > 0.0);
    let leverage = params.leverage.map(to_f64).filter(|x| *x > 0.0);
    let target = params.target_price.map(to_f64).filter(|x| *x > 0.0);

    let market_sentiment = futures.and_then(|f| f.funding_rate.map(|rate| market_sentiment(f, rate)));

    let Some(spot) = spot else {
        return InsightReport { market_sentiment, ..Default::default() };
    };
    let v = SpotView::from_snapshot(spot);

    InsightReport {
        price_position: Some(price_position(&v)),
        market_sentiment,
        volatility: Some(volatility(&v)),
        risk_level: leverage.map(|lev| risk_level(&v, lev)),
        target_reachability: average.zip(target).map(|(avg, tgt)| target_reachability(&v, avg, tgt)),
        volume_analysis: Some(volume_analysis(&v, spot.volume24h)),
        price_trend: Some(price_trend(&v)),
        recommendation: Some(recommendation(&v)),
        stop_loss: average.zip(leverage).map(|(avg, lev)| stop_loss(&v, avg, lev)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use rust_decimal_macros::dec;

    const EPS: f64 = 1e-9;

    fn spot(last: Decimal, high: Decimal, low: Decimal, change: Decimal) -> TickerSnapshot {
        TickerSnapshot {
            category: Category::Spot,
            symbol: "BTCUSDT".into(),
            last_price: last,
            high24h: high,
            low24h: low,
            volume24h: dec!(1000),
            change24h: change,
            funding_rate: None,
            open_interest: None,
        }
    }

    fn futures(rate: Option<Decimal>) -> TickerSnapshot {
        TickerSnapshot {
            category: Category::Linear,
            funding_rate: rate,
            open_interest: Some(dec!(12345.6)),
            ..spot(dec!(100), dec!(110), dec!(90), dec!(0.01))
        }
    }

    fn params(avg: Option<Decimal>, lev: Option<Decimal>, target: Option<Decimal>) -> PositionParams {
        PositionParams { average_price: avg, leverage: lev, target_price: target }
    }

    #[test]
    fn classify_takes_first_match() {
        let rules: [Rule<i32, &str>; 2] = [(|x: &i32| *x > 0, "pos"), (|x: &i32| *x > 10, "big")];
        assert_eq!(classify(&20, &rules, "none"), "pos");
        assert_eq!(classify(&-1, &rules, "none"), "none");
    }

    #[test]
    fn mid_range_rising_scenario() {
        let s = spot(dec!(100), dec!(110), dec!(90), dec!(0.06));
        let r = analyze(Some(&s), None, &PositionParams::default());

        let pp = r.price_position.as_ref().unwrap();
        assert_eq!(pp.verdict.level, PositionLevel::Mid);
        assert_eq!(pp.position_from_low, Some(50.0));

        let vol = r.volatility.as_ref().unwrap();
        assert_eq!(vol.verdict.level, VolatilityLevel::VeryHigh);
        assert!((vol.range_percent.unwrap() - 22.22).abs() < EPS);

        assert_eq!(r.price_trend.as_ref().unwrap().verdict.level, TrendLevel::Uptrend);
        assert_eq!(r.recommendation.as_ref().unwrap().verdict.level, Recommendation::NeutralWatch);
        assert_eq!(r.volume_analysis.as_ref().unwrap().verdict.level, VolumeLevel::ActiveRising);

        assert!(r.market_sentiment.is_none());
        assert!(r.risk_level.is_none());
        assert!(r.target_reachability.is_none());
        assert!(r.stop_loss.is_none());
    }

    #[test]
    fn falling_beats_low_price() {
        let s = spot(dec!(91), dec!(110), dec!(90), dec!(-0.06));
        let r = analyze(Some(&s), None, &PositionParams::default());
        let pp = r.price_position.as_ref().unwrap();
        assert_eq!(pp.verdict.level, PositionLevel::Low);
        assert_eq!(pp.position_from_low, Some(5.0));
        assert_eq!(r.recommendation.as_ref().unwrap().verdict.level, Recommendation::WaitAndWatch);
        assert_eq!(r.price_trend.as_ref().unwrap().verdict.level, TrendLevel::StrongDowntrend);
    }

    #[test]
    fn range_edges() {
        let at_high = analyze(Some(&spot(dec!(110), dec!(110), dec!(90), dec!(0))), None, &PositionParams::default());
        let pp = at_high.price_position.unwrap();
        assert_eq!(pp.position_from_low, Some(100.0));
        assert_eq!(pp.verdict.level, PositionLevel::High);

        let at_low = analyze(Some(&spot(dec!(90), dec!(110), dec!(90), dec!(0))), None, &PositionParams::default());
        let pp = at_low.price_position.unwrap();
        assert_eq!(pp.position_from_low, Some(0.0));
        assert_eq!(pp.verdict.level, PositionLevel::Low);
    }

    #[test]
    fn position_agrees_between_facets() {
        for (last, change) in [(dec!(93.7), dec!(0.02)), (dec!(108.3), dec!(-0.07)), (dec!(101.1), dec!(0.09))] {
            let r = analyze(Some(&spot(last, dec!(110), dec!(90), change)), None, &PositionParams::default());
            let a = r.price_position.unwrap().position_from_low;
            let b = r.price_trend.unwrap().position_from_low;
            let c = r.recommendation.unwrap().position_from_low;
            assert_eq!(a, b);
            assert_eq!(b, c);
        }
    }

    #[test]
    fn zero_range_falls_back_to_neutral() {
        let s = spot(dec!(100), dec!(100), dec!(100), dec!(0.06));
        let r = analyze(Some(&s), None, &PositionParams::default());
        let pp = r.price_position.unwrap();
        assert_eq!(pp.verdict.level, PositionLevel::Mid);
        assert_eq!(pp.position_from_low, None);
        // strong-uptrend butuh posisi > 60; posisi undefined -> uptrend biasa
        assert_eq!(r.price_trend.unwrap().verdict.level, TrendLevel::Uptrend);
        assert_eq!(r.recommendation.unwrap().verdict.level, Recommendation::NeutralWatch);
        let vol = r.volatility.unwrap();
        assert_eq!(vol.verdict.level, VolatilityLevel::Low);
        assert_eq!(vol.range_percent, Some(0.0));
    }

    #[test]
    fn zero_low_makes_volatility_undefined() {
        let s = spot(dec!(0), dec!(0), dec!(0), dec!(0));
        let r = analyze(Some(&s), None, &PositionParams::default());
        let vol = r.volatility.unwrap();
        assert_eq!(vol.verdict.level, VolatilityLevel::Normal);
        assert_eq!(vol.range_percent, None);
    }

    #[test]
    fn malformed_range_is_clamped_or_undefined() {
        // last di atas high -> clamp 100
        let r = analyze(Some(&spot(dec!(120), dec!(110), dec!(90), dec!(0))), None, &PositionParams::default());
        assert_eq!(r.price_position.unwrap().position_from_low, Some(100.0));
        // high < low -> range terbalik, posisi undefined, volatility di-floor 0
        let r = analyze(Some(&spot(dec!(100), dec!(90), dec!(110), dec!(0))), None, &PositionParams::default());
        assert_eq!(r.price_position.unwrap().position_from_low, None);
        assert_eq!(r.volatility.unwrap().range_percent, Some(0.0));
    }

    #[test]
    fn sentiment_bands() {
        let cases = [
            (dec!(0.00015), SentimentLevel::MildLongBias),
            (dec!(0.0001), SentimentLevel::MildLongBias),
            (dec!(0.02), SentimentLevel::OverheatedLong),
            (dec!(0.01), SentimentLevel::MildLongBias),
            (dec!(0.0101), SentimentLevel::OverheatedLong),
            (dec!(-0.0001), SentimentLevel::MildShortBias),
            (dec!(-0.01), SentimentLevel::MildShortBias),
            (dec!(-0.02), SentimentLevel::OverheatedShort),
            (dec!(0), SentimentLevel::Neutral),
        ];
        for (rate, want) in cases {
            let f = futures(Some(rate));
            let r = analyze(None, Some(&f), &PositionParams::default());
            assert_eq!(r.market_sentiment.unwrap().verdict.level, want, "rate {rate}");
        }
    }

    #[test]
    fn sentiment_reports_percent_with_four_decimals() {
        let f = futures(Some(dec!(0.00012345)));
        let ms = analyze(None, Some(&f), &PositionParams::default()).market_sentiment.unwrap();
        assert!((ms.funding_rate_percent - 0.0123).abs() < EPS);
        assert_eq!(ms.open_interest, Some(dec!(12345.6)));
    }

    #[test]
    fn sentiment_requires_funding_rate() {
        let f = futures(None);
        let r = analyze(None, Some(&f), &PositionParams::default());
        assert!(r.market_sentiment.is_none());
        assert!(r.is_empty());
        assert!(analyze(None, None, &PositionParams::default()).is_empty());
    }

    #[test]
    fn futures_only_yields_only_sentiment() {
        let f = futures(Some(dec!(0.0001)));
        let p = params(Some(dec!(100)), Some(dec!(10)), Some(dec!(120)));
        let r = analyze(None, Some(&f), &p);
        assert_eq!(r.entries().len(), 1);
        assert!(r.market_sentiment.is_some());
    }

    #[test]
    fn volatility_bands() {
        let cases = [
            (dec!(116), VolatilityLevel::VeryHigh),
            (dec!(112), VolatilityLevel::High),
            (dec!(105), VolatilityLevel::Normal),
            (dec!(102), VolatilityLevel::Low),
        ];
        for (high, want) in cases {
            let r = analyze(Some(&spot(dec!(100), high, dec!(100), dec!(0))), None, &PositionParams::default());
            assert_eq!(r.volatility.unwrap().verdict.level, want, "high {high}");
        }
    }

    #[test]
    fn risk_requires_leverage_and_scores_move() {
        let s = spot(dec!(100), dec!(110), dec!(90), dec!(0.04));
        assert!(analyze(Some(&s), None, &PositionParams::default()).risk_level.is_none());

        let cases = [
            (dec!(20), RiskLevel::VeryHigh), // 80
            (dec!(10), RiskLevel::High),     // 40
            (dec!(5), RiskLevel::Moderate),  // 20
            (dec!(2), RiskLevel::Low),       // 8
        ];
        for (lev, want) in cases {
            let r = analyze(Some(&s), None, &params(None, Some(lev), None));
            let risk = r.risk_level.unwrap();
            assert_eq!(risk.verdict.level, want, "lev {lev}");
            assert!((risk.risk_score - 4.0 * to_f64(lev)).abs() < EPS);
        }

        // pakai nilai absolut
        let down = spot(dec!(100), dec!(110), dec!(90), dec!(-0.04));
        let r = analyze(Some(&down), None, &params(None, Some(dec!(10)), None));
        assert_eq!(r.risk_level.unwrap().verdict.level, RiskLevel::High);
    }

    #[test]
    fn stop_loss_long_scenario() {
        let s = spot(dec!(105), dec!(110), dec!(90), dec!(0.01));
        let r = analyze(Some(&s), None, &params(Some(dec!(100)), Some(dec!(10)), None));
        let sl = r.stop_loss.unwrap();
        assert_eq!(sl.verdict.level, Direction::Long);
        assert_eq!(sl.stop_loss_percent, -5.0);
        assert_eq!(sl.stop_loss_price, 95.0);
        assert_eq!(sl.risk_percent, 10.0);
    }

    #[test]
    fn stop_loss_short_when_price_below_average() {
        let s = spot(dec!(95), dec!(110), dec!(90), dec!(0.01));
        let r = analyze(Some(&s), None, &params(Some(dec!(100)), Some(dec!(4)), None));
        let sl = r.stop_loss.unwrap();
        assert_eq!(sl.verdict.level, Direction::Short);
        assert_eq!(sl.stop_loss_percent, 12.5);
        assert_eq!(sl.stop_loss_price, 112.5);
    }

    #[test]
    fn stop_loss_needs_average_and_leverage() {
        let s = spot(dec!(105), dec!(110), dec!(90), dec!(0.01));
        let r = analyze(Some(&s), None, &params(None, Some(dec!(10)), None));
        assert!(r.stop_loss.is_none());
        assert!(r.risk_level.is_some());
        let r = analyze(Some(&s), None, &params(Some(dec!(100)), None, None));
        assert!(r.stop_loss.is_none());
        assert!(r.risk_level.is_none());
    }

    #[test]
    fn target_long_bands() {
        let p = |target| params(Some(dec!(100)), None, Some(target));

        // sudah lewat target
        let r = analyze(Some(&spot(dec!(105), dec!(110), dec!(90), dec!(0.01))), None, &p(dec!(104)));
        let t = r.target_reachability.unwrap();
        assert_eq!(t.direction, Direction::Long);
        assert_eq!(t.verdict.level, Reachability::Reached);
        assert!(t.distance_to_target.unwrap() < 0.0);

        // momentum kuat + dekat
        let r = analyze(Some(&spot(dec!(100), dec!(110), dec!(90), dec!(0.06))), None, &p(dec!(105)));
        assert_eq!(r.target_reachability.unwrap().verdict.level, Reachability::High);

        // turun tajam + jauh
        let r = analyze(Some(&spot(dec!(100), dec!(110), dec!(90), dec!(-0.06))), None, &p(dec!(130)));
        assert_eq!(r.target_reachability.unwrap().verdict.level, Reachability::Low);

        // sisanya moderate, profit vs rugi beda deskripsi
        let r = analyze(Some(&spot(dec!(102), dec!(110), dec!(90), dec!(0.01))), None, &p(dec!(110)));
        let t = r.target_reachability.unwrap();
        assert_eq!(t.verdict.level, Reachability::Moderate);
        assert!(t.verdict.description.contains("in profit"));
        assert_eq!(t.distance_from_average, Some(2.0));

        let r = analyze(Some(&spot(dec!(98), dec!(110), dec!(90), dec!(0.01))), None, &p(dec!(110)));
        let t = r.target_reachability.unwrap();
        assert_eq!(t.verdict.level, Reachability::Moderate);
        assert!(t.verdict.description.contains("under water"));
    }

    #[test]
    fn target_short_bands() {
        let p = |target| params(Some(dec!(100)), None, Some(target));

        // target 90 < avg -> short; harga 88 sudah di bawah target
        let r = analyze(Some(&spot(dec!(88), dec!(110), dec!(85), dec!(-0.01))), None, &p(dec!(90)));
        let t = r.target_reachability.unwrap();
        assert_eq!(t.direction, Direction::Short);
        assert_eq!(t.verdict.level, Reachability::Reached);

        let r = analyze(Some(&spot(dec!(95), dec!(110), dec!(90), dec!(-0.06))), None, &p(dec!(90)));
        assert_eq!(r.target_reachability.unwrap().verdict.level, Reachability::High);

        let r = analyze(Some(&spot(dec!(100), dec!(110), dec!(90), dec!(0.06))), None, &p(dec!(70)));
        assert_eq!(r.target_reachability.unwrap().verdict.level, Reachability::Low);

        let r = analyze(Some(&spot(dec!(97), dec!(110), dec!(90), dec!(0.01))), None, &p(dec!(90)));
        let t = r.target_reachability.unwrap();
        assert_eq!(t.verdict.level, Reachability::Moderate);
        assert!(t.verdict.description.contains("in profit"));
    }

    #[test]
    fn target_with_zero_price_is_neutral() {
        let s = spot(dec!(0), dec!(110), dec!(0), dec!(0));
        let r = analyze(Some(&s), None, &params(Some(dec!(100)), None, Some(dec!(120))));
        let t = r.target_reachability.unwrap();
        assert_eq!(t.verdict.level, Reachability::Moderate);
        assert_eq!(t.distance_to_target, None);
    }

    #[test]
    fn volume_ignores_volume_field() {
        let mut a = spot(dec!(100), dec!(110), dec!(90), dec!(0.01));
        let mut b = a.clone();
        a.volume24h = dec!(1);
        b.volume24h = dec!(999999999);
        let la = analyze(Some(&a), None, &PositionParams::default()).volume_analysis.unwrap().verdict.level;
        let lb = analyze(Some(&b), None, &PositionParams::default()).volume_analysis.unwrap().verdict.level;
        assert_eq!(la, VolumeLevel::Quiet);
        assert_eq!(la, lb);

        let r = analyze(Some(&spot(dec!(100), dec!(110), dec!(90), dec!(-0.03))), None, &PositionParams::default());
        assert_eq!(r.volume_analysis.unwrap().verdict.level, VolumeLevel::Normal);
    }

    #[test]
    fn recommendation_priority() {
        // low & flat -> consider buy
        let r = analyze(Some(&spot(dec!(92), dec!(110), dec!(90), dec!(0))), None, &PositionParams::default());
        assert_eq!(r.recommendation.unwrap().verdict.level, Recommendation::ConsiderBuy);
        // high & rising -> consider sell
        let r = analyze(Some(&spot(dec!(108), dec!(110), dec!(90), dec!(0.04))), None, &PositionParams::default());
        assert_eq!(r.recommendation.unwrap().verdict.level, Recommendation::ConsiderSell);
        // high & flat -> caution buy
        let r = analyze(Some(&spot(dec!(108), dec!(110), dec!(90), dec!(0.01))), None, &PositionParams::default());
        assert_eq!(r.recommendation.unwrap().verdict.level, Recommendation::CautionBuy);
        // mid & falling -> wait
        let r = analyze(Some(&spot(dec!(100), dec!(110), dec!(90), dec!(-0.04))), None, &PositionParams::default());
        assert_eq!(r.recommendation.unwrap().verdict.level, Recommendation::WaitAndWatch);
    }

    #[test]
    fn trend_strong_up_needs_upper_range() {
        let r = analyze(Some(&spot(dec!(105), dec!(110), dec!(90), dec!(0.07))), None, &PositionParams::default());
        assert_eq!(r.price_trend.unwrap().verdict.level, TrendLevel::StrongUptrend);
        let r = analyze(Some(&spot(dec!(100), dec!(110), dec!(90), dec!(-0.07))), None, &PositionParams::default());
        assert_eq!(r.price_trend.unwrap().verdict.level, TrendLevel::Downtrend);
        let r = analyze(Some(&spot(dec!(100), dec!(110), dec!(90), dec!(0.05))), None, &PositionParams::default());
        assert_eq!(r.price_trend.unwrap().verdict.level, TrendLevel::Sideways);
    }

    #[test]
    fn report_is_idempotent_and_serializes_expected_keys() {
        let s = spot(dec!(105), dec!(110), dec!(90), dec!(0.06));
        let f = futures(Some(dec!(0.0001)));
        let p = params(Some(dec!(100)), Some(dec!(10)), Some(dec!(120)));
        let a = serde_json::to_string(&analyze(Some(&s), Some(&f), &p)).unwrap();
        let b = serde_json::to_string(&analyze(Some(&s), Some(&f), &p)).unwrap();
        assert_eq!(a, b);

        let v: serde_json::Value = serde_json::from_str(&a).unwrap();
        for key in [
            "pricePosition",
            "marketSentiment",
            "volatility",
            "riskLevel",
            "targetReachability",
            "volumeAnalysis",
            "priceTrend",
            "recommendation",
            "stopLoss",
        ] {
            let facet = &v[key];
            assert!(facet.is_object(), "missing {key}");
            for field in ["level", "emoji", "description", "advice"] {
                assert!(facet.get(field).is_some(), "{key}.{field}");
            }
        }
        assert_eq!(v["marketSentiment"]["level"], "mild-long-bias");
        assert_eq!(v["stopLoss"]["level"], "long");
        assert_eq!(v["stopLoss"]["stopLossPrice"], 95.0);
        assert_eq!(v["volumeAnalysis"]["volume24h"], "1000");
    }

    #[test]
    fn text_has_one_line_per_facet() {
        let s = spot(dec!(100), dec!(110), dec!(90), dec!(0.06));
        let r = analyze(Some(&s), None, &PositionParams::default());
        let text = r.to_text();
        assert_eq!(text.lines().count(), 5);
        assert!(text.starts_with(PositionLevel::Mid.emoji()));
    }
}
