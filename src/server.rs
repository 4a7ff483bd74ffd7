// ===============================
// src/server.rs
// ===============================
//
// HTTP API (hyper 0.14):
//   GET  /api/price/{symbol}     spot
//   GET  /api/futures/{symbol}   linear
//   GET  /api/all/{symbol}       spot + linear (paralel)
//   GET  /api/insight/{symbol}   spot + linear + insight report
//        ?averagePrice=&leverage=&targetPrice=
//   POST /webhook/slack          outgoing webhook -> balas cepat, kirim hasil ke Slack
//   GET  /health
//   GET  /metrics                Prometheus text
//
// Pengiriman ke Slack selalu di-spawn (tidak menahan response).
//
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use ahash::AHashMap as HashMap;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::{position_params, ParamError};
use crate::domain::{Category, PositionParams};
use crate::feed::BybitClient;
use crate::insight;
use crate::metrics::{self, HTTP_REQUESTS};
use crate::slack::{extract_symbol, SlackNotifier};

pub struct AppState {
    pub client: BybitClient,
    pub slack: SlackNotifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Ticker(Category, String),
    All(String),
    Insight(String),
    SlackWebhook,
    Health,
    Metrics,
    Preflight,
    MethodNotAllowed,
    NotFound,
}

impl Route {
    /// Label metrics (tanpa symbol agar kardinalitas tetap kecil)
    pub fn label(&self) -> &'static str {
        match self {
            Route::Ticker(Category::Spot, _) => "price",
            Route::Ticker(Category::Linear, _) => "futures",
            Route::All(_) => "all",
            Route::Insight(_) => "insight",
            Route::SlackWebhook => "webhook_slack",
            Route::Health => "health",
            Route::Metrics => "metrics",
            Route::Preflight => "preflight",
            Route::MethodNotAllowed => "method_not_allowed",
            Route::NotFound => "not_found",
        }
    }
}

fn symbol_segment(seg: &str) -> Option<String> {
    let s = seg.trim();
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(s.to_ascii_uppercase())
}

pub fn route(method: &Method, path: &str) -> Route {
    if *method == Method::OPTIONS {
        return Route::Preflight;
    }
    let segs: Vec<&str> = path.trim_matches('/').split('/').collect();
    let (want, r) = match segs.as_slice() {
        ["api", kind, sym] => {
            let Some(sym) = symbol_segment(sym) else { return Route::NotFound };
            let r = match *kind {
                "price" => Route::Ticker(Category::Spot, sym),
                "futures" => Route::Ticker(Category::Linear, sym),
                "all" => Route::All(sym),
                "insight" => Route::Insight(sym),
                _ => return Route::NotFound,
            };
            (Method::GET, r)
        }
        ["webhook", "slack"] => (Method::POST, Route::SlackWebhook),
        ["health"] => (Method::GET, Route::Health),
        ["metrics"] => (Method::GET, Route::Metrics),
        _ => return Route::NotFound,
    };
    if *method == want { r } else { Route::MethodNotAllowed }
}

fn with_cors(mut rsp: Response<Body>) -> Response<Body> {
    let h = rsp.headers_mut();
    h.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    h.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    h.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
    rsp
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut rsp = Response::new(Body::from(bytes));
            *rsp.status_mut() = status;
            rsp.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
            rsp
        }
        Err(e) => {
            error!(?e, "serialize response failed");
            let mut rsp = Response::new(Body::from("internal error"));
            *rsp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            rsp
        }
    }
}

fn server_error(message: impl std::fmt::Display) -> Response<Body> {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &json!({ "error": "internal server error", "message": message.to_string() }),
    )
}

/// Query string -> map; key pertama yang muncul menang.
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(q) = query {
        for (k, v) in url::form_urlencoded::parse(q.as_bytes()) {
            out.entry(k.into_owned()).or_insert_with(|| v.into_owned());
        }
    }
    out
}

pub fn params_from_query(q: &HashMap<String, String>) -> Result<PositionParams, ParamError> {
    let get = |a: &str, b: &str| q.get(a).or_else(|| q.get(b)).map(String::as_str);
    position_params(
        get("averagePrice", "avg"),
        get("leverage", "lev"),
        get("targetPrice", "target"),
    )
}

async fn ticker(state: Arc<AppState>, category: Category, base: String) -> Response<Body> {
    let pair = state.client.pair(&base);
    let Some(snap) = state.client.fetch_ticker(&base, category).await else {
        return json_response(
            StatusCode::NOT_FOUND,
            &json!({ "error": "price data not found", "symbol": pair }),
        );
    };
    let rsp = json_response(StatusCode::OK, &json!({ "success": true, "data": &snap }));

    let slack = state.slack.clone();
    tokio::spawn(async move {
        match category {
            Category::Spot => slack.send(&pair, Some(&snap), None, None).await,
            Category::Linear => slack.send(&pair, None, Some(&snap), None).await,
        }
    });
    rsp
}

async fn all(state: Arc<AppState>, base: String) -> Response<Body> {
    let pair = state.client.pair(&base);
    let (spot, futures) = state.client.fetch_both(&base).await;
    let rsp = json_response(
        StatusCode::OK,
        &json!({ "success": true, "data": { "spot": &spot, "futures": &futures } }),
    );

    let slack = state.slack.clone();
    tokio::spawn(async move {
        let report = insight::analyze(spot.as_ref(), futures.as_ref(), &PositionParams::default());
        slack.send(&pair, spot.as_ref(), futures.as_ref(), Some(&report)).await;
    });
    rsp
}

async fn insight_route(state: Arc<AppState>, base: String, query: Option<&str>) -> Response<Body> {
    let params = match params_from_query(&parse_query(query)) {
        Ok(p) => p,
        Err(e) => {
            return json_response(StatusCode::BAD_REQUEST, &json!({ "error": e.to_string() }));
        }
    };
    let pair = state.client.pair(&base);
    let (spot, futures) = state.client.fetch_both(&base).await;
    if spot.is_none() && futures.is_none() {
        return json_response(
            StatusCode::NOT_FOUND,
            &json!({ "error": "price data not found", "symbol": pair }),
        );
    }

    let report = insight::analyze(spot.as_ref(), futures.as_ref(), &params);
    metrics::observe_report(&report);
    json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "data": {
                "symbol": pair,
                "spot": &spot,
                "futures": &futures,
                "params": &params,
                "insights": &report,
                "summary": report.to_text(),
            }
        }),
    )
}

async fn slack_webhook(state: Arc<AppState>, req: Request<Body>) -> Response<Body> {
    let bytes = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(e) => {
            error!(?e, "webhook: read body failed");
            return server_error(e);
        }
    };
    // body non-JSON diperlakukan seperti objek kosong
    let body: Value = serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({}));

    let Some(base) = extract_symbol(&body) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            &json!({ "error": "no symbol found; include one in the message (e.g. BTC, ETH)" }),
        );
    };
    let pair = state.client.pair(&base);
    info!(%pair, "slack webhook request");

    let rsp = json_response(
        StatusCode::OK,
        &json!({ "text": format!("🔍 Looking up {pair}..."), "response_type": "in_channel" }),
    );

    tokio::spawn(async move {
        let (spot, futures) = state.client.fetch_both(&base).await;
        let report = insight::analyze(spot.as_ref(), futures.as_ref(), &PositionParams::default());
        metrics::observe_report(&report);
        state.slack.send(&pair, spot.as_ref(), futures.as_ref(), Some(&report)).await;
    });
    rsp
}

fn metrics_response() -> Response<Body> {
    let mut rsp = Response::new(Body::from(metrics::encode_metrics()));
    rsp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    rsp
}

pub async fn handle(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>, Infallible> {
    let r = route(req.method(), req.uri().path());
    let label = r.label();
    let query = req.uri().query().map(str::to_string);

    let rsp = match r {
        Route::Ticker(category, sym) => ticker(state, category, sym).await,
        Route::All(sym) => all(state, sym).await,
        Route::Insight(sym) => insight_route(state, sym, query.as_deref()).await,
        Route::SlackWebhook => slack_webhook(state, req).await,
        Route::Health => json_response(
            StatusCode::OK,
            &json!({ "status": "ok", "timestamp": chrono::Utc::now().to_rfc3339() }),
        ),
        Route::Metrics => metrics_response(),
        Route::Preflight => {
            let mut rsp = Response::new(Body::empty());
            *rsp.status_mut() = StatusCode::NO_CONTENT;
            rsp
        }
        Route::MethodNotAllowed => {
            json_response(StatusCode::METHOD_NOT_ALLOWED, &json!({ "error": "method not allowed" }))
        }
        Route::NotFound => json_response(StatusCode::NOT_FOUND, &json!({ "error": "not found" })),
    };

    HTTP_REQUESTS
        .with_label_values(&[label, rsp.status().as_str()])
        .inc();
    Ok(with_cors(rsp))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(?e, "ctrl_c handler failed");
    }
    info!("shutdown signal received");
}

pub async fn serve(port: u16, state: Arc<AppState>) -> Result<(), hyper::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, state.clone()))) }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    info!(%addr, "api listening (routes: /api/price|futures|all|insight/:symbol, /webhook/slack, /health, /metrics)");
    server.with_graceful_shutdown(shutdown_signal()).await
}
