// ===============================
// src/repl.rs
// ===============================
//
// Prompt interaktif:
//   > btc
//   > eth avg=3200 lev=10 target=3500
//   > exit | quit
//
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::config::{position_params_from_tokens, ParamError};
use crate::domain::{Category, PositionParams};
use crate::feed::BybitClient;
use crate::insight;
use crate::render::{display_report, display_snapshot};

const PROMPT: &str = "\nEnter a symbol (e.g. BTC, ETH) or 'exit': ";

#[derive(Debug, PartialEq)]
pub enum Input {
    Exit,
    Empty,
    Query { symbol: String, params: PositionParams },
    Invalid(ParamError),
}

pub fn parse_line(line: &str) -> Input {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Input::Empty;
    };
    if first.eq_ignore_ascii_case("exit") || first.eq_ignore_ascii_case("quit") {
        return Input::Exit;
    }
    match position_params_from_tokens(words) {
        Ok(params) => Input::Query { symbol: first.to_ascii_uppercase(), params },
        Err(e) => Input::Invalid(e),
    }
}

/// Satu lookup lengkap: ticker spot + futures + insight, sebagai teks.
pub async fn lookup(client: &BybitClient, symbol: &str, params: &PositionParams) -> String {
    let (spot, futures) = client.fetch_both(symbol).await;
    let report = insight::analyze(spot.as_ref(), futures.as_ref(), params);
    crate::metrics::observe_report(&report);
    [
        display_snapshot(spot.as_ref(), Category::Spot),
        display_snapshot(futures.as_ref(), Category::Linear),
        display_report(&report),
    ]
    .join("\n\n")
}

pub async fn run(client: BybitClient) -> io::Result<()> {
    let mut stdout = io::stdout();
    let mut lines = BufReader::new(io::stdin()).lines();

    stdout
        .write_all(b"Bybit ticker insights\nOptional: avg=<price> lev=<x> target=<price>\n")
        .await?;

    loop {
        stdout.write_all(PROMPT.as_bytes()).await?;
        stdout.flush().await?;

        // EOF (Ctrl-D) -> keluar
        let Some(line) = lines.next_line().await? else { break };

        match parse_line(&line) {
            Input::Exit => break,
            Input::Empty => warn!("please enter a symbol"),
            Input::Invalid(e) => warn!(%e, "invalid parameters"),
            Input::Query { symbol, params } => {
                stdout.write_all(format!("\nFetching {symbol}...\n\n").as_bytes()).await?;
                let text = lookup(&client, &symbol, &params).await;
                stdout.write_all(text.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
        }
    }

    info!("repl closed");
    stdout.write_all(b"Bye!\n").await?;
    stdout.flush().await
}
