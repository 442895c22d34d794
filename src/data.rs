use crate::models::{Candle, SignalAction};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::{info, warn};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// One row of a candle snapshot file. The `signal` column is optional and
/// only present in exports that carry precomputed decisions.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandleRow {
    date: serde_json::Value,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
    #[serde(default)]
    signal: Option<String>,
}

/// Candle history plus any signals that shipped with it, aligned by row.
#[derive(Debug)]
pub struct CandleSnapshot {
    pub candles: Vec<Candle>,
    pub signals: Option<Vec<SignalAction>>,
}

/// Loads a JSON array of candle rows, drops rows without a usable close, and
/// returns the remainder sorted by date ascending.
pub fn load_candle_snapshot(path: &Path) -> Result<CandleSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let rows: Vec<CandleRow> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let has_signals = rows.iter().any(|row| row.signal.is_some());
    let mut paired: Vec<(Candle, SignalAction)> = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;

    for row in rows {
        if !row.close.is_finite() || row.close <= 0.0 {
            dropped += 1;
            continue;
        }
        let date = match parse_timestamp(&row.date) {
            Some(date) => date,
            None => {
                dropped += 1;
                continue;
            }
        };
        let signal = row
            .signal
            .as_deref()
            .map(|s| SignalAction::from_str(s).unwrap_or(SignalAction::Hold))
            .unwrap_or(SignalAction::Hold);
        paired.push((
            Candle {
                date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            },
            signal,
        ));
    }

    if dropped > 0 {
        warn!("Dropped {} unusable row(s) from {}", dropped, path.display());
    }
    if paired.is_empty() {
        return Err(anyhow!("No usable candles in {}", path.display()));
    }

    paired.sort_by_key(|(candle, _)| candle.date);
    info!("Loaded {} candles from {}", paired.len(), path.display());

    let (candles, signals): (Vec<Candle>, Vec<SignalAction>) = paired.into_iter().unzip();
    Ok(CandleSnapshot {
        candles,
        signals: if has_signals { Some(signals) } else { None },
    })
}

/// Accepts RFC 3339, naive `YYYY-MM-DD[ HH:MM:SS]` strings, and unix epoch
/// values (seconds, or milliseconds when the magnitude demands it).
fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(text) => parse_timestamp_str(text),
        serde_json::Value::Number(number) => {
            let epoch = number.as_i64()?;
            if epoch.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(epoch).single()
            } else {
                Utc.timestamp_opt(epoch, 0).single()
            }
        }
        _ => None,
    }
}

fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}
