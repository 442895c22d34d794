use anyhow::{anyhow, Result as AnyResult};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "buy",
            SignalAction::Sell => "sell",
            SignalAction::Hold => "hold",
        }
    }
}

impl FromStr for SignalAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(SignalAction::Buy),
            "sell" => Ok(SignalAction::Sell),
            "hold" | "" => Ok(SignalAction::Hold),
            other => Err(anyhow!("Unknown signal action '{}'", other)),
        }
    }
}

/// Why a trade record exists in its current form: `Buy` while the position is
/// still open, one of the exit variants once it has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeReason {
    Buy,
    StopLoss,
    TakeProfit,
    SignalSell,
    FinalSell,
}

impl TradeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeReason::Buy => "buy",
            TradeReason::StopLoss => "stop_loss",
            TradeReason::TakeProfit => "take_profit",
            TradeReason::SignalSell => "signal_sell",
            TradeReason::FinalSell => "final_sell",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub entry_date: DateTime<Utc>,
    pub exit_date: Option<DateTime<Utc>>,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub volume: f64,
    pub profit_pct: Option<f64>,
    pub reason: TradeReason,
    pub entry_fee: f64,
    pub exit_fee: Option<f64>,
}

impl Trade {
    pub fn is_closed(&self) -> bool {
        self.exit_date.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: DateTime<Utc>,
    pub capital: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRun {
    pub id: String,
    pub final_capital: f64,
    pub total_fees: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl BacktestRun {
    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|trade| trade.is_closed())
    }
}

/// Fixed statistic set produced by the metrics engine. Serialized field names
/// match the snapshot format the reporting layer writes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(rename = "Total Return (%)")]
    pub total_return_pct: f64,
    #[serde(rename = "Annualized Return (%)")]
    pub annualized_return_pct: f64,
    #[serde(rename = "Max Drawdown (%)")]
    pub max_drawdown_pct: f64,
    #[serde(rename = "Sharpe Ratio")]
    pub sharpe_ratio: f64,
    #[serde(rename = "Sortino Ratio")]
    pub sortino_ratio: f64,
    #[serde(rename = "Calmar Ratio")]
    pub calmar_ratio: f64,
    #[serde(rename = "Win Rate (%)")]
    pub win_rate_pct: f64,
    #[serde(rename = "Profit Factor")]
    pub profit_factor: f64,
    #[serde(rename = "Average Trade Return (%)")]
    pub avg_trade_return_pct: f64,
    #[serde(rename = "Expectancy")]
    pub expectancy: f64,
    #[serde(rename = "Std Dev of Returns")]
    pub std_dev_of_returns: f64,
    #[serde(rename = "Avg Win / Avg Loss")]
    pub avg_win_loss_ratio: f64,
    #[serde(rename = "Max Consecutive Wins")]
    pub max_consecutive_wins: u32,
    #[serde(rename = "Max Consecutive Losses")]
    pub max_consecutive_losses: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuneOutcome {
    pub params: HashMap<String, f64>,
    pub metrics: PerformanceMetrics,
    pub final_capital: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TuneReport {
    /// Ranked best-first: final capital descending, enumeration order on ties.
    pub ranked: Vec<TuneOutcome>,
    pub failed_combinations: usize,
}

impl TuneReport {
    pub fn best(&self) -> Option<&TuneOutcome> {
        self.ranked.first()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoldResult {
    pub split: usize,
    pub best_params: HashMap<String, f64>,
    pub final_capital: f64,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkForwardSummary {
    pub mean_return_pct: f64,
    pub median_return_pct: f64,
    /// Most frequent winning parameter sets across folds, count descending.
    pub top_params: Vec<(HashMap<String, f64>, usize)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkForwardReport {
    pub folds: Vec<FoldResult>,
    pub summary: WalkForwardSummary,
}

// Worker communication structures
#[derive(Debug, Clone)]
pub struct TuneTask {
    pub index: usize,
    pub params: HashMap<String, f64>,
}

#[derive(Debug)]
pub struct TuneTaskResult {
    pub index: usize,
    pub outcome: Option<TuneOutcome>,
    pub error: Option<String>,
}

fn normalize_parameter_map(raw: HashMap<String, Value>) -> HashMap<String, f64> {
    let mut cleaned = HashMap::with_capacity(raw.len());

    for (key, value) in raw.into_iter() {
        if let Some(num) = value.as_f64() {
            if num.is_finite() {
                cleaned.insert(key, num);
            } else {
                warn!(
                    "Skipping parameter `{}` due to non-finite numeric value {}",
                    key, value
                );
            }
            continue;
        }

        if let Some(text) = value.as_str() {
            match text.trim().parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => {
                    cleaned.insert(key, parsed);
                }
                _ => {
                    warn!(
                        "Skipping parameter `{}` due to non-numeric string value {}",
                        key, value
                    );
                }
            }
            continue;
        }

        if let Some(boolean) = value.as_bool() {
            cleaned.insert(key, if boolean { 1.0 } else { 0.0 });
            continue;
        }

        warn!(
            "Skipping parameter `{}` due to unsupported JSON value {}",
            key, value
        );
    }

    cleaned
}

pub fn parse_parameter_map_from_json(json: &str) -> AnyResult<HashMap<String, f64>> {
    let raw: HashMap<String, Value> =
        serde_json::from_str(json).map_err(|error| anyhow!("Invalid parameter JSON: {}", error))?;
    Ok(normalize_parameter_map(raw))
}
