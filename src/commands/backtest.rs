use crate::config::SimulationSettings;
use crate::data::load_candle_snapshot;
use crate::metrics::calculate_metrics;
use crate::models::parse_parameter_map_from_json;
use crate::report::format_metrics;
use crate::simulator::Simulator;
use crate::strategy::create_strategy;
use anyhow::{anyhow, Result};
use log::{info, warn};
use std::path::Path;

/// Runs one simulation over a candle snapshot and logs the statistics. With
/// no template the snapshot must carry its own signal column.
pub fn run(
    settings: &SimulationSettings,
    data_file: &Path,
    template_id: Option<&str>,
    params_json: Option<&str>,
) -> Result<()> {
    settings.validate()?;
    let snapshot = load_candle_snapshot(data_file)?;

    let signals = match template_id {
        Some(template_id) => {
            let params = params_json
                .map(parse_parameter_map_from_json)
                .transpose()?
                .unwrap_or_default();
            let strategy = create_strategy(template_id, &params)?;
            if snapshot.candles.len() < strategy.min_bars() {
                warn!(
                    "Only {} candles for a strategy that needs {} to warm up",
                    snapshot.candles.len(),
                    strategy.min_bars()
                );
            }
            strategy.generate_signals(&snapshot.candles)
        }
        None => snapshot
            .signals
            .clone()
            .ok_or_else(|| anyhow!("No template given and the snapshot has no signal column"))?,
    };

    let run = Simulator::new(settings.clone()).run(&snapshot.candles, &signals);
    let metrics = calculate_metrics(
        &run.equity_curve,
        &run.trades,
        settings.initial_capital,
        settings.timeframe_minutes,
    );

    info!(
        "Run {} finished: {} closed trade(s), final capital {:.2}, fees {:.2}",
        run.id,
        run.closed_trades().count(),
        run.final_capital,
        run.total_fees
    );
    let exits = exit_breakdown(run.closed_trades());
    if !exits.is_empty() {
        info!("Exits: {}", exits);
    }
    info!("Performance:\n{}", format_metrics(&metrics));
    Ok(())
}

/// Renders closed trades as `reason=count` pairs for the run summary.
fn exit_breakdown<'a>(trades: impl Iterator<Item = &'a crate::models::Trade>) -> String {
    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    for trade in trades {
        let reason = trade.reason.as_str();
        match counts.iter_mut().find(|(label, _)| *label == reason) {
            Some((_, count)) => *count += 1,
            None => counts.push((reason, 1)),
        }
    }
    counts
        .into_iter()
        .map(|(label, count)| format!("{}={}", label, count))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Trade, TradeReason};
    use chrono::{TimeZone, Utc};

    fn closed_trade(reason: TradeReason) -> Trade {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Trade {
            entry_date: date,
            exit_date: Some(date),
            entry_price: 100.0,
            exit_price: Some(101.0),
            volume: 1.0,
            profit_pct: Some(1.0),
            reason,
            entry_fee: 0.1,
            exit_fee: Some(0.1),
        }
    }

    #[test]
    fn exit_breakdown_counts_by_reason() {
        let trades = vec![
            closed_trade(TradeReason::StopLoss),
            closed_trade(TradeReason::TakeProfit),
            closed_trade(TradeReason::StopLoss),
        ];
        assert_eq!(
            exit_breakdown(trades.iter()),
            "stop_loss=2, take_profit=1"
        );
        assert_eq!(exit_breakdown(std::iter::empty::<&Trade>()), "");
    }
}
