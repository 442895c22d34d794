use crate::config::SimulationSettings;
use crate::data::load_candle_snapshot;
use crate::metrics::calculate_metrics;
use crate::simulator::Simulator;
use crate::strategy::{create_strategy, STRATEGY_TEMPLATE_IDS};
use anyhow::Result;
use log::{info, warn};
use std::collections::HashMap;
use std::path::Path;

/// Backtests every known template with default parameters on the same data
/// and logs them side by side.
pub fn run(settings: &SimulationSettings, data_file: &Path) -> Result<()> {
    settings.validate()?;
    let snapshot = load_candle_snapshot(data_file)?;

    info!(
        "Comparing {} template(s) on {} candles",
        STRATEGY_TEMPLATE_IDS.len(),
        snapshot.candles.len()
    );

    for template_id in STRATEGY_TEMPLATE_IDS {
        let strategy = match create_strategy(template_id, &HashMap::new()) {
            Ok(strategy) => strategy,
            Err(error) => {
                warn!("Skipping {}: {}", template_id, error);
                continue;
            }
        };
        let signals = strategy.generate_signals(&snapshot.candles);
        let run = Simulator::new(settings.clone()).run(&snapshot.candles, &signals);
        let metrics = calculate_metrics(
            &run.equity_curve,
            &run.trades,
            settings.initial_capital,
            settings.timeframe_minutes,
        );
        info!(
            "{}: return {:.2}%, {} trade(s), win rate {:.1}%, max drawdown {:.2}%, Sharpe {:.2}",
            template_id,
            metrics.total_return_pct,
            run.trades.len(),
            metrics.win_rate_pct,
            metrics.max_drawdown_pct,
            metrics.sharpe_ratio
        );
    }
    Ok(())
}
