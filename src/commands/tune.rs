use crate::config::{SimulationSettings, TunerSettings};
use crate::data::load_candle_snapshot;
use crate::report::format_metrics;
use crate::tuner::{ParamGrid, Tuner};
use anyhow::Result;
use log::info;
use std::path::Path;
use std::sync::Arc;

pub fn run(
    settings: &SimulationSettings,
    tuner_settings: &TunerSettings,
    data_file: &Path,
    template_id: &str,
    grid_json: Option<&str>,
    top: usize,
) -> Result<()> {
    settings.validate()?;
    let snapshot = load_candle_snapshot(data_file)?;

    let grid = match grid_json {
        Some(json) => ParamGrid::from_json(json)?,
        None => default_grid(template_id),
    };

    let tuner = Tuner::new(
        Arc::new(snapshot.candles),
        settings.clone(),
        tuner_settings.clone(),
    );
    let report = tuner.run(template_id, &grid);

    info!(
        "{} combination(s) ranked, {} failed",
        report.ranked.len(),
        report.failed_combinations
    );
    for (rank, outcome) in report.ranked.iter().take(top.max(1)).enumerate() {
        let mut params: Vec<_> = outcome.params.iter().collect();
        params.sort_by(|a, b| a.0.cmp(b.0));
        let rendered: Vec<String> = params
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        info!(
            "#{} [{}] final capital {:.2}",
            rank + 1,
            rendered.join(", "),
            outcome.final_capital
        );
        info!("{}", format_metrics(&outcome.metrics));
    }
    Ok(())
}

/// Search spaces used when no grid JSON is supplied.
pub fn default_grid(template_id: &str) -> ParamGrid {
    let mut grid = ParamGrid::new();
    match template_id {
        "momentum_breakout" => {
            grid.insert("rsi_period", vec![5.0, 7.0, 9.0]);
            grid.insert("supertrend_period", vec![5.0, 7.0, 10.0]);
            grid.insert("supertrend_multiplier", vec![1.5, 2.0, 2.5]);
        }
        _ => {
            grid.insert("rsi_period", vec![7.0, 14.0, 21.0]);
            grid.insert("rsi_threshold", vec![40.0, 50.0, 60.0]);
            grid.insert("supertrend_period", vec![7.0, 10.0, 14.0]);
            grid.insert("supertrend_multiplier", vec![2.0, 3.0, 4.0]);
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grids_cover_every_template() {
        for template_id in crate::strategy::STRATEGY_TEMPLATE_IDS {
            let grid = default_grid(template_id);
            assert!(grid.combination_count() > 1, "empty grid for {template_id}");
        }
    }
}
