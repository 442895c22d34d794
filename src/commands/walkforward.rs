use crate::commands::tune::default_grid;
use crate::config::{SimulationSettings, TunerSettings};
use crate::data::load_candle_snapshot;
use crate::report::export_walkforward_report;
use crate::tuner::ParamGrid;
use crate::walkforward::WalkForwardValidator;
use anyhow::Result;
use log::{info, warn};
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub fn run(
    settings: &SimulationSettings,
    tuner_settings: &TunerSettings,
    data_file: &Path,
    template_id: &str,
    grid_json: Option<&str>,
    n_splits: usize,
    output_dir: &Path,
) -> Result<()> {
    settings.validate()?;
    let snapshot = load_candle_snapshot(data_file)?;

    let grid = match grid_json {
        Some(json) => ParamGrid::from_json(json)?,
        None => default_grid(template_id),
    };

    let validator = WalkForwardValidator::new(settings.clone(), tuner_settings.clone(), n_splits);
    let report = validator.run(&snapshot.candles, template_id, &grid)?;

    if report.folds.is_empty() {
        warn!("No fold produced an out-of-sample result");
    }
    for fold in &report.folds {
        info!(
            "Split {}: out-of-sample return {:.2}%, final capital {:.2}",
            fold.split, fold.metrics.total_return_pct, fold.final_capital
        );
    }
    info!(
        "Out-of-sample return across {} fold(s): mean {:.2}%, median {:.2}%",
        report.folds.len(),
        report.summary.mean_return_pct,
        report.summary.median_return_pct
    );
    for (params, count) in &report.summary.top_params {
        let mut sorted: Vec<_> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let rendered: Vec<String> = sorted
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        info!("Won {} fold(s): [{}]", count, rendered.join(", "));
    }

    export_walkforward_report(&report, output_dir)?;
    Ok(())
}
