use crate::config::{SimulationSettings, TunerSettings};
use crate::metrics::calculate_metrics;
use crate::models::{Candle, FoldResult, WalkForwardReport, WalkForwardSummary};
use crate::simulator::Simulator;
use crate::strategy::create_strategy;
use crate::tuner::{parameter_signature, ParamGrid, Tuner};
use anyhow::{anyhow, Result};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Expanding-window out-of-sample validation. Each fold tunes on all history
/// up to the fold boundary and evaluates the winner on the next unseen slice.
pub struct WalkForwardValidator {
    simulation_settings: SimulationSettings,
    tuner_settings: TunerSettings,
    n_splits: usize,
}

impl WalkForwardValidator {
    pub fn new(
        simulation_settings: SimulationSettings,
        tuner_settings: TunerSettings,
        n_splits: usize,
    ) -> Self {
        Self {
            simulation_settings,
            tuner_settings,
            n_splits,
        }
    }

    pub fn run(
        &self,
        candles: &[Candle],
        template_id: &str,
        grid: &ParamGrid,
    ) -> Result<WalkForwardReport> {
        if self.n_splits == 0 {
            return Err(anyhow!("Walk-forward requires at least one split"));
        }
        let step = candles.len() / self.n_splits;
        if step == 0 {
            return Err(anyhow!(
                "Not enough rows ({}) for {} splits",
                candles.len(),
                self.n_splits
            ));
        }

        // The skip threshold uses the cheapest grid candidates so that a fold
        // is only dropped when no combination could warm up on it.
        let min_lookback = create_strategy(template_id, &grid.min_values())
            .map(|strategy| strategy.min_bars())
            .unwrap_or(0);

        let mut folds = Vec::new();
        for split in 0..self.n_splits {
            let Some((in_sample, out_sample)) = fold_windows(candles, step, split) else {
                break;
            };
            if out_sample.len() < min_lookback {
                warn!(
                    "Split {} skipped: {} out-of-sample rows is below the {}-bar warmup",
                    split + 1,
                    out_sample.len(),
                    min_lookback
                );
                continue;
            }

            info!(
                "Split {}/{}: tuning on {} rows, validating on {}",
                split + 1,
                self.n_splits,
                in_sample.len(),
                out_sample.len()
            );

            let tuner = Tuner::new(
                Arc::new(in_sample.to_vec()),
                self.simulation_settings.clone(),
                self.tuner_settings.clone(),
            );
            let report = tuner.run(template_id, grid);
            let Some(best) = report.best() else {
                warn!("Split {} skipped: every combination failed in-sample", split + 1);
                continue;
            };
            let best_params = best.params.clone();

            let strategy = create_strategy(template_id, &best_params)
                .map_err(|error| anyhow!("Winning parameters rejected: {}", error))?;
            let signals = strategy.generate_signals(out_sample);
            let run = Simulator::new(self.simulation_settings.clone()).run(out_sample, &signals);
            let metrics = calculate_metrics(
                &run.equity_curve,
                &run.trades,
                self.simulation_settings.initial_capital,
                self.simulation_settings.timeframe_minutes,
            );

            folds.push(FoldResult {
                split: split + 1,
                best_params,
                final_capital: run.final_capital,
                metrics,
            });
        }

        let summary = summarize(&folds);
        Ok(WalkForwardReport { folds, summary })
    }
}

/// In-sample is everything up to `step * (split + 1)`; out-of-sample is the
/// next `step` rows, clipped at the end of the series. Returns `None` once
/// either window is empty.
fn fold_windows(candles: &[Candle], step: usize, split: usize) -> Option<(&[Candle], &[Candle])> {
    let mid = step * (split + 1);
    if mid >= candles.len() {
        return None;
    }
    let end = (mid + step).min(candles.len());
    let in_sample = &candles[..mid];
    let out_sample = &candles[mid..end];
    if in_sample.is_empty() || out_sample.is_empty() {
        return None;
    }
    Some((in_sample, out_sample))
}

fn summarize(folds: &[FoldResult]) -> WalkForwardSummary {
    let mut returns: Vec<f64> = folds
        .iter()
        .map(|fold| fold.metrics.total_return_pct)
        .collect();
    returns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mean = if returns.is_empty() {
        0.0
    } else {
        returns.iter().sum::<f64>() / returns.len() as f64
    };
    let median = match returns.len() {
        0 => 0.0,
        n if n % 2 == 1 => returns[n / 2],
        n => (returns[n / 2 - 1] + returns[n / 2]) / 2.0,
    };

    WalkForwardSummary {
        mean_return_pct: mean,
        median_return_pct: median,
        top_params: top_parameter_sets(folds, 3),
    }
}

/// The most frequently winning parameter sets across folds; count ties break
/// toward the earlier fold.
fn top_parameter_sets(folds: &[FoldResult], limit: usize) -> Vec<(HashMap<String, f64>, usize)> {
    let mut order: Vec<String> = Vec::new();
    let mut by_signature: HashMap<String, (HashMap<String, f64>, usize)> = HashMap::new();

    for fold in folds {
        let signature = parameter_signature(&fold.best_params);
        match by_signature.get_mut(&signature) {
            Some((_, count)) => *count += 1,
            None => {
                order.push(signature.clone());
                by_signature.insert(signature, (fold.best_params.clone(), 1));
            }
        }
    }

    let mut ranked: Vec<(usize, HashMap<String, f64>, usize)> = order
        .into_iter()
        .enumerate()
        .map(|(first_seen, signature)| {
            let (params, count) = by_signature.remove(&signature).expect("tracked signature");
            (first_seen, params, count)
        })
        .collect();
    ranked.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, params, count)| (params, count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PerformanceMetrics;
    use chrono::{TimeZone, Utc};

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                date: Utc.timestamp_opt(1_700_000_000 + i as i64 * 3600, 0).unwrap(),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1.0,
            })
            .collect()
    }

    fn fold(split: usize, total_return_pct: f64, tag: f64) -> FoldResult {
        FoldResult {
            split,
            best_params: [("tag".to_string(), tag)].into_iter().collect(),
            final_capital: 1000.0,
            metrics: PerformanceMetrics {
                total_return_pct,
                ..PerformanceMetrics::default()
            },
        }
    }

    #[test]
    fn fold_windows_expand_and_clip() {
        let data = candles(10);
        let step = data.len() / 3;

        let (in0, out0) = fold_windows(&data, step, 0).unwrap();
        assert_eq!((in0.len(), out0.len()), (3, 3));

        let (in1, out1) = fold_windows(&data, step, 1).unwrap();
        assert_eq!((in1.len(), out1.len()), (6, 3));

        // The last fold is clipped to the series end.
        let (in2, out2) = fold_windows(&data, step, 2).unwrap();
        assert_eq!((in2.len(), out2.len()), (9, 1));

        assert!(fold_windows(&data, step, 3).is_none());
    }

    #[test]
    fn summary_uses_mean_median_and_mode() {
        let folds = vec![
            fold(1, 10.0, 1.0),
            fold(2, -5.0, 2.0),
            fold(3, 20.0, 1.0),
            fold(4, 5.0, 3.0),
        ];
        let summary = summarize(&folds);

        assert!((summary.mean_return_pct - 7.5).abs() < 1e-9);
        assert!((summary.median_return_pct - 7.5).abs() < 1e-9);
        assert_eq!(summary.top_params.len(), 3);
        assert_eq!(summary.top_params[0].1, 2);
        assert_eq!(summary.top_params[0].0.get("tag"), Some(&1.0));
    }

    #[test]
    fn empty_fold_list_summarizes_to_zeros() {
        let summary = summarize(&[]);
        assert_eq!(summary.mean_return_pct, 0.0);
        assert_eq!(summary.median_return_pct, 0.0);
        assert!(summary.top_params.is_empty());
    }

    #[test]
    fn degenerate_split_counts_are_rejected() {
        let validator = WalkForwardValidator::new(
            SimulationSettings::default(),
            TunerSettings::default(),
            0,
        );
        assert!(validator
            .run(&candles(10), "supertrend_rsi", &ParamGrid::new())
            .is_err());

        let validator = WalkForwardValidator::new(
            SimulationSettings::default(),
            TunerSettings::default(),
            20,
        );
        assert!(validator
            .run(&candles(10), "supertrend_rsi", &ParamGrid::new())
            .is_err());
    }
}
