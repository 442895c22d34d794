use crate::config::{SimulationSettings, TunerSettings};
use crate::metrics::calculate_metrics;
use crate::models::{Candle, TuneOutcome, TuneReport, TuneTask, TuneTaskResult};
use crate::simulator::Simulator;
use crate::strategy::create_strategy;
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Candidate lists per parameter name, kept sorted by name so that the
/// Cartesian enumeration order is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ParamGrid {
    entries: Vec<(String, Vec<f64>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, candidates: Vec<f64>) {
        if let Some(entry) = self.entries.iter_mut().find(|(key, _)| key == name) {
            entry.1 = candidates;
            return;
        }
        self.entries.push((name.to_string(), candidates));
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
    }

    /// Parses `{"name": [v1, v2, ...], ...}`; a bare number is treated as a
    /// single-candidate list.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Value =
            serde_json::from_str(json).map_err(|error| anyhow!("Invalid grid JSON: {}", error))?;
        let Some(object) = raw.as_object() else {
            return Err(anyhow!("Grid JSON must be an object of candidate lists"));
        };

        let mut grid = Self::new();
        for (name, value) in object {
            let candidates = match value {
                Value::Array(values) => values
                    .iter()
                    .map(|v| {
                        v.as_f64()
                            .filter(|n| n.is_finite())
                            .ok_or_else(|| anyhow!("Grid entry `{}` has a non-numeric candidate", name))
                    })
                    .collect::<Result<Vec<f64>>>()?,
                Value::Number(_) => vec![value.as_f64().expect("checked number")],
                _ => {
                    return Err(anyhow!(
                        "Grid entry `{}` must be a number or an array of numbers",
                        name
                    ))
                }
            };
            if candidates.is_empty() {
                return Err(anyhow!("Grid entry `{}` has no candidates", name));
            }
            grid.insert(name, candidates);
        }
        Ok(grid)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn combination_count(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, candidates)| candidates.len())
            .product()
    }

    /// Full Cartesian product in odometer order, rightmost entry fastest. An
    /// empty grid yields one empty combination (strategy defaults).
    pub fn combinations(&self) -> Vec<HashMap<String, f64>> {
        let mut combos = Vec::with_capacity(self.combination_count());
        let mut indices = vec![0usize; self.entries.len()];

        loop {
            let combo: HashMap<String, f64> = self
                .entries
                .iter()
                .zip(indices.iter())
                .map(|((name, candidates), &i)| (name.clone(), candidates[i]))
                .collect();
            combos.push(combo);

            let mut position = self.entries.len();
            loop {
                if position == 0 {
                    return combos;
                }
                position -= 1;
                indices[position] += 1;
                if indices[position] < self.entries[position].1.len() {
                    break;
                }
                indices[position] = 0;
            }
        }
    }

    /// Smallest candidate per parameter, used for minimum-lookback checks.
    pub fn min_values(&self) -> HashMap<String, f64> {
        self.entries
            .iter()
            .map(|(name, candidates)| {
                let min = candidates
                    .iter()
                    .copied()
                    .fold(f64::INFINITY, f64::min);
                (name.clone(), min)
            })
            .collect()
    }
}

pub(crate) fn parameter_signature(parameters: &HashMap<String, f64>) -> String {
    let mut sorted: Vec<_> = parameters.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    format!("{:?}", sorted)
}

/// Exhaustive grid search over strategy parameters. Every combination gets an
/// isolated evaluation; a failing strategy is logged and skipped rather than
/// aborting the sweep.
pub struct Tuner {
    candles: Arc<Vec<Candle>>,
    simulation_settings: SimulationSettings,
    tuner_settings: TunerSettings,
}

impl Tuner {
    pub fn new(
        candles: Arc<Vec<Candle>>,
        simulation_settings: SimulationSettings,
        tuner_settings: TunerSettings,
    ) -> Self {
        Self {
            candles,
            simulation_settings,
            tuner_settings,
        }
    }

    pub fn run(&self, template_id: &str, grid: &ParamGrid) -> TuneReport {
        let combinations = grid.combinations();
        let total = combinations.len();
        info!(
            "Evaluating {} parameter combination{} for template {}",
            total,
            if total == 1 { "" } else { "s" },
            template_id
        );

        let num_workers = self.tuner_settings.resolve_workers(total);
        let (task_tx, task_rx): (Sender<TuneTask>, Receiver<TuneTask>) = bounded(total);
        let (result_tx, result_rx): (Sender<TuneTaskResult>, Receiver<TuneTaskResult>) =
            bounded(total);

        let mut handles = Vec::new();
        for _ in 0..num_workers {
            let rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let candles = self.candles.clone();
            let settings = self.simulation_settings.clone();
            let template_id = template_id.to_string();

            let handle = thread::spawn(move || {
                while let Ok(task) = rx.recv() {
                    let result = match evaluate_combination(
                        &candles,
                        &settings,
                        &template_id,
                        task.params.clone(),
                    ) {
                        Ok(outcome) => TuneTaskResult {
                            index: task.index,
                            outcome: Some(outcome),
                            error: None,
                        },
                        Err(error) => TuneTaskResult {
                            index: task.index,
                            outcome: None,
                            error: Some(error),
                        },
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });
            handles.push(handle);
        }
        drop(result_tx);

        for (index, params) in combinations.into_iter().enumerate() {
            let _ = task_tx.send(TuneTask { index, params });
        }
        drop(task_tx);

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .expect("static progress template")
                .progress_chars("#>-"),
        );

        // Ranking is a synchronization barrier: wait for every combination or
        // its share of the timeout budget, then sort what arrived.
        let deadline = Instant::now() + self.tuner_settings.task_timeout * total.max(1) as u32;
        let mut indexed_outcomes: Vec<(usize, TuneOutcome)> = Vec::new();
        let mut failed = 0usize;
        let mut completed = 0usize;

        while completed < total {
            if Instant::now() >= deadline {
                warn!(
                    "Timed out waiting for {} remaining combination{}; ranking partial results",
                    total - completed,
                    if total - completed == 1 { "" } else { "s" }
                );
                failed += total - completed;
                break;
            }
            match result_rx.recv_timeout(std::time::Duration::from_millis(200)) {
                Ok(result) => {
                    completed += 1;
                    pb.set_position(completed as u64);
                    match (result.outcome, result.error) {
                        (Some(outcome), _) => indexed_outcomes.push((result.index, outcome)),
                        (None, error) => {
                            failed += 1;
                            warn!(
                                "Combination {} failed: {}",
                                result.index,
                                error.unwrap_or_else(|| "unknown error".to_string())
                            );
                        }
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
        pb.finish_and_clear();

        for handle in handles {
            let _ = handle.join();
        }

        let ranked = rank_outcomes(indexed_outcomes);
        if let Some(best) = ranked.first() {
            info!(
                "Best combination {} -> final capital {:.2}",
                parameter_signature(&best.params),
                best.final_capital
            );
        } else {
            info!("No parameter combination produced a result");
        }

        TuneReport {
            ranked,
            failed_combinations: failed,
        }
    }
}

fn evaluate_combination(
    candles: &[Candle],
    settings: &SimulationSettings,
    template_id: &str,
    params: HashMap<String, f64>,
) -> Result<TuneOutcome, String> {
    let strategy = create_strategy(template_id, &params).map_err(|e| e.to_string())?;
    let signals = strategy.generate_signals(candles);
    let run = Simulator::new(settings.clone()).run(candles, &signals);
    let metrics = calculate_metrics(
        &run.equity_curve,
        &run.trades,
        settings.initial_capital,
        settings.timeframe_minutes,
    );

    Ok(TuneOutcome {
        params,
        metrics,
        final_capital: run.final_capital,
    })
}

/// Descending by realized final capital; ties keep enumeration order because
/// the pre-sort by index plus the stable capital sort never reorders equals.
fn rank_outcomes(mut indexed: Vec<(usize, TuneOutcome)>) -> Vec<TuneOutcome> {
    indexed.sort_by_key(|(index, _)| *index);
    let mut outcomes: Vec<TuneOutcome> = indexed.into_iter().map(|(_, o)| o).collect();
    outcomes.sort_by(|a, b| {
        b.final_capital
            .partial_cmp(&a.final_capital)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    outcomes
}
