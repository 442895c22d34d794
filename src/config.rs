use anyhow::{anyhow, Result};
use std::time::Duration;

/// Risk and cost settings for a single simulation run. Stop-loss and
/// take-profit thresholds are fractions of the entry price; a `None` disables
/// the corresponding check.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub initial_capital: f64,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub trading_fee_pct: f64,
    pub timeframe_minutes: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            initial_capital: 1000.0,
            stop_loss_pct: Some(0.02),
            take_profit_pct: Some(0.04),
            trading_fee_pct: 0.001,
            timeframe_minutes: 60,
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(anyhow!(
                "initial_capital must be greater than zero (value: {})",
                self.initial_capital
            ));
        }
        if let Some(stop) = self.stop_loss_pct {
            if !stop.is_finite() || !(0.0..1.0).contains(&stop) {
                return Err(anyhow!(
                    "stop_loss_pct must be a fraction in [0, 1) (value: {})",
                    stop
                ));
            }
        }
        if let Some(take) = self.take_profit_pct {
            if !take.is_finite() || take < 0.0 {
                return Err(anyhow!(
                    "take_profit_pct must be a non-negative fraction (value: {})",
                    take
                ));
            }
        }
        if !self.trading_fee_pct.is_finite() || !(0.0..1.0).contains(&self.trading_fee_pct) {
            return Err(anyhow!(
                "trading_fee_pct must be a fraction in [0, 1) (value: {})",
                self.trading_fee_pct
            ));
        }
        if self.timeframe_minutes == 0 {
            return Err(anyhow!("timeframe_minutes must be greater than zero"));
        }
        Ok(())
    }
}

/// Runtime knobs for the grid search worker pool.
#[derive(Debug, Clone)]
pub struct TunerSettings {
    /// Worker thread count; `None` sizes the pool from the CPU count.
    pub workers: Option<usize>,
    /// Budget per parameter combination. A strategy that stalls past its
    /// share of the budget forfeits its slot instead of blocking the grid.
    pub task_timeout: Duration,
}

impl Default for TunerSettings {
    fn default() -> Self {
        Self {
            workers: None,
            task_timeout: Duration::from_secs(60),
        }
    }
}

impl TunerSettings {
    pub fn resolve_workers(&self, task_count: usize) -> usize {
        let requested = self.workers.unwrap_or_else(num_cpus::get);
        std::cmp::min(task_count.max(1), std::cmp::max(1, requested))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_pass_validation() {
        assert!(SimulationSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let mut settings = SimulationSettings {
            initial_capital: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        settings.initial_capital = 1000.0;
        settings.stop_loss_pct = Some(1.0);
        assert!(settings.validate().is_err());

        settings.stop_loss_pct = Some(0.05);
        settings.trading_fee_pct = -0.1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn worker_count_is_bounded_by_tasks() {
        let settings = TunerSettings {
            workers: Some(8),
            ..Default::default()
        };
        assert_eq!(settings.resolve_workers(3), 3);
        assert_eq!(settings.resolve_workers(100), 8);
        assert_eq!(settings.resolve_workers(0), 1);
    }
}
