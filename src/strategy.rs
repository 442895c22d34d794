use crate::models::{Candle, SignalAction};
use std::collections::HashMap;
use thiserror::Error;

/// Signal-generation failures surfaced to the grid search, which logs and
/// skips the offending parameter combination instead of aborting the run.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unknown strategy template: {0}")]
    UnknownTemplate(String),
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },
}

/// A signal-generating capability: given OHLC history, produce one
/// Buy/Sell/Hold decision per bar. Implementations are constructed from a
/// validated parameter set and stay decoupled from the simulation engine.
pub trait Strategy: Send + Sync {
    fn template_id(&self) -> &str;

    /// Smallest series length for which the strategy can emit a non-trivial
    /// signal. Walk-forward uses this to skip undersized folds.
    fn min_bars(&self) -> usize;

    fn generate_signals(&self, candles: &[Candle]) -> Vec<SignalAction>;
}

#[path = "strategies/supertrend_rsi.rs"]
pub mod supertrend_rsi;

pub use supertrend_rsi::SupertrendRsiStrategy;

#[path = "strategies/momentum_breakout.rs"]
pub mod momentum_breakout;

pub use momentum_breakout::MomentumBreakoutStrategy;

pub const STRATEGY_TEMPLATE_IDS: &[&str] = &["supertrend_rsi", "momentum_breakout"];

pub fn create_strategy(
    template_id: &str,
    parameters: &HashMap<String, f64>,
) -> Result<Box<dyn Strategy>, StrategyError> {
    match template_id {
        "supertrend_rsi" => Ok(Box::new(SupertrendRsiStrategy::new(parameters)?)),
        "momentum_breakout" => Ok(Box::new(MomentumBreakoutStrategy::new(parameters)?)),
        _ => Err(StrategyError::UnknownTemplate(template_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_rejects_unknown_templates() {
        assert!(matches!(
            create_strategy("buy_the_dip", &HashMap::new()),
            Err(StrategyError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn factory_builds_every_registered_template_with_defaults() {
        for template_id in STRATEGY_TEMPLATE_IDS {
            let strategy = create_strategy(template_id, &HashMap::new()).unwrap();
            assert_eq!(strategy.template_id(), *template_id);
            assert!(strategy.min_bars() > 0);
        }
    }
}
