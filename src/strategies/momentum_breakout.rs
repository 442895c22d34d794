use crate::indicators::{calculate_rsi, calculate_supertrend};
use crate::models::{Candle, SignalAction};
use crate::param_utils::{validated_period, validated_positive_f64};
use crate::strategy::StrategyError;
use std::collections::HashMap;

const RSI_BUY_LEVEL: f64 = 40.0;
const RSI_SELL_LEVEL: f64 = 75.0;

/// Faster variant of the Supertrend+RSI pairing: a short RSI window with
/// tighter entry/exit levels and a more reactive Supertrend.
pub struct MomentumBreakoutStrategy {
    template_id: String,
    rsi_period: usize,
    supertrend_period: usize,
    supertrend_multiplier: f64,
}

impl MomentumBreakoutStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> Result<Self, StrategyError> {
        let rsi_period = validated_period(parameters, "rsi_period", 7)?;
        let supertrend_period = validated_period(parameters, "supertrend_period", 7)?;
        let supertrend_multiplier =
            validated_positive_f64(parameters, "supertrend_multiplier", 2.0)?;
        Ok(Self {
            template_id: "momentum_breakout".to_string(),
            rsi_period,
            supertrend_period,
            supertrend_multiplier,
        })
    }
}

impl super::Strategy for MomentumBreakoutStrategy {
    fn template_id(&self) -> &str {
        &self.template_id
    }

    fn min_bars(&self) -> usize {
        self.rsi_period.max(self.supertrend_period)
    }

    fn generate_signals(&self, candles: &[Candle]) -> Vec<SignalAction> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let rsi = calculate_rsi(&closes, self.rsi_period);
        let trend = calculate_supertrend(candles, self.supertrend_period, self.supertrend_multiplier);

        let mut signals = vec![SignalAction::Hold; candles.len()];
        for i in 1..candles.len() {
            if rsi[i] < RSI_BUY_LEVEL && trend[i] {
                signals[i] = SignalAction::Buy;
            } else if rsi[i] > RSI_SELL_LEVEL && !trend[i] {
                signals[i] = SignalAction::Sell;
            }
        }

        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;

    #[test]
    fn defaults_build_a_short_lookback_strategy() {
        let strategy = MomentumBreakoutStrategy::new(&HashMap::new()).unwrap();
        assert_eq!(strategy.template_id(), "momentum_breakout");
        assert_eq!(strategy.min_bars(), 7);
    }

    #[test]
    fn empty_series_yields_no_signals() {
        let strategy = MomentumBreakoutStrategy::new(&HashMap::new()).unwrap();
        assert!(strategy.generate_signals(&[]).is_empty());
    }
}
