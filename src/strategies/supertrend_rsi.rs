use crate::indicators::{calculate_rsi, calculate_supertrend};
use crate::models::{Candle, SignalAction};
use crate::param_utils::{validated_period, validated_positive_f64, validated_range_f64};
use crate::strategy::StrategyError;
use std::collections::HashMap;

const RSI_SELL_LEVEL: f64 = 70.0;

/// Buys RSI dips while the Supertrend is bullish, sells RSI spikes once the
/// Supertrend turns bearish.
pub struct SupertrendRsiStrategy {
    template_id: String,
    rsi_period: usize,
    rsi_threshold: f64,
    supertrend_period: usize,
    supertrend_multiplier: f64,
}

impl SupertrendRsiStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> Result<Self, StrategyError> {
        let rsi_period = validated_period(parameters, "rsi_period", 14)?;
        let rsi_threshold = validated_range_f64(parameters, "rsi_threshold", 50.0, 0.0, 100.0)?;
        let supertrend_period = validated_period(parameters, "supertrend_period", 10)?;
        let supertrend_multiplier =
            validated_positive_f64(parameters, "supertrend_multiplier", 3.0)?;
        Ok(Self {
            template_id: "supertrend_rsi".to_string(),
            rsi_period,
            rsi_threshold,
            supertrend_period,
            supertrend_multiplier,
        })
    }
}

impl super::Strategy for SupertrendRsiStrategy {
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
            // NaN RSI during warm-up fails both comparisons and stays Hold.
            if rsi[i] < self.rsi_threshold && trend[i] {
                signals[i] = SignalAction::Buy;
            } else if rsi[i] > RSI_SELL_LEVEL && !trend[i] {
                signals[i] = SignalAction::Sell;
            }
        }

        signals
    }
}
