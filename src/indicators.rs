use crate::models::Candle;

/// Wilder-smoothed RSI over a close series. The first `period` values are NaN
/// while the smoothing warms up; callers compare against thresholds, and NaN
/// comparisons never fire a signal.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    if period == 0 || n < period + 1 {
        return vec![f64::NAN; n];
    }

    let mut rsi = vec![f64::NAN; n];
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    rsi[period] = rsi_from_averages(avg_gain, avg_loss);

    for i in period + 1..n {
        let change = closes[i] - closes[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        rsi[i] = rsi_from_averages(avg_gain, avg_loss);
    }

    rsi
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Wilder-smoothed average true range with a NaN warm-up prefix of
/// `period - 1` bars.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Vec<f64> {
    let n = candles.len();
    if period == 0 || n < period {
        return vec![f64::NAN; n];
    }

    let mut true_ranges = Vec::with_capacity(n);
    true_ranges.push(candles[0].high - candles[0].low);
    for i in 1..n {
        let prev_close = candles[i - 1].close;
        let tr = (candles[i].high - candles[i].low)
            .max((candles[i].high - prev_close).abs())
            .max((candles[i].low - prev_close).abs());
        true_ranges.push(tr);
    }

    let mut atr = vec![f64::NAN; n];
    let mut smoothed = true_ranges[..period].iter().sum::<f64>() / period as f64;
    atr[period - 1] = smoothed;
    for i in period..n {
        smoothed = (smoothed * (period as f64 - 1.0) + true_ranges[i]) / period as f64;
        atr[i] = smoothed;
    }

    atr
}

/// Supertrend direction per bar: `true` is bullish. Bands sit at
/// hl2 ± multiplier × ATR; the trend flips when the close crosses the
/// *previous* bar's band and otherwise carries forward. A series shorter than
/// the ATR period is treated as all-bullish.
pub fn calculate_supertrend(candles: &[Candle], period: usize, multiplier: f64) -> Vec<bool> {
    let n = candles.len();
    if n == 0 {
        return Vec::new();
    }
    if period == 0 || n < period {
        return vec![true; n];
    }

    let atr = calculate_atr(candles, period);
    let mut upper = Vec::with_capacity(n);
    let mut lower = Vec::with_capacity(n);
    for (candle, atr_value) in candles.iter().zip(atr.iter()) {
        let hl2 = (candle.high + candle.low) / 2.0;
        upper.push(hl2 + multiplier * atr_value);
        lower.push(hl2 - multiplier * atr_value);
    }

    let mut trend = Vec::with_capacity(n);
    trend.push(true);
    for i in 1..n {
        // NaN bands from the ATR warm-up fail both comparisons, so the
        // previous direction carries through the warm-up window.
        let direction = if candles[i].close > upper[i - 1] {
            true
        } else if candles[i].close < lower[i - 1] {
            false
        } else {
            trend[i - 1]
        };
        trend.push(direction);
    }

    trend
}
