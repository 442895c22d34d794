use crate::strategy::StrategyError;
use std::collections::HashMap;

/// Extract a parameter as f64 with a default value
pub fn get_param_f64(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    params.get(key).copied().unwrap_or(default)
}

/// Extract an indicator period: rounded, at least 1, finite.
pub fn validated_period(
    params: &HashMap<String, f64>,
    key: &str,
    default: usize,
) -> Result<usize, StrategyError> {
    let raw = params.get(key).copied().unwrap_or(default as f64);
    if !raw.is_finite() || raw.round() < 1.0 {
        return Err(StrategyError::InvalidParameter {
            name: key.to_string(),
            reason: format!("expected a period of at least 1, got {}", raw),
        });
    }
    Ok(raw.round() as usize)
}

/// Extract a strictly positive finite f64 parameter.
pub fn validated_positive_f64(
    params: &HashMap<String, f64>,
    key: &str,
    default: f64,
) -> Result<f64, StrategyError> {
    let raw = params.get(key).copied().unwrap_or(default);
    if !raw.is_finite() || raw <= 0.0 {
        return Err(StrategyError::InvalidParameter {
            name: key.to_string(),
            reason: format!("expected a positive number, got {}", raw),
        });
    }
    Ok(raw)
}

/// Extract a finite f64 parameter bounded to [min, max].
pub fn validated_range_f64(
    params: &HashMap<String, f64>,
    key: &str,
    default: f64,
    min: f64,
    max: f64,
) -> Result<f64, StrategyError> {
    let raw = params.get(key).copied().unwrap_or(default);
    if !raw.is_finite() || raw < min || raw > max {
        return Err(StrategyError::InvalidParameter {
            name: key.to_string(),
            reason: format!("expected a value in [{}, {}], got {}", min, max, raw),
        });
    }
    Ok(raw)
}
