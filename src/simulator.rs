use crate::config::SimulationSettings;
use crate::models::{BacktestRun, Candle, EquityPoint, SignalAction, Trade, TradeReason};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Handle to the single open trade record. Holding the ledger index directly
/// makes the at-most-one-open-position rule structural: a second entry is
/// impossible while this is `Some`.
struct OpenPosition {
    trade_index: usize,
    volume: f64,
    entry_price: f64,
    stop_price: Option<f64>,
    take_price: Option<f64>,
}

/// Long-only position state machine over a signal-annotated candle series.
///
/// Exit checks on a bar run in strict priority order: stop-loss on the bar
/// low, then take-profit on the bar high, then a sell signal at the close.
/// The intrabar path is unknowable from OHLC alone, so ties always resolve
/// to the stop-loss. A bar that opens a position is not exit-checked.
pub struct Simulator {
    settings: SimulationSettings,
}

impl Simulator {
    pub fn new(settings: SimulationSettings) -> Self {
        Self { settings }
    }

    pub fn run(&self, candles: &[Candle], signals: &[SignalAction]) -> BacktestRun {
        let mut capital = self.settings.initial_capital;
        let mut total_fees = 0.0;
        let mut trades: Vec<Trade> = Vec::new();
        let mut equity_curve = Vec::with_capacity(candles.len());
        let mut open: Option<OpenPosition> = None;

        for (candle, signal) in candles.iter().zip(signals.iter()) {
            match open.as_ref() {
                None => {
                    if *signal == SignalAction::Buy && capital > 0.0 && candle.close > 0.0 {
                        open = Some(self.enter_position(
                            candle,
                            &mut capital,
                            &mut total_fees,
                            &mut trades,
                        ));
                    }
                }
                Some(position) => {
                    if let Some((exit_price, reason)) = evaluate_exit(position, candle, *signal) {
                        let position = open.take().expect("checked open position");
                        capital = self.exit_position(
                            &position,
                            exit_price,
                            candle.date,
                            reason,
                            &mut total_fees,
                            &mut trades,
                        );
                    }
                }
            }

            let held_value = open
                .as_ref()
                .map(|position| position.volume * candle.close)
                .unwrap_or(0.0);
            equity_curve.push(EquityPoint {
                date: candle.date,
                capital: capital + held_value,
            });
        }

        // Force-close anything still held after the last bar.
        if let (Some(position), Some(last)) = (open.take(), candles.last()) {
            capital = self.exit_position(
                &position,
                last.close,
                last.date,
                TradeReason::FinalSell,
                &mut total_fees,
                &mut trades,
            );
        }

        BacktestRun {
            id: Uuid::new_v4().to_string(),
            final_capital: capital,
            total_fees,
            trades,
            equity_curve,
        }
    }

    fn enter_position(
        &self,
        candle: &Candle,
        capital: &mut f64,
        total_fees: &mut f64,
        trades: &mut Vec<Trade>,
    ) -> OpenPosition {
        let entry_fee = *capital * self.settings.trading_fee_pct;
        let invested = *capital - entry_fee;
        let volume = invested / candle.close;
        *total_fees += entry_fee;
        *capital = 0.0;

        trades.push(Trade {
            entry_date: candle.date,
            exit_date: None,
            entry_price: candle.close,
            exit_price: None,
            volume,
            profit_pct: None,
            reason: TradeReason::Buy,
            entry_fee,
            exit_fee: None,
        });

        OpenPosition {
            trade_index: trades.len() - 1,
            volume,
            entry_price: candle.close,
            stop_price: self
                .settings
                .stop_loss_pct
                .map(|pct| candle.close * (1.0 - pct)),
            take_price: self
                .settings
                .take_profit_pct
                .map(|pct| candle.close * (1.0 + pct)),
        }
    }

    /// Settles the open trade record in place and returns the post-exit cash
    /// balance. The exit fee is netted against the entry notional when
    /// computing `profit_pct`; the entry fee is not re-subtracted because it
    /// already reduced the position size at entry.
    fn exit_position(
        &self,
        position: &OpenPosition,
        exit_price: f64,
        exit_date: DateTime<Utc>,
        reason: TradeReason,
        total_fees: &mut f64,
        trades: &mut [Trade],
    ) -> f64 {
        let gross = position.volume * exit_price;
        let exit_fee = gross * self.settings.trading_fee_pct;
        let net = gross - exit_fee;
        *total_fees += exit_fee;

        let entry_notional = position.volume * position.entry_price;
        let profit_pct = if entry_notional > 0.0 {
            (net - entry_notional) / entry_notional * 100.0
        } else {
            0.0
        };

        let trade = &mut trades[position.trade_index];
        trade.exit_date = Some(exit_date);
        trade.exit_price = Some(exit_price);
        trade.profit_pct = Some(profit_pct);
        trade.reason = reason;
        trade.exit_fee = Some(exit_fee);

        net
    }
}

fn evaluate_exit(
    position: &OpenPosition,
    candle: &Candle,
    signal: SignalAction,
) -> Option<(f64, TradeReason)> {
    if let Some(stop) = position.stop_price {
        if candle.low <= stop {
            return Some((stop, TradeReason::StopLoss));
        }
    }
    if let Some(take) = position.take_price {
        if candle.high >= take {
            return Some((take, TradeReason::TakeProfit));
        }
    }
    if signal == SignalAction::Sell {
        return Some((candle.close, TradeReason::SignalSell));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn hourly_candles(closes: &[f64], lows: &[f64], highs: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .zip(lows.iter().zip(highs.iter()))
            .enumerate()
            .map(|(i, (&close, (&low, &high)))| Candle {
                date: start + Duration::hours(i as i64),
                open: close,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    fn signals(actions: &[&str]) -> Vec<SignalAction> {
        actions.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn settings_without_risk_controls(fee: f64) -> SimulationSettings {
        SimulationSettings {
            initial_capital: 1000.0,
            stop_loss_pct: None,
            take_profit_pct: None,
            trading_fee_pct: fee,
            timeframe_minutes: 60,
        }
    }

    #[test]
    fn buy_then_sell_without_fees() {
        let candles = hourly_candles(
            &[100.0, 102.0, 101.0, 105.0, 103.0],
            &[99.0, 101.0, 100.0, 104.0, 102.0],
            &[101.0, 103.0, 102.0, 106.0, 104.0],
        );
        let signals = signals(&["buy", "", "", "sell", ""]);

        let run = Simulator::new(settings_without_risk_controls(0.0)).run(&candles, &signals);

        assert_eq!(run.trades.len(), 1);
        let trade = &run.trades[0];
        assert_eq!(trade.reason, TradeReason::SignalSell);
        assert_eq!(trade.entry_price, 100.0);
        assert_eq!(trade.exit_price, Some(105.0));
        assert!((trade.profit_pct.unwrap() - 5.0).abs() < 1e-9);
        assert!((run.final_capital - 1050.0).abs() < 1e-9);
        assert_eq!(run.total_fees, 0.0);
    }

    #[test]
    fn fees_follow_the_entry_and_exit_formulas() {
        let candles = hourly_candles(
            &[100.0, 102.0, 101.0, 105.0, 103.0],
            &[99.0, 101.0, 100.0, 104.0, 102.0],
            &[101.0, 103.0, 102.0, 106.0, 104.0],
        );
        let signals = signals(&["buy", "", "", "sell", ""]);
        let fee = 0.001;

        let run = Simulator::new(settings_without_risk_controls(fee)).run(&candles, &signals);

        // Derive the expected values from the accounting formulas.
        let entry_fee = 1000.0 * fee;
        let volume = (1000.0 - entry_fee) / 100.0;
        let gross = volume * 105.0;
        let exit_fee = gross * fee;
        let expected_final = gross - exit_fee;

        let trade = &run.trades[0];
        assert!((trade.entry_fee - entry_fee).abs() < 1e-9);
        assert!((trade.volume - volume).abs() < 1e-9);
        assert!((trade.exit_fee.unwrap() - exit_fee).abs() < 1e-9);
        assert!((run.final_capital - expected_final).abs() < 1e-9);

        let ledger_fees: f64 = run
            .trades
            .iter()
            .map(|t| t.entry_fee + t.exit_fee.unwrap_or(0.0))
            .sum();
        assert!((ledger_fees - run.total_fees).abs() < 1e-9);
    }

    #[test]
    fn hold_only_series_never_trades() {
        let candles = hourly_candles(
            &[100.0, 101.0, 102.0, 103.0, 104.0],
            &[99.0, 100.0, 101.0, 102.0, 103.0],
            &[101.0, 102.0, 103.0, 104.0, 105.0],
        );
        let signals = signals(&["hold", "hold", "hold", "hold", "hold"]);

        let run = Simulator::new(settings_without_risk_controls(0.001)).run(&candles, &signals);

        assert!(run.trades.is_empty());
        assert_eq!(run.final_capital, 1000.0);
        assert_eq!(run.total_fees, 0.0);
        assert_eq!(run.equity_curve.len(), candles.len());
        assert!(run.equity_curve.iter().all(|p| p.capital == 1000.0));
    }

    #[test]
    fn stop_loss_wins_when_stop_and_take_hit_on_the_same_bar() {
        // Second bar spans both thresholds; the recorded reason must be the stop.
        let candles = hourly_candles(
            &[100.0, 100.0, 100.0],
            &[99.0, 80.0, 99.0],
            &[101.0, 120.0, 101.0],
        );
        let signals = signals(&["buy", "", ""]);
        let settings = SimulationSettings {
            initial_capital: 1000.0,
            stop_loss_pct: Some(0.05),
            take_profit_pct: Some(0.05),
            trading_fee_pct: 0.0,
            timeframe_minutes: 60,
        };

        let run = Simulator::new(settings).run(&candles, &signals);

        assert_eq!(run.trades.len(), 1);
        assert_eq!(run.trades[0].reason, TradeReason::StopLoss);
        assert_eq!(run.trades[0].exit_price, Some(95.0));
    }

    #[test]
    fn take_profit_exits_at_the_threshold_price() {
        let candles = hourly_candles(
            &[100.0, 103.0, 100.0],
            &[99.5, 101.0, 99.0],
            &[100.5, 106.0, 101.0],
        );
        let signals = signals(&["buy", "", ""]);
        let settings = SimulationSettings {
            initial_capital: 1000.0,
            stop_loss_pct: Some(0.10),
            take_profit_pct: Some(0.04),
            trading_fee_pct: 0.0,
            timeframe_minutes: 60,
        };

        let run = Simulator::new(settings).run(&candles, &signals);

        assert_eq!(run.trades[0].reason, TradeReason::TakeProfit);
        assert_eq!(run.trades[0].exit_price, Some(104.0));
        assert!((run.final_capital - 1040.0).abs() < 1e-9);
    }

    #[test]
    fn still_long_position_is_force_closed_at_the_last_close() {
        let candles = hourly_candles(
            &[100.0, 102.0, 110.0],
            &[99.0, 101.0, 108.0],
            &[101.0, 103.0, 111.0],
        );
        let signals = signals(&["buy", "", ""]);

        let run = Simulator::new(settings_without_risk_controls(0.0)).run(&candles, &signals);

        assert_eq!(run.trades.len(), 1);
        assert_eq!(run.trades[0].reason, TradeReason::FinalSell);
        assert_eq!(run.trades[0].exit_price, Some(110.0));
        assert!((run.final_capital - 1100.0).abs() < 1e-9);
        // The equity curve still has one point per bar.
        assert_eq!(run.equity_curve.len(), 3);
    }

    #[test]
    fn entry_bar_is_not_exit_checked() {
        // The entry bar's low breaches the stop threshold; the exit must wait
        // for the next bar.
        let candles = hourly_candles(
            &[100.0, 100.0],
            &[90.0, 90.0],
            &[101.0, 101.0],
        );
        let signals = signals(&["buy", ""]);
        let settings = SimulationSettings {
            initial_capital: 1000.0,
            stop_loss_pct: Some(0.05),
            take_profit_pct: None,
            trading_fee_pct: 0.0,
            timeframe_minutes: 60,
        };

        let run = Simulator::new(settings).run(&candles, &signals);

        let trade = &run.trades[0];
        assert_eq!(trade.reason, TradeReason::StopLoss);
        assert_eq!(trade.exit_date, Some(candles[1].date));
    }

    #[test]
    fn repeated_buy_signals_never_pyramid() {
        let candles = hourly_candles(
            &[100.0, 101.0, 102.0, 103.0],
            &[99.0, 100.0, 101.0, 102.0],
            &[101.0, 102.0, 103.0, 104.0],
        );
        let signals = signals(&["buy", "buy", "buy", "sell"]);

        let run = Simulator::new(settings_without_risk_controls(0.0)).run(&candles, &signals);

        assert_eq!(run.trades.len(), 1);
        assert_eq!(
            run.trades.iter().filter(|t| !t.is_closed()).count(),
            0,
            "every recorded trade must be closed at the end of the run"
        );
    }
}
