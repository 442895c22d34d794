use crate::models::{EquityPoint, PerformanceMetrics, Trade};
use statrs::statistics::Statistics;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const MINUTES_PER_DAY: f64 = 1440.0;

/// Derives the fixed statistic set from an equity curve and trade ledger.
///
/// Degenerate input (empty curve, no trades, zero elapsed time) produces a
/// zero-filled result rather than an error. Ratios that are undefined because
/// there is no data report 0; genuine one-sided extremes (all wins, zero
/// losses) report +infinity.
pub fn calculate_metrics(
    equity_curve: &[EquityPoint],
    trades: &[Trade],
    initial_capital: f64,
    timeframe_minutes: u32,
) -> PerformanceMetrics {
    if equity_curve.is_empty() || initial_capital <= 0.0 || timeframe_minutes == 0 {
        return PerformanceMetrics::default();
    }

    let first = equity_curve.first().expect("checked non-empty");
    let last = equity_curve.last().expect("checked non-empty");
    let final_equity = last.capital;

    let total_return_pct = (final_equity / initial_capital - 1.0) * 100.0;
    let annualized_return_pct = annualized_return(initial_capital, final_equity, first, last);
    let max_drawdown_pct = max_drawdown(equity_curve);

    let returns = per_bar_returns(equity_curve);
    let annualization = (MINUTES_PER_DAY / timeframe_minutes as f64) * TRADING_DAYS_PER_YEAR;
    let sharpe_ratio = sharpe(&returns, annualization);
    let sortino_ratio = sortino(&returns, annualization);
    let calmar_ratio = calmar(annualized_return_pct, max_drawdown_pct);
    let std_dev_of_returns = sample_std_dev(&returns);

    let trade_stats = TradeStats::from_ledger(trades);

    PerformanceMetrics {
        total_return_pct,
        annualized_return_pct,
        max_drawdown_pct,
        sharpe_ratio,
        sortino_ratio,
        calmar_ratio,
        win_rate_pct: trade_stats.win_rate_pct(),
        profit_factor: trade_stats.profit_factor(),
        avg_trade_return_pct: trade_stats.avg_trade_return_pct(),
        expectancy: trade_stats.expectancy(),
        std_dev_of_returns,
        avg_win_loss_ratio: trade_stats.avg_win_loss_ratio(),
        max_consecutive_wins: trade_stats.max_consecutive_wins,
        max_consecutive_losses: trade_stats.max_consecutive_losses,
    }
}

fn annualized_return(
    initial_capital: f64,
    final_equity: f64,
    first: &EquityPoint,
    last: &EquityPoint,
) -> f64 {
    let elapsed_days = (last.date - first.date).num_seconds() as f64 / 86_400.0;
    let years = elapsed_days / 365.25;
    if years <= 0.0 {
        return 0.0;
    }

    let ratio = final_equity / initial_capital;
    if ratio <= 0.0 {
        return -100.0;
    }

    let annualized = (ratio.powf(1.0 / years) - 1.0) * 100.0;
    // Extreme short-horizon compounding can overflow; report +infinity
    // instead of leaking a NaN.
    if annualized.is_finite() {
        annualized
    } else {
        f64::INFINITY
    }
}

fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;

    for point in equity_curve {
        if point.capital > peak {
            peak = point.capital;
        }
        if peak > 0.0 {
            let drawdown = (point.capital - peak) / peak * 100.0;
            if drawdown < worst {
                worst = drawdown;
            }
        }
    }

    worst
}

/// Bar-over-bar equity changes as fractions, not percentages: a 10% move is
/// 0.1. "Std Dev of Returns" and the Sharpe/Sortino inputs keep this scale.
fn per_bar_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|window| {
            let prev = window[0].capital;
            let curr = window[1].capital;
            if prev > 0.0 {
                (curr - prev) / prev
            } else {
                0.0
            }
        })
        .collect()
}

fn sample_std_dev(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std_dev = returns.iter().copied().std_dev();
    if std_dev.is_finite() {
        std_dev
    } else {
        0.0
    }
}

fn sharpe(returns: &[f64], annualization: f64) -> f64 {
    let std_dev = sample_std_dev(returns);
    if std_dev == 0.0 {
        return 0.0;
    }
    let mean = returns.iter().copied().mean();
    mean / std_dev * annualization.sqrt()
}

fn sortino(returns: &[f64], annualization: f64) -> f64 {
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return 0.0;
    }
    let downside_std = sample_std_dev(&downside);
    if downside_std == 0.0 {
        return 0.0;
    }
    let mean = returns.iter().copied().mean();
    mean / downside_std * annualization.sqrt()
}

fn calmar(annualized_return_pct: f64, max_drawdown_pct: f64) -> f64 {
    if !max_drawdown_pct.is_finite() || max_drawdown_pct >= 0.0 {
        return 0.0;
    }
    annualized_return_pct / max_drawdown_pct.abs()
}

/// Aggregates over closed trades only; an unclosed record participates in the
/// equity curve via mark-to-market but never in trade statistics.
struct TradeStats {
    closed: usize,
    wins: usize,
    losses: usize,
    gross_profit: f64,
    gross_loss: f64,
    profit_sum: f64,
    max_consecutive_wins: u32,
    max_consecutive_losses: u32,
}

impl TradeStats {
    fn from_ledger(trades: &[Trade]) -> Self {
        let mut stats = Self {
            closed: 0,
            wins: 0,
            losses: 0,
            gross_profit: 0.0,
            gross_loss: 0.0,
            profit_sum: 0.0,
            max_consecutive_wins: 0,
            max_consecutive_losses: 0,
        };

        let mut win_streak = 0u32;
        let mut loss_streak = 0u32;

        for profit_pct in trades.iter().filter_map(|trade| trade.profit_pct) {
            stats.closed += 1;
            stats.profit_sum += profit_pct;

            if profit_pct > 0.0 {
                stats.wins += 1;
                stats.gross_profit += profit_pct;
                win_streak += 1;
                loss_streak = 0;
            } else {
                stats.losses += 1;
                stats.gross_loss += profit_pct.abs();
                loss_streak += 1;
                win_streak = 0;
            }

            stats.max_consecutive_wins = stats.max_consecutive_wins.max(win_streak);
            stats.max_consecutive_losses = stats.max_consecutive_losses.max(loss_streak);
        }

        stats
    }

    fn win_rate_pct(&self) -> f64 {
        if self.closed == 0 {
            return 0.0;
        }
        self.wins as f64 / self.closed as f64 * 100.0
    }

    fn avg_trade_return_pct(&self) -> f64 {
        if self.closed == 0 {
            return 0.0;
        }
        self.profit_sum / self.closed as f64
    }

    fn avg_win(&self) -> f64 {
        if self.wins == 0 {
            return 0.0;
        }
        self.gross_profit / self.wins as f64
    }

    fn avg_loss(&self) -> f64 {
        if self.losses == 0 {
            return 0.0;
        }
        self.gross_loss / self.losses as f64
    }

    fn profit_factor(&self) -> f64 {
        if self.closed == 0 {
            return 0.0;
        }
        if self.gross_loss > 0.0 {
            self.gross_profit / self.gross_loss
        } else if self.gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    fn avg_win_loss_ratio(&self) -> f64 {
        if self.closed == 0 {
            return 0.0;
        }
        let avg_loss = self.avg_loss();
        let avg_win = self.avg_win();
        if avg_loss > 0.0 {
            avg_win / avg_loss
        } else if avg_win > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    fn expectancy(&self) -> f64 {
        if self.closed == 0 {
            return 0.0;
        }
        let win_rate = self.wins as f64 / self.closed as f64;
        let loss_rate = self.losses as f64 / self.closed as f64;
        self.avg_win() * win_rate - self.avg_loss() * loss_rate
    }
}
