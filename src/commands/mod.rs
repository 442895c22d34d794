pub mod backtest;
pub mod compare;
pub mod tune;
pub mod walkforward;
