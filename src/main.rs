use anyhow::Result;
use backtester::commands::{backtest, compare, tune, walkforward};
use backtester::config::{SimulationSettings, TunerSettings};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "backtester")]
#[command(about = "A trading strategy backtesting and validation tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Simulation knobs shared by every subcommand.
#[derive(Args)]
struct SimulationArgs {
    /// Starting capital in quote currency
    #[arg(long, default_value_t = 1000.0)]
    initial_capital: f64,
    /// Stop-loss distance as a fraction of the entry price (0 disables)
    #[arg(long, default_value_t = 0.02)]
    stop_loss: f64,
    /// Take-profit distance as a fraction of the entry price (0 disables)
    #[arg(long, default_value_t = 0.04)]
    take_profit: f64,
    /// Fee charged on each fill as a fraction of traded value
    #[arg(long, default_value_t = 0.001)]
    fee: f64,
    /// Candle timeframe in minutes, used for annualization
    #[arg(long, default_value_t = 60)]
    timeframe: u32,
}

impl SimulationArgs {
    fn to_settings(&self) -> SimulationSettings {
        SimulationSettings {
            initial_capital: self.initial_capital,
            stop_loss_pct: (self.stop_loss > 0.0).then_some(self.stop_loss),
            take_profit_pct: (self.take_profit > 0.0).then_some(self.take_profit),
            trading_fee_pct: self.fee,
            timeframe_minutes: self.timeframe,
        }
    }
}

#[derive(Args)]
struct TunerArgs {
    /// Worker thread count (defaults to the number of logical CPUs)
    #[arg(long)]
    workers: Option<usize>,
    /// Per-combination timeout budget in seconds
    #[arg(long, default_value_t = 60)]
    task_timeout: u64,
}

impl TunerArgs {
    fn to_settings(&self) -> TunerSettings {
        TunerSettings {
            workers: self.workers,
            task_timeout: Duration::from_secs(self.task_timeout),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one strategy over a candle snapshot
    Backtest {
        /// Path to the candle snapshot file
        data_file: PathBuf,
        /// Strategy template to run; omit to use signals embedded in the snapshot
        #[arg(long)]
        template: Option<String>,
        /// Strategy parameters as a JSON object
        #[arg(long)]
        params: Option<String>,
        #[command(flatten)]
        simulation: SimulationArgs,
    },
    /// Grid-search strategy parameters
    Tune {
        /// Path to the candle snapshot file
        data_file: PathBuf,
        /// Strategy template to tune
        template: String,
        /// Candidate grid as a JSON object of lists; omit for the built-in grid
        #[arg(long)]
        grid: Option<String>,
        /// How many ranked combinations to print
        #[arg(long, default_value_t = 5)]
        top: usize,
        #[command(flatten)]
        simulation: SimulationArgs,
        #[command(flatten)]
        tuner: TunerArgs,
    },
    /// Walk-forward validation with expanding in-sample windows
    Walkforward {
        /// Path to the candle snapshot file
        data_file: PathBuf,
        /// Strategy template to validate
        template: String,
        /// Candidate grid as a JSON object of lists; omit for the built-in grid
        #[arg(long)]
        grid: Option<String>,
        /// Number of folds
        #[arg(long, default_value_t = 5)]
        splits: usize,
        /// Directory for the CSV and JSON fold reports
        #[arg(short, long, default_value = "walkforward")]
        output: PathBuf,
        #[command(flatten)]
        simulation: SimulationArgs,
        #[command(flatten)]
        tuner: TunerArgs,
    },
    /// Backtest every template with defaults on the same data
    Compare {
        /// Path to the candle snapshot file
        data_file: PathBuf,
        #[command(flatten)]
        simulation: SimulationArgs,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting backtester. Not financial advice. Most retail traders lose money. Use at your own risk.");

    match Cli::parse().command {
        Commands::Backtest {
            data_file,
            template,
            params,
            simulation,
        } => backtest::run(
            &simulation.to_settings(),
            &data_file,
            template.as_deref(),
            params.as_deref(),
        ),
        Commands::Tune {
            data_file,
            template,
            grid,
            top,
            simulation,
            tuner,
        } => tune::run(
            &simulation.to_settings(),
            &tuner.to_settings(),
            &data_file,
            &template,
            grid.as_deref(),
            top,
        ),
        Commands::Walkforward {
            data_file,
            template,
            grid,
            splits,
            output,
            simulation,
            tuner,
        } => walkforward::run(
            &simulation.to_settings(),
            &tuner.to_settings(),
            &data_file,
            &template,
            grid.as_deref(),
            splits,
            &output,
        ),
        Commands::Compare {
            data_file,
            simulation,
        } => compare::run(&simulation.to_settings(), &data_file),
    }
}
