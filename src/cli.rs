//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::adapters::ranking_csv_adapter::RankingCsvAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestOutcome, BacktestResult, run_many};
use crate::domain::config_validation::{
    number, parse_date, strategy_params, validate_backtest_config, validate_data_config,
    validate_report_config, validate_strategy_config,
};
use crate::domain::error::BacktestError;
use crate::domain::portfolio::DEFAULT_INITIAL_CAPITAL;
use crate::domain::returns::RebalancePeriod;
use crate::domain::strategy::{Strategy, StrategyKind};
use crate::domain::universe::{DEFAULT_TOP_N, parse_codes, select_universe, validate_universe};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ResultSink;

#[derive(Parser, Debug)]
#[command(name = "backfolio", about = "Signal-driven portfolio backtester", version)]
pub struct Cli {
    /// Log filter, e.g. `info` or `backfolio=debug` (RUST_LOG wins when set)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Strategy file; repeat to run several strategies in parallel
        #[arg(short, long)]
        strategy: Vec<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        code: Option<String>,
        #[arg(long, value_enum)]
        format: Option<ReportFormat>,
        #[arg(long)]
        dry_run: bool,
    },
    /// List instruments available in the data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a strategy configuration
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// Show data range for symbol(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Csv,
}

impl ReportFormat {
    fn sink(self) -> Box<dyn ResultSink> {
        match self {
            ReportFormat::Json => Box::new(JsonReportAdapter::new()),
            ReportFormat::Csv => Box::new(CsvReportAdapter::new()),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Json => f.write_str("json"),
            ReportFormat::Csv => f.write_str("csv"),
        }
    }
}

/// Install the global tracing subscriber. Logs go to stderr.
pub fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // a second call (tests) leaves the first subscriber in place
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            strategy,
            output,
            code,
            format,
            dry_run,
        } => {
            let request = BacktestRequest {
                config_path: config,
                strategy_paths: strategy,
                output,
                code_override: code,
                format,
            };
            if dry_run {
                run_dry_run(&request).map(|()| ExitCode::SUCCESS)
            } else {
                run_backtest(&request)
            }
        }
        Command::ListSymbols { config } => run_list_symbols(&config).map(|()| ExitCode::SUCCESS),
        Command::Validate { strategy } => run_validate(&strategy).map(|()| ExitCode::SUCCESS),
        Command::Info { config, code } => {
            run_info(&config, code.as_deref()).map(|()| ExitCode::SUCCESS)
        }
    };

    result.unwrap_or_else(|e| {
        eprintln!("error: {e}");
        (&e).into()
    })
}

struct BacktestRequest {
    config_path: PathBuf,
    strategy_paths: Vec<PathBuf>,
    output: Option<PathBuf>,
    code_override: Option<String>,
    format: Option<ReportFormat>,
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, BacktestError> {
    tracing::debug!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// Paths in a config file are relative to the file itself.
fn resolve_path(config_path: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw.trim());
    if path.is_absolute() {
        return path;
    }
    match config_path.parent() {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn data_adapter(config_path: &Path, config: &dyn ConfigPort) -> Result<CsvAdapter, BacktestError> {
    validate_data_config(config)?;
    let directory = config
        .get_string("data", "directory")
        .ok_or_else(|| BacktestError::config_missing("data", "directory"))?;
    Ok(CsvAdapter::new(resolve_path(config_path, &directory)))
}

/// Strategies from `-s` files, or from the main config's `[strategy]`.
fn load_strategies(
    config: &FileConfigAdapter,
    strategy_paths: &[PathBuf],
) -> Result<Vec<Strategy>, BacktestError> {
    if strategy_paths.is_empty() {
        validate_strategy_config(config)?;
        return Ok(vec![build_strategy(config)?]);
    }

    strategy_paths
        .iter()
        .map(|path| {
            tracing::info!(path = %path.display(), "loading strategy");
            let adapter = load_config(path)?;
            validate_strategy_config(&adapter)?;
            build_strategy(&adapter)
        })
        .collect()
}

fn run_backtest(request: &BacktestRequest) -> Result<ExitCode, BacktestError> {
    // Stage 1: load and validate config
    tracing::info!(path = %request.config_path.display(), "loading config");
    let config = load_config(&request.config_path)?;
    validate_backtest_config(&config)?;
    validate_report_config(&config)?;

    // Stage 2: strategies
    let strategies = load_strategies(&config, &request.strategy_paths)?;
    let bt_config = build_backtest_config(&config)?;
    let format = resolve_format(request.format, &config);

    // Stage 3: universe and prices
    let data_port = data_adapter(&request.config_path, &config)?;
    let codes = resolve_codes(
        request.code_override.as_deref(),
        &config,
        &request.config_path,
        bt_config.start_date,
    )?;
    tracing::info!(codes = codes.len(), "validating universe");
    let validated = validate_universe(&data_port, codes, bt_config.start_date, bt_config.end_date)?;
    tracing::info!(
        instruments = validated.universe.count(),
        skipped = validated.skipped.len(),
        "universe ready"
    );

    // Stage 4: simulate every strategy
    let outcomes = run_many(&validated.series, &strategies, &bt_config);

    // Stage 5: hand results to the sink
    let mut failure: Option<BacktestError> = None;
    let mut completed: Vec<BacktestResult> = Vec::new();

    for (strategy, outcome) in strategies.iter().zip(outcomes) {
        match outcome {
            Ok(BacktestOutcome::Completed(result)) => {
                print_summary(&result);
                completed.push(*result);
            }
            Ok(BacktestOutcome::NoData { reason }) => {
                tracing::warn!(strategy = %strategy.name, "no result: {}", reason);
            }
            Err(e) => {
                eprintln!("error: {}: {e}", strategy.name);
                failure.get_or_insert(e);
            }
        }
    }

    if !completed.is_empty() {
        let sink = format.sink();
        emit(sink.as_ref(), &completed, request.output.as_deref(), strategies.len() > 1)?;
    }
    if let Some(e) = failure {
        return Err(e);
    }
    if completed.is_empty() {
        return Err(BacktestError::DataUnavailable {
            code: validated.universe.codes.join(","),
        });
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(result: &BacktestResult) {
    let m = &result.performance_metrics;
    let fmt_opt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v));
    let winners = result.trades.iter().filter(|t| t.is_win()).count();
    tracing::info!(
        "{}: total return {:.2}%, CAGR {:.2}%, Sharpe {}, max drawdown {:.2}%, win rate {}, {} trades ({} winning)",
        result.strategy_name,
        m.total_return,
        m.cagr,
        fmt_opt(m.sharpe),
        m.max_drawdown,
        fmt_opt(m.win_rate),
        m.total_trades,
        winners
    );
}

/// With several strategies every report gets its own file next to `output`,
/// or stdout carries them as one document.
fn emit(
    sink: &dyn ResultSink,
    results: &[BacktestResult],
    output: Option<&Path>,
    multiple: bool,
) -> Result<(), BacktestError> {
    let Some(path) = output else {
        let rendered = match results {
            [single] if !multiple => sink.render(single)?,
            _ => sink.render_many(results)?,
        };
        print!("{}", rendered);
        return Ok(());
    };

    let targets = if multiple {
        let names: Vec<&str> = results.iter().map(|r| r.strategy_name.as_str()).collect();
        per_strategy_paths(path, &names, sink.extension())
    } else {
        vec![path.to_path_buf()]
    };
    for (result, target) in results.iter().zip(&targets) {
        sink.write(result, &target.to_string_lossy())?;
        tracing::info!(path = %target.display(), strategy = %result.strategy_name, "report written");
    }
    Ok(())
}

fn slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if slug.chars().all(|c| c == '_') {
        "strategy".to_string()
    } else {
        slug
    }
}

/// `out/report.json` + "Golden Cross" → `out/report_golden_cross.json`.
///
/// Names that slug to the same file get a `_2`, `_3`, ... suffix so no
/// report overwrites another.
fn per_strategy_paths(base: &Path, strategy_names: &[&str], extension: &str) -> Vec<PathBuf> {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "result".to_string());
    let mut taken: HashSet<String> = HashSet::new();

    strategy_names
        .iter()
        .map(|name| {
            let slug = slug(name);
            let mut file = format!("{}_{}.{}", stem, slug, extension);
            let mut n = 2;
            while !taken.insert(file.clone()) {
                file = format!("{}_{}_{}.{}", stem, slug, n, extension);
                n += 1;
            }
            match base.parent() {
                Some(dir) => dir.join(file),
                None => PathBuf::from(file),
            }
        })
        .collect()
}

fn resolve_format(flag: Option<ReportFormat>, config: &dyn ConfigPort) -> ReportFormat {
    flag.unwrap_or_else(|| match config.get_string("report", "format") {
        Some(f) if f.trim().eq_ignore_ascii_case("csv") => ReportFormat::Csv,
        _ => ReportFormat::Json,
    })
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, BacktestError> {
    let start_date = parse_date(adapter.get_string("backtest", "start_date").as_deref(), "start_date")?;
    let end_date = parse_date(adapter.get_string("backtest", "end_date").as_deref(), "end_date")?;

    let rebalance = adapter
        .get_string("backtest", "rebalance")
        .map(|raw| raw.parse::<RebalancePeriod>())
        .transpose()
        .map_err(|reason| BacktestError::config_invalid("backtest", "rebalance", reason))?;

    Ok(BacktestConfig {
        start_date,
        end_date,
        initial_capital: number(adapter, "backtest", "initial_capital")?
            .unwrap_or(DEFAULT_INITIAL_CAPITAL),
        rebalance,
        risk_free_rate: number(adapter, "backtest", "risk_free_rate")?.unwrap_or(0.0),
    })
}

pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<Strategy, BacktestError> {
    let name = adapter
        .get_string("strategy", "name")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Unnamed".to_string());
    let description = adapter
        .get_string("strategy", "description")
        .unwrap_or_default();
    let kind_name = adapter
        .get_string("strategy", "kind")
        .ok_or_else(|| BacktestError::config_missing("strategy", "kind"))?;

    let kind = StrategyKind::from_params(&kind_name, &strategy_params(adapter)?)?;
    Ok(Strategy {
        name,
        description,
        kind,
    })
}

/// Instrument codes: `--code` override, then ranked `universe_file`, then
/// the `codes` / `code` list.
pub fn resolve_codes(
    code_override: Option<&str>,
    config: &dyn ConfigPort,
    config_path: &Path,
    as_of: NaiveDate,
) -> Result<Vec<String>, BacktestError> {
    if let Some(c) = code_override {
        return Ok(parse_codes(c)?);
    }

    if let Some(file) = config
        .get_string("backtest", "universe_file")
        .filter(|s| !s.trim().is_empty())
    {
        let top_n = number(config, "backtest", "top_n")?
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_TOP_N);
        let selector = RankingCsvAdapter::new(resolve_path(config_path, &file));
        return select_universe(&selector, as_of, top_n);
    }

    let listed = config
        .get_string("backtest", "codes")
        .filter(|s| !s.trim().is_empty())
        .or_else(|| config.get_string("backtest", "code"))
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| BacktestError::config_missing("backtest", "code"))?;
    Ok(parse_codes(&listed)?)
}

fn run_dry_run(request: &BacktestRequest) -> Result<(), BacktestError> {
    let config = load_config(&request.config_path)?;
    validate_backtest_config(&config)?;
    validate_data_config(&config)?;
    validate_report_config(&config)?;

    let strategies = load_strategies(&config, &request.strategy_paths)?;
    let bt_config = build_backtest_config(&config)?;
    let codes = resolve_codes(
        request.code_override.as_deref(),
        &config,
        &request.config_path,
        bt_config.start_date,
    )?;

    println!("Strategies:");
    for strategy in &strategies {
        println!("  {}: {}", strategy.name, strategy.kind);
    }
    println!("\nUniverse:");
    println!("  codes: {}", codes.join(", "));
    println!("\nPeriod:");
    println!("  {} to {}", bt_config.start_date, bt_config.end_date);
    println!("  initial capital: {:.2}", bt_config.initial_capital);
    println!("  rebalance: {}", bt_config.rebalance_for(codes.len()));
    println!("  format: {}", resolve_format(request.format, &config));
    println!("\nDry run complete: configuration is valid");
    Ok(())
}

fn run_list_symbols(config_path: &Path) -> Result<(), BacktestError> {
    let config = load_config(config_path)?;
    let adapter = data_adapter(config_path, &config)?;

    let symbols = adapter.list_symbols()?;
    if symbols.is_empty() {
        tracing::warn!(directory = %adapter.base_path().display(), "no symbols found");
    }
    for symbol in &symbols {
        println!("{}", symbol);
    }
    tracing::info!("{} symbols found", symbols.len());
    Ok(())
}

fn run_validate(strategy_path: &Path) -> Result<(), BacktestError> {
    tracing::info!(path = %strategy_path.display(), "validating strategy");
    let adapter = load_config(strategy_path)?;
    validate_strategy_config(&adapter)?;
    let strategy = build_strategy(&adapter)?;

    println!("Name:        {}", strategy.name);
    if !strategy.description.is_empty() {
        println!("Description: {}", strategy.description);
    }
    println!("Rule:        {}", strategy.kind);
    println!("Warm-up:     {} bars", strategy.kind.warmup_bars());
    println!("\nStrategy configuration is valid.");
    Ok(())
}

fn run_info(config_path: &Path, code: Option<&str>) -> Result<(), BacktestError> {
    let config = load_config(config_path)?;
    let adapter = data_adapter(config_path, &config)?;

    let codes = match code {
        Some(c) => parse_codes(c)?,
        None => adapter.list_symbols()?,
    };

    for c in &codes {
        match adapter.get_data_range(c) {
            Ok(Some((first, last, count))) => {
                println!("{}: {} bars, {} to {}", c, count, first, last);
            }
            Ok(None) => println!("{}: no data found", c),
            Err(e) => eprintln!("error querying {}: {}", c, e),
        }
    }
    Ok(())
}
