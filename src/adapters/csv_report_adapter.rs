//! CSV analytics export implementing ResultSink.
//!
//! Blank-line separated sections: Metrics, Equity Curve, Allocation History,
//! Trades and Monthly Returns.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::BacktestError;
use crate::ports::report_port::ResultSink;

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

type Rows = csv::Writer<Vec<u8>>;

fn section<F>(title: &str, header: &[&str], fill: F) -> Result<String, BacktestError>
where
    F: FnOnce(&mut Rows) -> Result<(), csv::Error>,
{
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    let io = |e: csv::Error| BacktestError::Io(e.into());

    wtr.write_record([title]).map_err(io)?;
    wtr.write_record(header).map_err(io)?;
    fill(&mut wtr).map_err(io)?;

    let bytes = wtr.into_inner().map_err(|e| BacktestError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| BacktestError::Io(std::io::Error::other(e)))
}

fn money(value: f64) -> String {
    format!("{:.2}", value)
}

fn optional(value: Option<f64>) -> String {
    value.map(money).unwrap_or_default()
}

impl ResultSink for CsvReportAdapter {
    fn render(&self, result: &BacktestResult) -> Result<String, BacktestError> {
        let m = &result.performance_metrics;

        let metrics = section("Metrics", &["Metric", "Value"], |w| {
            w.write_record(["Strategy", result.strategy_name.as_str()])?;
            w.write_record(["CAGR", money(m.cagr).as_str()])?;
            w.write_record(["Sharpe", optional(m.sharpe).as_str()])?;
            w.write_record(["TotalReturn", money(m.total_return).as_str()])?;
            w.write_record(["MaxDrawdown", money(m.max_drawdown).as_str()])?;
            w.write_record(["WinRate", optional(m.win_rate).as_str()])?;
            w.write_record(["TotalTrades", m.total_trades.to_string().as_str()])
        })?;

        let equity = section("Equity Curve", &["Date", "Capital"], |w| {
            for point in &result.equity_curve {
                w.write_record([point.date.to_string(), money(point.capital)])?;
            }
            Ok(())
        })?;

        let allocations = section("Allocation History", &["Date", "Code", "Allocation"], |w| {
            for snapshot in &result.allocation_history {
                for (code, value) in &snapshot.allocations {
                    w.write_record([snapshot.date.to_string(), code.clone(), money(*value)])?;
                }
            }
            Ok(())
        })?;

        let trades = section(
            "Trades",
            &[
                "Code",
                "Side",
                "EntryDate",
                "ExitDate",
                "EntryPrice",
                "ExitPrice",
                "ReturnPct",
                "HoldingDays",
            ],
            |w| {
                for t in &result.trades {
                    w.write_record([
                        t.code.clone(),
                        t.side.to_string(),
                        t.entry_date.to_string(),
                        t.exit_date.to_string(),
                        money(t.entry_price),
                        money(t.exit_price),
                        money(t.return_pct),
                        t.holding_days().to_string(),
                    ])?;
                }
                Ok(())
            },
        )?;

        let monthly = section("Monthly Returns", &["Scope", "Year", "Month", "ReturnPct"], |w| {
            let portfolio = std::iter::once(("portfolio", &result.monthly_returns));
            let instruments = result
                .instrument_monthly_returns
                .iter()
                .map(|(code, months)| (code.as_str(), months));
            for (scope, months) in portfolio.chain(instruments) {
                for m in months {
                    w.write_record([
                        scope.to_string(),
                        m.year.to_string(),
                        m.month.to_string(),
                        money(m.return_pct),
                    ])?;
                }
            }
            Ok(())
        })?;

        Ok([metrics, equity, allocations, trades, monthly].join("\n"))
    }

    fn extension(&self) -> &'static str {
        "csv"
    }
}
