//! JSON report adapter implementing ResultSink.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::BacktestError;
use crate::ports::report_port::ResultSink;

/// Writes the rounded result record as pretty-printed JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ResultSink for JsonReportAdapter {
    fn render(&self, result: &BacktestResult) -> Result<String, BacktestError> {
        let mut json = serde_json::to_string_pretty(&result.rounded())?;
        json.push('\n');
        Ok(json)
    }

    /// A single JSON array, so several runs stay one parseable document.
    fn render_many(&self, results: &[BacktestResult]) -> Result<String, BacktestError> {
        let rounded: Vec<BacktestResult> = results.iter().map(BacktestResult::rounded).collect();
        let mut json = serde_json::to_string_pretty(&rounded)?;
        json.push('\n');
        Ok(json)
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{BacktestConfig, run_backtest};
    use crate::domain::ohlcv::PriceBar;
    use crate::domain::price_series::PriceSeries;
    use crate::domain::strategy::{Strategy, StrategyKind};
    use chrono::NaiveDate;

    fn sample_result() -> BacktestResult {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = [100.0, 101.2345, 99.5]
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                code: "ITC".into(),
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1,
            })
            .collect();
        let series = PriceSeries::new("ITC", bars).unwrap();
        let strategy = Strategy {
            name: "Hold ITC".into(),
            description: String::new(),
            kind: StrategyKind::BuyAndHold,
        };
        let config = BacktestConfig {
            start_date: start,
            end_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            initial_capital: 10_000.0,
            rebalance: None,
            risk_free_rate: 0.0,
        };
        run_backtest(&[series], &strategy, &config)
            .unwrap()
            .into_result()
            .unwrap()
    }

    #[test]
    fn renders_rounded_record() {
        let json = JsonReportAdapter::new().render(&sample_result()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["strategy_name"], "Hold ITC");
        assert_eq!(value["strategy"]["kind"], "buy_and_hold");
        assert_eq!(value["rebalance"], "daily");
        assert_eq!(value["equity_curve"][1]["capital"], 10_123.45);
        assert_eq!(value["allocation_history"][1]["allocations"]["ITC"], 10_123.45);
        assert!(value["performance_metrics"]["CAGR"].is_number());
        assert!(value["trades"].as_array().unwrap().is_empty());
    }

    #[test]
    fn renders_many_as_one_array() {
        let first = sample_result();
        let mut second = sample_result();
        second.strategy_name = "Hold ITC again".into();

        let json = JsonReportAdapter::new().render_many(&[first, second]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let runs = value.as_array().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1]["strategy_name"], "Hold ITC again");
        assert_eq!(runs[0]["equity_curve"][1]["capital"], 10_123.45);
    }

    #[test]
    fn writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("result.json");
        let adapter = JsonReportAdapter::new();
        adapter.write(&sample_result(), path.to_str().unwrap()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with('{'));
        assert_eq!(adapter.extension(), "json");
    }
}
