//! Instrument universe: code lists from configuration, ranked selection and
//! data validation before a basket backtest.

use crate::domain::error::BacktestError;
use crate::domain::price_series::PriceSeries;
use crate::ports::data_port::DataPort;
use crate::ports::universe_port::UniverseSelector;
use chrono::NaiveDate;
use std::collections::HashSet;

pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    pub codes: Vec<String>,
}

impl Universe {
    pub fn count(&self) -> usize {
        self.codes.len()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),

    #[error("universe selection returned no instruments")]
    EmptySelection,

    #[error("all codes failed validation")]
    AllCodesFailed,
}

pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

/// Top-ranked codes from `selector`, de-duplicated and upper-cased.
pub fn select_universe(
    selector: &dyn UniverseSelector,
    as_of: NaiveDate,
    top_n: usize,
) -> Result<Vec<String>, BacktestError> {
    let mut seen = HashSet::new();
    let codes: Vec<String> = selector
        .select(as_of, top_n)?
        .into_iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .take(top_n)
        .collect();

    if codes.is_empty() {
        return Err(UniverseError::EmptySelection.into());
    }
    tracing::info!(count = codes.len(), %as_of, "selected universe");
    Ok(codes)
}

#[derive(Debug)]
pub struct UniverseValidationResult {
    pub universe: Universe,
    /// Loaded prices of every surviving code, in universe order.
    pub series: Vec<PriceSeries>,
    pub skipped: Vec<SkippedCode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCode {
    pub code: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    FetchFailed(String),
    InvalidData(String),
}

/// Fetch every code, dropping the ones that cannot take part.
///
/// Fails only when no code survives.
pub fn validate_universe(
    data_port: &dyn DataPort,
    codes: Vec<String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<UniverseValidationResult, BacktestError> {
    let requested = codes.len();
    let mut valid_codes = Vec::new();
    let mut series = Vec::new();
    let mut skipped = Vec::new();

    for code in codes {
        let bars = match data_port.fetch_prices(&code, start_date, end_date) {
            Ok(bars) => bars,
            Err(e) => {
                tracing::warn!(%code, error = %e, "skipping code, fetch failed");
                skipped.push(SkippedCode {
                    code,
                    reason: SkipReason::FetchFailed(e.to_string()),
                });
                continue;
            }
        };

        if bars.is_empty() {
            tracing::warn!(%code, "skipping code, no data in range");
            skipped.push(SkippedCode {
                code,
                reason: SkipReason::NoData,
            });
            continue;
        }

        match PriceSeries::new(code.clone(), bars) {
            Ok(s) => {
                tracing::debug!(%code, bars = s.len(), "code ok");
                valid_codes.push(code);
                series.push(s);
            }
            Err(e) => {
                tracing::warn!(%code, error = %e, "skipping code, invalid prices");
                skipped.push(SkippedCode {
                    code,
                    reason: SkipReason::InvalidData(e.to_string()),
                });
            }
        }
    }

    if valid_codes.is_empty() {
        return Err(UniverseError::AllCodesFailed.into());
    }

    if !skipped.is_empty() {
        tracing::info!(
            "backtesting {} of {} codes",
            valid_codes.len(),
            requested
        );
    }

    Ok(UniverseValidationResult {
        universe: Universe { codes: valid_codes },
        series,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::PriceBar;
    use std::collections::HashMap;

    struct StubData {
        bars: HashMap<String, Vec<PriceBar>>,
    }

    impl DataPort for StubData {
        fn fetch_prices(
            &self,
            code: &str,
            _start_date: NaiveDate,
            _end_date: NaiveDate,
        ) -> Result<Vec<PriceBar>, BacktestError> {
            if code == "BROKEN" {
                return Err(BacktestError::DataSource {
                    reason: "connection reset".into(),
                });
            }
            Ok(self.bars.get(code).cloned().unwrap_or_default())
        }

        fn list_symbols(&self) -> Result<Vec<String>, BacktestError> {
            Ok(self.bars.keys().cloned().collect())
        }

        fn get_data_range(
            &self,
            _code: &str,
        ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BacktestError> {
            Ok(None)
        }
    }

    struct StubRanking(Vec<&'static str>);

    impl UniverseSelector for StubRanking {
        fn select(&self, _as_of: NaiveDate, top_n: usize) -> Result<Vec<String>, BacktestError> {
            Ok(self.0.iter().take(top_n).map(|s| s.to_string()).collect())
        }
    }

    fn bar(code: &str, day: u32, close: f64) -> PriceBar {
        PriceBar {
            code: code.into(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10,
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_parse_codes_basic() {
        let result = parse_codes("TCS,INFY,HDFCBANK,ITC").unwrap();
        assert_eq!(result, vec!["TCS", "INFY", "HDFCBANK", "ITC"]);
    }

    #[test]
    fn test_parse_codes_trims_and_uppercases() {
        let result = parse_codes("  tcs , Infy ,itc  ").unwrap();
        assert_eq!(result, vec!["TCS", "INFY", "ITC"]);
    }

    #[test]
    fn test_parse_codes_empty_token() {
        assert!(matches!(parse_codes("TCS,,INFY"), Err(UniverseError::EmptyToken)));
        assert!(matches!(parse_codes(""), Err(UniverseError::EmptyToken)));
    }

    #[test]
    fn test_parse_codes_duplicate() {
        let result = parse_codes("TCS,INFY,tcs");
        assert!(matches!(result, Err(UniverseError::DuplicateCode(s)) if s == "TCS"));
    }

    #[test]
    fn select_universe_takes_top_n() {
        let ranking = StubRanking(vec!["ril", "TCS", "RIL", "INFY", "ITC"]);
        let codes = select_universe(&ranking, d(1), 3).unwrap();
        // "RIL" repeats within the first three so only two survive
        assert_eq!(codes, vec!["RIL", "TCS"]);
    }

    #[test]
    fn select_universe_empty_is_error() {
        let err = select_universe(&StubRanking(vec![]), d(1), 10).unwrap_err();
        assert!(matches!(err, BacktestError::Universe(UniverseError::EmptySelection)));
    }

    #[test]
    fn validate_universe_skips_missing_and_broken() {
        let mut bars = HashMap::new();
        bars.insert("TCS".to_string(), vec![bar("TCS", 2, 10.0), bar("TCS", 3, 11.0)]);
        bars.insert("BAD".to_string(), vec![bar("BAD", 3, 10.0), bar("BAD", 2, 11.0)]);
        let port = StubData { bars };

        let result = validate_universe(
            &port,
            vec!["TCS".into(), "NONE".into(), "BROKEN".into(), "BAD".into()],
            d(1),
            d(31),
        )
        .unwrap();

        assert_eq!(result.universe.codes, vec!["TCS"]);
        assert_eq!(result.universe.count(), 1);
        assert_eq!(result.series.len(), 1);
        assert_eq!(result.skipped.len(), 3);
        assert_eq!(result.skipped[0].reason, SkipReason::NoData);
        assert!(matches!(result.skipped[1].reason, SkipReason::FetchFailed(_)));
        assert!(matches!(result.skipped[2].reason, SkipReason::InvalidData(_)));
    }

    #[test]
    fn validate_universe_all_failed() {
        let port = StubData {
            bars: HashMap::new(),
        };
        let err = validate_universe(&port, vec!["X".into()], d(1), d(31)).unwrap_err();
        assert!(matches!(err, BacktestError::Universe(UniverseError::AllCodesFailed)));
    }
}
