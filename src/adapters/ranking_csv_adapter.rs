//! Ranked universe from a CSV file, e.g. market capitalisation per code.
//!
//! Columns: `code,rank_metric[,date]`. With a `date` column each code uses
//! its latest row dated on or before the selection date; later rows are
//! ignored.

use crate::domain::error::BacktestError;
use crate::ports::universe_port::UniverseSelector;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct RankingRow {
    code: String,
    rank_metric: f64,
    #[serde(default)]
    date: Option<NaiveDate>,
}

pub struct RankingCsvAdapter {
    path: PathBuf,
}

impl RankingCsvAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_rows(&self) -> Result<Vec<RankingRow>, BacktestError> {
        let source_err = |reason: String| BacktestError::DataSource {
            reason: format!("{}: {}", self.path.display(), reason),
        };
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| source_err(e.to_string()))?;
        rdr.deserialize()
            .collect::<Result<Vec<RankingRow>, _>>()
            .map_err(|e| source_err(e.to_string()))
    }
}

impl UniverseSelector for RankingCsvAdapter {
    fn select(&self, as_of: NaiveDate, top_n: usize) -> Result<Vec<String>, BacktestError> {
        let mut latest: HashMap<String, (Option<NaiveDate>, f64)> = HashMap::new();
        for row in self.read_rows()? {
            if row.date.is_some_and(|d| d > as_of) || !row.rank_metric.is_finite() {
                continue;
            }
            let code = row.code.to_uppercase();
            match latest.get(&code) {
                Some((seen, _)) if *seen > row.date => {}
                _ => {
                    latest.insert(code, (row.date, row.rank_metric));
                }
            }
        }

        let mut ranked: Vec<(String, f64)> = latest
            .into_iter()
            .map(|(code, (_, metric))| (code, metric))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(ranked.into_iter().take(top_n).map(|(code, _)| code).collect())
    }
}
