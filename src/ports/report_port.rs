//! Result export port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::BacktestError;

/// Port for handing finished backtest results to an external store.
pub trait ResultSink {
    fn render(&self, result: &BacktestResult) -> Result<String, BacktestError>;

    /// Several results in one document. Defaults to the single renders
    /// separated by a blank line.
    fn render_many(&self, results: &[BacktestResult]) -> Result<String, BacktestError> {
        let rendered = results
            .iter()
            .map(|result| self.render(result))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rendered.join("\n"))
    }

    /// File extension used when an output name has to be derived.
    fn extension(&self) -> &'static str;

    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), BacktestError> {
        std::fs::write(output_path, self.render(result)?)?;
        Ok(())
    }
}
