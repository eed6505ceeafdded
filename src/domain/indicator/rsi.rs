//! RSI (Relative Strength Index) indicator implementation.
//!
//! Average gain/loss is a plain rolling mean over the last n close-to-close
//! changes (no exponential smoothing):
//! - gain_j = max(C[j] - C[j-1], 0), loss_j = max(C[j-1] - C[j], 0)
//! - avg_gain[i] = mean(gain[i-n+1..=i]), likewise avg_loss
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: first n bars are invalid (need n price changes).

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_rsi(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        if period == 0 || i < period {
            values.push(IndicatorPoint::warmup(bar.date));
            continue;
        }

        let (gain_sum, loss_sum) = bars[i - period..=i]
            .windows(2)
            .map(|w| w[1].close - w[0].close)
            .fold((0.0_f64, 0.0_f64), |(g, l), change| {
                if change > 0.0 {
                    (g + change, l)
                } else {
                    (g, l - change)
                }
            });

        let avg_gain = gain_sum / period as f64;
        let avg_loss = loss_sum / period as f64;
        values.push(IndicatorPoint::ready(bar.date, rsi_value(avg_gain, avg_loss)));
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}
