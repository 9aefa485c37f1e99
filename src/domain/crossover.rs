//! Short/long moving-average pair and crossover classification.

use crate::domain::error::MacrossError;
use crate::domain::price_series::PriceSeries;
use crate::domain::strategy::CrossoverConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crossover {
    /// Short average moved from strictly below to strictly above the long one.
    Up,
    /// Short average moved from strictly above to strictly below the long one.
    Down,
    None,
}

/// The four averages compared for one instrument on one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingAverages {
    pub short_today: f64,
    pub long_today: f64,
    pub short_yesterday: f64,
    pub long_yesterday: f64,
}

impl MovingAverages {
    pub fn compute(
        short_closes: &PriceSeries,
        long_closes: &PriceSeries,
        config: &CrossoverConfig,
    ) -> Result<Self, MacrossError> {
        Ok(MovingAverages {
            short_today: short_closes.trailing_mean(config.short_window, 0)?,
            long_today: long_closes.trailing_mean(config.long_window, 0)?,
            short_yesterday: short_closes.trailing_mean(config.short_window, 1)?,
            long_yesterday: long_closes.trailing_mean(config.long_window, 1)?,
        })
    }

    /// Strict comparisons on both days; a tie on either day never signals.
    pub fn classify(&self) -> Crossover {
        if self.short_today > self.long_today && self.short_yesterday < self.long_yesterday {
            Crossover::Up
        } else if self.short_today < self.long_today && self.short_yesterday > self.long_yesterday
        {
            Crossover::Down
        } else {
            Crossover::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn mas(
        short_today: f64,
        long_today: f64,
        short_yesterday: f64,
        long_yesterday: f64,
    ) -> MovingAverages {
        MovingAverages {
            short_today,
            long_today,
            short_yesterday,
            long_yesterday,
        }
    }

    #[test]
    fn cross_up_from_below() {
        assert_eq!(mas(101.0, 100.0, 99.0, 100.0).classify(), Crossover::Up);
    }

    #[test]
    fn cross_down_from_above() {
        assert_eq!(mas(99.0, 100.0, 101.0, 100.0).classify(), Crossover::Down);
    }

    #[test]
    fn staying_above_is_no_signal() {
        assert_eq!(mas(102.0, 100.0, 101.0, 100.0).classify(), Crossover::None);
    }

    #[test]
    fn tie_today_is_no_signal() {
        assert_eq!(mas(100.0, 100.0, 99.0, 100.0).classify(), Crossover::None);
        assert_eq!(mas(100.0, 100.0, 101.0, 100.0).classify(), Crossover::None);
    }

    #[test]
    fn tie_yesterday_is_no_signal() {
        assert_eq!(mas(101.0, 100.0, 100.0, 100.0).classify(), Crossover::None);
        assert_eq!(mas(99.0, 100.0, 100.0, 100.0).classify(), Crossover::None);
    }

    #[test]
    fn compute_from_series() {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let config = CrossoverConfig {
            short_window: 2,
            long_window: 4,
            ..Default::default()
        };
        // long: [10, 10, 10, 10, 20] → today mean(10,10,10,20)=12.5, yesterday 10
        let long = PriceSeries::from_closes("AAPL", start, &[10.0, 10.0, 10.0, 10.0, 20.0]);
        // short: [10, 10, 20] → today 15, yesterday 10
        let short = PriceSeries::from_closes("AAPL", start, &[10.0, 10.0, 20.0]);
        let m = MovingAverages::compute(&short, &long, &config).unwrap();
        assert!((m.short_today - 15.0).abs() < 1e-12);
        assert!((m.long_today - 12.5).abs() < 1e-12);
        assert!((m.short_yesterday - 10.0).abs() < 1e-12);
        assert!((m.long_yesterday - 10.0).abs() < 1e-12);
        // yesterday is a tie, so no signal even though short is now above
        assert_eq!(m.classify(), Crossover::None);
    }

    #[test]
    fn compute_refuses_short_long_series() {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let config = CrossoverConfig {
            short_window: 2,
            long_window: 4,
            ..Default::default()
        };
        let long = PriceSeries::from_closes("AAPL", start, &[10.0, 10.0, 10.0, 10.0]);
        let short = PriceSeries::from_closes("AAPL", start, &[10.0, 10.0, 20.0]);
        let err = MovingAverages::compute(&short, &long, &config).unwrap_err();
        assert!(matches!(err, MacrossError::InsufficientHistory { window: 4, .. }));
    }
}
