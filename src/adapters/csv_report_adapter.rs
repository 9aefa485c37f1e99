//! CSV report adapter implementing ReportPort.
//!
//! Writes `returns.csv`, `trades.csv` and `summary.csv` into the output directory.

use std::fs;
use std::path::Path;

use crate::domain::error::MacrossError;
use crate::ports::report_port::{ReportContext, ReportPort};

pub struct CsvReportAdapter;

fn csv_error(path: &Path, e: impl std::fmt::Display) -> MacrossError {
    MacrossError::Data {
        reason: format!("failed to write {}: {}", path.display(), e),
    }
}

fn write_rows(path: &Path, header: &[&str], rows: Vec<Vec<String>>) -> Result<(), MacrossError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    wtr.write_record(header).map_err(|e| csv_error(path, e))?;
    for row in rows {
        wtr.write_record(&row).map_err(|e| csv_error(path, e))?;
    }
    wtr.flush()?;
    Ok(())
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, report: &ReportContext<'_>, output_dir: &Path) -> Result<(), MacrossError> {
        fs::create_dir_all(output_dir)?;

        let returns = report
            .returns
            .iter()
            .map(|r| {
                vec![
                    r.date.to_string(),
                    format!("{:.2}", r.equity),
                    format!("{:.6}", r.algorithm),
                    optional(r.benchmark),
                ]
            })
            .collect();
        write_rows(
            &output_dir.join("returns.csv"),
            &["date", "equity", "algorithm_return", "benchmark_return"],
            returns,
        )?;

        let trades = report
            .trades
            .iter()
            .map(|t| {
                vec![
                    t.code.clone(),
                    t.exchange.clone(),
                    t.quantity.to_string(),
                    format!("{:.4}", t.entry_price),
                    format!("{:.4}", t.exit_price),
                    t.entry_date.to_string(),
                    t.exit_date.to_string(),
                    format!("{:.2}", t.pnl),
                ]
            })
            .collect();
        write_rows(
            &output_dir.join("trades.csv"),
            &[
                "code",
                "exchange",
                "quantity",
                "entry_price",
                "exit_price",
                "entry_date",
                "exit_date",
                "pnl",
            ],
            trades,
        )?;

        let s = report.strategy;
        let m = report.metrics;
        let summary: Vec<(&str, String)> = vec![
            ("strategy", s.name.clone()),
            ("short_window", s.short_window.to_string()),
            ("long_window", s.long_window.to_string()),
            ("stop_loss", s.stop_loss_pct.to_string()),
            ("take_profit", s.take_profit_pct.to_string()),
            ("total_return", format!("{:.6}", m.total_return)),
            ("annualized_return", format!("{:.6}", m.annualized_return)),
            ("sharpe_ratio", format!("{:.4}", m.sharpe_ratio)),
            ("sortino_ratio", format!("{:.4}", m.sortino_ratio)),
            ("max_drawdown", format!("{:.6}", m.max_drawdown)),
            ("max_drawdown_duration", m.max_drawdown_duration.to_string()),
            ("total_trades", m.total_trades.to_string()),
            ("win_rate", format!("{:.4}", m.win_rate)),
            ("profit_factor", format!("{:.4}", m.profit_factor)),
            ("benchmark_return", optional(m.benchmark_return)),
            ("excess_return", optional(m.excess_return)),
        ];
        write_rows(
            &output_dir.join("summary.csv"),
            &["metric", "value"],
            summary
                .into_iter()
                .map(|(k, v)| vec![k.to_string(), v])
                .collect(),
        )
    }
}
