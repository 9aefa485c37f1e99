//! Core domain types and logic.

pub mod ohlcv;
pub mod price_series;
pub mod crossover;
pub mod strategy;
pub mod position;
pub mod portfolio;
pub mod engine;
pub mod execution;
pub mod universe;
pub mod code_data;
pub mod backtest;
pub mod benchmark;
pub mod metrics;
pub mod config_validation;
pub mod error;
