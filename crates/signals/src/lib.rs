//! Entry/exit signal evaluation and dynamic-bot candidate ranking, built on
//! top of the pure decision rule in `fleet_core::signal`.

pub mod analyzer;
pub mod ranking;

pub use analyzer::SignalAnalyzer;
pub use ranking::{top_by_quote_volume, top_by_volatility};
