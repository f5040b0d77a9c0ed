//! Data module for the market snapshot: price history, macro rates, and the
//! statistics computed from them

pub mod errors;
pub mod market;
pub mod rates;
pub mod snapshot;

// Re-export commonly used types
pub use errors::{DataError, DataResult, InstrumentError};
pub use market::{Lookback, MarketDataClient, PriceBatch, PricePoint, PriceSeries, PriceSource, DEFAULT_SYMBOLS};
pub use rates::{fetch_macro_rates, FredClient, RateObservation, RateSource, RatesOutcome, MACRO_SERIES};
pub use snapshot::{
    compute_metrics, InstrumentMetrics, InstrumentResult, MarketSnapshot, SnapshotEngine,
    SnapshotProvider,
};
