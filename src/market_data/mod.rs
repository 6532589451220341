pub mod candle_store;
pub mod sentiment;
pub mod tick;

// Re-export the core records for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle_store::{reconcile_last, Candle, CandleKey, CandleStore, ChartSnapshot, StoreUpdate};
pub use sentiment::{SentimentClass, SentimentEntry, SentimentSnapshot};
pub use tick::TickSnapshot;
