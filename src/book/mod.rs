//! Core order book implementation module
//!
//! Price-ordered bid and ask ladders with FIFO queues per price level,
//! price-time priority matching, a stop book for conditional orders, and
//! snapshot/imbalance views for observers.

pub mod book;
pub mod error;
pub mod price_level;
pub mod stops;
pub mod types;

// Re-export main types for convenience
pub use book::{BookConfig, BookStats, OrderBook, DEFAULT_DEPTH};
pub use error::{OrderBookError, OrderBookResult};
pub use price_level::PriceLevel;
pub use stops::StopBook;
pub use types::{
    DepthSnapshot, LevelDepth, Order, OrderId, OrderType, Price, Quantity, Side, TradeRecord,
};
