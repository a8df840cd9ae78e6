//! Single-Venue Limit Order Book & Matching Engine
//!
//! A thread-based matching engine for simulated equity-style trading.
//! Market-data feeders push orders into a blocking hand-off queue; a single
//! consumer applies them to a shared book that matches against resting
//! liquidity, records trades, and serves snapshots to observers.
//!
//! # Features
//!
//! - **Price-Time Priority**: best price first, strict FIFO within a level
//! - **Order Types**: limit, market, stop (triggered lazily from trade
//!   flow), and iceberg (visible portion only)
//! - **Single-Writer Consistency**: one exclusive lock guards the book, so
//!   snapshots see all or none of a call's effects
//! - **Blocking Hand-off**: condvar-backed MPSC queue, no busy-waiting,
//!   cooperative shutdown
//! - **Built-in Monitoring**: `tracing` logs plus `metrics` counters and
//!   latency histograms
//!
//! # Quick Start
//!
//! ```rust
//! use matchbook_engine::{Order, OrderBook, Side};
//!
//! let book = OrderBook::new();
//!
//! // Seed an ask, then cross it
//! book.add_order(Order::limit(1, Side::Sell, 10000, 10))?;
//! book.add_order(Order::limit(2, Side::Buy, 10000, 4))?;
//!
//! let trades = book.last_trades();
//! assert_eq!(trades[0].price, 10000);
//! assert_eq!(trades[0].quantity, 4);
//! # Ok::<(), matchbook_engine::OrderBookError>(())
//! ```
//!
//! # Architecture
//!
//! Producers → [`OrderQueue`] → matching engine → ladders + stop book +
//! trade ring; observers pull [`OrderBook::snapshot`],
//! [`OrderBook::imbalance`], [`OrderBook::last_trades`] and
//! [`OrderBook::pending_stops`].
//!
//! Each ladder is an ordered map from price to an owning FIFO level;
//! matching drains levels head-first and removes a level atomically with
//! its emptying. Stop orders park in a separate pair of maps and convert
//! to market orders once enough trades accumulate to warrant a sweep.

pub mod book;
pub mod metrics;
pub mod queue;
pub mod utils;

// Re-export commonly used types
pub use book::{
    BookConfig, BookStats, DepthSnapshot, LevelDepth, Order, OrderBook, OrderBookError,
    OrderBookResult, OrderId, OrderType, Price, Quantity, Side, TradeRecord, DEFAULT_DEPTH,
};
pub use metrics::EngineMetrics;
pub use queue::OrderQueue;
