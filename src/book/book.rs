use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::book::error::{OrderBookError, OrderBookResult};
use crate::book::price_level::PriceLevel;
use crate::book::stops::StopBook;
use crate::book::types::{
    DepthSnapshot, LevelDepth, Order, OrderType, Price, Quantity, Side, TradeRecord,
};

/// Default depth for snapshots and the imbalance metric.
pub const DEFAULT_DEPTH: usize = 5;

/// Tuning knobs for the book.
#[derive(Debug, Clone, Deserialize)]
pub struct BookConfig {
    /// Trades between two stop-trigger sweeps.
    pub stop_check_interval: u64,
    /// Recent trades retained for `last_trades`.
    pub trade_history_depth: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            stop_check_interval: 10,
            trade_history_depth: 5,
        }
    }
}

/// Single-venue limit order book with price-time priority matching.
///
/// One exclusive lock guards the ladders, the stop book and the trade ring,
/// so every `add_order` call and every snapshot observes a consistent book.
/// The pending-stop counter is additionally kept in an atomic so observers
/// can poll it without taking the lock.
#[derive(Debug)]
pub struct OrderBook {
    inner: Mutex<BookInner>,
    pending_stops: AtomicU64,
}

#[derive(Debug)]
struct BookInner {
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    stops: StopBook,
    last_trades: VecDeque<TradeRecord>,
    trades_since_stop_check: u64,
    total_trades: u64,
    total_volume: u64,
    config: BookConfig,
}

/// Point-in-time counters for reporting.
#[derive(Debug, Clone)]
pub struct BookStats {
    pub resting_orders: usize,
    pub bid_levels: usize,
    pub ask_levels: usize,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub spread: Option<Price>,
    pub last_trade_price: Option<Price>,
    pub total_trades: u64,
    pub total_volume: u64,
    pub pending_stops: u64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::with_config(BookConfig::default())
    }

    pub fn with_config(config: BookConfig) -> Self {
        Self {
            inner: Mutex::new(BookInner {
                bids: BTreeMap::new(),
                asks: BTreeMap::new(),
                stops: StopBook::new(),
                last_trades: VecDeque::new(),
                trades_since_stop_check: 0,
                total_trades: 0,
                total_volume: 0,
                config,
            }),
            pending_stops: AtomicU64::new(0),
        }
    }

    /// Consume one order: park it, match it, and rest any limit residual.
    ///
    /// The sole entry point to the engine. Invalid orders are rejected
    /// before the book is touched; everything else is total.
    pub fn add_order(&self, order: Order) -> OrderBookResult<()> {
        Self::validate(&order)?;

        let mut inner = self.inner.lock();
        match order.order_type {
            OrderType::Stop => {
                debug!(
                    id = order.id,
                    side = %order.side,
                    stop_price = order.stop_price,
                    quantity = order.quantity,
                    "parking stop order"
                );
                inner.stops.park(order);
                self.pending_stops.fetch_add(1, Ordering::Relaxed);
            }
            OrderType::Market => {
                let aggressor = order.side;
                let trades = inner.match_market(order);
                if trades > 0 {
                    self.sweep_stops(&mut inner, aggressor);
                }
            }
            OrderType::Limit | OrderType::Iceberg => {
                let aggressor = order.side;
                let trades = inner.match_and_rest(order);
                if trades > 0 {
                    self.sweep_stops(&mut inner, aggressor);
                }
            }
        }
        Ok(())
    }

    fn validate(order: &Order) -> OrderBookResult<()> {
        if order.quantity == 0 {
            return Err(OrderBookError::InvalidQuantity);
        }
        match order.order_type {
            OrderType::Limit | OrderType::Iceberg => {
                if order.price == 0 {
                    return Err(OrderBookError::InvalidPrice);
                }
            }
            OrderType::Stop => {
                if order.stop_price == 0 {
                    return Err(OrderBookError::InvalidStopPrice);
                }
            }
            OrderType::Market => {}
        }
        Ok(())
    }

    /// Lazily re-evaluate stop triggers after a matching pass.
    ///
    /// Runs only once `stop_check_interval` trades have accumulated, using
    /// the best opposite price as the reference. Invoked solely from the top
    /// of `add_order`, never from a matching loop, so triggered-order trades
    /// cannot nest another sweep; they defer to the next outer check.
    fn sweep_stops(&self, inner: &mut BookInner, aggressor: Side) {
        if self.pending_stops.load(Ordering::Relaxed) == 0 {
            return;
        }
        if inner.trades_since_stop_check < inner.config.stop_check_interval {
            return;
        }
        inner.trades_since_stop_check = 0;

        let reference = match aggressor {
            Side::Buy => inner.best_ask(),
            Side::Sell => inner.best_bid(),
        };
        let Some(reference) = reference else {
            // Matching emptied the opposite ladder; no reference price
            debug!("stop sweep skipped: opposite ladder empty");
            return;
        };

        let triggered = inner.stops.collect_triggered(reference);
        if triggered.is_empty() {
            return;
        }
        self.pending_stops
            .fetch_sub(triggered.len() as u64, Ordering::Relaxed);
        debug!(count = triggered.len(), reference, "stop orders triggered");

        for stop in triggered {
            inner.match_market(stop.into_market());
        }
    }

    /// Top-`depth` aggregated levels per side; asks ascending, bids descending.
    pub fn snapshot(&self, depth: usize) -> DepthSnapshot {
        let inner = self.inner.lock();
        let bids = inner
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(price, level)| LevelDepth {
                price: *price,
                quantity: level.total_quantity(),
            })
            .collect();
        let asks = inner
            .asks
            .iter()
            .take(depth)
            .map(|(price, level)| LevelDepth {
                price: *price,
                quantity: level.total_quantity(),
            })
            .collect();
        DepthSnapshot {
            timestamp: chrono::Utc::now(),
            bids,
            asks,
        }
    }

    /// Copy of the trade ring, newest first.
    pub fn last_trades(&self) -> Vec<TradeRecord> {
        self.inner.lock().last_trades.iter().copied().collect()
    }

    /// Signed depth imbalance over the top five levels, in `[-1, 1]`.
    /// Positive means buy pressure; `0.0` when both sides are empty.
    pub fn imbalance(&self) -> f64 {
        let inner = self.inner.lock();
        let bid_qty: Quantity = inner
            .bids
            .iter()
            .rev()
            .take(DEFAULT_DEPTH)
            .map(|(_, level)| level.total_quantity())
            .sum();
        let ask_qty: Quantity = inner
            .asks
            .iter()
            .take(DEFAULT_DEPTH)
            .map(|(_, level)| level.total_quantity())
            .sum();

        let total = bid_qty + ask_qty;
        if total == 0 {
            return 0.0;
        }
        (bid_qty as f64 - ask_qty as f64) / total as f64
    }

    /// Count of parked stops. Served from the atomic counter without the
    /// book lock; a best-effort snapshot used to short-circuit sweeps.
    pub fn pending_stops(&self) -> u64 {
        self.pending_stops.load(Ordering::Relaxed)
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.inner.lock().best_bid()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.inner.lock().best_ask()
    }

    pub fn spread(&self) -> Option<Price> {
        let inner = self.inner.lock();
        match (inner.best_ask(), inner.best_bid()) {
            (Some(ask), Some(bid)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    pub fn stats(&self) -> BookStats {
        let inner = self.inner.lock();
        BookStats {
            resting_orders: inner.bids.values().map(PriceLevel::order_count).sum::<usize>()
                + inner.asks.values().map(PriceLevel::order_count).sum::<usize>(),
            bid_levels: inner.bids.len(),
            ask_levels: inner.asks.len(),
            best_bid: inner.best_bid(),
            best_ask: inner.best_ask(),
            spread: match (inner.best_ask(), inner.best_bid()) {
                (Some(ask), Some(bid)) if ask > bid => Some(ask - bid),
                _ => None,
            },
            last_trade_price: inner.last_trades.front().map(|t| t.price),
            total_trades: inner.total_trades,
            total_volume: inner.total_volume,
            pending_stops: self.pending_stops.load(Ordering::Relaxed),
        }
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl BookInner {
    fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    /// Limit-match against the opposite ladder, then rest any residual at
    /// the order's own price. Returns the number of trades executed.
    fn match_and_rest(&mut self, mut order: Order) -> u64 {
        let trades = self.match_crossing(&mut order, false);
        if order.quantity > 0 {
            debug!(
                id = order.id,
                side = %order.side,
                price = order.price,
                quantity = order.quantity,
                "resting order"
            );
            let ladder = match order.side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            ladder
                .entry(order.price)
                .or_insert_with(PriceLevel::new)
                .push(order);
        }
        trades
    }

    /// Market-match against the opposite ladder; residual quantity is
    /// discarded once the ladder is exhausted.
    fn match_market(&mut self, mut order: Order) -> u64 {
        let trades = self.match_crossing(&mut order, true);
        if order.quantity > 0 {
            debug!(
                id = order.id,
                residual = order.quantity,
                "market order residual discarded"
            );
        }
        trades
    }

    /// Aggression loop: take the best opposite level while the incoming
    /// order has quantity and (for limit orders) its price still crosses.
    /// Each level is consumed head-first; trades execute at the maker price.
    fn match_crossing(&mut self, order: &mut Order, is_market: bool) -> u64 {
        let mut trades = 0;

        while order.quantity > 0 {
            let best_price = match order.side {
                Side::Buy => self.best_ask(),
                Side::Sell => self.best_bid(),
            };
            let Some(best_price) = best_price else {
                break;
            };

            if !is_market {
                let crosses = match order.side {
                    Side::Buy => order.price >= best_price,
                    Side::Sell => order.price <= best_price,
                };
                if !crosses {
                    break;
                }
            }

            let fills = {
                let ladder = match order.side {
                    Side::Buy => &mut self.asks,
                    Side::Sell => &mut self.bids,
                };
                let Some(level) = ladder.get_mut(&best_price) else {
                    break;
                };
                let fills = level.consume(order.quantity);
                if level.is_empty() {
                    ladder.remove(&best_price);
                }
                fills
            };

            for (maker_id, traded) in fills {
                order.fill(traded);
                trades += 1;
                trace!(
                    taker = order.id,
                    maker = maker_id,
                    price = best_price,
                    quantity = traded,
                    "trade"
                );
                self.record_trade(TradeRecord {
                    price: best_price,
                    quantity: traded,
                    aggressor: order.side,
                });
            }
        }

        trades
    }

    fn record_trade(&mut self, trade: TradeRecord) {
        self.total_trades += 1;
        self.total_volume += trade.quantity;
        self.trades_since_stop_check += 1;

        self.last_trades.push_front(trade);
        if self.last_trades.len() > self.config.trade_history_depth {
            self.last_trades.pop_back();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(id: u64, side: Side, price: Price, quantity: Quantity) -> Order {
        Order::limit(id, side, price, quantity)
    }

    fn trade(price: Price, quantity: Quantity, aggressor: Side) -> TradeRecord {
        TradeRecord {
            price,
            quantity,
            aggressor,
        }
    }

    #[test]
    fn test_empty_book() {
        let book = OrderBook::new();
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.spread(), None);
        assert_eq!(book.imbalance(), 0.0);
        assert!(book.last_trades().is_empty());
        assert_eq!(book.pending_stops(), 0);
    }

    #[test]
    fn test_resting_orders_do_not_cross() {
        let book = OrderBook::new();
        book.add_order(limit(1, Side::Buy, 10000, 100)).unwrap();
        book.add_order(limit(2, Side::Sell, 10100, 100)).unwrap();

        assert_eq!(book.best_bid(), Some(10000));
        assert_eq!(book.best_ask(), Some(10100));
        assert_eq!(book.spread(), Some(100));
        assert!(book.last_trades().is_empty());
    }

    #[test]
    fn test_simple_cross_walks_ask_levels() {
        let book = OrderBook::new();
        book.add_order(limit(1, Side::Sell, 10000, 10)).unwrap();
        book.add_order(limit(2, Side::Sell, 10100, 10)).unwrap();
        book.add_order(limit(3, Side::Buy, 10200, 15)).unwrap();

        // Newest first: 5 @ 101.00 then 10 @ 100.00, both buy-aggressed
        let trades = book.last_trades();
        assert_eq!(
            trades,
            vec![trade(10100, 5, Side::Buy), trade(10000, 10, Side::Buy)]
        );

        // id=2 keeps 5 at 101.00; the aggressor is fully filled
        let snapshot = book.snapshot(DEFAULT_DEPTH);
        assert!(snapshot.bids.is_empty());
        assert_eq!(
            snapshot.asks,
            vec![LevelDepth {
                price: 10100,
                quantity: 5
            }]
        );
    }

    #[test]
    fn test_fifo_within_level() {
        let book = OrderBook::new();
        book.add_order(limit(1, Side::Sell, 10000, 10)).unwrap();
        book.add_order(limit(2, Side::Sell, 10000, 10)).unwrap();
        book.add_order(limit(3, Side::Buy, 10000, 15)).unwrap();

        let trades = book.last_trades();
        assert_eq!(
            trades,
            vec![trade(10000, 5, Side::Buy), trade(10000, 10, Side::Buy)]
        );

        let snapshot = book.snapshot(DEFAULT_DEPTH);
        assert_eq!(
            snapshot.asks,
            vec![LevelDepth {
                price: 10000,
                quantity: 5
            }]
        );
    }

    #[test]
    fn test_market_partial_discards_residual() {
        let book = OrderBook::new();
        book.add_order(limit(1, Side::Sell, 10000, 5)).unwrap();
        book.add_order(Order::market(2, Side::Buy, 10)).unwrap();

        assert_eq!(book.last_trades(), vec![trade(10000, 5, Side::Buy)]);
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_market_on_empty_book_is_total() {
        let book = OrderBook::new();
        book.add_order(Order::market(1, Side::Sell, 10)).unwrap();
        assert!(book.last_trades().is_empty());
    }

    #[test]
    fn test_no_cross_guard_rests_bid() {
        let book = OrderBook::new();
        book.add_order(limit(1, Side::Sell, 10100, 10)).unwrap();
        book.add_order(limit(2, Side::Buy, 10000, 10)).unwrap();

        assert!(book.last_trades().is_empty());
        assert_eq!(book.best_bid(), Some(10000));
        assert_eq!(book.best_ask(), Some(10100));
    }

    #[test]
    fn test_trade_price_is_maker_price() {
        let book = OrderBook::new();
        book.add_order(limit(1, Side::Buy, 10000, 10)).unwrap();
        book.add_order(limit(2, Side::Sell, 9900, 10)).unwrap();

        // Sell at 99.00 hits the resting bid at 100.00
        assert_eq!(book.last_trades(), vec![trade(10000, 10, Side::Sell)]);
    }

    #[test]
    fn test_conservation_of_quantity() {
        let book = OrderBook::new();
        book.add_order(limit(1, Side::Sell, 10000, 7)).unwrap();
        book.add_order(limit(2, Side::Sell, 10050, 4)).unwrap();
        book.add_order(limit(3, Side::Buy, 10100, 20)).unwrap();

        let traded: Quantity = book.last_trades().iter().map(|t| t.quantity).sum();
        let resting: Quantity = book
            .snapshot(DEFAULT_DEPTH)
            .bids
            .iter()
            .map(|l| l.quantity)
            .sum();
        assert_eq!(traded + resting, 20);
        assert_eq!(book.best_bid(), Some(10100));
    }

    #[test]
    fn test_trade_ring_is_bounded_newest_first() {
        let book = OrderBook::new();
        for i in 0..8u64 {
            book.add_order(limit(i, Side::Sell, 10000 + i, 1)).unwrap();
        }
        book.add_order(limit(100, Side::Buy, 10010, 8)).unwrap();

        let trades = book.last_trades();
        assert_eq!(trades.len(), 5);
        // Newest first: the last trade hit the highest ask
        assert_eq!(trades[0].price, 10007);
        assert_eq!(trades[4].price, 10003);
    }

    #[test]
    fn test_imbalance_sign_and_range() {
        let book = OrderBook::new();
        book.add_order(limit(1, Side::Buy, 10000, 300)).unwrap();
        book.add_order(limit(2, Side::Sell, 10100, 100)).unwrap();

        let imbalance = book.imbalance();
        assert!(imbalance > 0.0 && imbalance <= 1.0);
        assert!((imbalance - 0.5).abs() < f64::EPSILON);

        // One-sided book saturates at the bound
        let book = OrderBook::new();
        book.add_order(limit(1, Side::Sell, 10100, 50)).unwrap();
        assert!((book.imbalance() + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_orders_leave_book_untouched() {
        let book = OrderBook::new();

        assert_eq!(
            book.add_order(limit(1, Side::Buy, 10000, 0)),
            Err(OrderBookError::InvalidQuantity)
        );
        assert_eq!(
            book.add_order(limit(2, Side::Buy, 0, 10)),
            Err(OrderBookError::InvalidPrice)
        );
        assert_eq!(
            book.add_order(Order::stop(3, Side::Buy, 0, 10)),
            Err(OrderBookError::InvalidStopPrice)
        );

        assert_eq!(book.best_bid(), None);
        assert_eq!(book.pending_stops(), 0);
    }

    #[test]
    fn test_stop_parks_without_touching_ladders() {
        let book = OrderBook::new();
        book.add_order(Order::stop(1, Side::Buy, 10000, 5)).unwrap();

        assert_eq!(book.pending_stops(), 1);
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_stop_triggers_after_trade_threshold() {
        let book = OrderBook::new();
        book.add_order(limit(1, Side::Sell, 10000, 100)).unwrap();
        book.add_order(Order::stop(2, Side::Buy, 10000, 5)).unwrap();

        // Nine aggressing trades: below the threshold, the stop stays parked
        for i in 0..9u64 {
            book.add_order(limit(10 + i, Side::Buy, 10000, 1)).unwrap();
        }
        assert_eq!(book.pending_stops(), 1);

        // The tenth trade reaches the threshold; the stop fires and fills
        book.add_order(limit(19, Side::Buy, 10000, 1)).unwrap();
        assert_eq!(book.pending_stops(), 0);

        let trades = book.last_trades();
        assert_eq!(trades[0], trade(10000, 5, Side::Buy));

        // 100 - 10 aggressors - 5 stop quantity
        let snapshot = book.snapshot(DEFAULT_DEPTH);
        assert_eq!(
            snapshot.asks,
            vec![LevelDepth {
                price: 10000,
                quantity: 85
            }]
        );
    }

    #[test]
    fn test_stop_sweep_skipped_when_opposite_ladder_empties() {
        let book = OrderBook::new();
        book.add_order(limit(1, Side::Sell, 10000, 10)).unwrap();
        book.add_order(Order::stop(2, Side::Buy, 10000, 5)).unwrap();

        // Ten aggressors drain the ask ladder exactly at the threshold;
        // with no reference price the sweep is skipped and the stop stays
        for i in 0..10u64 {
            book.add_order(limit(10 + i, Side::Buy, 10000, 1)).unwrap();
        }
        assert_eq!(book.pending_stops(), 1);
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_sell_stop_triggers_on_falling_reference() {
        let config = BookConfig {
            stop_check_interval: 1,
            ..BookConfig::default()
        };
        let book = OrderBook::with_config(config);
        book.add_order(limit(1, Side::Buy, 9900, 100)).unwrap();
        book.add_order(Order::stop(2, Side::Sell, 9900, 5)).unwrap();

        // A sell aggression leaves best bid 99.00 as the reference, which
        // reaches the sell stop immediately at interval 1
        book.add_order(limit(3, Side::Sell, 9900, 1)).unwrap();

        assert_eq!(book.pending_stops(), 0);
        let trades = book.last_trades();
        assert_eq!(trades[0], trade(9900, 5, Side::Sell));
    }

    #[test]
    fn test_iceberg_rests_visible_quantity_only() {
        let book = OrderBook::new();
        book.add_order(Order::iceberg(1, Side::Sell, 10000, 20, 80))
            .unwrap();

        let snapshot = book.snapshot(DEFAULT_DEPTH);
        assert_eq!(
            snapshot.asks,
            vec![LevelDepth {
                price: 10000,
                quantity: 20
            }]
        );

        // Hidden reserve is not replenished: draining the visible part
        // removes the order
        book.add_order(Order::market(2, Side::Buy, 20)).unwrap();
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_snapshot_ordering_and_depth() {
        let book = OrderBook::new();
        for i in 0..7u64 {
            book.add_order(limit(i, Side::Buy, 9900 - i * 10, 10)).unwrap();
            book.add_order(limit(100 + i, Side::Sell, 10000 + i * 10, 10))
                .unwrap();
        }

        let snapshot = book.snapshot(DEFAULT_DEPTH);
        assert_eq!(snapshot.bids.len(), 5);
        assert_eq!(snapshot.asks.len(), 5);
        assert_eq!(snapshot.bids[0].price, 9900);
        assert!(snapshot.bids.windows(2).all(|w| w[0].price > w[1].price));
        assert_eq!(snapshot.asks[0].price, 10000);
        assert!(snapshot.asks.windows(2).all(|w| w[0].price < w[1].price));
    }

    #[test]
    fn test_stats_counters() {
        let book = OrderBook::new();
        book.add_order(limit(1, Side::Sell, 10000, 10)).unwrap();
        book.add_order(limit(2, Side::Buy, 10000, 4)).unwrap();
        book.add_order(Order::stop(3, Side::Buy, 10500, 5)).unwrap();

        let stats = book.stats();
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.total_volume, 4);
        assert_eq!(stats.last_trade_price, Some(10000));
        assert_eq!(stats.resting_orders, 1);
        assert_eq!(stats.ask_levels, 1);
        assert_eq!(stats.bid_levels, 0);
        assert_eq!(stats.pending_stops, 1);
    }

    #[test]
    fn test_book_never_crossed_after_sequence() {
        let book = OrderBook::new();
        let orders = [
            limit(1, Side::Sell, 10100, 10),
            limit(2, Side::Buy, 9900, 10),
            limit(3, Side::Buy, 10100, 5),
            limit(4, Side::Sell, 9900, 3),
            limit(5, Side::Buy, 10200, 20),
            limit(6, Side::Sell, 9800, 40),
        ];
        for order in orders {
            book.add_order(order).unwrap();
            if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
                assert!(ask > bid, "book crossed: bid {bid} >= ask {ask}");
            }
        }
    }
}
