use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type OrderId = u64;
pub type Price = u64; // Price in ticks (1 tick = 0.01 currency units)
pub type Quantity = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Rest at a limit price; match anything at that price or better.
    Limit,
    /// Cross at any price; residual quantity is discarded, never rested.
    Market,
    /// Inert until the reference price reaches `stop_price`, then a market order.
    Stop,
    /// Limit order with a hidden reserve. The reserve is carried on the
    /// resting order but not replenished into the visible quantity.
    Iceberg,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Stop => write!(f, "STOP"),
            OrderType::Iceberg => write!(f, "ICEBERG"),
        }
    }
}

/// An order as submitted by a feeder.
///
/// Ids are caller-assigned; the engine does not enforce uniqueness.
/// `quantity` is the live visible quantity and is decremented in place as
/// the order fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price in ticks; ignored for market orders.
    pub price: Price,
    /// Remaining visible quantity.
    pub quantity: Quantity,
    /// Total size at submission; for icebergs, visible + hidden.
    pub original_quantity: Quantity,
    /// Trigger price; meaningful only for stop orders.
    pub stop_price: Price,
    /// Hidden reserve; meaningful only for icebergs.
    pub hidden_quantity: Quantity,
}

impl Order {
    pub fn new(
        id: OrderId,
        side: Side,
        order_type: OrderType,
        price: Price,
        quantity: Quantity,
        stop_price: Price,
        hidden_quantity: Quantity,
    ) -> Self {
        let original_quantity = match order_type {
            OrderType::Iceberg => quantity + hidden_quantity,
            _ => quantity,
        };
        Self {
            id,
            side,
            order_type,
            price,
            quantity,
            original_quantity,
            stop_price,
            hidden_quantity,
        }
    }

    pub fn limit(id: OrderId, side: Side, price: Price, quantity: Quantity) -> Self {
        Self::new(id, side, OrderType::Limit, price, quantity, 0, 0)
    }

    pub fn market(id: OrderId, side: Side, quantity: Quantity) -> Self {
        // Market orders carry no price of their own
        Self::new(id, side, OrderType::Market, 0, quantity, 0, 0)
    }

    pub fn stop(id: OrderId, side: Side, stop_price: Price, quantity: Quantity) -> Self {
        Self::new(id, side, OrderType::Stop, 0, quantity, stop_price, 0)
    }

    pub fn iceberg(
        id: OrderId,
        side: Side,
        price: Price,
        visible: Quantity,
        hidden: Quantity,
    ) -> Self {
        Self::new(id, side, OrderType::Iceberg, price, visible, 0, hidden)
    }

    /// Reduce the remaining quantity by a fill.
    pub fn fill(&mut self, quantity: Quantity) {
        debug_assert!(quantity <= self.quantity);
        self.quantity -= quantity;
    }

    pub fn is_filled(&self) -> bool {
        self.quantity == 0
    }

    /// The market order a triggered stop turns into.
    pub fn into_market(self) -> Order {
        Order {
            order_type: OrderType::Market,
            price: 0,
            ..self
        }
    }
}

/// A single executed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Execution price: always the resting (maker) side's price.
    pub price: Price,
    pub quantity: Quantity,
    /// Side of the incoming order that crossed the spread.
    pub aggressor: Side,
}

/// Aggregated resting quantity at one ladder price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDepth {
    pub price: Price,
    pub quantity: Quantity,
}

/// Top-of-book view: bids descending, asks ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<LevelDepth>,
    pub asks: Vec<LevelDepth>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_order_construction() {
        let order = Order::limit(7, Side::Buy, 15000, 100);

        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.price, 15000);
        assert_eq!(order.quantity, 100);
        assert_eq!(order.original_quantity, 100);
        assert_eq!(order.stop_price, 0);
        assert_eq!(order.hidden_quantity, 0);
    }

    #[test]
    fn test_iceberg_original_quantity_includes_hidden() {
        let order = Order::iceberg(8, Side::Sell, 15000, 100, 400);

        assert_eq!(order.quantity, 100);
        assert_eq!(order.hidden_quantity, 400);
        assert_eq!(order.original_quantity, 500);
    }

    #[test]
    fn test_order_fill() {
        let mut order = Order::limit(1, Side::Buy, 15000, 100);

        order.fill(30);
        assert_eq!(order.quantity, 70);
        assert!(!order.is_filled());

        order.fill(70);
        assert_eq!(order.quantity, 0);
        assert!(order.is_filled());
    }

    #[test]
    fn test_stop_into_market_preserves_side_and_quantity() {
        let stop = Order::stop(42, Side::Sell, 9900, 25);
        let market = stop.into_market();

        assert_eq!(market.id, 42);
        assert_eq!(market.side, Side::Sell);
        assert_eq!(market.order_type, OrderType::Market);
        assert_eq!(market.quantity, 25);
    }

    #[test]
    fn test_side_display_and_opposite() {
        assert_eq!(Side::Buy.to_string(), "BUY");
        assert_eq!(Side::Sell.to_string(), "SELL");
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }
}
