//! Parked stop orders, indexed by trigger price.
//!
//! Buy stops trigger when the reference price rises to their `stop_price`
//! (next to trigger = lowest key); sell stops when it falls (next = highest
//! key). Orders sharing a trigger price keep arrival order.

use std::collections::{BTreeMap, VecDeque};

use crate::book::types::{Order, Price, Side};

#[derive(Debug, Default)]
pub struct StopBook {
    buy: BTreeMap<Price, VecDeque<Order>>,
    sell: BTreeMap<Price, VecDeque<Order>>,
}

impl StopBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park an untriggered stop order.
    pub fn park(&mut self, order: Order) {
        let map = match order.side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        };
        map.entry(order.stop_price).or_default().push_back(order);
    }

    /// Remove and return every stop the reference price reaches.
    ///
    /// Buy stops come back lowest trigger first, then sell stops highest
    /// first; within a trigger price, arrival order.
    pub fn collect_triggered(&mut self, reference: Price) -> Vec<Order> {
        let mut triggered = Vec::new();

        let buy_keys: Vec<Price> = self.buy.range(..=reference).map(|(k, _)| *k).collect();
        for key in buy_keys {
            if let Some(queue) = self.buy.remove(&key) {
                triggered.extend(queue);
            }
        }

        let sell_keys: Vec<Price> = self
            .sell
            .range(reference..)
            .rev()
            .map(|(k, _)| *k)
            .collect();
        for key in sell_keys {
            if let Some(queue) = self.sell.remove(&key) {
                triggered.extend(queue);
            }
        }

        triggered
    }

    /// Number of parked stops on both sides.
    pub fn pending(&self) -> usize {
        self.buy.values().map(VecDeque::len).sum::<usize>()
            + self.sell.values().map(VecDeque::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }
}
