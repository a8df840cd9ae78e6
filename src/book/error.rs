use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderBookError {
    /// Quantity must be positive
    InvalidQuantity,

    /// Limit price must be positive
    InvalidPrice,

    /// Stop orders need a positive trigger price
    InvalidStopPrice,
}

impl fmt::Display for OrderBookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderBookError::InvalidQuantity => write!(f, "Invalid quantity"),
            OrderBookError::InvalidPrice => write!(f, "Invalid price"),
            OrderBookError::InvalidStopPrice => write!(f, "Invalid stop price"),
        }
    }
}

impl std::error::Error for OrderBookError {}

/// Result type for order book operations
pub type OrderBookResult<T> = Result<T, OrderBookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            OrderBookError::InvalidQuantity.to_string(),
            "Invalid quantity"
        );
        assert_eq!(OrderBookError::InvalidPrice.to_string(), "Invalid price");
        assert_eq!(
            OrderBookError::InvalidStopPrice.to_string(),
            "Invalid stop price"
        );
    }

    #[test]
    fn test_error_serialization() {
        let error = OrderBookError::InvalidStopPrice;
        let serialized = serde_json::to_string(&error).unwrap();
        let deserialized: OrderBookError = serde_json::from_str(&serialized).unwrap();
        assert_eq!(error, deserialized);
    }
}
