pub mod time;

pub use time::LatencyTimer;

/// Convert price from ticks to human-readable format
pub fn format_price(price_ticks: u64) -> String {
    format!("${:.2}", price_ticks as f64 / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(10000), "$100.00");
        assert_eq!(format_price(12550), "$125.50");
        assert_eq!(format_price(99), "$0.99");
    }
}
