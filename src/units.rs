//! Conversion between wei and ether

use crate::error::{ClientError, ClientResult};

use ethers::types::U256;
use ethers::utils;

/// Render a wei amount as an exact decimal ether string.
///
/// Trailing zeros are trimmed but one fractional digit is always kept, so
/// `0` renders as `"0.0"` and `10^18` as `"1.0"`.
pub fn balance_to_ether(balance: U256) -> String {
    let formatted = utils::format_ether(balance);
    match formatted.split_once('.') {
        Some((integer, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                format!("{}.0", integer)
            } else {
                format!("{}.{}", integer, fraction)
            }
        }
        None => format!("{}.0", formatted),
    }
}

/// Lossy ether value, for gauges and display
pub fn balance_to_ether_f64(balance: U256) -> f64 {
    balance_to_ether(balance).parse().unwrap_or(f64::NAN)
}

/// Parse a decimal ether amount into wei
pub fn parse_ether(amount: &str) -> ClientResult<U256> {
    utils::parse_ether(amount)
        .map_err(|e| ClientError::Config(format!("Invalid ether amount '{}': {}", amount, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_one_ether() {
        assert_eq!(balance_to_ether(U256::zero()), "0.0");
        assert_eq!(balance_to_ether(U256::exp10(18)), "1.0");
        assert_eq!(balance_to_ether_f64(U256::exp10(18)), 1.0);
        assert_eq!(balance_to_ether_f64(U256::zero()), 0.0);
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let balance = U256::from_dec_str("123456789000000000000").unwrap();
        let first = balance_to_ether(balance);
        let second = balance_to_ether(balance);
        assert_eq!(first, second);
        assert_eq!(first, "123.456789");
        assert_eq!(
            balance_to_ether_f64(balance).to_bits(),
            balance_to_ether_f64(balance).to_bits()
        );
    }

    #[test]
    fn test_fractional_amounts() {
        let one_and_half = U256::from(1_500_000_000_000_000_000u64);
        assert_eq!(balance_to_ether(one_and_half), "1.5");
        assert_eq!(parse_ether("1.5").unwrap(), one_and_half);
        assert!(parse_ether("one").is_err());
    }
}
