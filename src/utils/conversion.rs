//! Address and hex formatting helpers.
//!
//! Every address that reaches the store goes through here, so rows can be
//! compared as plain lowercase strings.

use alloy::primitives::{hex, Address};

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parses a user-supplied address (any hex casing, 0x prefix required) into the
/// lowercase form used by the store.
pub fn normalize_address(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if !trimmed.starts_with("0x") {
        return None;
    }
    trimmed
        .parse::<Address>()
        .ok()
        .map(|address| hex_encode(address.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address_lowercases() {
        assert_eq!(
            normalize_address("0x631658F09a33251A9fA6344223D4673176f5D1A1").as_deref(),
            Some("0x631658f09a33251a9fa6344223d4673176f5d1a1")
        );
        assert_eq!(
            normalize_address(" 0x631658f09a33251a9fa6344223d4673176f5d1a1 ").as_deref(),
            Some("0x631658f09a33251a9fa6344223d4673176f5d1a1")
        );
    }

    #[test]
    fn test_normalize_address_rejects_invalid() {
        assert_eq!(normalize_address("631658f09a33251a9fa6344223d4673176f5d1a1"), None);
        assert_eq!(normalize_address("0x1234"), None);
        assert_eq!(normalize_address("alice"), None);
    }
}
