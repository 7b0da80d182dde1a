use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Indexer progress cursor (PostgreSQL).
///
/// Holds the last block whose logs are fully persisted. Used to resume
/// indexing after restarts without missing or duplicating accounts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub name: String,
    pub block_number: u64,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(name: impl Into<String>, block_number: u64) -> Self {
        Self {
            name: name.into(),
            block_number,
            updated_at: Utc::now(),
        }
    }

    /// Stored as a decimal string so the column never overflows a signed integer.
    pub fn encode_value(&self) -> String {
        self.block_number.to_string()
    }

    pub fn decode_value(value: &str) -> Option<u64> {
        value.trim().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_survives_u64_max() {
        let checkpoint = Checkpoint::new("lastProcessedBlock", u64::MAX);
        let encoded = checkpoint.encode_value();

        assert_eq!(encoded, "18446744073709551615");
        assert_eq!(Checkpoint::decode_value(&encoded), Some(u64::MAX));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(Checkpoint::decode_value("-1"), None);
        assert_eq!(Checkpoint::decode_value("0x10"), None);
        assert_eq!(Checkpoint::decode_value(" 42 "), Some(42));
    }
}
