//! Utility functions for the indexer.

mod conversion;

pub use conversion::{hex_encode, normalize_address};
