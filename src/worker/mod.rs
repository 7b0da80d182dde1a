pub mod indexer;
pub mod margin;
pub mod parser;

pub use indexer::{AccountIndexer, IndexerOptions};
pub use margin::MarginRecorder;
