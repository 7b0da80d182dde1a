//! Periodic background tasks.

pub mod margin_poller;

pub use margin_poller::{CycleReport, MarginPoller};
