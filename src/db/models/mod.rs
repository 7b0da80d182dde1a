mod account;
mod balance_snapshot;
mod checkpoint;

pub use account::{Account, NewAccount};
pub use balance_snapshot::{BalanceSnapshot, NewBalanceSnapshot};
pub use checkpoint::Checkpoint;
