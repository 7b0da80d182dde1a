//! Decoding of factory logs into typed events.

use alloy::{
    primitives::{Address, LogData},
    sol_types::SolEvent,
};

use crate::{
    abis::AccountCreated,
    chain::{LogEntry, LogFilter},
    error::{IndexerError, Result},
};

/// Filter matching `AccountCreated` logs emitted by the factory.
pub fn account_created_filter(factory: Address) -> LogFilter {
    LogFilter::new(factory, AccountCreated::SIGNATURE_HASH)
}

/// Decodes `(account, creator)` from the indexed topics of a creation log.
pub fn parse_account_created(log: &LogEntry) -> Result<AccountCreated> {
    let malformed = |reason: String| IndexerError::MalformedLog {
        block_number: log.block_number,
        reason,
    };

    let log_data = LogData::new(log.topics.clone(), log.data.clone())
        .ok_or_else(|| malformed(format!("{} topics", log.topics.len())))?;

    let event = AccountCreated::decode_log_data(&log_data).map_err(|e| malformed(e.to_string()))?;

    if event.account.is_zero() {
        return Err(malformed("zero account address".to_string()));
    }

    Ok(event)
}

/// Sorts logs by (block, transaction index, log index).
pub fn sort_by_position(logs: &mut [LogEntry]) {
    logs.sort_by_key(LogEntry::position);
}
