//! InnoDB locking row types

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A source transaction involved in locking. `id` is the source-assigned key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub thread: String,
    pub query: String,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub wait_start_time: Option<DateTime<FixedOffset>>,
    pub lock_mode: String,
    pub lock_type: String,
    pub lock_table: String,
    pub lock_index: String,
    pub lock_data: String,
}

impl Transaction {
    /// Wait start must not precede the transaction start
    pub fn has_consistent_times(&self) -> bool {
        match (self.start_time, self.wait_start_time) {
            (Some(start), Some(wait)) => wait >= start,
            _ => true,
        }
    }
}

/// A lock wait linking a waiting transaction to the one blocking it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnodbLockWait {
    pub id: Option<i64>,
    pub log_time: DateTime<FixedOffset>,
    pub waiting_id: String,
    pub blocking_id: String,
}

/// A transaction flagged as long running
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongTxn {
    pub id: Option<i64>,
    pub log_time: DateTime<FixedOffset>,
    pub transaction_id: String,
}

/// One locking observation with every transaction it references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LockEvent {
    Wait {
        wait: InnodbLockWait,
        waiting: Transaction,
        blocking: Transaction,
    },
    LongRunning {
        long_txn: LongTxn,
        transaction: Transaction,
    },
}

impl LockEvent {
    /// Transactions that must be stored before the event row
    pub fn transactions(&self) -> Vec<&Transaction> {
        match self {
            Self::Wait {
                waiting, blocking, ..
            } => vec![waiting, blocking],
            Self::LongRunning { transaction, .. } => vec![transaction],
        }
    }
}
