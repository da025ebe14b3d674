//! SQLite sink repositories
//!
//! Free functions over any `SqliteExecutor`, so the same call works against the
//! pool or inside a scoped transaction. Types come from `crate::data::types`.

pub mod bad_query;
pub mod connection;
pub mod lock_wait;
pub mod long_txn;
pub mod query_attribute;
pub mod transaction;
pub mod user_query;

pub use bad_query::{insert_bad_query, select_bad_queries};
pub use connection::{insert_connection_sample, select_connection_samples};
pub use lock_wait::{insert_lock_wait, select_lock_waits};
pub use long_txn::{insert_long_txn, select_long_txns};
pub use query_attribute::{
    count_query_attributes, get_query_attribute_by_hash, upsert_query_attribute,
};
pub use transaction::{
    ensure_transaction, get_transaction, insert_transaction, transaction_exists,
};
pub use user_query::{
    insert_user_query, select_user_queries, select_user_query, set_digest_hash,
    update_user_query, upsert_user_query,
};

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, FixedOffset, TimeZone, Utc};

    use crate::data::types::{Transaction, UserQuery};

    pub fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 1800).unwrap()
    }

    /// A slow-log entry observed at epoch 1552777235
    pub fn sample_user_query() -> UserQuery {
        UserQuery {
            id: None,
            user_host: "dbadmin2[dbadmin2]".to_string(),
            ip_address: "172.16.2.208".to_string(),
            connection_id: "311270893".to_string(),
            query: "SELECT `A`, `B`\nFROM `D`\nWHERE `C` = ?".to_string(),
            query_time: 0.000218,
            lock_time: 0.000072,
            rows_sent: 6,
            rows_examined: 12,
            log_time: Utc
                .timestamp_opt(1_552_777_235, 0)
                .unwrap()
                .fixed_offset(),
            digest_hash: None,
        }
    }

    pub fn sample_transaction(id: &str) -> Transaction {
        let utc = FixedOffset::east_opt(0).unwrap();
        Transaction {
            id: id.to_string(),
            thread: "62265463".to_string(),
            query: "SELECT sequence_number FROM invoice WHERE id = 45 FOR UPDATE".to_string(),
            start_time: Some(utc.with_ymd_and_hms(2019, 3, 18, 2, 41, 1).unwrap()),
            wait_start_time: Some(utc.with_ymd_and_hms(2019, 3, 18, 2, 43, 1).unwrap()),
            lock_mode: "X".to_string(),
            lock_type: "RECORD".to_string(),
            lock_table: "`schema`.`table`".to_string(),
            lock_index: "PRIMARY".to_string(),
            lock_data: "45".to_string(),
        }
    }

    /// Observation time used by lock-wait and long-transaction fixtures
    pub fn observed_at() -> DateTime<FixedOffset> {
        ist().with_ymd_and_hms(2019, 3, 13, 22, 2, 1).unwrap()
    }
}
