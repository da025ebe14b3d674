//! Row types shared by the sink repositories and the jobs

mod locks;
mod queries;

pub use locks::{InnodbLockWait, LockEvent, LongTxn, Transaction};
pub use queries::{BadQuery, ConnectionSample, QueryAttribute, UserQuery};
