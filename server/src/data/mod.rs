//! Data storage layer
//!
//! - `sqlite` - Sink database holding every row the jobs produce
//! - `digest` - Query digest deduplication on top of the sink
//! - `types` - Row types shared by repositories and jobs
//! - `traits` - Repository trait the jobs write through

pub mod digest;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use sqlite::{SinkError, SinkService};
pub use traits::SinkRepository;
