//! Relational storage gateway for the video-processing worker.
//!
//! Exposes two capability interfaces (`JobSource`, `Storage`) over a
//! pooled Postgres connection, plus the embedded schema migration that
//! stands up the tables both interfaces assume.

pub mod error;
pub mod gateway;
pub mod pool;

pub use error::{StorageError, StorageResult};
pub use gateway::{ClaimedJob, JobSource, PgStorage, QueuePeekRow, QueueStats, Storage};
pub use pool::connect;
