//! Durable cache-file persistence for the directory store, plus the
//! pluggable SQL-export seam.

pub mod codec;
pub mod sql_sink;

pub use codec::SnapshotCodec;
pub use sql_sink::{EntityView, NoopSqlSink, SqlSink};
