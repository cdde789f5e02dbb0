//! The directory graph: append-only tag table, secondary indexes,
//! deferred-reference resolution, transitive membership queries, and the
//! ingestion protocol that ties them together.

pub mod deferred;
pub mod indexes;
pub mod store;
pub mod tag_table;
pub mod transitive;

pub use deferred::DeferredResolver;
pub use indexes::Indexes;
pub use store::{Defect, DefectKind, Store};
pub use tag_table::TagTable;
pub use transitive::TransitiveEngine;
