// ============================================================================
// dirstore library
// ============================================================================
//
// An always-fresh, in-memory mirror of a directory-service domain. The
// store ingests a paged bulk-load and a live change-notify feed into a
// single append-only tag table, maintains secondary indexes and the
// manager/member and group-membership graph (with cross-referral deferred
// resolution), and answers transitive-membership queries over a
// potentially cyclic group graph without blocking readers against the
// writer. `DirectoryStore` is the crate's single public entry point; it
// wires the store together with a failover-aware sync pipeline and a
// schema-tagged binary snapshot codec so the mirror can warm-start and
// survive DC outages.

pub mod config;
pub mod core;
pub mod facade;
pub mod metrics;
pub mod snapshot;
pub mod store;
pub mod sync;

pub use config::StoreConfig;
pub use core::{
    ci_key, DeferredDn, DirError, Entity, EntityStatus, GroupType, Guid, ObjectClass,
    RawRecord, RecordSource, Result, SamAccountType, Tag, UserAccountControl,
};
pub use facade::{DirectoryStore, FeedFactory};
pub use metrics::{Counter, CountingMetricSink, MetricSink, NoopMetricSink, Timer};
pub use snapshot::{EntityView, NoopSqlSink, SnapshotCodec, SqlSink};
pub use store::{Defect, DefectKind, DeferredResolver, Indexes, Store, TagTable, TransitiveEngine};
pub use sync::{
    channel_feed, parse_ranged_attribute, ChannelFeed, DcLocator, DcProbe, DirectoryFeed,
    DnsResolver, FeedFaults, RangedAttribute, SiteResolver, StaticFeed, StaticSiteMap, SyncPipeline,
};
