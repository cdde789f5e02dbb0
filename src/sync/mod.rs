//! The failover-aware sync pipeline: feeds, the bounded-queue consumer,
//! DC selection, and the fault watchdog.

pub mod dc_locator;
pub mod feed;
pub mod pipeline;
pub mod watchdog;

pub use dc_locator::{DcLocator, DcProbe, DnsResolver, SiteResolver, StaticSiteMap};
pub use feed::{channel_feed, parse_ranged_attribute, ChannelFeed, DirectoryFeed, RangedAttribute, StaticFeed};
pub use pipeline::{FeedFaults, SyncPipeline};
