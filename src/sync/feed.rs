//! The `DirectoryFeed` seam. LDAP client mechanics are an external
//! collaborator this crate does not implement — it only defines the
//! contract a feed must satisfy, plus small in-process implementations
//! used by tests and the demo binary. A production feed wraps a real
//! LDAP client behind the same trait.

use regex::Regex;
use std::sync::OnceLock;

use crate::core::{RawRecord, Result};

/// A source of raw, pre-ingestion records. `BulkLoadFeed`-shaped
/// implementations return `Ok(None)` once the paged enumeration is
/// exhausted; `ChangeNotifyFeed`-shaped implementations block
/// indefinitely and only return `Ok(None)` on graceful shutdown.
pub trait DirectoryFeed: Send {
    fn next_record(&mut self) -> Result<Option<RawRecord>>;
}

/// A feed over a fixed, pre-collected list of records — the shape a
/// paged bulk-load enumeration settles into once every page has been
/// fetched and flattened. Useful for tests and for replaying a captured
/// bulk load.
pub struct StaticFeed {
    records: std::vec::IntoIter<RawRecord>,
}

impl StaticFeed {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records: records.into_iter() }
    }
}

impl DirectoryFeed for StaticFeed {
    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        Ok(self.records.next())
    }
}

/// A feed driven by an external producer over a channel — the shape a
/// change-notification stream takes once decoupled from the network
/// socket that feeds it. `next_record` blocks until a record arrives or
/// the sender is dropped (graceful shutdown).
pub struct ChannelFeed {
    receiver: std::sync::mpsc::Receiver<RawRecord>,
}

impl DirectoryFeed for ChannelFeed {
    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        match self.receiver.recv() {
            Ok(record) => Ok(Some(record)),
            Err(_) => Ok(None),
        }
    }
}

/// Builds a `(Sender, ChannelFeed)` pair for driving a `ChannelFeed` from
/// test code or a production change-notification adapter.
pub fn channel_feed() -> (std::sync::mpsc::Sender<RawRecord>, ChannelFeed) {
    let (tx, rx) = std::sync::mpsc::channel();
    (tx, ChannelFeed { receiver: rx })
}

/// One page of a range-chunked multi-valued attribute, e.g. the directory
/// answering a `member` request with `member;range=0-999` because the full
/// value list didn't fit in one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangedAttribute {
    pub base_name: String,
    pub start: u32,
    /// `None` for the terminal `*` upper bound — the directory has no more
    /// chunks after this one.
    pub end: Option<u32>,
}

impl RangedAttribute {
    pub fn is_final_chunk(&self) -> bool {
        self.end.is_none()
    }
}

/// Detects a `name;range=start-end` or `name;range=start-*` LDAP attribute
/// name and splits out its chunk bounds. A production feed uses this to
/// decide whether to issue a follow-up search for the next `start` before
/// handing the assembled record to the store — an opaque LDAP-client
/// concern out of scope here, but the parsing itself is plain string work
/// this crate can do without a directory connection.
pub fn parse_ranged_attribute(attribute_name: &str) -> Option<RangedAttribute> {
    static RANGE_RE: OnceLock<Regex> = OnceLock::new();
    let re = RANGE_RE.get_or_init(|| Regex::new(r"(?i)^(.+);range=(\d+)-(\d+|\*)$").expect("static regex is valid"));
    let caps = re.captures(attribute_name)?;
    Some(RangedAttribute {
        base_name: caps[1].to_string(),
        start: caps[2].parse().ok()?,
        end: if &caps[3] == "*" { None } else { caps[3].parse().ok() },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_a_bounded_range_chunk() {
        let parsed = parse_ranged_attribute("member;range=0-999").unwrap();
        assert_eq!(parsed.base_name, "member");
        assert_eq!(parsed.start, 0);
        assert_eq!(parsed.end, Some(999));
        assert!(!parsed.is_final_chunk());
    }

    #[test]
    fn detects_the_terminal_chunk() {
        let parsed = parse_ranged_attribute("member;range=1000-*").unwrap();
        assert_eq!(parsed.start, 1000);
        assert_eq!(parsed.end, None);
        assert!(parsed.is_final_chunk());
    }

    #[test]
    fn plain_attribute_names_do_not_match() {
        assert!(parse_ranged_attribute("member").is_none());
        assert!(parse_ranged_attribute("mail").is_none());
    }
}
