//! DcLocator — selects a domain controller in priority order:
//! preferred DC, then site-local DC (via an IP-subnet-to-site map), then
//! any DNS-resolved DC. The subnet map and DNS resolution are external
//! collaborators; this module only defines the seams (`SiteResolver`,
//! `DcProbe`, `DnsResolver`) and the selection + backoff policy around
//! them.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::warn;

/// Maps the machine's local subnet to a directory site, and a site to its
/// candidate DC list. Loaded at startup by a bootstrap search against the
/// directory's configuration partition — out of scope here.
pub trait SiteResolver: Send + Sync {
    fn site_for_subnet(&self, local_ipv4: Ipv4Addr) -> Option<String>;
    fn dcs_for_site(&self, site: &str) -> Vec<String>;
}

/// A fixed, in-process `SiteResolver` built from the subnet→site and
/// site→DC tables a bootstrap search would normally populate. Useful for
/// tests and for a host application that snapshots the configuration
/// partition into a static table rather than re-querying it per lookup.
#[derive(Debug, Default, Clone)]
pub struct StaticSiteMap {
    subnets: Vec<(Ipv4Addr, u8, String)>,
    sites: std::collections::HashMap<String, Vec<String>>,
}

impl StaticSiteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subnet (CIDR prefix length `/prefix_len`) as belonging
    /// to `site`.
    pub fn add_subnet(mut self, network: Ipv4Addr, prefix_len: u8, site: impl Into<String>) -> Self {
        self.subnets.push((network, prefix_len, site.into()));
        self
    }

    pub fn add_site_dcs(mut self, site: impl Into<String>, dcs: Vec<String>) -> Self {
        self.sites.insert(site.into(), dcs);
        self
    }

    fn matches(candidate: Ipv4Addr, network: Ipv4Addr, prefix_len: u8) -> bool {
        let mask = if prefix_len == 0 { 0 } else { u32::MAX << (32 - prefix_len) };
        u32::from(candidate) & mask == u32::from(network) & mask
    }
}

impl SiteResolver for StaticSiteMap {
    fn site_for_subnet(&self, local_ipv4: Ipv4Addr) -> Option<String> {
        self.subnets
            .iter()
            .find(|(network, prefix_len, _)| Self::matches(local_ipv4, *network, *prefix_len))
            .map(|(_, _, site)| site.clone())
    }

    fn dcs_for_site(&self, site: &str) -> Vec<String> {
        self.sites.get(site).cloned().unwrap_or_default()
    }
}

/// Resolves the domain name to candidate DC hostnames via DNS.
pub trait DnsResolver: Send + Sync {
    fn resolve(&self, domain: &str) -> Vec<String>;
}

/// A lightweight availability check: fetching the flat NetBIOS name for
/// the domain within a bounded time.
pub trait DcProbe: Send + Sync {
    fn probe(&self, dc: &str, timeout: Duration) -> bool;
}

pub struct DcLocator {
    domain: String,
    preferred: Option<String>,
    local_ipv4: Option<Ipv4Addr>,
    site_resolver: Option<Arc<dyn SiteResolver>>,
    dns_resolver: Arc<dyn DnsResolver>,
    probe: Arc<dyn DcProbe>,
    probe_timeout: Duration,
}

impl DcLocator {
    pub fn new(
        domain: impl Into<String>,
        preferred: Option<String>,
        local_ipv4: Option<Ipv4Addr>,
        site_resolver: Option<Arc<dyn SiteResolver>>,
        dns_resolver: Arc<dyn DnsResolver>,
        probe: Arc<dyn DcProbe>,
    ) -> Self {
        Self {
            domain: domain.into(),
            preferred,
            local_ipv4,
            site_resolver,
            dns_resolver,
            probe,
            probe_timeout: Duration::from_secs(5),
        }
    }

    /// Runs the three-tier selection once. Returns the first available
    /// DC, or `None` if nothing in any tier answers the probe.
    pub fn select(&self) -> Option<String> {
        if let Some(preferred) = &self.preferred {
            if self.probe.probe(preferred, self.probe_timeout) {
                return Some(preferred.clone());
            }
        }

        if let (Some(resolver), Some(ip)) = (&self.site_resolver, self.local_ipv4) {
            if let Some(site) = resolver.site_for_subnet(ip) {
                for dc in resolver.dcs_for_site(&site) {
                    if self.probe.probe(&dc, self.probe_timeout) {
                        return Some(dc);
                    }
                }
            }
        }

        for dc in self.dns_resolver.resolve(&self.domain) {
            if self.probe.probe(&dc, self.probe_timeout) {
                return Some(dc);
            }
        }

        None
    }

    /// Retries `select()` with exponential backoff (doubling from `min`
    /// to `max`) until a DC is found or `cancel` is set.
    pub fn select_with_backoff(&self, min: Duration, max: Duration, cancel: &AtomicBool) -> Option<String> {
        let mut backoff = min;
        loop {
            if cancel.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(dc) = self.select() {
                return Some(dc);
            }
            warn!(backoff_secs = backoff.as_secs(), "no domain controller available, retrying");
            thread::sleep(backoff);
            backoff = (backoff * 2).min(max);
        }
    }
}

impl std::fmt::Debug for DcLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcLocator")
            .field("domain", &self.domain)
            .field("preferred", &self.preferred)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_site_map_resolves_by_longest_configured_subnet() {
        let map = StaticSiteMap::new()
            .add_subnet(Ipv4Addr::new(10, 0, 0, 0), 24, "hq")
            .add_site_dcs("hq", vec!["dc-hq1.example.com".to_string()]);

        assert_eq!(map.site_for_subnet(Ipv4Addr::new(10, 0, 0, 42)), Some("hq".to_string()));
        assert_eq!(map.site_for_subnet(Ipv4Addr::new(10, 0, 1, 42)), None);
        assert_eq!(map.dcs_for_site("hq"), vec!["dc-hq1.example.com".to_string()]);
        assert!(map.dcs_for_site("unknown").is_empty());
    }

    #[test]
    fn locator_uses_site_resolver_when_preferred_is_unset() {
        let map = StaticSiteMap::new()
            .add_subnet(Ipv4Addr::new(192, 168, 1, 0), 24, "branch")
            .add_site_dcs("branch", vec!["dc-branch.example.com".to_string()]);

        let locator = DcLocator::new(
            "example.com",
            None,
            Some(Ipv4Addr::new(192, 168, 1, 10)),
            Some(Arc::new(map)),
            Arc::new(StaticDns(vec!["dc-fallback.example.com".to_string()])),
            Arc::new(AlwaysUp),
        );
        assert_eq!(locator.select(), Some("dc-branch.example.com".to_string()));
    }

    struct AlwaysUp;
    impl DcProbe for AlwaysUp {
        fn probe(&self, _dc: &str, _timeout: Duration) -> bool {
            true
        }
    }

    struct AlwaysDown;
    impl DcProbe for AlwaysDown {
        fn probe(&self, _dc: &str, _timeout: Duration) -> bool {
            false
        }
    }

    struct StaticDns(Vec<String>);
    impl DnsResolver for StaticDns {
        fn resolve(&self, _domain: &str) -> Vec<String> {
            self.0.clone()
        }
    }

    #[test]
    fn prefers_the_preferred_server_when_reachable() {
        let locator = DcLocator::new(
            "example.com",
            Some("dc1.example.com".to_string()),
            None,
            None,
            Arc::new(StaticDns(vec!["dc2.example.com".to_string()])),
            Arc::new(AlwaysUp),
        );
        assert_eq!(locator.select(), Some("dc1.example.com".to_string()));
    }

    #[test]
    fn falls_back_to_dns_when_preferred_is_down() {
        let locator = DcLocator::new(
            "example.com",
            Some("dc1.example.com".to_string()),
            None,
            None,
            Arc::new(StaticDns(vec!["dc2.example.com".to_string()])),
            Arc::new(AlwaysDown),
        );
        assert_eq!(locator.select(), None);

        struct SelectivelyUp;
        impl DcProbe for SelectivelyUp {
            fn probe(&self, dc: &str, _timeout: Duration) -> bool {
                dc == "dc2.example.com"
            }
        }
        let locator = DcLocator::new(
            "example.com",
            Some("dc1.example.com".to_string()),
            None,
            None,
            Arc::new(StaticDns(vec!["dc2.example.com".to_string()])),
            Arc::new(SelectivelyUp),
        );
        assert_eq!(locator.select(), Some("dc2.example.com".to_string()));
    }
}
