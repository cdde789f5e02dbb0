//! Store configuration, loadable from environment variables with
//! `dotenvy` support for a local `.env` file.

use std::path::PathBuf;
use std::time::Duration;

use crate::core::{DirError, Result};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// DNS name of the directory domain. Required.
    pub domain: String,
    /// NetBIOS flat name of the domain (e.g. `"EXAMPLE"` for
    /// `example.com`), used as the store default for entities with no
    /// `flatName` attribute of their own and for `"DOMAIN\user"`-style
    /// sAMAccountName prefix stripping. Defaults to the domain's first DNS
    /// label, upper-cased, when not set explicitly.
    pub domain_flat_name: Option<String>,
    /// Hostname of a DC to try first.
    pub preferred_server: Option<String>,
    /// If true, every attribute is stored in the schema-agnostic tail
    /// rather than only the attributes named in `other_attributes`.
    pub load_all_attributes: bool,
    /// Extra attributes to request when `load_all_attributes` is false.
    pub other_attributes: Vec<String>,
    /// Override for the default snapshot cache-file location.
    pub snapshot_path: Option<PathBuf>,
    /// Period between periodic snapshot writes.
    pub snapshot_interval: Duration,
    /// Page size for the bulk-load paged enumeration.
    pub bulk_load_page_size: usize,
    /// Identity used to name the snapshot file: `{identity}.{domain}.cache`.
    pub identity: String,
    /// Minimum and maximum backoff when retrying DC selection after a
    /// feed-init error (doubling from min to max).
    pub dc_retry_backoff_min: Duration,
    pub dc_retry_backoff_max: Duration,
    /// Watchdog poll interval.
    pub watchdog_interval: Duration,
    /// Bound on the bulk-load / change-notify feed queues.
    pub feed_queue_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            domain_flat_name: None,
            preferred_server: None,
            load_all_attributes: false,
            other_attributes: Vec::new(),
            snapshot_path: None,
            snapshot_interval: Duration::from_secs(5 * 60),
            bulk_load_page_size: 1000,
            identity: "dirstore".to_string(),
            dc_retry_backoff_min: Duration::from_secs(1),
            dc_retry_backoff_max: Duration::from_secs(60),
            watchdog_interval: Duration::from_secs(5 * 60),
            feed_queue_capacity: 4096,
        }
    }
}

impl StoreConfig {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    /// Loads configuration overrides from environment variables, with a
    /// `.env` file in the current directory loaded first if present.
    ///
    /// Recognized variables: `DIRSTORE_DOMAIN` (required),
    /// `DIRSTORE_DOMAIN_FLAT_NAME`, `DIRSTORE_PREFERRED_SERVER`,
    /// `DIRSTORE_LOAD_ALL_ATTRIBUTES`, `DIRSTORE_SNAPSHOT_PATH`,
    /// `DIRSTORE_SNAPSHOT_INTERVAL_SECS`, `DIRSTORE_BULK_LOAD_PAGE_SIZE`,
    /// `DIRSTORE_IDENTITY`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let domain = std::env::var("DIRSTORE_DOMAIN")
            .map_err(|_| DirError::Config("DIRSTORE_DOMAIN is required".to_string()))?;
        let mut cfg = Self::new(domain);

        if let Ok(v) = std::env::var("DIRSTORE_DOMAIN_FLAT_NAME") {
            cfg.domain_flat_name = Some(v);
        }
        if let Ok(v) = std::env::var("DIRSTORE_PREFERRED_SERVER") {
            cfg.preferred_server = Some(v);
        }
        if let Ok(v) = std::env::var("DIRSTORE_LOAD_ALL_ATTRIBUTES") {
            cfg.load_all_attributes = v.parse().unwrap_or(false);
        }
        if let Ok(v) = std::env::var("DIRSTORE_SNAPSHOT_PATH") {
            cfg.snapshot_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("DIRSTORE_SNAPSHOT_INTERVAL_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                cfg.snapshot_interval = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("DIRSTORE_BULK_LOAD_PAGE_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.bulk_load_page_size = n;
            }
        }
        if let Ok(v) = std::env::var("DIRSTORE_IDENTITY") {
            cfg.identity = v;
        }

        Ok(cfg)
    }

    /// Resolves the snapshot file path, defaulting to
    /// `{identity}.{domain}.cache` in the current directory.
    pub fn resolved_snapshot_path(&self) -> PathBuf {
        self.snapshot_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!("{}.{}.cache", self.identity, self.domain))
        })
    }

    /// Sibling defect-log path: same stem, `.log` extension.
    pub fn defect_log_path(&self) -> PathBuf {
        self.resolved_snapshot_path().with_extension("log")
    }

    /// Resolves the store default NetBIOS flat name: the configured value,
    /// or the domain's first DNS label upper-cased (`"example.com"` →
    /// `"EXAMPLE"`).
    pub fn resolved_domain_flat_name(&self) -> String {
        self.domain_flat_name.clone().unwrap_or_else(|| {
            self.domain
                .split('.')
                .next()
                .unwrap_or(&self.domain)
                .to_ascii_uppercase()
        })
    }
}
