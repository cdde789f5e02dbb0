use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dirstore::{
    CountingMetricSink, DcLocator, DcProbe, DirectoryFeed, DirectoryStore, DnsResolver, EntityView,
    Guid, ObjectClass, RawRecord, SnapshotCodec, StaticFeed, StoreConfig,
};

#[derive(Parser)]
#[command(name = "dirstore")]
#[command(about = "In-memory mirror of a directory-service domain", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sync pipeline against a demo feed for a fixed duration
    /// and report ingestion stats. The real LDAP client is an external
    /// collaborator this crate does not provide; this subcommand
    /// exercises the pipeline with a small built-in record set so the
    /// wiring can be demonstrated end to end.
    Run {
        /// How long to run before shutting down and reporting stats.
        #[arg(long, default_value_t = 2)]
        seconds: u64,
    },
    /// Load a snapshot file and print summary counts.
    Inspect {
        /// Path to the snapshot file. Defaults to the configured path.
        path: Option<PathBuf>,
        /// Print every live entity as one JSON object per line instead of
        /// the summary counts, for piping into `jq` or a `SqlSink`.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { seconds } => run(seconds),
        Commands::Inspect { path, json } => inspect(path, json),
    }
}

fn run(seconds: u64) -> anyhow::Result<()> {
    let mut config = StoreConfig::from_env().unwrap_or_else(|_| StoreConfig::new("demo.local"));
    config.snapshot_path = config.snapshot_path.or_else(|| Some(PathBuf::from("dirstore-demo.cache")));

    let metrics = Arc::new(CountingMetricSink::new());
    let store = Arc::new(DirectoryStore::open(config, metrics.clone()));

    let locator = Arc::new(DcLocator::new(
        store.config().domain.clone(),
        store.config().preferred_server.clone(),
        None::<Ipv4Addr>,
        None,
        Arc::new(LocalhostDns),
        Arc::new(AlwaysUp),
    ));

    let build_feeds = Arc::new(|_dc: &str| -> (Box<dyn DirectoryFeed>, Box<dyn DirectoryFeed>) {
        (Box::new(StaticFeed::new(demo_records())), Box::new(StaticFeed::new(Vec::new())))
    });

    store.run(locator, build_feeds)?;
    std::thread::sleep(Duration::from_secs(seconds));
    store.shutdown();

    println!("records applied: {}", metrics.counter_value("store.records_applied"));
    println!("defects: {}", metrics.counter_value("store.defects"));
    println!("live entities: {}", store.store().iter_live().count());

    Ok(())
}

fn inspect(path: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(|| StoreConfig::default().resolved_snapshot_path());
    match SnapshotCodec::load(&path)? {
        Some(entities) => {
            if json {
                for entity in entities.iter().flatten() {
                    println!("{}", serde_json::to_string(&EntityView::from(entity))?);
                }
                return Ok(());
            }
            let total = entities.len();
            let live = entities.iter().filter(|e| e.is_some()).count();
            println!("{}: {} slots, {} live entities", path.display(), total, live);
            let groups = entities.iter().flatten().filter(|e| e.is_group()).count();
            println!("  groups: {groups}");
        }
        None => println!("{}: no snapshot found", path.display()),
    }
    Ok(())
}

fn demo_records() -> Vec<RawRecord> {
    let mut group = RawRecord::new("CN=Engineering,DC=demo,DC=local", Guid::new_v4(), ObjectClass::new("group"));
    group.sam_account_name = Some("Engineering".to_string());
    group.primary_group_token = Some(1001);

    let mut user = RawRecord::new("CN=Alice,DC=demo,DC=local", Guid::new_v4(), ObjectClass::new("user"));
    user.sam_account_name = Some("alice".to_string());
    user.manager_dn = Some("CN=Bob,DC=demo,DC=local".to_string());

    let mut manager = RawRecord::new("CN=Bob,DC=demo,DC=local", Guid::new_v4(), ObjectClass::new("user"));
    manager.sam_account_name = Some("bob".to_string());

    vec![group, user, manager]
}

struct LocalhostDns;
impl DnsResolver for LocalhostDns {
    fn resolve(&self, _domain: &str) -> Vec<String> {
        vec!["localhost".to_string()]
    }
}

struct AlwaysUp;
impl DcProbe for AlwaysUp {
    fn probe(&self, _dc: &str, _timeout: Duration) -> bool {
        true
    }
}
