//! pagesync - synchronize a remote paged store with local snapshot files

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use pagesync::auth::{Identity, Principal};
use pagesync::config::{Config, ConfigLoader, RemoteTarget};
use pagesync::network::QuicStoreClient;
use pagesync::store::{calls, FilePages, LocalClient, RemoteStore, StoreService};
use pagesync::sync::{
    backup_records, read_records_file, restore_records, write_records_file, DiffSyncEngine,
    SnapshotPuller, SnapshotVerifier,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(
    name = "pagesync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Block-level synchronization of a remote paged store with local snapshots"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - errors only
    #[arg(short, long)]
    quiet: bool,

    /// Configuration file path (default: ./pagesync.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Remote store: quic://host:port or file://path
    #[arg(short, long)]
    remote: Option<String>,

    /// Secret key file identifying this client
    #[arg(short, long)]
    identity: Option<PathBuf>,

    /// Skip TLS certificate verification (testing only)
    #[arg(long)]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the blocks of a local snapshot that differ from the reference
    Push {
        source: PathBuf,
        /// Reference snapshot the remote is known to match
        #[arg(long)]
        reference: Option<PathBuf>,
        /// Block size in bytes (at most 256 MiB less 4 KiB over quic)
        #[arg(long)]
        block_size: Option<u64>,
        /// Compare only, write nothing
        #[arg(long)]
        dry_run: bool,
        /// Replace the reference with the source after a successful push
        #[arg(long)]
        rotate: bool,
        /// Write throughput cap in bytes/second
        #[arg(long)]
        bandwidth: Option<u64>,
    },
    /// Download the whole remote store into a local snapshot
    Pull {
        dest: PathBuf,
        /// Also write a copy to use as the reference of a later push
        #[arg(long)]
        reference: Option<PathBuf>,
        /// Block size in bytes (at most 256 MiB less 4 KiB over quic)
        #[arg(long)]
        block_size: Option<u64>,
    },
    /// Compare the remote store with a local snapshot
    Verify {
        file: PathBuf,
        /// Block size in bytes (at most 256 MiB less 4 KiB over quic)
        #[arg(long)]
        block_size: Option<u64>,
    },
    /// Print the remote store size
    Size,
    /// Back up or restore structured records
    Records {
        #[command(subcommand)]
        command: RecordsCommand,
    },
    /// Grant a principal access to records (and with --stable, to the store)
    Authorize {
        principal: Principal,
        #[arg(long)]
        stable: bool,
    },
    /// Revoke all access of a principal
    Deauthorize { principal: Principal },
    /// List authorized principals
    Authorized,
    /// Show the principal the remote sees for this identity
    Whoami,
    /// Manage the local identity
    Identity {
        #[command(subcommand)]
        command: IdentityCommand,
    },
}

#[derive(Subcommand)]
enum RecordsCommand {
    /// Save all records to a JSON file
    Backup { file: PathBuf },
    /// Send records from a JSON file to the remote
    Restore { file: PathBuf },
}

#[derive(Subcommand)]
enum IdentityCommand {
    /// Generate a new secret key file
    New { path: PathBuf },
    /// Print the principal of the configured identity
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::load(cli.config.as_deref()).context("loading configuration")?;
    apply_overrides(&mut config, &cli);

    init_logging(cli.debug, cli.quiet, &config.logging.level)?;
    debug!("pagesync v{} starting", env!("CARGO_PKG_VERSION"));

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    match cli.command {
        Commands::Identity { command } => identity_command(command, &config),
        command => {
            let remote = RemoteHandle::open(&config).await?;
            let result = run(command, &config, remote.store.as_ref()).await;
            remote.finish()?;
            result
        }
    }
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(remote) = &cli.remote {
        config.remote.target = Some(remote.clone());
    }
    if let Some(identity) = &cli.identity {
        config.remote.identity = Some(identity.clone());
    }
    if cli.insecure {
        config.remote.insecure = true;
    }
}

fn init_logging(debug: bool, quiet: bool, default_level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if quiet {
        "error"
    } else {
        default_level
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}

/// The remote store plus, for file targets, the in-process host to flush on exit
struct RemoteHandle {
    store: Box<dyn RemoteStore>,
    local: Option<Arc<StoreService>>,
}

impl RemoteHandle {
    async fn open(config: &Config) -> Result<Self> {
        let identity = load_identity(config)?;

        match config.remote_target()? {
            RemoteTarget::Quic(host) => {
                let client =
                    QuicStoreClient::connect_host(&host, &identity, config.connection_config()?)
                        .await
                        .with_context(|| format!("connecting to {host}"))?;
                info!("Connected to {} as {}", client.remote_addr(), identity.principal());
                Ok(Self {
                    store: Box::new(client),
                    local: None,
                })
            }
            RemoteTarget::File(path) => {
                // Only the server creates stores; a missing file here is a bad target
                let pages = FilePages::open_existing(&path)
                    .with_context(|| format!("opening store file {}", path.display()))?;
                let records = records_sidecar(&path);
                let service = Arc::new(
                    StoreService::new(pages)
                        .with_controller(identity.principal())
                        .with_records_file(&records)
                        .with_context(|| format!("loading records {}", records.display()))?,
                );
                debug!("Hosting {} in-process", path.display());
                Ok(Self {
                    store: Box::new(LocalClient::new(service.clone(), identity.principal())),
                    local: Some(service),
                })
            }
        }
    }

    fn finish(self) -> Result<()> {
        if let Some(service) = self.local {
            service.flush().context("flushing store file")?;
        }
        Ok(())
    }
}

fn records_sidecar(store: &Path) -> PathBuf {
    let mut name = store.as_os_str().to_owned();
    name.push(".records.json");
    PathBuf::from(name)
}

fn load_identity(config: &Config) -> Result<Identity> {
    match &config.remote.identity {
        Some(path) => Identity::from_key_file(path)
            .with_context(|| format!("loading identity {}", path.display())),
        None => match config.remote_target()? {
            // A local store file is only ever reached by this process
            RemoteTarget::File(_) => Ok(Identity::from_secret(b"pagesync local host")),
            RemoteTarget::Quic(_) => Err(anyhow!(
                "an identity is required for remote stores (--identity or remote.identity)"
            )),
        },
    }
}

async fn run(command: Commands, config: &Config, remote: &dyn RemoteStore) -> Result<()> {
    match command {
        Commands::Push {
            source,
            reference,
            block_size,
            dry_run,
            rotate,
            bandwidth,
        } => {
            let mut sync_config = config
                .sync_config()
                .dry_run(dry_run)
                .with_block_size(block_size_for(config, block_size)?);
            if bandwidth.is_some() {
                sync_config = sync_config.with_bandwidth_limit(bandwidth);
            }
            if rotate {
                sync_config = sync_config.rotate_reference(true);
            }

            let engine = DiffSyncEngine::new(sync_config)?;
            let report = engine
                .sync(remote, &source, reference.as_deref())
                .await
                .with_context(|| format!("pushing {}", source.display()))?;

            println!(
                "{} {} bytes: {} blocks, {} written, {} skipped{}",
                if report.dry_run { "Checked" } else { "Pushed" },
                report.source_len,
                report.blocks_total,
                report.blocks_written,
                report.blocks_skipped,
                if report.dry_run {
                    format!(", {} would be written", report.blocks_would_write)
                } else {
                    String::new()
                }
            );
            if report.rotated {
                println!("Reference rotated");
            }
        }
        Commands::Pull {
            dest,
            reference,
            block_size,
        } => {
            let puller = SnapshotPuller::new(block_size_for(config, block_size)?)?;
            let report = puller
                .pull(remote, &dest, reference.as_deref())
                .await
                .with_context(|| format!("pulling into {}", dest.display()))?;
            println!(
                "Pulled {} bytes in {} blocks into {}",
                report.bytes_read,
                report.blocks,
                dest.display()
            );
        }
        Commands::Verify { file, block_size } => {
            let verifier = SnapshotVerifier::new(block_size_for(config, block_size)?)?;
            let report = verifier.verify(remote, &file).await?;

            println!("local  {} bytes  blake3 {}", report.local_len, report.local_digest);
            println!("remote {} bytes", report.remote_size);
            for offset in &report.mismatched {
                println!("mismatch at offset {offset}");
            }
            if report.trailing_mismatch {
                println!("remote holds non-zero data past the local length");
            }
            if !report.is_match() {
                return Err(anyhow!(
                    "{} does not match the remote store",
                    file.display()
                ));
            }
            println!("OK");
        }
        Commands::Size => {
            println!("{}", remote.size().await?);
        }
        Commands::Records { command } => match command {
            RecordsCommand::Backup { file } => {
                let records = backup_records(remote, config.sync.record_page_size).await?;
                write_records_file(&file, &records).await?;
                println!("Saved {} records to {}", records.len(), file.display());
            }
            RecordsCommand::Restore { file } => {
                let records = read_records_file(&file).await?;
                let sent = restore_records(remote, &records, config.sync.restore_batch).await?;
                println!("Restored {} records from {}", sent, file.display());
            }
        },
        Commands::Authorize { principal, stable } => {
            if stable {
                calls::stable_authorize(remote, principal).await?;
            } else {
                calls::authorize(remote, principal).await?;
            }
            println!("Authorized {principal}");
        }
        Commands::Deauthorize { principal } => {
            if calls::deauthorize(remote, principal).await? {
                println!("Deauthorized {principal}");
            } else {
                println!("{principal} was not authorized");
            }
        }
        Commands::Authorized => {
            for entry in calls::get_authorized(remote).await? {
                println!(
                    "{}  records={} stable={}",
                    entry.principal, entry.records, entry.stable
                );
            }
        }
        Commands::Whoami => {
            println!("{}", calls::whoami(remote).await?);
        }
        Commands::Identity { command } => identity_command(command, config)?,
    }

    Ok(())
}

fn block_size_for(config: &Config, requested: Option<u64>) -> Result<u64> {
    let block_size = requested.unwrap_or(config.sync.block_size);
    config.check_block_size(block_size)?;
    Ok(block_size)
}

fn identity_command(command: IdentityCommand, config: &Config) -> Result<()> {
    match command {
        IdentityCommand::New { path } => {
            let identity = Identity::generate_key_file(&path)?;
            println!("Wrote {}", path.display());
            println!("{}", identity.principal());
        }
        IdentityCommand::Show => {
            let path = config.identity_path()?;
            let identity = Identity::from_key_file(path)?;
            println!("{}", identity.principal());
        }
    }
    Ok(())
}
