//! pagesync-server - hosts a paged store over QUIC

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use pagesync::auth::Principal;
use pagesync::metrics::{start_metrics_server, MetricsConfig};
use pagesync::network::{ConnectionConfig, StoreServer};
use pagesync::store::{FilePages, InMemoryPages, PageMemory, StoreService};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "pagesync-server",
    version = env!("CARGO_PKG_VERSION"),
    about = "Hosts a paged store for pagesync clients"
)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:4433")]
    bind: SocketAddr,

    /// Backing store file (in-memory store when omitted)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Upper bound on the store size in 64 KiB pages
    #[arg(long)]
    max_pages: Option<u64>,

    /// Principal granted full access; repeatable
    #[arg(long = "controller")]
    controllers: Vec<Principal>,

    /// JSON file the structured records are loaded from and saved to
    #[arg(long)]
    records: Option<PathBuf>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Name put in the self-signed certificate
    #[arg(long, default_value = "localhost")]
    server_name: String,

    /// Write the DER certificate here so clients can trust it
    #[arg(long)]
    cert_out: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - errors only
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.quiet)?;

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    if let Some(addr) = args.metrics_addr {
        start_metrics_server(MetricsConfig::with_addr(addr))?;
        info!("Metrics available at http://{}/metrics", addr);
    }

    let memory: Box<dyn PageMemory> = match &args.store {
        Some(path) => {
            let pages = FilePages::open(path)
                .with_context(|| format!("opening store file {}", path.display()))?;
            info!("Serving {} ({} pages)", path.display(), pages.page_count());
            match args.max_pages {
                Some(max) => Box::new(pages.with_max_pages(max)),
                None => Box::new(pages),
            }
        }
        None => {
            warn!("No --store given, contents are lost on exit");
            match args.max_pages {
                Some(max) => Box::new(InMemoryPages::with_max_pages(max)),
                None => Box::new(InMemoryPages::new()),
            }
        }
    };

    let mut service = StoreService::new(memory);
    if args.controllers.is_empty() {
        warn!("No --controller given, nobody can read or write the store");
    }
    for controller in &args.controllers {
        info!("Controller {}", controller);
        service = service.with_controller(*controller);
    }
    if let Some(records) = &args.records {
        service = service
            .with_records_file(records)
            .with_context(|| format!("loading records {}", records.display()))?;
    }

    let config = ConnectionConfig {
        bind_addr: args.bind,
        server_name: args.server_name.clone(),
        ..Default::default()
    };
    let server = StoreServer::bind(config, Arc::new(service))?;

    if let (Some(path), Some(der)) = (&args.cert_out, server.certificate_der()) {
        std::fs::write(path, der)
            .with_context(|| format!("writing certificate to {}", path.display()))?;
        info!("Certificate written to {}", path.display());
    }

    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    let stats = server.stats();
    info!(
        "Served {} requests ({} bytes in, {} bytes out)",
        stats.requests_served, stats.total_bytes_received, stats.total_bytes_sent
    );
    Ok(())
}

fn init_logging(debug: bool, quiet: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;

    fmt().with_env_filter(filter).with_target(false).init();

    Ok(())
}
