//! Prometheus exporter for Apache Solr.

use std::net::IpAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use solr_exporter::{
    ExporterConfig, ExporterContext, HttpServer, Registry, ScrapeExecutor, ServerConfig,
};
use solr_exporter_common::{init_tracing, resolve, select_connection_string};

/// Prometheus exporter for Apache Solr.
#[derive(Parser, Debug)]
#[command(name = "solr-exporter")]
#[command(about = "Export Apache Solr metrics in the Prometheus format")]
#[command(version)]
struct Args {
    /// Port the metrics endpoint listens on.
    #[arg(short, long, default_value_t = 9983)]
    port: u16,

    /// Solr base URL of a standalone node (for example http://localhost:8983/solr).
    #[arg(short, long, conflicts_with = "zkhost")]
    baseurl: Option<String>,

    /// ZooKeeper connection string of a SolrCloud cluster (for example localhost:2181/solr).
    #[arg(short, long)]
    zkhost: Option<String>,

    /// Path to the configuration file (YAML or JSON5).
    #[arg(short = 'f', long, default_value = "./conf/config.yml")]
    config_file: String,

    /// Number of jobs scraped concurrently.
    #[arg(
        short = 'n',
        long,
        alias = "num-thread",
        default_value_t = 1,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    num_threads: u16,

    /// Log level (trace, debug, info, warn, error); overrides the config file.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = ExporterConfig::load_from_file(&args.config_file)?;

    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_tracing(&config.logging)?;

    info!("Starting Solr Prometheus Exporter");

    let conn_str = select_connection_string(args.baseurl.as_deref(), args.zkhost.as_deref());
    let target = resolve(conn_str)?;
    info!(connection = %target, cloud = target.is_cloud(), "Resolved Solr connection");

    let registry = Registry::load(&config)?;
    if registry.is_empty() {
        warn!(config = %args.config_file, "No scrape jobs configured");
    }
    info!(jobs = registry.len(), threads = args.num_threads, "Loaded scrape jobs");

    let cloud = target.is_cloud();
    let skipped = registry.jobs().iter().filter(|j| !j.mode.runs_in(cloud)).count();
    if skipped > 0 {
        info!(skipped, cloud, "Jobs for the other deployment mode will be skipped");
    }

    let bind: IpAddr = config
        .server
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

    let ctx = ExporterContext::new(target, registry, &config.scrape, args.num_threads as usize)?;
    let executor = Arc::new(ScrapeExecutor::new(Arc::new(ctx)));

    let server = HttpServer::new(
        executor,
        ServerConfig {
            bind,
            port: args.port,
            path: config.server.path.clone(),
        },
    );
    server.start().await?;

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    server.stop().await;

    info!("Exporter stopped");
    Ok(())
}

async fn terminate() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
