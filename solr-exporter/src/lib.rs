//! Prometheus exporter for Apache Solr.
//!
//! Each poll of the metrics endpoint runs one scrape cycle: every configured
//! job is sent to the Solr deployment (a standalone node or the live nodes
//! of a SolrCloud cluster), the JSON responses are turned into samples, and
//! the result is rendered in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   HTTP Server   │────>│    Executor     │────>│  Solr / ZK      │
//! │   (/metrics)    │<────│  (aggregation)  │<────│  (JSON APIs)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! solr-exporter -b http://localhost:8983/solr -f conf/config.yml
//! solr-exporter -z zk1:2181,zk2:2181/solr -n 4
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod context;
pub mod discovery;
pub mod executor;
pub mod exposition;
pub mod extraction;
pub mod http;
pub mod mapping;
pub mod registry;

pub use aggregator::{MetricFamily, Sample, Snapshot};
pub use config::{ConfigError, ExporterConfig};
pub use context::{ErrorCounter, ExporterContext};
pub use discovery::{DiscoveryError, NodeDiscovery};
pub use executor::{
    CycleOutcome, JobError, JobFailure, ScrapeError, ScrapeExecutor, ScrapeResult,
};
pub use http::{HttpServer, ServerConfig, ServerError};
pub use registry::{Registry, ScrapeJob};
