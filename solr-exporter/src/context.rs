//! Process-wide state shared by the executor and the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use prometheus_client::metrics::counter::Counter;

use solr_exporter_common::ConnectionTarget;

use crate::client::SolrClient;
use crate::config::ScrapeSettings;
use crate::discovery::NodeDiscovery;
use crate::registry::Registry;

/// Cumulative count of failed jobs since process start.
#[derive(Debug, Clone, Default)]
pub struct ErrorCounter {
    inner: Counter<u64>,
}

impl ErrorCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one failed job, returning the new total.
    pub fn record(&self) -> u64 {
        self.inner.inc() + 1
    }

    pub fn get(&self) -> u64 {
        self.inner.get()
    }
}

/// Everything a scrape cycle needs, built once at startup.
#[derive(Debug)]
pub struct ExporterContext {
    pub target: ConnectionTarget,
    pub registry: Arc<Registry>,
    pub client: SolrClient,
    /// Number of jobs allowed to run at once (at least 1).
    pub concurrency: usize,
    pub job_timeout: Duration,
    /// Live node lookup, holding the ZooKeeper session across cycles.
    pub discovery: NodeDiscovery,
    pub errors: ErrorCounter,
}

impl ExporterContext {
    pub fn new(
        target: ConnectionTarget,
        registry: Registry,
        settings: &ScrapeSettings,
        concurrency: usize,
    ) -> Result<Self, reqwest::Error> {
        let job_timeout = Duration::from_secs(settings.timeout_secs);
        let discovery_timeout = Duration::from_secs(settings.discovery_timeout_secs);

        Ok(Self {
            discovery: NodeDiscovery::new(target.clone(), discovery_timeout),
            target,
            registry: Arc::new(registry),
            client: SolrClient::new(job_timeout)?,
            concurrency: concurrency.max(1),
            job_timeout,
            errors: ErrorCounter::new(),
        })
    }

    /// Override both timeouts; used where whole seconds are too coarse.
    pub fn with_timeouts(
        mut self,
        job: Duration,
        discovery: Duration,
    ) -> Result<Self, reqwest::Error> {
        self.client = SolrClient::new(job)?;
        self.job_timeout = job;
        self.discovery = NodeDiscovery::new(self.target.clone(), discovery);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_counter_is_shared_between_clones() {
        let counter = ErrorCounter::new();
        let clone = counter.clone();

        assert_eq!(counter.record(), 1);
        assert_eq!(clone.record(), 2);
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_concurrency_floor() {
        let target = ConnectionTarget::Standalone {
            base_url: "http://localhost:8983/solr".to_string(),
        };

        let ctx = ExporterContext::new(target, Registry::default(), &ScrapeSettings::default(), 0)
            .unwrap();

        assert_eq!(ctx.concurrency, 1);
        assert_eq!(ctx.job_timeout, Duration::from_secs(10));
        assert_eq!(ctx.discovery.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_with_timeouts_rebuilds_discovery() {
        let target = ConnectionTarget::Cloud {
            hosts: vec!["zk1:2181".to_string()],
            chroot: "/solr".to_string(),
        };

        let ctx = ExporterContext::new(target, Registry::default(), &ScrapeSettings::default(), 2)
            .unwrap()
            .with_timeouts(Duration::from_millis(500), Duration::from_millis(300))
            .unwrap();

        assert_eq!(ctx.job_timeout, Duration::from_millis(500));
        assert_eq!(ctx.discovery.timeout(), Duration::from_millis(300));
    }
}
