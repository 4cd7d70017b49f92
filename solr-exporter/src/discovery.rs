//! SolrCloud live node discovery through ZooKeeper.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use solr_exporter_common::ConnectionTarget;

/// ZooKeeper node listing the live Solr nodes.
pub const LIVE_NODES_PATH: &str = "/live_nodes";

/// ZooKeeper node holding cluster-wide properties.
pub const CLUSTER_PROPS_PATH: &str = "/clusterprops.json";

const DEFAULT_SCHEME: &str = "http";

#[derive(Debug, Default, Deserialize)]
struct ClusterProps {
    #[serde(rename = "urlScheme")]
    url_scheme: Option<String>,
}

/// Convert a live node name (`host:8983_solr`) into a base URL.
///
/// The text before the first `_` is the host and port, the rest is the
/// URL-encoded context path.
pub fn node_name_to_url(node_name: &str, scheme: &str) -> String {
    match node_name.split_once('_') {
        Some((host, context)) if !context.is_empty() => {
            let context = context.replace("%2F", "/").replace("%2f", "/");
            format!("{}://{}/{}", scheme, host, context.trim_start_matches('/'))
        }
        Some((host, _)) => format!("{}://{}", scheme, host),
        None => format!("{}://{}", scheme, node_name),
    }
}

/// Parse the URL scheme out of `/clusterprops.json`, defaulting to `http`.
pub fn url_scheme(cluster_props: &[u8]) -> String {
    serde_json::from_slice::<ClusterProps>(cluster_props)
        .ok()
        .and_then(|p| p.url_scheme)
        .filter(|s| s == "http" || s == "https")
        .unwrap_or_else(|| DEFAULT_SCHEME.to_string())
}

/// Reasons live node discovery fails.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no ZooKeeper hosts configured")]
    NoHosts,

    #[error("failed to connect to ZooKeeper at {connect}: {source}")]
    Connect {
        connect: String,
        #[source]
        source: zookeeper_client::Error,
    },

    #[error("failed to list {path}: {source}")]
    List {
        path: &'static str,
        #[source]
        source: zookeeper_client::Error,
    },

    #[error("ZooKeeper discovery timed out after {0:?}")]
    Timeout(Duration),
}

/// Resolves the Solr nodes a cycle talks to.
///
/// In cloud mode the ZooKeeper session is opened on first use and kept for
/// later cycles. A session that failed a lookup, timed out or terminated is
/// dropped and reopened on the next call.
#[derive(Debug)]
pub struct NodeDiscovery {
    target: ConnectionTarget,
    timeout: Duration,
    session: Mutex<Option<zookeeper_client::Client>>,
}

impl NodeDiscovery {
    pub fn new(target: ConnectionTarget, timeout: Duration) -> Self {
        Self {
            target,
            timeout,
            session: Mutex::new(None),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a ZooKeeper session is currently cached.
    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Base URLs of the live nodes, sorted. A standalone target is its own
    /// single node.
    pub async fn live_node_urls(&self) -> Result<Vec<String>, DiscoveryError> {
        let connect = match &self.target {
            ConnectionTarget::Standalone { base_url } => return Ok(vec![base_url.clone()]),
            ConnectionTarget::Cloud { hosts, .. } if hosts.is_empty() => {
                return Err(DiscoveryError::NoHosts);
            }
            ConnectionTarget::Cloud { .. } => self
                .target
                .zk_connect_string()
                .ok_or(DiscoveryError::NoHosts)?,
        };

        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|c| c.state().is_terminated()) {
            debug!(zk = %connect, "ZooKeeper session terminated, reconnecting");
            *session = None;
        }

        let result = tokio::time::timeout(self.timeout, lookup(&mut session, &connect))
            .await
            .unwrap_or(Err(DiscoveryError::Timeout(self.timeout)));
        if result.is_err() {
            *session = None;
        }
        let (nodes, scheme) = result?;

        if nodes.is_empty() {
            warn!(zk = %connect, "No live Solr nodes registered");
        }

        let mut urls: Vec<String> = nodes
            .iter()
            .map(|node| node_name_to_url(node, &scheme))
            .collect();
        urls.sort();
        debug!(count = urls.len(), "Discovered live nodes");

        Ok(urls)
    }
}

/// Read `/live_nodes` and the URL scheme, opening a session if none is
/// cached.
async fn lookup(
    session: &mut Option<zookeeper_client::Client>,
    connect: &str,
) -> Result<(Vec<String>, String), DiscoveryError> {
    let client = match session.as_ref() {
        Some(client) => client.clone(),
        None => {
            let client = zookeeper_client::Client::connect(connect)
                .await
                .map_err(|source| DiscoveryError::Connect {
                    connect: connect.to_string(),
                    source,
                })?;
            debug!(zk = %connect, "Opened ZooKeeper session");
            session.insert(client).clone()
        }
    };

    let nodes = client
        .list_children(LIVE_NODES_PATH)
        .await
        .map_err(|source| DiscoveryError::List {
            path: LIVE_NODES_PATH,
            source,
        })?;

    let scheme = match client.get_data(CLUSTER_PROPS_PATH).await {
        Ok((data, _)) => url_scheme(&data),
        Err(e) => {
            debug!(error = %e, "No cluster properties, using http");
            DEFAULT_SCHEME.to_string()
        }
    };

    Ok((nodes, scheme))
}
