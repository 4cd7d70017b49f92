//! Resolution of a connection string into a Solr deployment target.
//!
//! Two forms are recognised, tried in this order:
//!
//! - a direct base URL such as `http://localhost:8983/solr` (standalone mode)
//! - a ZooKeeper locator `host[,host...][/chroot]` such as
//!   `zk1:2181,zk2:2181/solr` (SolrCloud mode)

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// Default connection string used when neither a base URL nor a ZooKeeper
/// locator is supplied.
pub const DEFAULT_CONNECTION: &str = "http://localhost:8983/solr";

/// Chroot used when the locator does not carry one.
pub const DEFAULT_CHROOT: &str = "/";

static BASE_URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[\w/:%#$&?()~.=+\-]+$").expect("valid base URL regex"));

static ZK_HOST_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<host>[^/]+)(?P<chroot>(?:/.*)?)$").expect("valid ZooKeeper locator regex")
});

/// How to reach a Solr deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// A single node reached directly over HTTP.
    Standalone { base_url: String },
    /// A SolrCloud cluster whose live nodes are discovered through ZooKeeper.
    Cloud { hosts: Vec<String>, chroot: String },
}

impl ConnectionTarget {
    /// Whether this target is a SolrCloud cluster.
    pub fn is_cloud(&self) -> bool {
        matches!(self, ConnectionTarget::Cloud { .. })
    }

    /// Render the ZooKeeper connect string (`h1,h2/chroot`) for a cloud target.
    ///
    /// The default chroot is omitted.
    pub fn zk_connect_string(&self) -> Option<String> {
        match self {
            ConnectionTarget::Standalone { .. } => None,
            ConnectionTarget::Cloud { hosts, chroot } => {
                let mut connect = hosts.join(",");
                if chroot != DEFAULT_CHROOT {
                    connect.push_str(chroot);
                }
                Some(connect)
            }
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionTarget::Standalone { base_url } => write!(f, "standalone({})", base_url),
            ConnectionTarget::Cloud { hosts, chroot } => {
                write!(f, "cloud({} chroot={})", hosts.join(","), chroot)
            }
        }
    }
}

/// Resolve a connection string into a [`ConnectionTarget`].
///
/// The base URL pattern wins whenever it matches; the locator pattern is only
/// consulted otherwise.
///
/// # Example
/// ```
/// use solr_exporter_common::connection::{resolve, ConnectionTarget};
///
/// let target = resolve("zk1:2181,zk2:2181/solr").unwrap();
/// assert_eq!(
///     target,
///     ConnectionTarget::Cloud {
///         hosts: vec!["zk1:2181".to_string(), "zk2:2181".to_string()],
///         chroot: "/solr".to_string(),
///     }
/// );
/// ```
pub fn resolve(conn_str: &str) -> Result<ConnectionTarget> {
    if BASE_URL_PATTERN.is_match(conn_str) {
        return Ok(ConnectionTarget::Standalone {
            base_url: conn_str.to_string(),
        });
    }

    let captures = ZK_HOST_PATTERN
        .captures(conn_str)
        .ok_or_else(|| Error::InvalidConnectionString(conn_str.to_string()))?;

    let host = captures.name("host").map_or("", |m| m.as_str());
    let chroot = captures.name("chroot").map_or("", |m| m.as_str());

    let mut hosts: Vec<String> = Vec::new();
    for h in host.split(',').map(str::trim).filter(|h| !h.is_empty()) {
        if !hosts.iter().any(|existing| existing == h) {
            hosts.push(h.to_string());
        }
    }

    if hosts.is_empty() {
        return Err(Error::InvalidConnectionString(conn_str.to_string()));
    }

    let chroot = if chroot.is_empty() {
        DEFAULT_CHROOT.to_string()
    } else {
        chroot.to_string()
    };

    Ok(ConnectionTarget::Cloud { hosts, chroot })
}

/// Pick the connection string from the mutually exclusive CLI inputs.
///
/// A non-empty base URL wins, then a non-empty ZooKeeper locator, then
/// [`DEFAULT_CONNECTION`].
pub fn select_connection_string<'a>(
    base_url: Option<&'a str>,
    zk_host: Option<&'a str>,
) -> &'a str {
    match (base_url, zk_host) {
        (Some(url), _) if !url.is_empty() => url,
        (_, Some(zk)) if !zk.is_empty() => zk,
        _ => DEFAULT_CONNECTION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud(hosts: &[&str], chroot: &str) -> ConnectionTarget {
        ConnectionTarget::Cloud {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            chroot: chroot.to_string(),
        }
    }

    #[test]
    fn test_resolve_base_url() {
        assert_eq!(
            resolve("http://localhost:8983/solr").unwrap(),
            ConnectionTarget::Standalone {
                base_url: "http://localhost:8983/solr".to_string()
            }
        );
        assert_eq!(
            resolve("https://solr.example.com:8443/solr/").unwrap(),
            ConnectionTarget::Standalone {
                base_url: "https://solr.example.com:8443/solr/".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_zk_hosts_with_chroot() {
        assert_eq!(
            resolve("zk1:2181,zk2:2181/solr").unwrap(),
            cloud(&["zk1:2181", "zk2:2181"], "/solr")
        );
    }

    #[test]
    fn test_resolve_zk_single_host_default_chroot() {
        assert_eq!(resolve("zk1:2181").unwrap(), cloud(&["zk1:2181"], "/"));
    }

    #[test]
    fn test_resolve_zk_trims_and_skips_empty_hosts() {
        assert_eq!(
            resolve(" zk1:2181 ,, zk2:2181,/a/b").unwrap(),
            cloud(&["zk1:2181", "zk2:2181"], "/a/b")
        );
    }

    #[test]
    fn test_resolve_zk_deduplicates_hosts() {
        assert_eq!(
            resolve("zk1:2181,zk1:2181,zk2:2181").unwrap(),
            cloud(&["zk1:2181", "zk2:2181"], "/")
        );
    }

    #[test]
    fn test_resolve_invalid() {
        assert!(matches!(
            resolve(""),
            Err(Error::InvalidConnectionString(_))
        ));
        assert!(matches!(
            resolve("/solr"),
            Err(Error::InvalidConnectionString(_))
        ));
        assert!(matches!(
            resolve(" , ,"),
            Err(Error::InvalidConnectionString(_))
        ));
    }

    #[test]
    fn test_resolve_malformed_url_falls_back_to_locator() {
        // Anything the locator pattern accepts is a host list, even if it
        // looks like a URL.
        assert_eq!(
            resolve("http://bad host/solr").unwrap(),
            cloud(&["http:"], "//bad host/solr")
        );
        assert_eq!(
            resolve("ftp://zk1:2181").unwrap(),
            cloud(&["ftp:"], "//zk1:2181")
        );
    }

    #[test]
    fn test_zk_connect_string() {
        assert_eq!(
            cloud(&["zk1:2181", "zk2:2181"], "/solr").zk_connect_string(),
            Some("zk1:2181,zk2:2181/solr".to_string())
        );
        assert_eq!(
            cloud(&["zk1:2181"], "/").zk_connect_string(),
            Some("zk1:2181".to_string())
        );
        assert_eq!(
            resolve(DEFAULT_CONNECTION).unwrap().zk_connect_string(),
            None
        );
    }

    #[test]
    fn test_select_connection_string() {
        assert_eq!(
            select_connection_string(Some("http://a:8983/solr"), None),
            "http://a:8983/solr"
        );
        assert_eq!(select_connection_string(Some(""), Some("zk:2181")), "zk:2181");
        assert_eq!(select_connection_string(None, None), DEFAULT_CONNECTION);
        assert_eq!(select_connection_string(Some(""), Some("")), DEFAULT_CONNECTION);
    }
}
