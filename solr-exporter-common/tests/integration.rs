//! Integration tests for solr-exporter-common library.

use std::io::Write;

use serde::Deserialize;
use solr_exporter_common::{
    ConnectionTarget, DEFAULT_CONNECTION, Error, LogFormat, LoggingConfig, load_config, resolve,
    select_connection_string,
};

#[derive(Debug, Deserialize)]
struct TestConfig {
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    names: Vec<String>,
}

fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file
}

#[test]
fn test_load_yaml_config_file() {
    let file = write_temp(
        ".yml",
        "logging:\n  level: debug\n  format: json\nnames:\n  - a\n  - b\n",
    );

    let config: TestConfig = load_config(file.path()).expect("load yaml");

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.names, vec!["a", "b"]);
}

#[test]
fn test_load_json5_config_file() {
    let file = write_temp(
        ".json5",
        r#"{
            // comments are allowed
            names: ["x"],
        }"#,
    );

    let config: TestConfig = load_config(file.path()).expect("load json5");

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.names, vec!["x"]);
}

#[test]
fn test_load_missing_file_mentions_path() {
    let result: solr_exporter_common::Result<TestConfig> =
        load_config("/nonexistent/solr-exporter/config.yml");

    match result {
        Err(Error::Config(msg)) => assert!(msg.contains("/nonexistent/solr-exporter/config.yml")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_cli_selection_then_resolution() {
    let conn = select_connection_string(None, None);
    assert_eq!(conn, DEFAULT_CONNECTION);
    assert_eq!(
        resolve(conn).unwrap(),
        ConnectionTarget::Standalone {
            base_url: "http://localhost:8983/solr".to_string()
        }
    );

    let conn = select_connection_string(Some(""), Some("zk1:2181,zk2:2181/solr"));
    let target = resolve(conn).unwrap();
    assert!(target.is_cloud());
    assert_eq!(
        target.zk_connect_string().as_deref(),
        Some("zk1:2181,zk2:2181/solr")
    );
}

#[test]
fn test_resolution_is_exclusive() {
    // Every URL-shaped input is standalone with the exact string
    for url in [
        "http://localhost:8983/solr",
        "https://10.0.0.1:8983/solr",
        "http://solr-0.solr.svc:8983/solr?x=1&y=2",
    ] {
        assert_eq!(
            resolve(url).unwrap(),
            ConnectionTarget::Standalone {
                base_url: url.to_string()
            }
        );
    }

    // Every locator is cloud
    for (locator, hosts, chroot) in [
        ("zk1:2181", vec!["zk1:2181"], "/"),
        ("zk1:2181/", vec!["zk1:2181"], "/"),
        ("zk1:2181,zk2:2181,zk3:2181/solr", vec!["zk1:2181", "zk2:2181", "zk3:2181"], "/solr"),
    ] {
        assert_eq!(
            resolve(locator).unwrap(),
            ConnectionTarget::Cloud {
                hosts: hosts.into_iter().map(String::from).collect(),
                chroot: chroot.to_string(),
            }
        );
    }
}
