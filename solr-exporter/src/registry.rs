//! The set of configured scrape jobs.
//!
//! Jobs are compiled and validated once from the configuration and never
//! change afterwards, so the registry is shared between tasks without locks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::{ConfigError, ExporterConfig, JobConfig, JobMode, JobScope, RuleConfig};
use crate::extraction::{ExtractionRule, LabelSource, PathSegment, Variable};
use crate::mapping::{HISTOGRAM_SUFFIXES, MetricType, is_valid_label_name, is_valid_metric_name};

/// Request path of a job, possibly expanded once per core or collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplate {
    raw: String,
    expansion: Option<Variable>,
}

impl EndpointTemplate {
    /// Parse an endpoint, accepting at most one kind of placeholder.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if !raw.starts_with('/') {
            return Err(format!("endpoint must start with /: {}", raw));
        }

        let mut expansion = None;
        let mut rest = raw;
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| format!("unclosed placeholder in endpoint: {}", raw))?;
            let name = &after[..close];

            let variable = match Variable::from_name(name) {
                Some(v @ (Variable::Core | Variable::Collection)) => v,
                _ => return Err(format!("unknown endpoint placeholder {{{}}}", name)),
            };
            if expansion.is_some_and(|existing| existing != variable) {
                return Err(format!(
                    "endpoint mixes {{core}} and {{collection}}: {}",
                    raw
                ));
            }
            expansion = Some(variable);
            rest = &after[close + 1..];
        }

        Ok(Self {
            raw: raw.to_string(),
            expansion,
        })
    }

    /// The variable the endpoint is expanded over, if any.
    pub fn expansion(&self) -> Option<Variable> {
        self.expansion
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Render the path for one request, forcing a JSON response.
    pub fn render(&self, value: Option<&str>) -> String {
        let mut path = match (self.expansion, value) {
            (Some(variable), Some(value)) => self.raw.replace(variable.placeholder(), value),
            _ => self.raw.clone(),
        };

        let has_wt = path
            .split_once('?')
            .is_some_and(|(_, query)| query.split('&').any(|p| p.starts_with("wt=")));
        if !has_wt {
            path.push(if path.contains('?') { '&' } else { '?' });
            path.push_str("wt=json");
        }

        path
    }
}

/// A validated metric extraction job.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeJob {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub endpoint: EndpointTemplate,
    pub scope: JobScope,
    pub mode: JobMode,
    pub label_names: Vec<String>,
    pub rules: Vec<ExtractionRule>,
}

impl ScrapeJob {
    /// Compile a job from its configuration.
    pub fn compile(config: &JobConfig) -> Result<Self, ConfigError> {
        let invalid =
            |msg: String| ConfigError::Validation(format!("job '{}': {}", config.name, msg));

        if config.name.is_empty() {
            return Err(ConfigError::Validation("job name must not be empty".to_string()));
        }
        if !is_valid_metric_name(&config.name) {
            return Err(invalid("name is not a valid metric name".to_string()));
        }

        let endpoint = EndpointTemplate::parse(&config.endpoint).map_err(invalid)?;

        let mut seen = HashSet::new();
        for label in &config.labels {
            if !is_valid_label_name(label) {
                return Err(invalid(format!("invalid label name '{}'", label)));
            }
            if !seen.insert(label.as_str()) {
                return Err(invalid(format!("duplicate label name '{}'", label)));
            }
        }

        if config.rules.is_empty() {
            return Err(invalid("at least one rule is required".to_string()));
        }

        let rules = config
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                compile_rule(config, &endpoint, rule)
                    .map_err(|msg| invalid(format!("rule {}: {}", i + 1, msg)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: config.name.clone(),
            help: config.help.clone(),
            metric_type: config.metric_type,
            endpoint,
            scope: config.scope,
            mode: config.mode,
            label_names: config.labels.clone(),
            rules,
        })
    }

    /// Family names this job produces, in rule order.
    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.family.as_str())
    }

    #[cfg(test)]
    pub(crate) fn for_tests(name: &str, metric_type: MetricType, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            help: String::new(),
            metric_type,
            endpoint: EndpointTemplate::parse("/admin/info/system").unwrap(),
            scope: JobScope::Node,
            mode: JobMode::Any,
            label_names: labels.iter().map(|l| l.to_string()).collect(),
            rules: Vec::new(),
        }
    }
}

fn compile_rule(
    job: &JobConfig,
    endpoint: &EndpointTemplate,
    rule: &RuleConfig,
) -> Result<ExtractionRule, String> {
    if rule.path.is_empty() {
        return Err("path must not be empty".to_string());
    }
    let path: Vec<PathSegment> = rule.path.iter().map(|s| PathSegment::parse(s)).collect();

    let family = rule.metric.clone().unwrap_or_else(|| job.name.clone());
    if !is_valid_metric_name(&family) {
        return Err(format!("'{}' is not a valid metric name", family));
    }

    let suffix = match (job.metric_type, rule.suffix.as_deref()) {
        (MetricType::Histogram, Some(s)) if HISTOGRAM_SUFFIXES.contains(&s) => s.to_string(),
        (MetricType::Histogram, _) => {
            return Err(format!(
                "histogram rules need a suffix, one of {}",
                HISTOGRAM_SUFFIXES.join(", ")
            ));
        }
        (_, Some(_)) => return Err("suffix is only allowed on histogram jobs".to_string()),
        (_, None) => String::new(),
    };
    if suffix == "_bucket" && !job.labels.iter().any(|l| l == "le") {
        return Err("histogram _bucket rules need an 'le' label".to_string());
    }

    if rule.label_values.len() != job.labels.len() {
        return Err(format!(
            "{} label values given for {} labels",
            rule.label_values.len(),
            job.labels.len()
        ));
    }

    let label_values = rule
        .label_values
        .iter()
        .map(|raw| LabelSource::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let compiled = ExtractionRule {
        path,
        family,
        suffix,
        label_values,
        equals: rule.equals.clone(),
    };

    let wildcards = compiled.wildcard_count();
    for source in &compiled.label_values {
        match source {
            LabelSource::Capture(n) if *n > wildcards => {
                return Err(format!(
                    "capture ${} used but path has {} wildcard(s)",
                    n, wildcards
                ));
            }
            LabelSource::Variable(v @ (Variable::Core | Variable::Collection))
                if endpoint.expansion() != Some(*v) =>
            {
                return Err(format!(
                    "label uses {} but the endpoint has no such placeholder",
                    v.placeholder()
                ));
            }
            _ => {}
        }
    }

    Ok(compiled)
}

/// Registry of scrape jobs in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    jobs: Vec<Arc<ScrapeJob>>,
}

impl Registry {
    /// Build the registry from the exporter configuration.
    pub fn load(config: &ExporterConfig) -> Result<Self, ConfigError> {
        Self::from_jobs(&config.jobs)
    }

    /// Build the registry from job definitions.
    pub fn from_jobs(configs: &[JobConfig]) -> Result<Self, ConfigError> {
        let mut jobs = Vec::with_capacity(configs.len());
        let mut names = HashSet::new();
        let mut families: HashMap<String, (MetricType, Vec<String>, String)> = HashMap::new();

        for config in configs {
            let job = ScrapeJob::compile(config)?;

            if !names.insert(job.name.clone()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate job name '{}'",
                    job.name
                )));
            }

            for family in job.families() {
                match families.get(family) {
                    Some((metric_type, labels, owner))
                        if *metric_type != job.metric_type || *labels != job.label_names =>
                    {
                        return Err(ConfigError::Validation(format!(
                            "metric '{}' is declared by jobs '{}' and '{}' \
                             with different types or labels",
                            family, owner, job.name
                        )));
                    }
                    Some(_) => {}
                    None => {
                        families.insert(
                            family.to_string(),
                            (job.metric_type, job.label_names.clone(), job.name.clone()),
                        );
                    }
                }
            }

            jobs.push(Arc::new(job));
        }

        Ok(Self { jobs })
    }

    /// Jobs in declaration order.
    pub fn jobs(&self) -> &[Arc<ScrapeJob>] {
        &self.jobs
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ScrapeJob>> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Registry, ConfigError> {
        let config = ExporterConfig::parse(json)?;
        Registry::load(&config)
    }

    fn err(json: &str) -> String {
        parse(json).unwrap_err().to_string()
    }

    #[test]
    fn test_load_preserves_declaration_order() {
        let registry = parse(
            r#"{ jobs: [
                { name: "solr_b", type: "gauge", endpoint: "/admin/info/system",
                  rules: [{ path: ["a"] }] },
                { name: "solr_a", type: "counter", endpoint: "/admin/metrics",
                  rules: [{ path: ["b"] }] },
            ] }"#,
        )
        .unwrap();

        let names: Vec<_> = registry.jobs().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["solr_b", "solr_a"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("solr_a").is_some());
    }

    #[test]
    fn test_duplicate_job_name() {
        let msg = err(
            r#"{ jobs: [
                { name: "solr_a", type: "gauge", endpoint: "/x", rules: [{ path: ["a"] }] },
                { name: "solr_a", type: "gauge", endpoint: "/y", rules: [{ path: ["b"] }] },
            ] }"#,
        );
        assert!(msg.contains("duplicate job name"));
    }

    #[test]
    fn test_rules_required() {
        let msg = err(
            r#"{ jobs: [{ name: "solr_a", type: "gauge", endpoint: "/x", rules: [] }] }"#,
        );
        assert!(msg.contains("at least one rule"));
    }

    #[test]
    fn test_label_value_count_must_match() {
        let msg = err(
            r#"{ jobs: [{ name: "solr_a", type: "gauge", endpoint: "/x", labels: ["core"],
                rules: [{ path: ["a"] }] }] }"#,
        );
        assert!(msg.contains("0 label values given for 1 labels"));
    }

    #[test]
    fn test_capture_out_of_range() {
        let msg = err(
            r#"{ jobs: [{ name: "solr_a", type: "gauge", endpoint: "/x", labels: ["k"],
                rules: [{ path: ["a", "*"], label_values: ["$2"] }] }] }"#,
        );
        assert!(msg.contains("capture $2"));
    }

    #[test]
    fn test_core_label_requires_core_endpoint() {
        let msg = err(
            r#"{ jobs: [{ name: "solr_a", type: "gauge", endpoint: "/admin/ping",
                labels: ["core"],
                rules: [{ path: ["status"], equals: "OK", label_values: ["{core}"] }] }] }"#,
        );
        assert!(msg.contains("{core}"));

        assert!(
            parse(
                r#"{ jobs: [{ name: "solr_a", type: "gauge", endpoint: "/{core}/admin/ping",
                    labels: ["core"],
                    rules: [{ path: ["status"], equals: "OK", label_values: ["{core}"] }] }] }"#,
            )
            .is_ok()
        );
    }

    #[test]
    fn test_invalid_names() {
        let msg = err(r#"{ jobs: [{
            name: "solr-a", type: "gauge", endpoint: "/x", rules: [{ path: ["a"] }]
        }] }"#);
        assert!(msg.contains("not a valid metric name"));

        let msg = err(r#"{ jobs: [{
            name: "solr_a", type: "gauge", endpoint: "/x", labels: ["a-b"],
            rules: [{ path: ["a"], label_values: ["v"] }]
        }] }"#);
        assert!(msg.contains("invalid label name"));

        let msg = err(r#"{ jobs: [{
            name: "solr_a", type: "gauge", endpoint: "/x", labels: ["a", "a"],
            rules: [{ path: ["a"], label_values: ["v", "w"] }]
        }] }"#);
        assert!(msg.contains("duplicate label name"));
    }

    #[test]
    fn test_histogram_suffix_rules() {
        let msg = err(r#"{ jobs: [{
            name: "solr_a", type: "gauge", endpoint: "/x",
            rules: [{ path: ["a"], suffix: "_sum" }]
        }] }"#);
        assert!(msg.contains("only allowed on histogram"));

        let msg = err(r#"{ jobs: [{
            name: "solr_h", type: "histogram", endpoint: "/x", rules: [{ path: ["a"] }]
        }] }"#);
        assert!(msg.contains("need a suffix"));

        let msg = err(r#"{ jobs: [{
            name: "solr_h", type: "histogram", endpoint: "/x",
            rules: [{ path: ["a"], suffix: "_bucket" }]
        }] }"#);
        assert!(msg.contains("'le' label"));

        let registry = parse(
            r#"{ jobs: [{ name: "solr_h", type: "histogram", endpoint: "/x", labels: ["le"],
              rules: [
                { path: ["b", "p50"], suffix: "_bucket", label_values: ["0.5"] },
                { path: ["b", "sum"], suffix: "_sum", label_values: [""] },
                { path: ["b", "count"], suffix: "_count", label_values: [""] },
            ] }] }"#,
        )
        .unwrap();
        assert_eq!(registry.jobs()[0].rules[2].series_name(), "solr_h_count");
    }

    #[test]
    fn test_conflicting_family_declarations() {
        let msg = err(
            r#"{ jobs: [
                { name: "solr_a", type: "gauge", endpoint: "/x",
                  rules: [{ path: ["a"], metric: "solr_shared" }] },
                { name: "solr_b", type: "counter", endpoint: "/y",
                  rules: [{ path: ["b"], metric: "solr_shared" }] },
            ] }"#,
        );
        assert!(msg.contains("solr_shared"));
    }

    #[test]
    fn test_endpoint_template_parse() {
        assert!(EndpointTemplate::parse("admin/ping").is_err());
        assert!(EndpointTemplate::parse("/{shard}/x").is_err());
        assert!(EndpointTemplate::parse("/{core").is_err());
        assert!(EndpointTemplate::parse("/{core}/{collection}").is_err());

        let t = EndpointTemplate::parse("/{collection}/select?q=*:*").unwrap();
        assert_eq!(t.expansion(), Some(Variable::Collection));
        assert_eq!(EndpointTemplate::parse("/admin/metrics").unwrap().expansion(), None);
    }

    #[test]
    fn test_endpoint_render_forces_json() {
        let t = EndpointTemplate::parse("/{core}/admin/ping").unwrap();
        assert_eq!(t.render(Some("c1")), "/c1/admin/ping?wt=json");

        let t = EndpointTemplate::parse("/admin/metrics?group=jvm").unwrap();
        assert_eq!(t.render(None), "/admin/metrics?group=jvm&wt=json");

        let t = EndpointTemplate::parse("/admin/metrics?wt=json&group=jvm").unwrap();
        assert_eq!(t.render(None), "/admin/metrics?wt=json&group=jvm");
    }
}
