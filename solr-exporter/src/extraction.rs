//! Extraction of metric samples from Solr JSON responses.
//!
//! A rule walks a path of keys from the document root. `*` segments visit
//! every entry of an object (or every index of an array) and capture the key,
//! which rules can use as a label value with `$1`, `$2`, ...
//!
//! Absent keys and `null` values produce no sample. A value of the wrong
//! shape (a scalar where the path continues, or a non-numeric leaf) fails the
//! rule.

use serde_json::Value;
use thiserror::Error;

use crate::aggregator::Sample;

/// Errors raised when a response does not have the shape a rule expects.
#[derive(Debug, Error, PartialEq)]
pub enum ExtractionError {
    #[error("expected an object or array at '{path}', found {found}")]
    NotContainer { path: String, found: &'static str },

    #[error("expected a number or boolean at '{path}', found {found}")]
    NotNumeric { path: String, found: &'static str },

    #[error("label variable {{{0}}} is not bound for this request")]
    Unbound(&'static str),
}

/// One step of an extraction path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// An object key, or an array index when the node is an array.
    Key(String),
    /// Every entry of the node; the key or index is captured.
    Wildcard,
}

impl PathSegment {
    pub fn parse(segment: &str) -> Self {
        if segment == "*" {
            PathSegment::Wildcard
        } else {
            PathSegment::Key(segment.to_string())
        }
    }
}

/// Request-scoped values a label can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Core,
    Collection,
    BaseUrl,
}

impl Variable {
    pub fn name(&self) -> &'static str {
        match self {
            Variable::Core => "core",
            Variable::Collection => "collection",
            Variable::BaseUrl => "base_url",
        }
    }

    /// The `{name}` form used in templates.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Variable::Core => "{core}",
            Variable::Collection => "{collection}",
            Variable::BaseUrl => "{base_url}",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "core" => Some(Variable::Core),
            "collection" => Some(Variable::Collection),
            "base_url" => Some(Variable::BaseUrl),
            _ => None,
        }
    }
}

/// Where a label value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSource {
    /// The key captured by the N-th wildcard (1-based).
    Capture(usize),
    /// A request variable.
    Variable(Variable),
    /// A fixed value.
    Literal(String),
}

impl LabelSource {
    /// Parse `$N`, `{variable}` or a literal.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if let Some(index) = raw.strip_prefix('$')
            && !index.is_empty()
            && index.chars().all(|c| c.is_ascii_digit())
        {
            let index: usize = index
                .parse()
                .map_err(|_| format!("capture index out of range: {}", raw))?;
            if index == 0 {
                return Err("captures are numbered from $1".to_string());
            }
            return Ok(LabelSource::Capture(index));
        }

        if let Some(name) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            return Variable::from_name(name)
                .map(LabelSource::Variable)
                .ok_or_else(|| format!("unknown label variable: {}", raw));
        }

        Ok(LabelSource::Literal(raw.to_string()))
    }
}

/// Values bound for one request of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub base_url: String,
    pub core: Option<String>,
    pub collection: Option<String>,
}

impl RequestContext {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, variable: Variable) -> Option<&str> {
        match variable {
            Variable::Core => self.core.as_deref(),
            Variable::Collection => self.collection.as_deref(),
            Variable::BaseUrl => Some(&self.base_url),
        }
    }
}

/// A compiled extraction rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRule {
    pub path: Vec<PathSegment>,
    /// Metric family the samples belong to.
    pub family: String,
    /// Appended to the family name to form the series name.
    pub suffix: String,
    /// One source per job label, in label order.
    pub label_values: Vec<LabelSource>,
    pub equals: Option<String>,
}

impl ExtractionRule {
    /// Number of wildcard segments, i.e. captures available to labels.
    pub fn wildcard_count(&self) -> usize {
        self.path
            .iter()
            .filter(|s| matches!(s, PathSegment::Wildcard))
            .count()
    }

    /// The series name the samples are emitted under.
    pub fn series_name(&self) -> String {
        format!("{}{}", self.family, self.suffix)
    }

    /// Apply the rule to a response document.
    pub fn apply(
        &self,
        doc: &Value,
        label_names: &[String],
        ctx: &RequestContext,
    ) -> Result<Vec<Sample>, ExtractionError> {
        let mut matches = Vec::new();
        let mut trail = Vec::new();
        let mut captures = Vec::new();
        walk(doc, &self.path, &mut trail, &mut captures, &mut matches)?;

        let name = self.series_name();
        let mut samples = Vec::with_capacity(matches.len());

        for m in matches {
            let value = leaf_value(m.leaf, self.equals.as_deref(), &m.path)?;

            let mut labels = Vec::with_capacity(label_names.len());
            for (label, source) in label_names.iter().zip(&self.label_values) {
                let label_value = match source {
                    LabelSource::Capture(n) => m.captures.get(n - 1).cloned().unwrap_or_default(),
                    LabelSource::Variable(v) => ctx
                        .get(*v)
                        .ok_or(ExtractionError::Unbound(v.name()))?
                        .to_string(),
                    LabelSource::Literal(s) => s.clone(),
                };
                labels.push((label.clone(), label_value));
            }

            samples.push(Sample {
                family: self.family.clone(),
                name: name.clone(),
                labels,
                value,
            });
        }

        Ok(samples)
    }
}

struct Match<'a> {
    leaf: &'a Value,
    captures: Vec<String>,
    path: String,
}

fn walk<'a>(
    node: &'a Value,
    segments: &[PathSegment],
    trail: &mut Vec<String>,
    captures: &mut Vec<String>,
    out: &mut Vec<Match<'a>>,
) -> Result<(), ExtractionError> {
    if node.is_null() {
        return Ok(());
    }

    let Some((segment, rest)) = segments.split_first() else {
        out.push(Match {
            leaf: node,
            captures: captures.clone(),
            path: trail.join("/"),
        });
        return Ok(());
    };

    match (segment, node) {
        (PathSegment::Key(key), Value::Object(map)) => {
            if let Some(child) = map.get(key) {
                trail.push(key.clone());
                walk(child, rest, trail, captures, out)?;
                trail.pop();
            }
        }
        (PathSegment::Key(key), Value::Array(items)) => {
            let index: usize = key.parse().map_err(|_| ExtractionError::NotContainer {
                path: trail.join("/"),
                found: "array",
            })?;
            if let Some(child) = items.get(index) {
                trail.push(key.clone());
                walk(child, rest, trail, captures, out)?;
                trail.pop();
            }
        }
        (PathSegment::Wildcard, Value::Object(map)) => {
            for (key, child) in map {
                trail.push(key.clone());
                captures.push(key.clone());
                walk(child, rest, trail, captures, out)?;
                captures.pop();
                trail.pop();
            }
        }
        (PathSegment::Wildcard, Value::Array(items)) => {
            for (index, child) in items.iter().enumerate() {
                trail.push(index.to_string());
                captures.push(index.to_string());
                walk(child, rest, trail, captures, out)?;
                captures.pop();
                trail.pop();
            }
        }
        (_, scalar) => {
            return Err(ExtractionError::NotContainer {
                path: trail.join("/"),
                found: kind(scalar),
            });
        }
    }

    Ok(())
}

fn leaf_value(leaf: &Value, equals: Option<&str>, path: &str) -> Result<f64, ExtractionError> {
    if let Some(expected) = equals {
        let matched = match leaf {
            Value::String(s) => s == expected,
            Value::Number(n) => n.to_string() == expected,
            Value::Bool(b) => b.to_string() == expected,
            other => {
                return Err(ExtractionError::NotNumeric {
                    path: path.to_string(),
                    found: kind(other),
                });
            }
        };
        return Ok(if matched { 1.0 } else { 0.0 });
    }

    match leaf {
        Value::Number(n) => n.as_f64().ok_or_else(|| ExtractionError::NotNumeric {
            path: path.to_string(),
            found: "number",
        }),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(ExtractionError::NotNumeric {
            path: path.to_string(),
            found: kind(other),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
