//! Merging of per-job results into one snapshot of metric families.

use std::collections::HashMap;

use tracing::debug;

use crate::executor::ScrapeResult;
use crate::mapping::MetricType;

/// One metric sample produced by an extraction rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Family the sample belongs to.
    pub family: String,
    /// Full series name (family name plus histogram suffix).
    pub name: String,
    /// Label pairs in the job's label order.
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Sample {
    fn label_values(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|(_, v)| v.as_str())
    }

    fn same_series(&self, other: &Sample) -> bool {
        self.name == other.name && self.labels == other.labels
    }
}

/// All samples of one metric name, with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub metric_type: MetricType,
    pub help: String,
    pub label_names: Vec<String>,
    pub samples: Vec<Sample>,
}

/// The metric families of one scrape cycle, in output order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub families: Vec<MetricFamily>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    /// Total number of samples across all families.
    pub fn sample_count(&self) -> usize {
        self.families.iter().map(|f| f.samples.len()).sum()
    }
}

/// Build a snapshot from the results of one cycle.
///
/// `results` must be in job declaration order. Families appear in the order
/// they are first produced; samples inside a family are sorted by label
/// values, then series name. Failed jobs contribute nothing.
pub fn aggregate(results: &[ScrapeResult]) -> Snapshot {
    let mut families: Vec<MetricFamily> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for result in results {
        let ScrapeResult::Success { job, samples } = result else {
            continue;
        };

        for sample in samples {
            let slot = *index.entry(sample.family.clone()).or_insert_with(|| {
                families.push(MetricFamily {
                    name: sample.family.clone(),
                    metric_type: job.metric_type,
                    help: job.help.clone(),
                    label_names: job.label_names.clone(),
                    samples: Vec::new(),
                });
                families.len() - 1
            });
            families[slot].samples.push(sample.clone());
        }
    }

    for family in &mut families {
        family.samples.sort_by(|a, b| {
            a.label_values()
                .cmp(b.label_values())
                .then_with(|| a.name.cmp(&b.name))
        });

        let before = family.samples.len();
        family.samples.dedup_by(|later, earlier| later.same_series(earlier));
        let dropped = before - family.samples.len();
        if dropped > 0 {
            debug!(family = %family.name, dropped, "Dropped duplicate series");
        }
    }

    Snapshot { families }
}
