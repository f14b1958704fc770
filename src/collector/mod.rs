//! Collector interface and metric samples.
//!
//! A collector owns a fixed set of metric descriptors, built once at
//! construction, and on every scrape emits gauge samples that reference
//! those descriptors into a [`MetricSink`]. Collectors hold no mutable
//! state between scrapes.

mod puppet;

pub use puppet::{PuppetCollector, PuppetConfig, SummarySchema, DEFAULT_SUMMARY_FILE};

use prometheus::core::Desc;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Metric namespace shared by every collector in this exporter.
pub const NAMESPACE: &str = "node";

/// Errors that can occur while constructing or updating a collector.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{metric}: expected {expected} label values, got {got}")]
    LabelMismatch {
        metric: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid metric descriptor: {0}")]
    Descriptor(#[from] prometheus::Error),
}

/// Label values for a metric without variable labels.
pub const NO_LABELS: [&str; 0] = [];

/// Kind of value carried by a [`Sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Gauge,
}

/// A single data point emitted by a collector.
#[derive(Debug, Clone)]
pub struct Sample<'a> {
    desc: &'a Desc,
    value_type: ValueType,
    value: f64,
    label_values: Vec<String>,
}

impl<'a> Sample<'a> {
    /// Creates a gauge sample.
    ///
    /// `label_values` must line up with the descriptor's variable labels,
    /// in the same order.
    pub fn gauge<S: Into<String>>(
        desc: &'a Desc,
        value: f64,
        label_values: impl IntoIterator<Item = S>,
    ) -> Result<Self, CollectorError> {
        let label_values: Vec<String> = label_values.into_iter().map(Into::into).collect();
        if label_values.len() != desc.variable_labels.len() {
            return Err(CollectorError::LabelMismatch {
                metric: desc.fq_name.clone(),
                expected: desc.variable_labels.len(),
                got: label_values.len(),
            });
        }
        Ok(Self {
            desc,
            value_type: ValueType::Gauge,
            value,
            label_values,
        })
    }

    pub fn desc(&self) -> &'a Desc {
        self.desc
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Returns the value of the named label, if the descriptor declares it.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .variable_labels
            .iter()
            .position(|l| l == name)
            .map(|i| self.label_values[i].as_str())
    }
}

/// Destination for emitted samples. Emission is fire-and-forget.
pub trait MetricSink<'a> {
    fn emit(&mut self, sample: Sample<'a>);
}

impl<'a> MetricSink<'a> for Vec<Sample<'a>> {
    fn emit(&mut self, sample: Sample<'a>) {
        self.push(sample);
    }
}

/// A unit that produces metric samples on demand.
pub trait Collector: Send + Sync {
    /// Descriptors for every metric this collector may emit.
    fn describe(&self) -> Vec<&Desc>;

    /// Runs one collection cycle.
    ///
    /// On error nothing has been emitted into `sink`.
    fn update<'a>(&'a self, sink: &mut dyn MetricSink<'a>) -> Result<(), CollectorError>;
}

/// Joins the non-empty name components with underscores.
pub fn fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Builds a descriptor in the exporter namespace.
pub(crate) fn new_desc(name: &str, help: &str, labels: &[&str]) -> Result<Desc, CollectorError> {
    Ok(Desc::new(
        fq_name(NAMESPACE, "", name),
        help.to_string(),
        labels.iter().map(|l| l.to_string()).collect(),
        HashMap::new(),
    )?)
}
