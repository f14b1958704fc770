//! Puppet last-run summary collector.
//!
//! Reads the YAML summary Puppet writes after every agent run and exposes
//! a handful of its fields as gauges. The file is read fresh on every
//! scrape; nothing is cached between cycles.

use super::{new_desc, Collector, CollectorError, MetricSink, Sample, NO_LABELS};
use prometheus::core::Desc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where Puppet stores its summary file by default.
pub const DEFAULT_SUMMARY_FILE: &str = "/var/lib/puppet/state/last_run_summary.yaml";

/// Stage key holding the timestamp of the run rather than a duration.
const LAST_RUN: &str = "last_run";
/// Aggregate key, never exported as a stage or event status.
const TOTAL: &str = "total";

/// Layout of the summary file the collector expects.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SummarySchema {
    /// Per-status resources and events, per-stage timings and catalog version.
    #[default]
    Detailed,
    /// Failure count and last run time only.
    Reduced,
}

/// Configuration for the Puppet collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PuppetConfig {
    /// Path where Puppet stores its summary file.
    pub summary_file: PathBuf,
    /// Which summary layout to export.
    pub schema: SummarySchema,
}

impl Default for PuppetConfig {
    fn default() -> Self {
        Self {
            summary_file: PathBuf::from(DEFAULT_SUMMARY_FILE),
            schema: SummarySchema::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DetailedSummary {
    #[serde(default)]
    resources: BTreeMap<String, f64>,
    #[serde(default)]
    time: BTreeMap<String, f64>,
    #[serde(default)]
    events: BTreeMap<String, f64>,
    #[serde(default)]
    version: VersionSummary,
}

#[derive(Debug, Default, Deserialize)]
struct VersionSummary {
    config: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReducedSummary {
    resources: FailedResources,
    events: FailedEvents,
    time: LastRunTime,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FailedResources {
    failed: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FailedEvents {
    failure: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LastRunTime {
    last_run: Option<u64>,
}

#[derive(Debug)]
struct DetailedMetrics {
    config_version: Desc,
    resources: Desc,
    time_of_last_run: Desc,
    stage_time: Desc,
    events: Desc,
}

impl DetailedMetrics {
    fn new() -> Result<Self, CollectorError> {
        Ok(Self {
            config_version: new_desc("puppet_catalog_version", "Catalog version of Puppet.", &[])?,
            resources: new_desc("puppet_resources", "Summary of Puppet resources", &["status"])?,
            time_of_last_run: new_desc(
                "puppet_time_of_last_run_seconds",
                "Timestamp of the last puppet run in Unixtime",
                &[],
            )?,
            stage_time: new_desc(
                "puppet_time_per_stage_seconds",
                "The time per stage of a Puppet run.",
                &["stage"],
            )?,
            events: new_desc("puppet_events", "Summary of Puppet events.", &["status"])?,
        })
    }

    fn samples(&self, summary: &DetailedSummary) -> Result<Vec<Sample<'_>>, CollectorError> {
        let mut samples = Vec::new();

        if let Some(version) = summary.version.config {
            samples.push(Sample::gauge(&self.config_version, version, NO_LABELS)?);
        }

        for (status, count) in &summary.resources {
            samples.push(Sample::gauge(&self.resources, *count, [status.as_str()])?);
        }

        for (stage, seconds) in &summary.time {
            match stage.as_str() {
                LAST_RUN => {
                    samples.push(Sample::gauge(&self.time_of_last_run, *seconds, NO_LABELS)?)
                }
                TOTAL => {}
                _ => {
                    samples.push(Sample::gauge(&self.stage_time, *seconds, [stage.as_str()])?)
                }
            }
        }

        for (status, count) in summary.events.iter().filter(|(status, _)| *status != TOTAL) {
            samples.push(Sample::gauge(&self.events, *count, [status.as_str()])?);
        }

        Ok(samples)
    }

    fn descs(&self) -> Vec<&Desc> {
        vec![
            &self.config_version,
            &self.resources,
            &self.time_of_last_run,
            &self.stage_time,
            &self.events,
        ]
    }
}

#[derive(Debug)]
struct ReducedMetrics {
    failures: Desc,
    time_since_last_run: Desc,
}

impl ReducedMetrics {
    fn new() -> Result<Self, CollectorError> {
        Ok(Self {
            failures: new_desc(
                "puppet_last_run_failures",
                "Failed resources plus failed events of the last Puppet run.",
                &[],
            )?,
            time_since_last_run: new_desc(
                "puppet_time_since_last_run_seconds",
                "Time of the last Puppet run as reported in its summary.",
                &[],
            )?,
        })
    }

    fn samples(&self, summary: &ReducedSummary) -> Result<Vec<Sample<'_>>, CollectorError> {
        let failures = summary.resources.failed.saturating_add(summary.events.failure);
        let mut samples = vec![Sample::gauge(&self.failures, failures as f64, NO_LABELS)?];

        if let Some(last_run) = summary.time.last_run {
            samples.push(Sample::gauge(&self.time_since_last_run, last_run as f64, NO_LABELS)?);
        }

        Ok(samples)
    }

    fn descs(&self) -> Vec<&Desc> {
        vec![&self.failures, &self.time_since_last_run]
    }
}

#[derive(Debug)]
enum Metrics {
    Detailed(DetailedMetrics),
    Reduced(ReducedMetrics),
}

/// Exposes fields of Puppet's last-run summary as gauges.
///
/// Registered under the key `"puppet"`. Each update reads and parses the
/// summary file; a read or parse failure fails the whole cycle and emits
/// nothing.
#[derive(Debug)]
pub struct PuppetCollector {
    summary_file: PathBuf,
    metrics: Metrics,
}

impl PuppetCollector {
    /// Registry key the collector is exposed under.
    pub const NAME: &'static str = "puppet";

    /// Creates the collector and its descriptors.
    pub fn new(config: &PuppetConfig) -> Result<Self, CollectorError> {
        let metrics = match config.schema {
            SummarySchema::Detailed => Metrics::Detailed(DetailedMetrics::new()?),
            SummarySchema::Reduced => Metrics::Reduced(ReducedMetrics::new()?),
        };
        Ok(Self {
            summary_file: config.summary_file.clone(),
            metrics,
        })
    }

    /// Path of the summary file read on each update.
    pub fn summary_file(&self) -> &Path {
        &self.summary_file
    }

    fn parse<T: DeserializeOwned>(&self, contents: &[u8]) -> Result<T, CollectorError> {
        serde_yaml::from_slice(contents).map_err(|source| CollectorError::Parse {
            path: self.summary_file.clone(),
            source,
        })
    }
}

impl Collector for PuppetCollector {
    fn describe(&self) -> Vec<&Desc> {
        match &self.metrics {
            Metrics::Detailed(m) => m.descs(),
            Metrics::Reduced(m) => m.descs(),
        }
    }

    fn update<'a>(&'a self, sink: &mut dyn MetricSink<'a>) -> Result<(), CollectorError> {
        tracing::debug!(path = %self.summary_file.display(), "reading puppet summary");

        let contents = std::fs::read(&self.summary_file).map_err(|source| CollectorError::Read {
            path: self.summary_file.clone(),
            source,
        })?;

        let samples = match &self.metrics {
            Metrics::Detailed(m) => m.samples(&self.parse(&contents)?)?,
            Metrics::Reduced(m) => m.samples(&self.parse(&contents)?)?,
        };

        for sample in samples {
            sink.emit(sample);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DETAILED: &str = "\
version:
  config: 42
  puppet: \"7.24.0\"
resources:
  changed: 2
  failed: 1
time:
  last_run: 1700000000
  total: 5
  apply: 3
events:
  success: 4
  failure: 1
  total: 5
";

    const REDUCED: &str = "\
resources:
  failed: 3
  total: 40
events:
  failure: 2
time:
  last_run: 120
";

    fn summary_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn collector(file: &NamedTempFile, schema: SummarySchema) -> PuppetCollector {
        PuppetCollector::new(&PuppetConfig {
            summary_file: file.path().to_path_buf(),
            schema,
        })
        .unwrap()
    }

    /// Flattens samples into comparable (name, labels, value) triples.
    fn flatten(samples: &[Sample<'_>]) -> Vec<(String, Vec<String>, f64)> {
        samples
            .iter()
            .map(|s| (s.desc().fq_name.clone(), s.label_values().to_vec(), s.value()))
            .collect()
    }

    fn sample(name: &str, labels: &[&str], value: f64) -> (String, Vec<String>, f64) {
        (
            name.to_string(),
            labels.iter().map(|l| l.to_string()).collect(),
            value,
        )
    }

    #[test]
    fn test_detailed_summary() {
        let file = summary_file(DETAILED);
        let collector = collector(&file, SummarySchema::Detailed);

        let mut samples: Vec<Sample<'_>> = Vec::new();
        collector.update(&mut samples).unwrap();

        let mut got = flatten(&samples);
        got.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mut want = vec![
            sample("node_puppet_catalog_version", &[], 42.0),
            sample("node_puppet_resources", &["changed"], 2.0),
            sample("node_puppet_resources", &["failed"], 1.0),
            sample("node_puppet_time_of_last_run_seconds", &[], 1_700_000_000.0),
            sample("node_puppet_time_per_stage_seconds", &["apply"], 3.0),
            sample("node_puppet_events", &["failure"], 1.0),
            sample("node_puppet_events", &["success"], 4.0),
        ];
        want.sort_by(|a, b| a.partial_cmp(b).unwrap());

        assert_eq!(got, want);
    }

    #[test]
    fn test_reduced_summary() {
        let file = summary_file(REDUCED);
        let collector = collector(&file, SummarySchema::Reduced);

        let mut samples: Vec<Sample<'_>> = Vec::new();
        collector.update(&mut samples).unwrap();

        assert_eq!(
            flatten(&samples),
            vec![
                sample("node_puppet_last_run_failures", &[], 5.0),
                sample("node_puppet_time_since_last_run_seconds", &[], 120.0),
            ]
        );
    }

    #[test]
    fn test_missing_keys_emit_nothing() {
        let file = summary_file("resources:\n  changed: 0\n");
        let collector = collector(&file, SummarySchema::Detailed);

        let mut samples: Vec<Sample<'_>> = Vec::new();
        collector.update(&mut samples).unwrap();

        assert_eq!(flatten(&samples), vec![sample("node_puppet_resources", &["changed"], 0.0)]);
    }

    #[test]
    fn test_reduced_defaults_missing_counts() {
        let file = summary_file("events:\n  failure: 1\n");
        let collector = collector(&file, SummarySchema::Reduced);

        let mut samples: Vec<Sample<'_>> = Vec::new();
        collector.update(&mut samples).unwrap();

        assert_eq!(flatten(&samples), vec![sample("node_puppet_last_run_failures", &[], 1.0)]);
    }

    #[test]
    fn test_missing_file_fails_without_samples() {
        let dir = tempfile::tempdir().unwrap();
        let collector = PuppetCollector::new(&PuppetConfig {
            summary_file: dir.path().join("last_run_summary.yaml"),
            schema: SummarySchema::Detailed,
        })
        .unwrap();

        let mut samples: Vec<Sample<'_>> = Vec::new();
        let result = collector.update(&mut samples);

        assert!(matches!(result, Err(CollectorError::Read { .. })));
        assert!(samples.is_empty());
    }

    #[test]
    fn test_malformed_yaml_fails_without_samples() {
        let file = summary_file("resources: [changed: 2\n  failed: {\n");
        let collector = collector(&file, SummarySchema::Detailed);

        let mut samples: Vec<Sample<'_>> = Vec::new();
        let result = collector.update(&mut samples);

        assert!(matches!(result, Err(CollectorError::Parse { .. })));
        assert!(samples.is_empty());
    }

    #[test]
    fn test_type_mismatch_fails_without_samples() {
        let file = summary_file("version:\n  config: 1\nresources:\n  changed: lots\n");
        let collector = collector(&file, SummarySchema::Detailed);

        let mut samples: Vec<Sample<'_>> = Vec::new();
        let result = collector.update(&mut samples);

        assert!(matches!(result, Err(CollectorError::Parse { .. })));
        assert!(samples.is_empty());
    }

    #[test]
    fn test_update_is_idempotent() {
        let file = summary_file(DETAILED);
        let collector = collector(&file, SummarySchema::Detailed);

        let mut first: Vec<Sample<'_>> = Vec::new();
        collector.update(&mut first).unwrap();
        let mut second: Vec<Sample<'_>> = Vec::new();
        collector.update(&mut second).unwrap();

        assert_eq!(flatten(&first), flatten(&second));
    }

    #[test]
    fn test_recovers_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_run_summary.yaml");
        let collector = PuppetCollector::new(&PuppetConfig {
            summary_file: path.clone(),
            schema: SummarySchema::Reduced,
        })
        .unwrap();

        let mut samples: Vec<Sample<'_>> = Vec::new();
        assert!(collector.update(&mut samples).is_err());

        std::fs::write(&path, REDUCED).unwrap();
        collector.update(&mut samples).unwrap();
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn test_describe_matches_schema() {
        let file = summary_file(DETAILED);

        assert_eq!(collector(&file, SummarySchema::Detailed).describe().len(), 5);
        assert_eq!(collector(&file, SummarySchema::Reduced).describe().len(), 2);
    }

    #[test]
    fn test_default_config() {
        let config = PuppetConfig::default();
        assert_eq!(config.summary_file, Path::new(DEFAULT_SUMMARY_FILE));
        assert_eq!(config.schema, SummarySchema::Detailed);
    }

    proptest! {
        #[test]
        fn prop_total_never_exported(
            stages in prop::collection::btree_map("[a-z][a-z_]{0,11}", 0u32..100_000, 0..8),
            events in prop::collection::btree_map("[a-z][a-z_]{0,11}", 0u32..1_000, 0..8),
        ) {
            let mut time: BTreeMap<String, f64> =
                stages.into_iter().map(|(k, v)| (k, f64::from(v))).collect();
            time.insert(TOTAL.to_string(), 12.5);
            let mut event_counts: BTreeMap<String, f64> =
                events.into_iter().map(|(k, v)| (k, f64::from(v))).collect();
            event_counts.insert(TOTAL.to_string(), 7.0);

            let mut document = BTreeMap::new();
            document.insert("time", time);
            document.insert("events", event_counts);
            let file = summary_file(&serde_yaml::to_string(&document).unwrap());
            let collector = collector(&file, SummarySchema::Detailed);

            let mut samples: Vec<Sample<'_>> = Vec::new();
            collector.update(&mut samples).unwrap();

            for s in &samples {
                prop_assert_ne!(s.label("stage"), Some(TOTAL));
                if s.desc().fq_name == "node_puppet_events" {
                    prop_assert_ne!(s.label("status"), Some(TOTAL));
                }
            }
        }
    }
}
