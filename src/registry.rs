//! Collector registry and Prometheus bridge.
//!
//! Collectors are registered explicitly by the host process under a fixed
//! key. On every scrape each collector is updated into its own buffer; a
//! failing collector contributes nothing but its scrape meta metrics.

use crate::collector::{fq_name, Collector, CollectorError, Sample, NAMESPACE};
use prometheus::core::Desc;
use prometheus::proto::{Gauge, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::{Encoder, TextEncoder};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use thiserror::Error;

/// Errors that can occur while registering collectors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("collector already registered: {0}")]
    DuplicateKey(String),

    #[error("invalid metric descriptor: {0}")]
    Descriptor(#[from] prometheus::Error),
}

/// Outcome of updating a single collector.
#[derive(Debug)]
pub struct ScrapeResult {
    /// Registry key of the collector.
    pub collector: String,
    /// Wall-clock time spent in the update.
    pub duration_seconds: f64,
    /// The update error, if the cycle failed.
    pub error: Option<CollectorError>,
}

impl ScrapeResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Set of named collectors scraped together.
///
/// Implements [`prometheus::core::Collector`] so it can be registered in a
/// [`prometheus::Registry`] and encoded with the standard encoders.
pub struct CollectorRegistry {
    collectors: BTreeMap<String, Box<dyn Collector>>,
    scrape_duration: Desc,
    scrape_success: Desc,
}

impl CollectorRegistry {
    /// Creates an empty registry with its scrape meta descriptors.
    pub fn new() -> Result<Self, RegistryError> {
        let scrape_duration = Desc::new(
            fq_name(NAMESPACE, "scrape", "collector_duration_seconds"),
            "Duration of a collector scrape.".to_string(),
            vec!["collector".to_string()],
            HashMap::new(),
        )?;
        let scrape_success = Desc::new(
            fq_name(NAMESPACE, "scrape", "collector_success"),
            "Whether a collector succeeded.".to_string(),
            vec!["collector".to_string()],
            HashMap::new(),
        )?;

        Ok(Self {
            collectors: BTreeMap::new(),
            scrape_duration,
            scrape_success,
        })
    }

    /// Registers a collector under `key`.
    ///
    /// Keys are unique for the lifetime of the registry.
    pub fn register(
        &mut self,
        key: impl Into<String>,
        collector: Box<dyn Collector>,
    ) -> Result<(), RegistryError> {
        let key = key.into();
        if self.collectors.contains_key(&key) {
            return Err(RegistryError::DuplicateKey(key));
        }
        tracing::info!(collector = %key, "registered collector");
        self.collectors.insert(key, collector);
        Ok(())
    }

    /// Names of the registered collectors, in scrape order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.collectors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Updates every collector, returning the per-collector outcomes along
    /// with the metric families of the successful ones.
    pub fn scrape(&self) -> (Vec<ScrapeResult>, Vec<MetricFamily>) {
        let mut results = Vec::with_capacity(self.collectors.len());
        let mut families = Vec::new();

        for (key, collector) in &self.collectors {
            let start = Instant::now();
            let mut samples: Vec<Sample<'_>> = Vec::new();
            let outcome = collector.update(&mut samples);
            let duration_seconds = start.elapsed().as_secs_f64();

            let error = match outcome {
                Ok(()) => {
                    tracing::debug!(
                        collector = %key,
                        samples = samples.len(),
                        duration_seconds,
                        "collector succeeded"
                    );
                    families.extend(to_families(&samples));
                    None
                }
                Err(e) => {
                    tracing::error!(
                        collector = %key,
                        duration_seconds,
                        error = %e,
                        "collector failed"
                    );
                    Some(e)
                }
            };

            results.push(ScrapeResult {
                collector: key.clone(),
                duration_seconds,
                error,
            });
        }

        (results, families)
    }

    fn meta_families(&self, results: &[ScrapeResult]) -> Vec<MetricFamily> {
        let mut duration = new_family(&self.scrape_duration);
        let mut success = new_family(&self.scrape_success);

        for result in results {
            let labels = [result.collector.as_str()];
            duration
                .mut_metric()
                .push(gauge_metric(&self.scrape_duration, &labels, result.duration_seconds));
            success.mut_metric().push(gauge_metric(
                &self.scrape_success,
                &labels,
                if result.is_success() { 1.0 } else { 0.0 },
            ));
        }

        vec![duration, success]
    }
}

impl prometheus::core::Collector for CollectorRegistry {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = vec![&self.scrape_duration, &self.scrape_success];
        for collector in self.collectors.values() {
            descs.extend(collector.describe());
        }
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let (results, mut families) = self.scrape();
        families.extend(self.meta_families(&results));
        families
    }
}

/// Encodes everything in `registry` in the Prometheus text format.
pub fn encode_text(registry: &prometheus::Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Groups samples by descriptor into gauge metric families.
fn to_families(samples: &[Sample<'_>]) -> Vec<MetricFamily> {
    let mut by_name: BTreeMap<&str, MetricFamily> = BTreeMap::new();

    for sample in samples {
        let desc = sample.desc();
        by_name
            .entry(desc.fq_name.as_str())
            .or_insert_with(|| new_family(desc))
            .mut_metric()
            .push(gauge_metric(desc, sample.label_values(), sample.value()));
    }

    by_name.into_values().collect()
}

fn new_family(desc: &Desc) -> MetricFamily {
    let mut family = MetricFamily::default();
    family.set_name(desc.fq_name.clone());
    family.set_help(desc.help.clone());
    family.set_field_type(MetricType::GAUGE);
    family
}

fn gauge_metric<S: AsRef<str>>(desc: &Desc, label_values: &[S], value: f64) -> Metric {
    let mut metric = Metric::default();
    for (name, label_value) in desc.variable_labels.iter().zip(label_values) {
        let mut pair = LabelPair::default();
        pair.set_name(name.clone());
        pair.set_value(label_value.as_ref().to_string());
        metric.mut_label().push(pair);
    }
    let mut gauge = Gauge::default();
    gauge.set_value(value);
    metric.set_gauge(gauge);
    metric
}
