//! Puppet Exporter Library
//!
//! Exposes the fields of Puppet's last-run summary file as Prometheus
//! gauges.
//!
//! # Architecture
//!
//! ```text
//! last_run_summary.yaml → PuppetCollector → CollectorRegistry → prometheus::Registry → /metrics
//! ```
//!
//! Collectors are registered explicitly by the host under a fixed key
//! (`"puppet"`). Every scrape re-reads the summary file; a read or parse
//! failure drops that collector's samples for the cycle and is reported
//! through `node_scrape_collector_success`.
//!
//! # Example
//!
//! ```no_run
//! use puppet_exporter::{
//!     collector::{PuppetCollector, PuppetConfig},
//!     registry::{encode_text, CollectorRegistry},
//! };
//!
//! let collector = PuppetCollector::new(&PuppetConfig::default()).unwrap();
//!
//! let mut collectors = CollectorRegistry::new().unwrap();
//! collectors.register(PuppetCollector::NAME, Box::new(collector)).unwrap();
//!
//! let registry = prometheus::Registry::new();
//! registry.register(Box::new(collectors)).unwrap();
//!
//! println!("{}", encode_text(&registry).unwrap());
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod collector;
pub mod config;
pub mod registry;
#[cfg(feature = "http")]
pub mod server;

// Re-export commonly used types at crate root
pub use collector::{Collector, CollectorError, PuppetCollector, PuppetConfig, Sample, SummarySchema};
pub use config::{Cli, ConfigError, FileConfig, WebConfig};
pub use registry::{encode_text, CollectorRegistry, RegistryError};
#[cfg(feature = "http")]
pub use server::{MetricsServer, ServerError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
