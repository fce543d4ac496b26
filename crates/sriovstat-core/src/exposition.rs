//! Prometheus adapter for `SriovCollector`.
//!
//! Counter names are only known after reading, so the adapter is an unchecked
//! collector: `desc()` is empty and families are built on every scrape.

use std::collections::BTreeMap;

use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, LabelPair, Metric, MetricFamily, MetricType};

use crate::collector::{FileSystem, LinkQuery, SriovCollector, VfSample};

/// Prefix of every exported metric name.
pub const METRIC_PREFIX: &str = "sriov_vf_";

/// Exposes VF samples as one counter family per counter name.
pub struct SriovMetrics<F: FileSystem, L: LinkQuery> {
    collector: SriovCollector<F, L>,
}

impl<F: FileSystem, L: LinkQuery> SriovMetrics<F, L> {
    pub fn new(collector: SriovCollector<F, L>) -> Self {
        Self { collector }
    }

    /// The wrapped collector, for priority updates and scrape stats.
    pub fn collector(&self) -> &SriovCollector<F, L> {
        &self.collector
    }
}

impl<F: FileSystem, L: LinkQuery> Collector for SriovMetrics<F, L> {
    fn desc(&self) -> Vec<&Desc> {
        Vec::new()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        families(self.collector.collect())
    }
}

/// Groups samples by counter name into counter families, sorted by name.
pub fn families(samples: Vec<VfSample>) -> Vec<MetricFamily> {
    let mut by_name: BTreeMap<String, MetricFamily> = BTreeMap::new();

    for sample in samples {
        let name = metric_name(&sample.name);
        let family = by_name.entry(name.clone()).or_insert_with(|| {
            let mut family = MetricFamily::default();
            family.set_name(name);
            family.set_help(format!("Statistic {}.", sample.name));
            family.set_field_type(MetricType::COUNTER);
            family
        });
        family.mut_metric().push(metric(&sample));
    }

    by_name.into_values().collect()
}

fn metric(sample: &VfSample) -> Metric {
    let mut counter = proto::Counter::default();
    counter.set_value(sample.value as f64);

    let mut metric = Metric::default();
    // Label pairs are kept sorted by name
    for (name, value) in [
        ("numa_node", sample.numa_node.clone()),
        ("pciAddr", sample.pci_address.clone()),
        ("pf", sample.pf.clone()),
        ("vf", sample.vf.to_string()),
    ] {
        let mut label = LabelPair::default();
        label.set_name(name.to_string());
        label.set_value(value);
        metric.mut_label().push(label);
    }
    metric.set_counter(counter);
    metric
}

/// `sriov_vf_<counter>`, with characters outside `[a-zA-Z0-9_:]` replaced.
pub fn metric_name(counter: &str) -> String {
    let mut name = String::with_capacity(METRIC_PREFIX.len() + counter.len());
    name.push_str(METRIC_PREFIX);
    name.extend(counter.chars().map(|c| {
        if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
            c
        } else {
            '_'
        }
    }));
    name
}
