//! Merges one entity's metric values with population-wide statistics.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Metric values for a single entity, keyed by metric name. Metrics the
/// entity has no value for are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EntityProfile(BTreeMap<String, f64>);

impl EntityProfile {
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.0.get(metric).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl FromIterator<(String, f64)> for EntityProfile {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Min/max/avg of each metric across the population for one duration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PopulationProfile(BTreeMap<String, MetricStats>);

impl PopulationProfile {
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<MetricStats> {
        self.0.get(metric).copied()
    }

    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl FromIterator<(String, MetricStats)> for PopulationProfile {
    fn from_iter<I: IntoIterator<Item = (String, MetricStats)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricComparison {
    pub value: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileComparison {
    pub metrics: BTreeMap<String, MetricComparison>,
    /// Metrics present on one side only. Non-empty means the comparison is
    /// partial; the affected entries carry `None` for the absent side.
    pub missing: BTreeSet<String>,
}

impl ProfileComparison {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Combine an entity profile with population statistics.
///
/// Every metric that appears on either side gets an entry. A metric missing
/// from one side is kept with that side set to `None` and recorded in
/// [`ProfileComparison::missing`].
#[must_use]
pub fn fuse(entity: &EntityProfile, population: &PopulationProfile) -> ProfileComparison {
    let names: BTreeSet<&str> = entity.metrics().chain(population.metrics()).collect();

    let mut comparison = ProfileComparison::default();
    for name in names {
        let value = entity.get(name);
        let stats = population.get(name);
        if value.is_none() || stats.is_none() {
            comparison.missing.insert(name.to_string());
        }
        comparison.metrics.insert(
            name.to_string(),
            MetricComparison {
                value,
                min: stats.map(|s| s.min),
                max: stats.map(|s| s.max),
                avg: stats.map(|s| s.avg),
            },
        );
    }
    comparison
}
