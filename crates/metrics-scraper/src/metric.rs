// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::target::Target;

/// Fixed metric vocabulary. The JSON field names reported by the metric
/// sources are the snake_case variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    // host endpoint
    CpuUsage,
    MemoryAvailable,
    MemoryUsed,
    DiskAvailable,
    DiskUsed,
    // container monitor
    CpuAbsoluteUsage,
    CpuPercentUsage,
    MemoryAbsoluteUsage,
    MemoryPercentUsage,
    NetworkInput,
    NetworkOutput,
    DiskRead,
    DiskWrite,
    /// Round-trip time of the fetch in milliseconds, measured by the collector.
    Latency,
}

pub const HOST_METRICS: &[MetricName] = &[
    MetricName::CpuUsage,
    MetricName::MemoryAvailable,
    MetricName::MemoryUsed,
    MetricName::DiskAvailable,
    MetricName::DiskUsed,
    MetricName::Latency,
];

pub const CONTAINER_METRICS: &[MetricName] = &[
    MetricName::CpuPercentUsage,
    MetricName::CpuAbsoluteUsage,
    MetricName::MemoryAbsoluteUsage,
    MetricName::MemoryPercentUsage,
    MetricName::NetworkInput,
    MetricName::NetworkOutput,
    MetricName::DiskRead,
    MetricName::DiskWrite,
    MetricName::Latency,
];

const ALL_METRICS: &[MetricName] = &[
    MetricName::CpuUsage,
    MetricName::MemoryAvailable,
    MetricName::MemoryUsed,
    MetricName::DiskAvailable,
    MetricName::DiskUsed,
    MetricName::CpuAbsoluteUsage,
    MetricName::CpuPercentUsage,
    MetricName::MemoryAbsoluteUsage,
    MetricName::MemoryPercentUsage,
    MetricName::NetworkInput,
    MetricName::NetworkOutput,
    MetricName::DiskRead,
    MetricName::DiskWrite,
    MetricName::Latency,
];

impl MetricName {
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricName::CpuUsage => "cpu_usage",
            MetricName::MemoryAvailable => "memory_available",
            MetricName::MemoryUsed => "memory_used",
            MetricName::DiskAvailable => "disk_available",
            MetricName::DiskUsed => "disk_used",
            MetricName::CpuAbsoluteUsage => "cpu_absolute_usage",
            MetricName::CpuPercentUsage => "cpu_percent_usage",
            MetricName::MemoryAbsoluteUsage => "memory_absolute_usage",
            MetricName::MemoryPercentUsage => "memory_percent_usage",
            MetricName::NetworkInput => "network_input",
            MetricName::NetworkOutput => "network_output",
            MetricName::DiskRead => "disk_read",
            MetricName::DiskWrite => "disk_write",
            MetricName::Latency => "latency",
        }
    }

    /// Whether the value comes from the collector rather than the response body.
    pub const fn is_measured(self) -> bool {
        matches!(self, MetricName::Latency)
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown metric name '{0}'")]
pub struct UnknownMetric(pub String);

impl FromStr for MetricName {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_METRICS
            .iter()
            .copied()
            .find(|metric| metric.as_str() == s)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

/// One reading of a series. `Unavailable` marks a round in which the target
/// could not be read; it never collides with a numeric value.
///
/// Serializes as a JSON number, or `null` when unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Sample {
    Value(f64),
    Unavailable,
}

impl Sample {
    pub fn is_available(&self) -> bool {
        matches!(self, Sample::Value(_))
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Sample::Value(v) => Some(*v),
            Sample::Unavailable => None,
        }
    }
}

impl From<Option<f64>> for Sample {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Sample::Unavailable, Sample::Value)
    }
}

/// Identifies one time series: a metric of a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub target: Target,
    pub metric: MetricName,
}

impl SeriesKey {
    pub fn new(target: Target, metric: MetricName) -> Self {
        Self { target, metric }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.metric)
    }
}
