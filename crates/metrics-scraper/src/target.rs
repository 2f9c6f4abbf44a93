// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Monitored targets and the groups they are fetched in.
//!
//! A host target exposes its own metrics endpoint and is fetched on its own.
//! Container targets are reported by a monitor service running on their host,
//! so every container configured under one host is fetched with a single
//! request to that monitor.

use std::fmt;

use derive_more::Display;
use serde::Serialize;

use crate::metric::{MetricName, CONTAINER_METRICS, HOST_METRICS};

pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Network address of a monitored host, `host:port`.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct HostAddr(String);

impl HostAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Host,
    Container,
}

/// A monitored unit: a bare host, or a named container on a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Target {
    host: HostAddr,
    container: Option<String>,
}

impl Target {
    pub fn host(host: HostAddr) -> Self {
        Self {
            host,
            container: None,
        }
    }

    pub fn container(host: HostAddr, name: impl Into<String>) -> Self {
        Self {
            host,
            container: Some(name.into()),
        }
    }

    /// Builds the target addressed by a host and an optional container name.
    pub fn from_parts(host: HostAddr, container: Option<String>) -> Self {
        Self { host, container }
    }

    pub fn host_addr(&self) -> &HostAddr {
        &self.host
    }

    pub fn container_name(&self) -> Option<&str> {
        self.container.as_deref()
    }

    pub fn kind(&self) -> TargetKind {
        match self.container {
            Some(_) => TargetKind::Container,
            None => TargetKind::Host,
        }
    }

    /// Every metric tracked for this target, `latency` included.
    pub fn vocabulary(&self) -> &'static [MetricName] {
        match self.kind() {
            TargetKind::Host => HOST_METRICS,
            TargetKind::Container => CONTAINER_METRICS,
        }
    }

    /// The metric whose latest sample decides whether the target is live.
    pub fn liveness_metric(&self) -> MetricName {
        match self.kind() {
            TargetKind::Host => MetricName::CpuUsage,
            TargetKind::Container => MetricName::CpuPercentUsage,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container {
            Some(name) => write!(f, "{name}@{}", self.host),
            None => write!(f, "{}", self.host),
        }
    }
}

/// The unit of one fetch per round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetGroup {
    /// A host serving its own metric bundle at `path`.
    Endpoint { host: HostAddr, path: String },
    /// A monitor service reporting stats for the named containers on its host.
    Monitor {
        host: HostAddr,
        containers: Vec<String>,
    },
}

impl TargetGroup {
    pub fn endpoint(host: HostAddr) -> Self {
        TargetGroup::Endpoint {
            host,
            path: DEFAULT_METRICS_PATH.to_string(),
        }
    }

    pub fn monitor(host: HostAddr, containers: Vec<String>) -> Self {
        TargetGroup::Monitor { host, containers }
    }

    pub fn host(&self) -> &HostAddr {
        match self {
            TargetGroup::Endpoint { host, .. } | TargetGroup::Monitor { host, .. } => host,
        }
    }

    /// Targets covered by this group, in configuration order.
    pub fn targets(&self) -> Vec<Target> {
        match self {
            TargetGroup::Endpoint { host, .. } => vec![Target::host(host.clone())],
            TargetGroup::Monitor { host, containers } => containers
                .iter()
                .map(|name| Target::container(host.clone(), name.as_str()))
                .collect(),
        }
    }
}
