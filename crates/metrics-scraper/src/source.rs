// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::FetchError;
use crate::target::{Target, TargetGroup, DEFAULT_METRICS_PATH};

/// One target's metric bundle, as reported by its source.
pub type RawMetrics = serde_json::Map<String, Value>;

/// Metric bundles of the targets of one group, as returned by one fetch.
pub type GroupPayload = HashMap<Target, RawMetrics>;

#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Fetches the current metrics of every target in `group` with a single
    /// request. Targets the source did not report are absent from the payload.
    async fn fetch(&self, group: &TargetGroup) -> Result<GroupPayload, FetchError>;
}

/// Fetches metric bundles over HTTP.
///
/// A host endpoint answers `GET http://{host}{path}` with a flat JSON object
/// of numeric fields. A container monitor answers
/// `GET http://{host}/metrics?container_names=a&container_names=b` with an
/// object keyed by container name.
#[derive(Clone)]
pub struct HttpMetricSource {
    client: reqwest::Client,
}

impl HttpMetricSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// The URL requested for `group`.
pub fn group_url(group: &TargetGroup) -> Result<Url, FetchError> {
    let raw = match group {
        TargetGroup::Endpoint { host, path } => format!("http://{host}{path}"),
        TargetGroup::Monitor { host, .. } => format!("http://{host}{DEFAULT_METRICS_PATH}"),
    };
    let mut url = Url::parse(&raw).map_err(|e| FetchError::Url(format!("{raw}: {e}")))?;

    if let TargetGroup::Monitor { containers, .. } = group {
        let mut query = url.query_pairs_mut();
        for container in containers {
            query.append_pair("container_names", container);
        }
    }
    Ok(url)
}

fn as_object(value: Value) -> Result<RawMetrics, FetchError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(FetchError::Payload(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Splits a decoded response body into per-target bundles.
pub fn parse_payload(group: &TargetGroup, body: Value) -> Result<GroupPayload, FetchError> {
    let object = as_object(body)?;
    match group {
        TargetGroup::Endpoint { host, .. } => {
            Ok(HashMap::from([(Target::host(host.clone()), object)]))
        }
        TargetGroup::Monitor { host, containers } => {
            let mut by_container = object;
            let mut payload = HashMap::with_capacity(containers.len());
            for name in containers {
                let Some(stats) = by_container.remove(name) else {
                    continue;
                };
                match as_object(stats) {
                    Ok(stats) => {
                        payload.insert(Target::container(host.clone(), name.as_str()), stats);
                    }
                    Err(e) => warn!("Ignoring stats of container {name} on {host}: {e}"),
                }
            }
            Ok(payload)
        }
    }
}

#[async_trait]
impl MetricSource for HttpMetricSource {
    async fn fetch(&self, group: &TargetGroup) -> Result<GroupPayload, FetchError> {
        let url = group_url(group)?;
        debug!("Fetching metrics from {url}");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let value: Value =
            serde_json::from_slice(&body).map_err(|e| FetchError::Payload(e.to_string()))?;
        parse_payload(group, value)
    }
}
