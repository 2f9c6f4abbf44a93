// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns fetch outcomes into fixed-shape records.
//!
//! A record always carries one sample for every metric in its target's
//! vocabulary. A response that lacks any required field is rejected as a
//! whole, so a target never ends a round with some series written and others
//! skipped.

use std::time::Duration;

use tracing::warn;

use crate::errors::{FetchError, NormalizeError};
use crate::metric::{MetricName, Sample};
use crate::source::{GroupPayload, RawMetrics};
use crate::target::{Target, TargetGroup, TargetKind};

/// Value the container monitor reports in every field of a container that is
/// not running.
const NOT_RUNNING_MARKER: f64 = -1.0;

/// One round's reading of every tracked metric of a target.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    target: Target,
    samples: Vec<(MetricName, Sample)>,
}

impl Record {
    /// A record marking every metric of `target` unavailable.
    pub fn unavailable(target: Target) -> Self {
        let samples = target
            .vocabulary()
            .iter()
            .map(|metric| (*metric, Sample::Unavailable))
            .collect();
        Self { target, samples }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Samples in vocabulary order.
    pub fn samples(&self) -> &[(MetricName, Sample)] {
        &self.samples
    }

    pub fn get(&self, metric: MetricName) -> Option<Sample> {
        self.samples
            .iter()
            .find(|(name, _)| *name == metric)
            .map(|(_, sample)| *sample)
    }

    pub fn is_live(&self) -> bool {
        self.get(self.target.liveness_metric())
            .is_some_and(|sample| sample.is_available())
    }
}

/// Builds the record of a target from its fetched metric bundle.
///
/// `latency` is the measured round-trip of the fetch and fills the
/// `latency` series; every other metric must be present as a number.
pub fn extract(
    target: &Target,
    metrics: &RawMetrics,
    latency: Duration,
) -> Result<Record, NormalizeError> {
    let vocabulary = target.vocabulary();
    let mut samples = Vec::with_capacity(vocabulary.len());

    for &metric in vocabulary {
        let sample = if metric.is_measured() {
            Sample::Value(latency.as_secs_f64() * 1000.0)
        } else {
            let value = metrics
                .get(metric.as_str())
                .ok_or(NormalizeError::MissingField(metric))?;
            let number = value
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or(NormalizeError::NotNumeric(metric))?;
            Sample::Value(number)
        };
        samples.push((metric, sample));
    }

    if target.kind() == TargetKind::Container && reports_not_running(&samples) {
        return Err(NormalizeError::NotRunning);
    }

    Ok(Record {
        target: target.clone(),
        samples,
    })
}

fn reports_not_running(samples: &[(MetricName, Sample)]) -> bool {
    samples
        .iter()
        .filter(|(metric, _)| !metric.is_measured())
        .all(|(_, sample)| *sample == Sample::Value(NOT_RUNNING_MARKER))
}

/// Produces one record per target of `group` for this round.
///
/// A failed fetch marks every target of the group unavailable. A successful
/// fetch is still checked target by target: a target missing from the payload
/// or with an incomplete bundle is unavailable while its siblings keep their
/// values.
pub fn normalize_group(
    group: &TargetGroup,
    outcome: &Result<GroupPayload, FetchError>,
    latency: Duration,
) -> Vec<Record> {
    group
        .targets()
        .into_iter()
        .map(|target| {
            let payload = match outcome {
                Ok(payload) => payload,
                Err(_) => return Record::unavailable(target),
            };
            let extracted = payload
                .get(&target)
                .ok_or(NormalizeError::TargetAbsent)
                .and_then(|metrics| extract(&target, metrics, latency));
            match extracted {
                Ok(record) => record,
                Err(e) => {
                    warn!("Discarding metrics of {target} for this round: {e}");
                    Record::unavailable(target)
                }
            }
        })
        .collect()
}
