// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::metric::{MetricName, SeriesKey};
use crate::target::Target;

/// Errors raised while reading or validating the scraper configuration.
/// All of them are fatal at start-up.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("No targets configured: set SCRAPER_ENDPOINTS and/or SCRAPER_MONITORS")]
    NoTargets,

    #[error("Target {0} is configured more than once")]
    DuplicateTarget(Target),
}

/// Reasons a fetch from a metric source did not produce a payload.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected status code {0}")]
    Status(u16),

    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("Invalid metrics URL: {0}")]
    Url(String),

    #[error("Fetch did not complete before the round deadline")]
    Timeout,
}

/// Reasons a fetched payload could not be turned into a complete record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("Missing metric field '{0}'")]
    MissingField(MetricName),

    #[error("Metric field '{0}' is not a finite number")]
    NotNumeric(MetricName),

    #[error("Target is absent from the response")]
    TargetAbsent,

    #[error("Monitor reports the container as not running")]
    NotRunning,
}

/// Misuse of the window store. These indicate a programming error in the
/// writer, never a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Series {0} is not tracked by this store")]
    UnknownSeries(SeriesKey),

    #[error("Target {0} is not tracked by this store")]
    UnknownTarget(Target),

    #[error("Record for {0} does not match the target's vocabulary")]
    IncompleteRecord(Target),
}
