// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::time::Duration;

use reqwest::ClientBuilder;

/// Creates a reqwest client builder with rustls TLS.
pub fn create_reqwest_client_builder() -> Result<ClientBuilder, Box<dyn Error>> {
    Ok(reqwest::Client::builder().use_rustls_tls())
}

/// Builds the client shared by every fetch. No single request may outlive
/// one poll interval; the collector's round deadline is usually tighter.
pub fn build_client(interval: Duration) -> Result<reqwest::Client, Box<dyn Error>> {
    let client = create_reqwest_client_builder()?
        .timeout(interval)
        .connect_timeout(interval)
        .pool_idle_timeout(interval.saturating_mul(2))
        .build()?;
    Ok(client)
}
