// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod logger;

use std::{env, process, sync::Arc};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use metrics_scraper::{
    collector::Collector,
    config::ScraperConfig,
    http_client,
    notifier::Notifier,
    query::QueryApi,
    query_server::QueryServer,
    source::{HttpMetricSource, MetricSource},
    window::WindowStore,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
pub async fn main() {
    let log_level = env::var("SCRAPER_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,hyper_util=off,reqwest=off,rustls=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .event_format(logger::Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match ScraperConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading scraper configuration: {e}");
            process::exit(1);
        }
    };

    let client = match http_client::build_client(config.interval) {
        Ok(client) => client,
        Err(e) => {
            error!("Error creating HTTP client: {e}");
            process::exit(1);
        }
    };

    let store = Arc::new(WindowStore::new(config.window_size, config.targets()));
    let notifier = Arc::new(Notifier::new());
    let source: Arc<dyn MetricSource> = Arc::new(HttpMetricSource::new(client));

    let collector = Collector::new(
        config.groups.clone(),
        source,
        Arc::clone(&store),
        Arc::clone(&notifier),
        config.interval,
    );
    let query_server = QueryServer::new(QueryApi::new(store), notifier, config.query_port);

    let cancel = CancellationToken::new();
    let mut server_handle = tokio::spawn(query_server.serve(cancel.clone()));
    let collector_handle = tokio::spawn(collector.run(cancel.clone()));

    info!(
        "Scraping {} targets every {:?}, keeping {} samples per series, queries on port {}",
        config.targets().len(),
        config.interval,
        config.window_size,
        config.query_port
    );

    let mut exit_code = 0;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Unable to listen for shutdown signal: {e}");
                exit_code = 1;
            }
            info!("Shutting down");
        }
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => error!("Query server stopped unexpectedly"),
                Ok(Err(e)) => error!("Query server failed: {e}"),
                Err(e) => error!("Query server task died: {e}"),
            }
            exit_code = 1;
        }
    }

    cancel.cancel();
    if let Err(e) = collector_handle.await {
        error!("Collector task died: {e}");
    }
    if !server_handle.is_finished() {
        let _ = server_handle.await;
    }

    if exit_code != 0 {
        process::exit(exit_code);
    }
}
