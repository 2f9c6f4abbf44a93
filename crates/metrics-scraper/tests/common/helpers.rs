// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use metrics_scraper::{
    collector::Collector,
    notifier::Notifier,
    query::QueryApi,
    source::{MetricSource, RawMetrics},
    target::TargetGroup,
    window::WindowStore,
};
use serde_json::{json, Value};
use tokio::time::timeout;

fn object(value: Value) -> RawMetrics {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A complete host endpoint bundle
pub fn host_bundle(cpu: f64) -> RawMetrics {
    object(json!({
        "cpu_usage": cpu,
        "memory_available": 2048.0,
        "memory_used": 1024.0,
        "disk_available": 50.0,
        "disk_used": 10.0
    }))
}

/// A complete container monitor bundle with every field set to `value`
pub fn container_bundle(value: f64) -> RawMetrics {
    object(json!({
        "cpu_absolute_usage": value,
        "cpu_percent_usage": value,
        "memory_absolute_usage": value,
        "memory_percent_usage": value,
        "network_input": value,
        "network_output": value,
        "disk_read": value,
        "disk_write": value
    }))
}

/// Everything a running scraper shares, wired the way the agent wires it
pub struct Pipeline {
    pub collector: Collector,
    pub store: Arc<WindowStore>,
    pub notifier: Arc<Notifier>,
    pub query: QueryApi,
}

pub fn pipeline(
    groups: Vec<TargetGroup>,
    source: Arc<dyn MetricSource>,
    window_size: usize,
    interval: Duration,
) -> Pipeline {
    let store = Arc::new(WindowStore::new(
        window_size,
        groups.iter().flat_map(TargetGroup::targets),
    ));
    let notifier = Arc::new(Notifier::new());
    let collector = Collector::new(
        groups,
        source,
        Arc::clone(&store),
        Arc::clone(&notifier),
        interval,
    );
    let query = QueryApi::new(Arc::clone(&store));
    Pipeline {
        collector,
        store,
        notifier,
        query,
    }
}

/// Send a GET request over TCP and return the status and JSON body
/// (`Value::Null` for an empty body)
pub async fn send_tcp_request(
    port: u16,
    uri: &str,
) -> Result<(StatusCode, Value), Box<dyn std::error::Error + Send + Sync>> {
    let stream = timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)),
    )
    .await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let request = Request::builder()
        .uri(uri)
        .method("GET")
        .header("Host", format!("127.0.0.1:{port}"))
        .body(Empty::<Bytes>::new())?;
    let response = timeout(Duration::from_secs(5), sender.send_request(request)).await??;

    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((status, value))
}
