// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read-only HTTP/1 JSON facade over the query API.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::service_fn;
use hyper::{http, Method, StatusCode, Uri};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::http_utils::{
    empty_response, json_response, log_and_create_http_response, parse_query, HttpResponse,
};
use crate::metric::MetricName;
use crate::notifier::Notifier;
use crate::query::{QueryApi, Status};
use crate::target::{HostAddr, Target};
use crate::window::Window;

pub const TARGETS_ENDPOINT_PATH: &str = "/targets";
pub const WINDOW_ENDPOINT_PATH: &str = "/window";
pub const WINDOWS_ENDPOINT_PATH: &str = "/windows";
pub const STATUS_ENDPOINT_PATH: &str = "/status";
pub const WAIT_ENDPOINT_PATH: &str = "/wait";

const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_WAIT_TIMEOUT_MS: u64 = 600_000;

#[derive(Serialize)]
struct TargetStatus<'a> {
    #[serde(flatten)]
    target: &'a Target,
    status: Status,
}

#[derive(Serialize)]
struct SeriesView {
    metric: MetricName,
    samples: Window,
}

#[derive(Clone)]
pub struct QueryServer {
    query: QueryApi,
    notifier: Arc<Notifier>,
    port: u16,
}

impl QueryServer {
    pub fn new(query: QueryApi, notifier: Arc<Notifier>, port: u16) -> Self {
        Self {
            query,
            notifier,
            port,
        }
    }

    /// Binds the configured port on every interface and serves until
    /// `cancel` fires.
    pub async fn serve(
        self,
        cancel: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(&addr).await?;
        debug!("Query server started: listening on port {}", self.port);
        self.serve_listener(listener, cancel).await
    }

    pub async fn serve_listener(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let handler = self;
        let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
            let handler = handler.clone();
            async move { handler.handle(req.method(), req.uri()).await }
        });

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                () = cancel.cancelled() => break,
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Query server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Query connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("Query connection error: {e}");
                }
            });
        }

        joinset.abort_all();
        debug!("Query server stopped");
        Ok(())
    }

    /// Routes one request. Only malformed requests are errors; unknown
    /// targets and metrics read as empty windows and `down`.
    pub async fn handle(&self, method: &Method, uri: &Uri) -> http::Result<HttpResponse> {
        let params = parse_query(uri.query());
        match (method, uri.path()) {
            (&Method::GET, TARGETS_ENDPOINT_PATH) => self.targets_handler(),
            (&Method::GET, WINDOW_ENDPOINT_PATH) => self.window_handler(&params),
            (&Method::GET, WINDOWS_ENDPOINT_PATH) => self.windows_handler(&params),
            (&Method::GET, STATUS_ENDPOINT_PATH) => self.status_handler(&params),
            (&Method::GET, WAIT_ENDPOINT_PATH) => self.wait_handler(&params).await,
            _ => empty_response(StatusCode::NOT_FOUND),
        }
    }

    fn targets_handler(&self) -> http::Result<HttpResponse> {
        let targets = self.query.list_targets();
        let targets: Vec<_> = targets
            .iter()
            .map(|target| TargetStatus {
                target,
                status: self.query.get_status(target),
            })
            .collect();
        json_response(StatusCode::OK, &serde_json::json!({ "targets": targets }))
    }

    fn window_handler(&self, params: &HashMap<String, String>) -> http::Result<HttpResponse> {
        let target = match target_param(params) {
            Ok(target) => target,
            Err(response) => return response,
        };
        let metric = match params.get("metric") {
            None => {
                return log_and_create_http_response(
                    "Missing metric parameter",
                    StatusCode::BAD_REQUEST,
                )
            }
            Some(raw) => match raw.parse::<MetricName>() {
                Ok(metric) => metric,
                Err(e) => return log_and_create_http_response(&e.to_string(), StatusCode::BAD_REQUEST),
            },
        };

        let samples = self.query.get_window(&target, metric);
        json_response(
            StatusCode::OK,
            &serde_json::json!({ "target": target, "metric": metric, "samples": samples }),
        )
    }

    fn windows_handler(&self, params: &HashMap<String, String>) -> http::Result<HttpResponse> {
        let target = match target_param(params) {
            Ok(target) => target,
            Err(response) => return response,
        };
        let series: Vec<_> = self
            .query
            .get_windows(&target)
            .into_iter()
            .map(|(metric, samples)| SeriesView { metric, samples })
            .collect();
        json_response(
            StatusCode::OK,
            &serde_json::json!({ "target": target, "series": series }),
        )
    }

    fn status_handler(&self, params: &HashMap<String, String>) -> http::Result<HttpResponse> {
        let target = match target_param(params) {
            Ok(target) => target,
            Err(response) => return response,
        };
        let status = self.query.get_status(&target);
        json_response(
            StatusCode::OK,
            &TargetStatus {
                target: &target,
                status,
            },
        )
    }

    async fn wait_handler(&self, params: &HashMap<String, String>) -> http::Result<HttpResponse> {
        let timeout = match params.get("timeout_ms") {
            None => DEFAULT_WAIT_TIMEOUT,
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms <= MAX_WAIT_TIMEOUT_MS => Duration::from_millis(ms),
                _ => {
                    return log_and_create_http_response(
                        &format!("Invalid timeout_ms '{raw}', expected 0 to {MAX_WAIT_TIMEOUT_MS}"),
                        StatusCode::BAD_REQUEST,
                    )
                }
            },
        };

        match self.notifier.wait_timeout(timeout).await {
            Some(round) => json_response(StatusCode::OK, &serde_json::json!({ "round": round })),
            None => empty_response(StatusCode::NO_CONTENT),
        }
    }
}

/// Reads the `host` and optional `container` parameters.
fn target_param(
    params: &HashMap<String, String>,
) -> Result<Target, http::Result<HttpResponse>> {
    let host = match params.get("host").map(|h| h.trim()) {
        Some(host) if !host.is_empty() => HostAddr::new(host),
        _ => {
            return Err(log_and_create_http_response(
                "Missing host parameter",
                StatusCode::BAD_REQUEST,
            ))
        }
    };
    let container = params
        .get("container")
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    Ok(Target::from_parts(host, container))
}
