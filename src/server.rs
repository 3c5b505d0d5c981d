//! Metrics HTTP server
//!
//! Serves the telemetry path (one collection pass per request), a landing
//! page on `/` and a liveness probe on `/healthz`.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collector::DeviceCollector;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::metrics::{ExporterMetrics, PrometheusSink};

/// HTTP front end of the exporter.
pub struct MetricsServer {
    config: ServerConfig,
    state: Arc<ServerState>,
}

struct ServerState {
    collector: Arc<DeviceCollector>,
    metrics: ExporterMetrics,
    telemetry_path: String,
}

impl MetricsServer {
    pub fn new(config: ServerConfig, collector: Arc<DeviceCollector>, metrics: ExporterMetrics) -> Self {
        let state = Arc::new(ServerState {
            collector,
            metrics,
            telemetry_path: config.telemetry_path.clone(),
        });
        Self { config, state }
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// Only a failure to bind is returned as an error.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.config.listen_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Http(format!("Failed to bind metrics server on {}: {}", addr, e)))?;

        info!("Metrics server listening on {}", addr);

        loop {
            let stream = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Metrics server stopped");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        warn!("Metrics server accept error: {}", e);
                        continue;
                    }
                },
            };

            let io = TokioIo::new(stream);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { Ok::<_, Infallible>(state.handle(req).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Metrics server connection error: {}", e);
                }
            });
        }
    }
}

impl ServerState {
    async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return respond(StatusCode::METHOD_NOT_ALLOWED, "text/plain", "method not allowed");
        }

        let path = req.uri().path().to_owned();
        if path == self.telemetry_path {
            return match self.render_metrics().await {
                Ok(body) => respond(StatusCode::OK, prometheus::TEXT_FORMAT, body),
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    respond(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "text/plain",
                        format!("failed to encode metrics: {}", e),
                    )
                }
            };
        }

        match path.as_str() {
            "/healthz" => respond(StatusCode::OK, "text/plain", "ok"),
            "/" => respond(StatusCode::OK, "text/html; charset=utf-8", landing_page(&self.telemetry_path)),
            _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
        }
    }

    async fn render_metrics(&self) -> Result<Vec<u8>> {
        let mut sink = PrometheusSink::new();
        self.collector.collect(&mut sink).await;

        let mut families = sink.gather();
        families.extend(self.metrics.gather());

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(buffer)
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn landing_page(telemetry_path: &str) -> String {
    let href: String = telemetry_path
        .chars()
        .map(|c| match c {
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '&' => "&amp;".to_string(),
            c => c.to_string(),
        })
        .collect();

    format!(
        "<html>\n<head><title>smartctl_exporter</title></head>\n<body>\n\
         <h1>smartctl_exporter</h1>\n\
         <p>Prometheus Exporter for S.M.A.R.T. devices (version {})</p>\n\
         <ul><li><a href=\"{}\">Metrics</a></li></ul>\n\
         </body>\n</html>\n",
        env!("CARGO_PKG_VERSION"),
        href
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorConfig;
    use crate::hardware::{Device, DeviceType, ScanEntry};
    use crate::inventory::Inventory;
    use crate::metrics::SmartctlTranslator;
    use crate::smartctl::DiagnosticReader;
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};

    struct HealthyReader;

    #[async_trait]
    impl DiagnosticReader for HealthyReader {
        async fn list_devices(&self, _args: &[String]) -> Result<Vec<ScanEntry>> {
            Ok(vec![])
        }

        async fn read_device(&self, _device: &Device) -> Result<Option<Value>> {
            Ok(Some(json!({"smart_status": {"passed": true}})))
        }
    }

    fn state(telemetry_path: &str) -> ServerState {
        let inventory = Arc::new(Inventory::new(vec![Device::new("/dev/sda", "sda", DeviceType::Sat)]));
        let metrics = ExporterMetrics::new().unwrap();
        let collector = DeviceCollector::new(
            CollectorConfig::default(),
            inventory,
            Arc::new(HealthyReader),
            Arc::new(SmartctlTranslator),
        )
        .with_metrics(metrics.clone());

        ServerState {
            collector: Arc::new(collector),
            metrics,
            telemetry_path: telemetry_path.to_string(),
        }
    }

    async fn get(state: &ServerState, path: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(path).body(()).unwrap();
        let response = state.handle(req).await;
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = state("/metrics");
        let (status, body) = get(&state, "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"smartctl_device_smart_status{device="sda"} 1"#));
        assert!(body.contains("smartctl_devices 1"));
        assert!(body.contains("smartctl_exporter_scrape_duration_seconds_count 1"));
    }

    #[tokio::test]
    async fn test_custom_telemetry_path() {
        let state = state("/probe");
        assert_eq!(get(&state, "/probe").await.0, StatusCode::OK);
        assert_eq!(get(&state, "/metrics").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_landing_and_health() {
        let state = state("/metrics");

        let (status, body) = get(&state, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"<a href="/metrics">"#));

        assert_eq!(get(&state, "/healthz").await, (StatusCode::OK, "ok".to_string()));
        assert_eq!(get(&state, "/nope").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rejects_post() {
        let state = state("/metrics");
        let req = Request::builder()
            .method(Method::POST)
            .uri("/metrics")
            .body(())
            .unwrap();
        assert_eq!(state.handle(req).await.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_landing_page_escapes_path() {
        assert!(landing_page("/m\"x").contains("/m&quot;x"));
    }
}
