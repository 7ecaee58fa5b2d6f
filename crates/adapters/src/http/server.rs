//! Statistics API server.
//!
//! One JSON surface: probe counters, pipeline counters and per-sink
//! delivery counters, all point-in-time snapshots.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::info;

use application::pipeline::Pipeline;

pub fn build_router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/stats", get(handle_stats))
        .with_state(pipeline)
}

async fn handle_stats(State(pipeline): State<Arc<Pipeline>>) -> Json<Value> {
    Json(json!({
        "probe": pipeline.probe_stats(),
        "pipeline": pipeline.stats(),
        "sinks": pipeline.sink_stats(),
    }))
}

/// Serve the statistics API on `endpoint` until `shutdown` resolves.
pub async fn run_api_server(
    pipeline: Arc<Pipeline>,
    endpoint: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(endpoint)
        .await
        .with_context(|| format!("binding stats API to {endpoint}"))?;
    info!(endpoint, "stats API server listening");

    axum::serve(listener, build_router(pipeline))
        .with_graceful_shutdown(shutdown)
        .await
        .context("serving stats API")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::probe::{Probe, ProbeDriver, RingStreams};
    use domain::probe::error::ProbeError;
    use tokio::sync::mpsc;

    struct IdleDriver;

    impl ProbeDriver for IdleDriver {
        fn attach(&mut self) -> Result<RingStreams, ProbeError> {
            let (_tx_u, update) = mpsc::channel(1);
            let (_tx_d, destroy) = mpsc::channel(1);
            Ok(RingStreams { update, destroy })
        }

        fn detach(&mut self) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stats_endpoint_serves_the_surface() {
        let probe = Arc::new(Probe::new(Box::new(IdleDriver)));
        let pipeline = Arc::new(Pipeline::new(probe).unwrap());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, build_router(pipeline)).await.unwrap();
        });

        let body: Value = reqwest::get(format!("http://{addr}/stats"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["probe"]["perf_events_total"], 0);
        assert_eq!(body["pipeline"]["events_total"], 0);
        assert_eq!(body["pipeline"]["update_queue_length"], 0);
        assert!(body["sinks"].is_object());

        server.abort();
    }
}
