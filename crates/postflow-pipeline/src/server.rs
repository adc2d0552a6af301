//! HTTP harness around the invocation handlers

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

use crate::handler;
use crate::pipeline::Pipeline;

/// Shared state of the harness
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

/// Routes: `POST /` and `POST /run` trigger a run, `GET /health` checks the store
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(run_pipeline))
        .route("/run", post(run_pipeline))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(tracing_layer())
}

fn tracing_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(tower_http::LatencyUnit::Micros),
        )
}

async fn run_pipeline(State(state): State<AppState>) -> Response {
    let (payload, status) = handler::invoke(&state.pipeline).await;
    (status, Json(payload)).into_response()
}

async fn health_check(State(state): State<AppState>) -> Response {
    let (report, status) = handler::health(state.pipeline.store()).await;
    (status, Json(report)).into_response()
}

/// Bind and serve until Ctrl+C or SIGTERM
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let server = &state.pipeline.config().server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port).parse()?;
    let drain_timeout = Duration::from_secs(server.shutdown_timeout_secs);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    serve_with_shutdown(listener, router(state), shutdown_signal(), drain_timeout).await
}

/// Serve `app` until `signal` resolves, then drain for at most `drain_timeout`.
///
/// The listener stops accepting as soon as `signal` resolves. Requests still
/// in flight when the timeout expires are dropped.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    app: Router,
    signal: F,
    drain_timeout: Duration,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let draining = Arc::new(Notify::new());
    let notify = draining.clone();

    let graceful = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            notify.notify_one();
        })
        .into_future();
    tokio::pin!(graceful);

    tokio::select! {
        result = &mut graceful => result?,
        _ = async {
            draining.notified().await;
            info!("Waiting up to {} seconds for in-flight runs to finish", drain_timeout.as_secs());
            tokio::time::sleep(drain_timeout).await;
        } => {
            warn!("Shutdown timeout of {} seconds elapsed, dropping in-flight requests", drain_timeout.as_secs());
        },
    }

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::sync::oneshot;

    async fn local_listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    fn hanging_app() -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .route(
                "/hang",
                get(|| async {
                    std::future::pending::<()>().await;
                    "unreachable"
                }),
            )
    }

    #[tokio::test]
    async fn test_idle_server_stops_on_signal() {
        let (listener, addr) = local_listener().await;
        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve_with_shutdown(
            listener,
            hanging_app(),
            async move {
                rx.await.ok();
            },
            Duration::from_secs(30),
        ));

        let body = reqwest::get(format!("http://{}/ping", addr)).await.unwrap().text().await.unwrap();
        assert_eq!(body, "pong");

        let started = Instant::now();
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should stop without waiting for the drain timeout")
            .unwrap()
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_drain_is_bounded_by_timeout() {
        let (listener, addr) = local_listener().await;
        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve_with_shutdown(
            listener,
            hanging_app(),
            async move {
                rx.await.ok();
            },
            Duration::from_millis(300),
        ));

        let in_flight = tokio::spawn(reqwest::get(format!("http://{}/hang", addr)));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("a hanging request must not block shutdown past the timeout")
            .unwrap()
            .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "stopped after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5));
        in_flight.abort();
    }

    #[tokio::test]
    async fn test_new_connections_refused_after_signal() {
        let (listener, addr) = local_listener().await;
        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve_with_shutdown(
            listener,
            hanging_app(),
            async move {
                rx.await.ok();
            },
            Duration::from_secs(30),
        ));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap().unwrap();

        assert!(reqwest::get(format!("http://{}/ping", addr)).await.is_err());
    }
}
