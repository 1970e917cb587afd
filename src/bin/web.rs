//! Reasoning Chain HTTP 入口
//!
//! 启动: cargo run --bin reasoning-web --features web
//!
//! - `POST /api/reasoning`：请求 `{query, context?, mode?}`，返回 full / compact / failure 响应
//! - `POST /api/reasoning/stream`：SSE，逐条推送链执行事件，最后一条 `result` 事件为完整响应
//! - `GET /api/tools`：已注册工具及参数 Schema
//! - `GET /api/health`

#![cfg(feature = "web")]

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

use reasoning_chain::chain::EventSink;
use reasoning_chain::config::load_config;
use reasoning_chain::core::{ReasoningOrchestrator, ReasoningRequest, ReasoningResponse, ShutdownManager};
use reasoning_chain::observability;

struct AppState {
    orchestrator: ReasoningOrchestrator,
    shutdown: Arc<ShutdownManager>,
}

fn status_for(response: &ReasoningResponse) -> StatusCode {
    match response {
        ReasoningResponse::Failure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    }
}

/// POST /api/reasoning；客户端断开时 handler future 被丢弃，链随之取消
async fn api_reasoning(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReasoningRequest>,
) -> Response {
    let response = state
        .orchestrator
        .handle(req, state.shutdown.child_token())
        .await;
    (status_for(&response), Json(response)).into_response()
}

/// POST /api/reasoning/stream
async fn api_reasoning_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReasoningRequest>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let token = state.shutdown.child_token();
    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    let run_state = Arc::clone(&state);
    let run_token = token.clone();
    tokio::spawn(async move {
        let (sink, mut events) = EventSink::channel();
        let run = run_state.orchestrator.run(req.into_query(), run_token, sink);
        tokio::pin!(run);

        let result = loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    if let Ok(data) = serde_json::to_string(&event) {
                        let _ = tx.send(Event::default().event("chain").data(data));
                    }
                }
                result = &mut run => break result,
            }
        };
        while let Ok(event) = events.try_recv() {
            if let Ok(data) = serde_json::to_string(&event) {
                let _ = tx.send(Event::default().event("chain").data(data));
            }
        }

        let response = match result {
            Ok(run) => ReasoningResponse::from_run(&run),
            Err(e) => ReasoningResponse::failure(e.to_string()),
        };
        if let Ok(data) = serde_json::to_string(&response) {
            let _ = tx.send(Event::default().event("result").data(data));
        }
    });

    // 流被丢弃（客户端断开）时取消链
    let guard: DropGuard = token.drop_guard();
    let event_stream = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        rx.recv().await.map(|event| (Ok(event), (rx, guard)))
    });

    Sse::new(event_stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    )
}

/// GET /api/tools
async fn api_tools(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        state.orchestrator.registry().to_schema_json(),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let orchestrator = ReasoningOrchestrator::from_config(&cfg).context("Failed to build orchestrator")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let state = Arc::new(AppState {
        orchestrator,
        shutdown: Arc::clone(&shutdown),
    });

    let app = Router::new()
        .route("/api/reasoning", post(api_reasoning))
        .route("/api/reasoning/stream", post(api_reasoning_stream))
        .route("/api/tools", get(api_tools))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(state);

    let addr = std::env::var("REASONING_WEB_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    tracing::info!("Reasoning web listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
        .await?;

    Ok(())
}
