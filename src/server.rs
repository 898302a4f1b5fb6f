//! 只读 HTTP 接口
//!
//! - `GET /messages[?tz=Zone]`：按时间升序返回缓冲区快照
//! - `GET /health`：存活检查，附带缓冲区条数和预热状态

use crate::snapshot::{DisplayMessage, DisplayZone, SnapshotReader};
use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

/// 路由共享状态
#[derive(Debug, Clone)]
pub struct AppState {
    pub reader: SnapshotReader,
    /// 未指定 `tz` 时使用的展示时区
    pub zone: DisplayZone,
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    tz: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    messages: usize,
    all_warm: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// 构建路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/messages", get(list_messages))
        .route("/health", get(health))
        .with_state(state)
}

async fn list_messages(State(state): State<AppState>, Query(query): Query<MessagesQuery>) -> Response {
    let zone = match query.tz.as_deref() {
        Some(tz) => match tz.parse::<DisplayZone>() {
            Ok(zone) => zone,
            Err(error) => return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response(),
        },
        None => state.zone,
    };
    let messages: Vec<DisplayMessage> = state.reader.read(zone);
    Json(messages).into_response()
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        messages: state.reader.len(),
        all_warm: state.reader.all_warm(),
    })
}

/// 绑定地址并提供服务，直到 `shutdown` 完成
pub async fn serve<F>(addr: &str, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %listener.local_addr()?, "Read API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("read API server error")
}
