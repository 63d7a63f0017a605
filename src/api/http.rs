//! HTTP API Server
//!
//! Status and fault-injection endpoints for a single metadata node.

use std::sync::Arc;
use axum::{
    extract::{Path, State, Json},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::metadata::{MetadataNode, MetadataService, NodeRole};
use crate::oplog::Version;
use crate::error::{Error, Result};

/// Shared application state
pub struct AppState {
    /// The node this API reports on
    pub node: Arc<MetadataNode>,
}

/// HTTP API server
pub struct HttpServer {
    bind_address: String,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(bind_address: String, node: Arc<MetadataNode>) -> Self {
        Self {
            bind_address,
            state: Arc::new(AppState { node }),
        }
    }

    /// Create the router
    pub fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(handle_health))
            .route("/status", get(handle_status))
            .route("/files/:filename", get(handle_file))
            // Fault injection
            .route("/admin/crash", post(handle_crash))
            .route("/admin/restore", post(handle_restore))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: tokio::net::TcpListener) -> Result<()> {
        let app = Self::router(Arc::clone(&self.state));
        tracing::info!("HTTP API listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub node_id: u32,
    pub is_leader: bool,
}

/// File metadata response
#[derive(Debug, Serialize, Deserialize)]
pub struct FileResponse {
    pub filename: String,
    pub version: Version,
    pub block_hashes: Vec<String>,
    pub deleted: bool,
}

/// Admin action response
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminResponse {
    pub success: bool,
    pub crashed: bool,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============ Handlers ============

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let node = &state.node;
    Json(HealthResponse {
        healthy: !node.crashed(),
        node_id: node.id(),
        is_leader: node.role() == NodeRole::Leader,
    })
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.node.status().await)
}

async fn handle_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    if state.node.crashed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse { error: Error::NodeCrashed.to_string() }),
        )
            .into_response();
    }

    match state.node.file_record(&filename).await {
        Some(record) => Json(FileResponse {
            deleted: record.is_deleted(),
            filename: record.filename,
            version: record.version,
            block_hashes: record.block_hashes,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse { error: format!("File not found: {}", filename) }),
        )
            .into_response(),
    }
}

async fn handle_crash(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    admin_response(&state.node, state.node.crash().await)
}

async fn handle_restore(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    admin_response(&state.node, state.node.restore().await)
}

fn admin_response(node: &MetadataNode, result: Result<()>) -> axum::response::Response {
    match result {
        Ok(()) => Json(AdminResponse {
            success: true,
            crashed: node.crashed(),
        })
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: e.to_string() }),
        )
            .into_response(),
    }
}
