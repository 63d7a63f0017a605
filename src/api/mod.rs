//! HTTP API Module
//!
//! Provides a REST API for node status and fault injection.

mod http;

pub use http::{HttpServer, AppState, HealthResponse, FileResponse, AdminResponse};
