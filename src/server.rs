//! Echo HTTP server for upprobe
//!
//! A small axum server standing in for an echo-style upload endpoint, so both
//! transports can be exercised without network access.

use crate::error::{Result as UploadResult, UploadError};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Echo response for an accepted upload
#[derive(Debug, Serialize)]
pub struct EchoResponse {
    /// Number of body bytes received
    pub bytes_received: u64,

    /// Request content type, including the multipart boundary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Server capabilities response
#[derive(Debug, Serialize)]
pub struct ServerInfoResponse {
    /// Server version
    pub version: &'static str,

    /// Available endpoints
    pub endpoints: Vec<EndpointInfo>,
}

/// Endpoint information
#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

impl EndpointInfo {
    fn new(method: &str, path: &str, description: &str) -> Self {
        Self {
            path: path.to_string(),
            method: method.to_string(),
            description: description.to_string(),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Optional error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "upprobe",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn endpoints() -> Vec<EndpointInfo> {
    vec![
        EndpointInfo::new("GET", "/health", "Health check endpoint"),
        EndpointInfo::new("GET", "/info", "Server information and available endpoints"),
        EndpointInfo::new("POST", "/post", "Accept an upload and echo its size"),
        EndpointInfo::new(
            "POST",
            "/status/:code",
            "Accept an upload and reply with the given status code",
        ),
    ]
}

/// Server info handler
async fn server_info() -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        version: env!("CARGO_PKG_VERSION"),
        endpoints: endpoints(),
    })
}

/// Read the request body to the end, counting bytes
async fn drain(body: Body) -> std::result::Result<u64, ErrorResponse> {
    let mut stream = body.into_data_stream();
    let mut received = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ErrorResponse {
            error: format!("Failed to read request body: {}", e),
            code: Some("body_error".to_string()),
        })?;
        received += chunk.len() as u64;
    }

    Ok(received)
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Echo handler
async fn echo_handler(
    headers: HeaderMap,
    body: Body,
) -> std::result::Result<Json<EchoResponse>, ErrorResponse> {
    let bytes_received = drain(body).await?;
    tracing::debug!("Echo endpoint received {} bytes", bytes_received);

    Ok(Json(EchoResponse {
        bytes_received,
        content_type: content_type(&headers),
    }))
}

/// Fixed-status handler
async fn status_handler(
    Path(code): Path<u16>,
    headers: HeaderMap,
    body: Body,
) -> std::result::Result<Response, ErrorResponse> {
    let status = StatusCode::from_u16(code).map_err(|_| ErrorResponse {
        error: format!("Invalid status code: {}", code),
        code: Some("invalid_status".to_string()),
    })?;

    let bytes_received = drain(body).await?;
    tracing::debug!("Status endpoint received {} bytes, replying {}", bytes_received, code);

    let echo = EchoResponse {
        bytes_received,
        content_type: content_type(&headers),
    };
    Ok((status, Json(echo)).into_response())
}

/// Create the echo router
pub fn create_router() -> Router {
    // Enable CORS for all origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/post", post(echo_handler))
        .route("/status/:code", post(status_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
}

/// Serve the echo router on an already bound listener
pub async fn serve(listener: TcpListener) -> UploadResult<()> {
    axum::serve(listener, create_router())
        .await
        .map_err(UploadError::Io)
}

/// Run the server
pub async fn run_server(config: ServerConfig) -> UploadResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.map_err(UploadError::Io)?;

    tracing::info!("upprobe echo server listening on http://{}", addr);
    tracing::info!("Available endpoints:");
    for endpoint in endpoints() {
        tracing::info!("  {:<4} {:<13} - {}", endpoint.method, endpoint.path, endpoint.description);
    }

    serve(listener).await
}
