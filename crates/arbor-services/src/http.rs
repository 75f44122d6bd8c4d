//! HTTP resource service
//!
//! Serves a subtree of the resource tree:
//! - `GET /<path>`: JSON view of the node, its triples for a Description,
//!   or a link-format document for `.well-known/core`
//! - `PUT /<path>`: replace the node's value with the JSON body

use arbor_core::NodeId;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::error::ServiceError;
use crate::net;
use crate::resource::{self, Representation, WriteError};
use crate::SharedTree;

/// Running HTTP service bound to a subtree
pub struct HttpService {
    base_address: String,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl HttpService {
    /// Bind `host:port` and start serving the subtree rooted at `root`
    pub async fn start(
        tree: SharedTree,
        root: NodeId,
        host: &str,
        port: u16,
    ) -> Result<Self, ServiceError> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| ServiceError::Bind {
                scheme: "http",
                addr: format!("{}:{}", host, port),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let app = router(Arc::new(HttpState { tree, root }));

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "HTTP service failed");
            }
        });

        info!(address = %local_addr, protocol = "HTTP", "Started resource service");
        Ok(Self {
            base_address: net::base_address("http", local_addr),
            local_addr,
            task,
        })
    }

    /// `http://host:port/` as reachable by clients
    pub fn base_address(&self) -> &str {
        &self.base_address
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop serving
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

struct HttpState {
    tree: SharedTree,
    root: NodeId,
}

fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", get(get_root).put(put_root))
        .route("/{*path}", get(get_resource).put(put_resource))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

async fn get_root(State(state): State<Arc<HttpState>>) -> Response {
    read(&state, "").await
}

async fn get_resource(
    State(state): State<Arc<HttpState>>,
    Path(path): Path<String>,
) -> Response {
    read(&state, &path).await
}

async fn put_root(State(state): State<Arc<HttpState>>, Json(value): Json<Value>) -> Response {
    write(&state, "", value).await
}

async fn put_resource(
    State(state): State<Arc<HttpState>>,
    Path(path): Path<String>,
    Json(value): Json<Value>,
) -> Response {
    write(&state, &path, value).await
}

async fn read(state: &HttpState, path: &str) -> Response {
    let tree = state.tree.read().await;
    match resource::represent(&tree, state.root, path) {
        Ok(Representation::Node(view)) => Json(view).into_response(),
        Ok(Representation::Description(graph)) => Json(graph).into_response(),
        Ok(Representation::Links(doc)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/link-format")],
            doc,
        )
            .into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(ApiError::new(e.to_string()))).into_response(),
    }
}

async fn write(state: &HttpState, path: &str, value: Value) -> Response {
    let mut tree = state.tree.write().await;
    match resource::update(&mut tree, state.root, path, value) {
        Ok(()) => {
            debug!(path = %path, "Resource value updated over HTTP");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(WriteError::NotFound(e)) => {
            (StatusCode::NOT_FOUND, Json(ApiError::new(e.to_string()))).into_response()
        }
        Err(e @ WriteError::ReadOnly(_)) => (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(ApiError::new(e.to_string())),
        )
            .into_response(),
    }
}
