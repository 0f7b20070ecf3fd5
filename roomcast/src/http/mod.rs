// Module: http
// JSON API and WebSocket endpoints

pub mod error;
pub mod health;
pub mod room;
pub mod stream;
pub mod websocket;

use axum::{
    http::{header, HeaderMap},
    routing::get,
    Router,
};
use roomcast_sfu::SfuManager;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SfuManager>,
    pub server: Arc<ServerConfig>,
}

impl AppState {
    /// Base URLs (`ws(s)://host`, `http(s)://host`) as seen by the caller.
    fn base_urls(&self, headers: &HeaderMap) -> (String, String) {
        let host = headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map_or_else(
                || format!("{}:{}", self.server.host, self.server.port),
                str::to_string,
            );
        if self.server.secure_websocket {
            (format!("wss://{host}"), format!("https://{host}"))
        } else {
            (format!("ws://{host}"), format!("http://{host}"))
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .merge(health::create_health_router())
        .route("/api/room/create", get(room::create_room))
        .route("/api/room/{id}", get(room::room_info))
        .route("/api/stream/{sid}", get(stream::stream_info))
        .route("/room/{id}/websocket", get(websocket::room_websocket))
        .route("/room/{id}/chat/websocket", get(websocket::room_chat_websocket))
        .route("/room/{id}/viewer/websocket", get(websocket::room_viewer_websocket))
        .route("/stream/{sid}/websocket", get(websocket::stream_websocket))
        .route("/stream/{sid}/chat/websocket", get(websocket::stream_chat_websocket))
        .route("/stream/{sid}/viewer/websocket", get(websocket::stream_viewer_websocket));

    // Apply layers before state
    let router = router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    router.with_state(state)
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_support::state());
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_base_urls_follow_host_header_and_scheme() {
        let mut state = test_support::state();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "example.com".parse().unwrap());
        assert_eq!(
            state.base_urls(&headers),
            ("ws://example.com".to_string(), "http://example.com".to_string())
        );

        state.server = Arc::new(ServerConfig {
            secure_websocket: true,
            ..ServerConfig::default()
        });
        assert_eq!(state.base_urls(&headers).0, "wss://example.com");
        assert_eq!(state.base_urls(&HeaderMap::new()).1, "https://0.0.0.0:8080");
    }
}
