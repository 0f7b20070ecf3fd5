//! Room endpoints

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Redirect,
    Json,
};
use roomcast_sfu::{RoomId, StreamId};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::http::AppState;

#[derive(Debug, Serialize)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub stream_id: StreamId,
    pub room_websocket_url: String,
    pub chat_websocket_url: String,
    pub viewer_websocket_url: String,
    pub stream_link: String,
    pub connections: usize,
}

/// Create a room with a random id and send the browser to it.
pub async fn create_room() -> Redirect {
    let id = Uuid::new_v4();
    info!(room_id = %id, "Room requested");
    Redirect::to(&format!("/room/{id}"))
}

/// Join (creating on demand) and describe a room.
pub async fn room_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Json<RoomInfo> {
    let (room_id, stream_id) = state.manager.join_room(&RoomId::from(id));
    let connections = state
        .manager
        .room_stats(&room_id)
        .map_or(0, |stats| stats.connections);
    let (ws, http) = state.base_urls(&headers);

    Json(RoomInfo {
        room_websocket_url: format!("{ws}/room/{room_id}/websocket"),
        chat_websocket_url: format!("{ws}/room/{room_id}/chat/websocket"),
        viewer_websocket_url: format!("{ws}/room/{room_id}/viewer/websocket"),
        stream_link: format!("{http}/stream/{stream_id}"),
        room_id,
        stream_id,
        connections,
    })
}

#[cfg(test)]
mod tests {
    use crate::http::{create_router, test_support};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use roomcast_sfu::{RoomId, StreamId};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_create_room_redirects() {
        let app = create_router(test_support::state());
        let response = app
            .oneshot(Request::get("/api/room/create").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("/room/"));
        assert_eq!(location.len(), "/room/".len() + 36);
    }

    #[tokio::test]
    async fn test_room_info_creates_room() {
        let state = test_support::state();
        let app = create_router(state.clone());
        let response = app
            .oneshot(
                Request::get("/api/room/lobby")
                    .header(header::HOST, "sfu.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let stream_id = StreamId::derive(&RoomId::from("lobby"));
        assert_eq!(json["room_id"], "lobby");
        assert_eq!(json["stream_id"], stream_id.as_str());
        assert_eq!(json["room_websocket_url"], "ws://sfu.test/room/lobby/websocket");
        assert_eq!(json["stream_link"], format!("http://sfu.test/stream/{stream_id}"));
        assert_eq!(json["connections"], 0);
        assert!(state.manager.stream(&stream_id).is_some());
    }
}
