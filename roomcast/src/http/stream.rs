//! Stream (broadcast alias) endpoints

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use roomcast_sfu::StreamId;
use serde::Serialize;

use crate::http::{AppError, AppResult, AppState};

#[derive(Debug, Serialize)]
pub struct StreamInfo {
    pub stream_id: StreamId,
    pub stream_websocket_url: String,
    pub chat_websocket_url: String,
    pub viewer_websocket_url: String,
    pub connections: usize,
}

pub async fn stream_info(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<StreamInfo>> {
    let stream_id = StreamId::from(sid);
    let room = state
        .manager
        .stream(&stream_id)
        .ok_or_else(|| AppError::not_found("Stream not found"))?;
    let (ws, _) = state.base_urls(&headers);

    Ok(Json(StreamInfo {
        stream_websocket_url: format!("{ws}/stream/{stream_id}/websocket"),
        chat_websocket_url: format!("{ws}/stream/{stream_id}/chat/websocket"),
        viewer_websocket_url: format!("{ws}/stream/{stream_id}/viewer/websocket"),
        connections: room.peers.connection_count(),
        stream_id,
    }))
}
