//! WebSocket endpoints
//!
//! Three socket kinds per room and per stream:
//! - signaling: JSON offer/answer/candidate envelopes driving a peer connection
//! - viewer: the room's connection count pushed as plain text
//! - chat: text messages broadcast through the room's chat hub

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{future, stream::SplitStream, Sink, SinkExt, Stream, StreamExt, TryStreamExt};
use roomcast_sfu::{ChatHub, ChatMember, RoomId, SignalSink, SinkWriter, StreamId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, warn};

use crate::http::{AppError, AppResult, AppState};

/// Time allowed to write one message to the peer
const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed between two frames from the peer
const PONG_WAIT: Duration = Duration::from_secs(60);

/// Must be shorter than `PONG_WAIT`
const PING_PERIOD: Duration = Duration::from_secs(54);

/// Split a socket into a serialised text writer and a stream of text frames.
///
/// Non-text frames are skipped; the stream ends on close.
fn split_text(
    socket: WebSocket,
) -> (
    Arc<dyn SignalSink>,
    impl Stream<Item = Result<String, axum::Error>> + Send + Unpin,
) {
    let (sender, receiver) = socket.split();
    let sender = sender.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))));
    let inbound = receiver.try_filter_map(|message| {
        future::ready(Ok(match message {
            Message::Text(text) => Some(text.as_str().to_owned()),
            _ => None,
        }))
    });
    (Arc::new(SinkWriter::new(sender)), inbound)
}

pub async fn room_websocket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(state.server.max_message_size)
        .on_upgrade(move |socket| async move {
            let room_id = RoomId::from(id);
            info!(room_id = %room_id, "Room signaling connected");
            let (sink, inbound) = split_text(socket);
            if let Err(e) = state.manager.room_signaling(&room_id, sink, inbound).await {
                warn!(room_id = %room_id, error = %e, "Room signaling session failed");
            }
        })
}

pub async fn stream_websocket(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    ws: WebSocketUpgrade,
) -> AppResult<impl IntoResponse> {
    let stream_id = StreamId::from(sid);
    if state.manager.stream(&stream_id).is_none() {
        return Err(AppError::not_found("Stream not found"));
    }

    Ok(ws
        .max_message_size(state.server.max_message_size)
        .on_upgrade(move |socket| async move {
            info!(stream_id = %stream_id, "Stream signaling connected");
            let (sink, inbound) = split_text(socket);
            match state.manager.stream_signaling(&stream_id, sink, inbound).await {
                Ok(true) => {}
                Ok(false) => debug!(stream_id = %stream_id, "Stream vanished before upgrade"),
                Err(e) => warn!(stream_id = %stream_id, error = %e, "Stream signaling session failed"),
            }
        }))
}

pub async fn room_viewer_websocket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| viewer_session(socket, state, id))
}

pub async fn stream_viewer_websocket(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| viewer_session(socket, state, sid))
}

/// Push the connection count until either side goes away.
async fn viewer_session(socket: WebSocket, state: AppState, id: String) {
    let (sink, mut inbound) = split_text(socket);
    let drain = async { while let Some(Ok(_)) = inbound.next().await {} };

    tokio::select! {
        found = state.manager.viewer_count(&id, sink) => {
            if !found {
                debug!(id = %id, "Viewer count requested for unknown room");
            }
        }
        () = drain => {}
    }
}

pub async fn room_chat_websocket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = state.manager.room_chat(&RoomId::from(id));
    ws.max_message_size(state.manager.config().chat_max_message_size)
        .on_upgrade(move |socket| chat_session(socket, hub))
}

pub async fn stream_chat_websocket(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    ws: WebSocketUpgrade,
) -> AppResult<impl IntoResponse> {
    let hub = state
        .manager
        .stream_chat(&StreamId::from(sid))
        .ok_or_else(|| AppError::not_found("Stream not found"))?;
    Ok(ws
        .max_message_size(state.manager.config().chat_max_message_size)
        .on_upgrade(move |socket| chat_session(socket, hub)))
}

async fn chat_session(socket: WebSocket, hub: ChatHub) {
    let Some(member) = hub.join() else {
        return;
    };
    let id = member.id;
    debug!(client_id = id, "Chat client connected");

    let (sender, receiver) = socket.split();
    let mut write = tokio::spawn(write_pump(sender, member));

    let read_ended = tokio::select! {
        () = read_pump(receiver, &hub) => true,
        _ = &mut write => false,
    };

    // Closing the queue lets the write pump send a close frame.
    hub.leave(id);
    if read_ended {
        let _ = write.await;
    }
    debug!(client_id = id, "Chat client disconnected");
}

/// Forward browser messages to the hub until the socket closes or goes quiet.
async fn read_pump(mut receiver: SplitStream<WebSocket>, hub: &ChatHub) {
    loop {
        match timeout(PONG_WAIT, receiver.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                hub.broadcast(text.as_str());
            }
            Ok(Some(Ok(Message::Close(_))) | None) => return,
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => {
                debug!(error = %e, "Chat read failed");
                return;
            }
            Err(_) => {
                debug!("Chat client missed its pong deadline");
                return;
            }
        }
    }
}

/// Write hub broadcasts and keep-alive pings to the browser.
async fn write_pump<S>(mut sender: S, mut member: ChatMember)
where
    S: Sink<Message> + Unpin,
{
    let mut ping = interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);
    loop {
        let message = tokio::select! {
            next = member.recv() => match next {
                Some(text) => Message::Text(text.into()),
                None => {
                    let _ = timeout(WRITE_WAIT, sender.send(Message::Close(None))).await;
                    return;
                }
            },
            _ = ping.tick() => Message::Ping(Default::default()),
        };

        match timeout(WRITE_WAIT, sender.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    #[tokio::test]
    async fn test_write_pump_forwards_and_closes() {
        let hub = ChatHub::spawn(8);
        let member = hub.join().unwrap();
        let id = member.id;
        let (tx, mut rx) = mpsc::unbounded::<Message>();
        let pump = tokio::spawn(write_pump(tx, member));

        hub.broadcast("hello\nroom");
        match rx.next().await {
            Some(Message::Text(text)) => assert_eq!(text.as_str(), "hello room"),
            other => panic!("unexpected frame: {other:?}"),
        }

        hub.leave(id);
        assert!(matches!(rx.next().await, Some(Message::Close(None))));
        pump.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_pump_pings_idle_clients() {
        let hub = ChatHub::spawn(8);
        let member = hub.join().unwrap();
        let (tx, mut rx) = mpsc::unbounded::<Message>();
        let pump = tokio::spawn(write_pump(tx, member));

        tokio::time::sleep(PING_PERIOD + Duration::from_secs(1)).await;
        assert!(matches!(rx.next().await, Some(Message::Ping(_))));

        drop(rx);
        hub.broadcast("after close");
        pump.await.unwrap();
    }
}
