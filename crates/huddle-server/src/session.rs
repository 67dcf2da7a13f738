use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use huddle_bridge::decode_inline_image;
use huddle_core::{ChatEvent, EventParseError, PresenceStatus};

use crate::server::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Drive one WebSocket connection through its session: join the room,
/// announce the participant, relay events one at a time, clean up once.
pub async fn run(socket: WebSocket, state: AppState, room: String, username: String) {
    let (conn_id, rx) = state.registry.join(&room, &username);
    tracing::info!(conn = %conn_id, room = %room, username = %username, "participant joined");

    state.broadcaster.deliver(
        &room,
        &ChatEvent::Status {
            user: username.clone(),
            status: PresenceStatus::Online,
            last_seen: None,
        },
        Some(&username),
    );

    let (ws_tx, ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(ws_tx, rx));

    tokio::select! {
        // The writer ends when the socket dies or this session was evicted
        // by a rejoin (its send queue closes).
        _ = &mut writer => {}
        _ = read_loop(ws_rx, &state, &room, &username) => {
            writer.abort();
        }
    }

    // Runs exactly once per connection, whichever side ended first. The
    // offline announcement is gated on actual removal: an evicted session's
    // late disconnect must not mark the newer session offline.
    if let Some(last_seen) = state.registry.leave(&room, &conn_id) {
        state.broadcaster.deliver(
            &room,
            &ChatEvent::Status {
                user: username.clone(),
                status: PresenceStatus::Offline,
                last_seen: Some(last_seen),
            },
            Some(&username),
        );
    }
    tracing::info!(conn = %conn_id, room = %room, username = %username, "participant left");
}

/// Drain the member's send queue into the socket, pinging on an interval so
/// idle connections survive intermediaries.
async fn write_loop(mut ws_tx: SplitSink<WebSocket, WsMessage>, mut rx: mpsc::Receiver<String>) {
    let mut ping = tokio::time::interval(HEARTBEAT_INTERVAL);
    ping.tick().await; // consume first immediate tick

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(text) => {
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = ping.tick() => {
                if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Receive frames until the transport closes or a frame is malformed.
async fn read_loop(mut ws_rx: SplitStream<WebSocket>, state: &AppState, room: &str, username: &str) {
    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            WsMessage::Text(text) => {
                if let Err(e) = dispatch(state, room, username, text.as_str()).await {
                    tracing::warn!(
                        room = %room,
                        username = %username,
                        error = %e,
                        "protocol error, closing session"
                    );
                    break;
                }
            }
            WsMessage::Close(_) => break,
            // axum answers pings itself; pongs and binary frames carry nothing
            _ => {}
        }
    }
}

/// Route one inbound event. An unknown tag is ignored; a malformed frame is
/// the session's end.
async fn dispatch(
    state: &AppState,
    room: &str,
    username: &str,
    raw: &str,
) -> Result<(), EventParseError> {
    let Some(event) = ChatEvent::parse(raw)? else {
        tracing::debug!(room = %room, username = %username, "ignoring unrecognized event tag");
        return Ok(());
    };

    match &event {
        ChatEvent::Message { text, .. } => {
            state.broadcaster.deliver(room, &event, Some(username));
            state.forwarder.forward_text(text).await;
        }
        ChatEvent::Typing => {
            state.broadcaster.deliver(room, &ChatEvent::Typing, Some(username));
        }
        ChatEvent::Reaction { .. } | ChatEvent::Read { .. } => {
            state.broadcaster.deliver(room, &event, Some(username));
        }
        ChatEvent::Image { url, .. } => {
            state.broadcaster.deliver(room, &event, Some(username));
            if let Some(image) = decode_inline_image(url) {
                state.forwarder.forward_image(image).await;
            }
        }
        // Server-originated only; a client that sends one gets nothing back.
        ChatEvent::Status { .. } => {}
    }
    Ok(())
}
