use crate::state::AppState;
use crate::websocket::ConnectionId;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, warn};

/// Socket endpoint for live-session chat. Identity arrives in the `join`
/// frame; the platform's auth layer hands `userId`/`userName` to the client
/// before it opens the socket.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let conn = ConnectionId::new();
    let (tx, mut rx) = unbounded_channel::<String>();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            // Outbound: frames the relay queued for this connection.
            maybe = rx.recv() => {
                match maybe {
                    Some(frame) => {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Inbound: client frames routed through the relay.
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        state.relay.handle_frame(conn, &tx, &text).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("binary chat frames are not supported");
                    }
                    // Ping/pong is answered by the framework.
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(error = %e, "chat socket errored");
                        break;
                    }
                }
            }
        }
    }

    // Abrupt close and explicit close land here alike.
    state.relay.disconnect(conn).await;
}
