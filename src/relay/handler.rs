//! Endpoint WebSocket del relay
//!
//! Cada socket se parte en lector y escritor. El escritor drena la cola de
//! salida de la sesión; el lector entrega los frames de texto al `Relay`.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use super::{Outbound, Relay};
use crate::state::AppState;

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let relay = state.relay.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

async fn handle_socket(socket: WebSocket, relay: Relay) {
    let (mut sink, mut stream) = socket.split();
    let (conn, mut outbox) = relay.connect().await;

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Err(e) = relay.handle_text(conn, &text).await {
                    relay.reject(conn, &e).await;
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            // Binary/Ping/Pong: axum responde los ping por su cuenta
            Ok(_) => {}
            Err(e) => {
                debug!("🔌 Error leyendo del socket {}: {}", conn, e);
                break;
            }
        }
    }

    relay.disconnect(conn).await;
    let _ = writer.await;
}
