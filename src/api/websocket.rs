use super::AppState;
use crate::core::hub::{Client, ClientConnection, Event};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Outbound half of one websocket, owned by the hub's writer task for this
/// client. Each event goes out as one JSON text frame.
struct WsConnection {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl ClientConnection for WsConnection {
    async fn send_event(&mut self, event: &Event) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event)?;
        self.sink.send(Message::Text(payload)).await?;
        Ok(())
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4().to_string();
    let (sink, mut stream) = socket.split();

    state
        .hub
        .register_client(Client::new(client_id.clone(), Box::new(WsConnection { sink })))
        .await;
    tracing::info!(client_id = %client_id, "websocket client connected");

    // The stream is broadcast-only; inbound frames are drained and ignored
    // until the peer goes away.
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.hub.unregister_client(&client_id).await;
    tracing::info!(client_id = %client_id, "websocket client disconnected");
}
