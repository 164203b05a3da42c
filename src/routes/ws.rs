//! WebSocket upgrade + message loop. One workflow session per connection.
//!
//! Client messages are parsed as JSON and forwarded to the session. State
//! snapshots are pushed whenever a transition applies, including the
//! delayed ones (challenge loads, verdicts), so the client never has to
//! poll while an async call is outstanding.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::protocol::{snapshot_out, ClientWsMessage, ServerWsMessage};
use crate::session::Session;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "patterngym", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn send_msg(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  if let Err(e) = socket.send(Message::Text(out)).await {
    error!(target: "patterngym", error = %e, "WS send error");
    return false;
  }
  true
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let (session_id, session) = state.open_session().await;
  let mut updates = session.subscribe();
  info!(target: "patterngym", %session_id, "WebSocket connected");

  // Initial snapshot so the client renders Idle immediately.
  let initial = ServerWsMessage::State { state: snapshot_out(&session.snapshot()) };
  if !send_msg(&mut socket, &initial).await {
    state.close_session(&session_id).await;
    return;
  }

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        match incoming {
          Some(Ok(Message::Text(txt))) => {
            let direct_reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(msg) => {
                debug!(target: "patterngym", "WS received: {:?}", &msg);
                handle_client_ws(msg, &state, &session).await
              }
              Err(e) => Some(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }),
            };
            if let Some(reply) = direct_reply {
              if !send_msg(&mut socket, &reply).await { break; }
            }
          }
          Some(Ok(Message::Ping(payload))) => { let _ = socket.send(Message::Pong(payload)).await; }
          Some(Ok(Message::Close(_))) | None => break,
          Some(Ok(_)) => {}
          Some(Err(e)) => {
            error!(target: "patterngym", error = %e, "WS receive error");
            break;
          }
        }
      }
      changed = updates.changed() => {
        if changed.is_err() { break; }
        let snap = updates.borrow_and_update().clone();
        let msg = ServerWsMessage::State { state: snapshot_out(&snap) };
        if !send_msg(&mut socket, &msg).await { break; }
      }
    }
  }

  state.close_session(&session_id).await;
  info!(target: "patterngym", %session_id, "WebSocket disconnected");
}

/// Dispatch one client message. Returns a direct reply where one is needed;
/// state-changing operations answer through the snapshot push instead.
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  session: &Arc<Session>,
) -> Option<ServerWsMessage> {
  match msg {
    ClientWsMessage::Ping => Some(ServerWsMessage::Pong),

    ClientWsMessage::NewChallenge { difficulty } => {
      tracing::info!(target: "challenge", %difficulty, "WS new_challenge requested");
      session.request_challenge(difficulty).await;
      None
    }

    ClientWsMessage::Edit { text } => match session.edit(&text).await {
      Ok(()) => None,
      Err(e) => Some(ServerWsMessage::Error { message: e.to_string() }),
    },

    ClientWsMessage::Submit => match session.submit().await {
      Ok(()) => {
        tracing::info!(target: "challenge", "WS submission dispatched");
        None
      }
      Err(e) => Some(ServerWsMessage::Error { message: e.to_string() }),
    },

    ClientWsMessage::Hint => {
      let text = state.hint(session).await;
      tracing::info!(target: "challenge", "WS hint served");
      Some(ServerWsMessage::Hint { text })
    }
  }
}
