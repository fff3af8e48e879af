use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::auth::{jwt, AuthError};
use crate::config::AuthConfig;
use crate::error::{ErrorKind, RoomError};
use crate::room_sync::{ClientMessage, ServerMessage};
use crate::session::{forward_events, RoomChannel, SessionRegistry};

const OUTBOUND_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

pub async fn room_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(registry): State<Arc<SessionRegistry>>,
    State(auth): State<AuthConfig>,
) -> Result<impl IntoResponse, AuthError> {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;
    let user_id = jwt::verify_token(&token, &auth.jwt_secret)?;
    let connection_id = format!("conn-{}", uuid::Uuid::new_v4());

    log::info!("Client {} ({}) connecting", connection_id, user_id);
    Ok(ws.on_upgrade(move |socket| handle_room_socket(socket, registry, user_id, connection_id)))
}

async fn handle_room_socket(
    socket: WebSocket,
    registry: Arc<SessionRegistry>,
    user_id: String,
    connection_id: String,
) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);

    // task for writing to this client; everything outbound funnels through it
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => log::error!("Failed to serialize outbound message: {}", e),
            }
        }
    });

    let mut connection = RoomConnection::new(registry, user_id.clone(), connection_id.clone(), out_tx);
    loop {
        tokio::select! {
            _ = (&mut send_task) => break,
            incoming = receiver.next() => {
                let Some(Ok(msg)) = incoming else {
                    break;
                };
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => connection.dispatch(message).await,
                        Err(e) => {
                            log::warn!("Failed to parse message from {}: {}", connection_id, e);
                            connection.reply(ServerMessage::error("Unrecognized message")).await;
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    // cleanup: announce the departure, membership is kept
    connection.disconnect().await;
    send_task.abort();

    log::info!("Client {} ({}) disconnected", connection_id, user_id);
}

struct JoinedRoom {
    code: String,
    channel: RoomChannel,
    forwarder: JoinHandle<()>,
}

/// Per-connection dispatcher. Knows which room the socket has joined and
/// turns inbound messages into registry calls; failures go back to this
/// connection only.
pub(crate) struct RoomConnection {
    registry: Arc<SessionRegistry>,
    user_id: String,
    connection_id: String,
    out: mpsc::Sender<ServerMessage>,
    joined: Option<JoinedRoom>,
}

impl RoomConnection {
    pub(crate) fn new(
        registry: Arc<SessionRegistry>,
        user_id: String,
        connection_id: String,
        out: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            registry,
            user_id,
            connection_id,
            out,
            joined: None,
        }
    }

    pub(crate) async fn dispatch(&mut self, message: ClientMessage) {
        if let Err(e) = self.handle(message).await {
            match e.kind() {
                ErrorKind::Forbidden => {
                    log::warn!("{} refused for {}: {}", self.user_id, self.connection_id, e)
                }
                _ => log::debug!("Rejected message from {}: {}", self.connection_id, e),
            }
            self.reply(ServerMessage::error(e)).await;
        }
    }

    async fn reply(&self, message: ServerMessage) {
        if self.out.send(message).await.is_err() {
            log::debug!("Outbound queue for {} is closed", self.connection_id);
        }
    }

    fn joined(&self) -> Result<&JoinedRoom, RoomError> {
        self.joined
            .as_ref()
            .ok_or_else(|| RoomError::InvalidState("join a room first".to_string()))
    }

    async fn handle(&mut self, message: ClientMessage) -> Result<(), RoomError> {
        let message = match message.into_draw_event() {
            Ok(event) => {
                let room = self.joined()?;
                room.channel.relay_draw(&self.connection_id, &self.user_id, event);
                return Ok(());
            }
            Err(other) => other,
        };

        match message {
            ClientMessage::JoinRoom { room_code, user_id } => {
                if user_id != self.user_id {
                    return Err(RoomError::Unauthorized);
                }
                self.join(&room_code).await
            }
            ClientMessage::SaveDrawing { image_data } => {
                let code = self.joined()?.code.clone();
                self.registry
                    .save_drawing(&code, &self.user_id, &self.connection_id, image_data)
                    .await
            }
            ClientMessage::StartTimer => {
                let code = self.joined()?.code.clone();
                self.registry.start_timer(&code, &self.user_id).await.map(|_| ())
            }
            ClientMessage::FinishRoom => {
                let code = self.joined()?.code.clone();
                self.registry.finish_room(&code, &self.user_id).await
            }
            ClientMessage::SubmitRating {
                target_user_id,
                rating,
            } => {
                // the ranking reaches this connection through the room broadcast
                let code = self.joined()?.code.clone();
                self.registry
                    .submit_rating(&code, &self.user_id, &target_user_id, rating)
                    .await
                    .map(|_| ())
            }
            ClientMessage::CopyDrawing { source_user_id } => {
                let code = self.joined()?.code.clone();
                let copied = self
                    .registry
                    .copy_drawing(&code, &self.user_id, &source_user_id)
                    .await?;
                self.reply(copied).await;
                Ok(())
            }
            ClientMessage::Ping => {
                self.reply(ServerMessage::Pong).await;
                Ok(())
            }
            // relayed above
            ClientMessage::DrawStart { .. } | ClientMessage::DrawMove { .. } | ClientMessage::DrawEnd => {
                Ok(())
            }
        }
    }

    async fn join(&mut self, room_code: &str) -> Result<(), RoomError> {
        let admission = self
            .registry
            .admit(room_code, &self.user_id, &self.connection_id)
            .await?;

        // a socket follows one room at a time
        if let Some(previous) = self.joined.take() {
            previous.forwarder.abort();
            if previous.code != admission.code {
                self.registry
                    .leave(&previous.code, &self.user_id, &self.connection_id)
                    .await;
            }
        }

        self.reply(admission.state).await;
        let forwarder = tokio::spawn(forward_events(
            Arc::downgrade(&self.registry),
            admission.code.clone(),
            admission.events,
            self.connection_id.clone(),
            self.out.clone(),
        ));
        self.joined = Some(JoinedRoom {
            code: admission.code,
            channel: admission.channel,
            forwarder,
        });
        Ok(())
    }

    pub(crate) async fn disconnect(&mut self) {
        if let Some(room) = self.joined.take() {
            room.forwarder.abort();
            self.registry
                .leave(&room.code, &self.user_id, &self.connection_id)
                .await;
        }
    }
}
