use std::sync::Arc;
use std::time::Instant;

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use futures::channel::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::websocket::protocol::ServerMessage;
use crate::websocket::registry::{ConnectionRegistry, Registration};
use crate::AppState;

/// Upgrades `GET /ws` into a relay session.
pub async fn websocket_route(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> std::result::Result<HttpResponse, Error> {
    let peer_addr = req.peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!("New WebSocket connection request from: {}", peer_addr);

    ws::start(
        RelaySession::new(state.registry.clone(), state.config.relay.clone(), peer_addr),
        &req,
        stream,
    )
}

/// One actor per websocket. It owns the connection's registration, so the
/// entry disappears from the registry however the actor ends.
pub struct RelaySession {
    registry: Arc<ConnectionRegistry>,
    relay: RelayConfig,
    peer_addr: String,
    registration: Option<Registration>,
    last_seen: Instant,
}

impl RelaySession {
    pub fn new(registry: Arc<ConnectionRegistry>, relay: RelayConfig, peer_addr: String) -> Self {
        Self {
            registry,
            relay,
            peer_addr,
            registration: None,
            last_seen: Instant::now(),
        }
    }

    fn id(&self) -> &str {
        self.registration
            .as_ref()
            .map(Registration::id)
            .unwrap_or("-")
    }

    fn start_heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(self.relay.heartbeat_interval(), |act, ctx| {
            if let Some(timeout) = act.relay.client_timeout() {
                if act.last_seen.elapsed() > timeout {
                    warn!("Client {} ({}) timed out, closing", act.id(), act.peer_addr);
                    ctx.close(Some(ws::CloseCode::Away.into()));
                    ctx.stop();
                    return;
                }
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for RelaySession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, rx) = mpsc::unbounded();

        match self.registry.register(tx) {
            Ok(registration) => {
                info!(
                    "WebSocket connection established with {} (id: {})",
                    self.peer_addr,
                    registration.id()
                );
                self.registration = Some(registration);
                // The welcome is already queued on rx.
                ctx.add_stream(rx);
                self.start_heartbeat(ctx);
            }
            Err(e) => {
                error!("Failed to register connection from {}: {}", self.peer_addr, e);
                ctx.close(Some(ws::CloseCode::Error.into()));
                ctx.stop();
            }
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(registration) = self.registration.take() {
            info!(
                "WebSocket connection closed with {} (id: {})",
                self.peer_addr,
                registration.id()
            );
        }
    }
}

/// Outbound messages queued by the registry.
impl StreamHandler<ServerMessage> for RelaySession {
    fn handle(&mut self, msg: ServerMessage, ctx: &mut Self::Context) {
        match msg.to_json() {
            Ok(json_str) => ctx.text(json_str),
            Err(e) => error!("Failed to serialize server message for {}: {}", self.id(), e),
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // Every sender is gone, so the registry no longer routes to us.
        info!("Connection {} is no longer registered, closing", self.id());
        ctx.stop();
    }
}

/// Inbound websocket frames.
impl StreamHandler<std::result::Result<ws::Message, ws::ProtocolError>> for RelaySession {
    fn handle(&mut self, msg: std::result::Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        self.last_seen = Instant::now();

        match msg {
            Ok(ws::Message::Text(text)) => {
                debug!("Received message from {}: {}", self.id(), text);
                let sender_id = self.id().to_string();
                self.registry.dispatch(&sender_id, &text);
            }
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Binary(bin)) => {
                debug!("Ignoring binary message from {} of {} bytes", self.id(), bin.len());
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed from {}: {:?}", self.peer_addr, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error handling WebSocket message from {}: {}", self.peer_addr, e);
                ctx.stop();
            }
        }
    }
}
