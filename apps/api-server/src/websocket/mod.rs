//! WebSocket handlers using socketioxide.

mod guard;

pub use guard::{Admission, ConnectionGuard, DropReason, MessageVerdict, WsLimits, WsRateLimiter};

use socketioxide::{
    SocketIo,
    extract::{Data, SocketRef},
};
use std::net::SocketAddr;
use std::sync::Arc;

use ratekeeper_shared::ApiResponse;

use crate::middleware::resolve_client_ip;

/// Shared state for WebSocket handlers.
#[derive(Clone)]
pub struct WsState {
    pub rate_limiter: Arc<WsRateLimiter>,
}

/// Client IP of a handshake.
///
/// Falls back to the peer address when the host stores it as a
/// `SocketAddr` in the request extensions.
fn handshake_ip(socket: &SocketRef) -> Option<String> {
    let parts = socket.req_parts();
    resolve_client_ip(
        |name| parts.headers.get(name).and_then(|value| value.to_str().ok()),
        parts.extensions.get::<SocketAddr>().map(|addr| addr.ip()),
    )
}

/// Apply the connection's message limits. Returns whether to handle the message.
fn accept_message(socket: &SocketRef, guard: &ConnectionGuard, size: usize) -> bool {
    match guard.check_message(size) {
        MessageVerdict::Accept => true,
        MessageVerdict::Drop(reason) => {
            tracing::debug!(socket_id = %socket.id, reason = ?reason, "Dropped WebSocket message");
            false
        }
        MessageVerdict::Close(reason) => {
            tracing::warn!(socket_id = %socket.id, reason = ?reason, "Closing WebSocket after repeated violations");
            socket.clone().disconnect().ok();
            false
        }
    }
}

/// Configure WebSocket handlers.
pub fn configure_socket_handlers(io: SocketIo, state: WsState) {
    io.ns("/", move |socket: SocketRef| {
        let state = state.clone();
        async move {
            let socket_id = socket.id.to_string();
            let ip = handshake_ip(&socket);

            if let Admission::Refused { retry_after } =
                state.rate_limiter.admit(ip.as_deref()).await
            {
                socket
                    .emit(
                        "rate_limited",
                        &ApiResponse::failure(format!(
                            "Too many connections, retry in {} seconds",
                            retry_after
                        )),
                    )
                    .ok();
                socket.disconnect().ok();
                return;
            }

            tracing::info!(socket_id = %socket_id, ip = ?ip, "Client connected");
            let guard = Arc::new(state.rate_limiter.connection_guard());

            // Handle join room
            let join_guard = guard.clone();
            socket.on("join", move |socket: SocketRef, Data::<String>(room)| {
                let guard = join_guard.clone();
                async move {
                    if !accept_message(&socket, &guard, room.len()) {
                        return;
                    }
                    socket.join(room.clone()).ok();
                    tracing::info!(socket_id = %socket.id, room = %room, "Client joined room");
                    socket.emit("joined", &room).ok();
                }
            });

            // Handle leave room
            let leave_guard = guard.clone();
            socket.on("leave", move |socket: SocketRef, Data::<String>(room)| {
                let guard = leave_guard.clone();
                async move {
                    if !accept_message(&socket, &guard, room.len()) {
                        return;
                    }
                    socket.leave(room.clone()).ok();
                    tracing::info!(socket_id = %socket.id, room = %room, "Client left room");
                }
            });

            // Handle broadcast to room
            let broadcast_guard = guard.clone();
            socket.on(
                "broadcast",
                move |socket: SocketRef, Data::<(String, serde_json::Value)>(data)| {
                    let guard = broadcast_guard.clone();
                    async move {
                        let (room, message) = data;
                        let size = room.len() + message.to_string().len();
                        if !accept_message(&socket, &guard, size) {
                            return;
                        }
                        tracing::debug!(socket_id = %socket.id, room = %room, "Broadcasting to room");
                        socket.to(room).emit("message", &message).ok();
                    }
                },
            );

            // Handle disconnect
            socket.on_disconnect(|socket: SocketRef| async move {
                tracing::info!(socket_id = %socket.id, "Client disconnected");
            });
        }
    });
}

/// Create SocketIO layer for integration with a tower-based HTTP stack.
pub fn create_socketio_layer(state: WsState) -> (socketioxide::layer::SocketIoLayer, SocketIo) {
    let max_payload = state.rate_limiter.limits().max_message_bytes as u64;
    let (layer, io) = SocketIo::builder().max_payload(max_payload.saturating_mul(2)).build_layer();
    configure_socket_handlers(io.clone(), state);
    (layer, io)
}
