use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use tutor_types::auth::{Claims, verify_token};
use tutor_types::channel::authorize;
use tutor_types::events::{GatewayCommand, GatewayFrame, RelayEvent};

use crate::publisher::Publisher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long an unauthenticated socket may take to send `Identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Subscriptions = Arc<RwLock<HashSet<String>>>;

/// Handle a socket whose token was already checked at the HTTP upgrade.
pub async fn handle_connection_authenticated(socket: WebSocket, publisher: Publisher, claims: Claims) {
    let (sender, receiver) = socket.split();
    info!("{} ({} {}) connected to gateway (pre-authenticated)", claims.name, claims.role, claims.sub);
    run_connection_loop(sender, receiver, publisher, claims).await;
}

/// Handle a socket that authenticates with an `Identify` command.
pub async fn handle_connection(socket: WebSocket, publisher: Publisher, jwt_secret: String) {
    let (sender, mut receiver) = socket.split();

    let claims = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(claims) => claims,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({} {}) connected to gateway", claims.name, claims.role, claims.sub);
    run_connection_loop(sender, receiver, publisher, claims).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    publisher: Publisher,
    claims: Claims,
) {
    let ready = GatewayFrame::Ready {
        user_id: claims.sub,
        role: claims.role,
    };
    if !send_frame(&mut sender, &ready).await {
        return;
    }

    let user_id = claims.sub;
    let mut broadcast_rx = publisher.dispatcher().subscribe();

    // Per-connection channel subscriptions (shared between send and recv tasks)
    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    // Subscribe acks flow from the recv task to the socket writer
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<GatewayFrame>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Gateway session of {} lagged by {} events", user_id, n);
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };

                    let subscribed = send_subscriptions
                        .read()
                        .unwrap_or_else(|e| e.into_inner())
                        .contains(&*msg.channel);
                    if !subscribed {
                        continue;
                    }

                    // Don't echo typing back to the typist
                    if let RelayEvent::Typing { user_id: typist, .. } = &msg.event {
                        if *typist == user_id {
                            continue;
                        }
                    }

                    let frame = GatewayFrame::Event {
                        channel: msg.channel.to_string(),
                        payload: msg.event,
                    };
                    if !send_frame(&mut sender, &frame).await {
                        break;
                    }
                }
                reply = reply_rx.recv() => {
                    let Some(frame) = reply else { break };
                    if !send_frame(&mut sender, &frame).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_claims = claims.clone();
    let recv_publisher = publisher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&recv_publisher, &recv_claims, cmd, &subscriptions, &reply_tx);
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_claims.name,
                            recv_claims.sub,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} ({}) disconnected from gateway", claims.name, claims.sub);
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, jwt_secret: &str) -> Option<Claims> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(&text) {
                    return verify_token(&token, jwt_secret).ok();
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

/// Apply one client command. Subscription requests are answered on `replies`.
fn handle_command(
    publisher: &Publisher,
    claims: &Claims,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
    replies: &mpsc::UnboundedSender<GatewayFrame>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { channel } => {
            let reply = match authorize(&channel, claims.sub) {
                Ok(_) => {
                    info!("{} ({}) subscribed to {}", claims.name, claims.sub, channel);
                    subscriptions
                        .write()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(channel.clone());
                    GatewayFrame::Subscribed { channel }
                }
                Err(reason) => {
                    warn!("{} ({}) refused subscription to {}: {}", claims.name, claims.sub, channel, reason);
                    GatewayFrame::SubscriptionError {
                        channel,
                        reason: reason.to_string(),
                    }
                }
            };
            let _ = replies.send(reply);
        }

        GatewayCommand::Unsubscribe { channel } => {
            let removed = subscriptions
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&channel);
            if removed {
                info!("{} ({}) unsubscribed from {}", claims.name, claims.sub, channel);
            }
        }

        GatewayCommand::StartTyping { channel } => {
            let subscribed = subscriptions
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .contains(&channel);
            if !subscribed {
                warn!("{} ({}) typing on unsubscribed channel {}", claims.name, claims.sub, channel);
                return;
            }
            // Typing is a client event: local fan-out only, never sent to the hosted relay
            publisher.dispatcher().publish(
                &channel,
                RelayEvent::Typing {
                    user_id: claims.sub,
                    role: claims.role,
                },
            );
        }
    }
}

async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &GatewayFrame) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode gateway frame: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
