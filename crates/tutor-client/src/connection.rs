use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use tutor_types::events::{GatewayCommand, GatewayFrame, RelayEvent};

use crate::error::ClientError;

/// How long to wait for `ready` and for each subscription ack.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Callback invoked once per event delivered on a subscribed channel.
pub type EventHandler = Arc<dyn Fn(RelayEvent) + Send + Sync>;

/// Subscription socket to the gateway.
///
/// Connects lazily on the first `subscribe` and stays up until `disconnect`
/// or until the server drops it. After a drop the next `subscribe` opens a
/// fresh socket; earlier subscriptions are not restored and events published
/// in between are not replayed, so callers should re-fetch history.
pub struct RelayConnection {
    url: String,
    token: String,
    session: tokio::sync::Mutex<Option<Session>>,
}

struct Session {
    commands: mpsc::UnboundedSender<GatewayCommand>,
    shared: Arc<SessionShared>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct SessionShared {
    handlers: Mutex<HashMap<String, EventHandler>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Result<(), String>>>>,
}

impl RelayConnection {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }

    /// Subscribe to `channel` and wait for the server to accept it.
    pub async fn subscribe<F>(&self, channel: &str, on_event: F) -> Result<(), ClientError>
    where
        F: Fn(RelayEvent) + Send + Sync + 'static,
    {
        let (ack_tx, ack_rx) = oneshot::channel();
        let shared = {
            let mut slot = self.session.lock().await;
            let session = self.ensure_session(&mut slot).await?;
            lock(&session.shared.pending).insert(channel.to_string(), ack_tx);
            lock(&session.shared.handlers).insert(channel.to_string(), Arc::new(on_event));
            session
                .commands
                .send(GatewayCommand::Subscribe {
                    channel: channel.to_string(),
                })
                .map_err(|_| ClientError::Disconnected)?;
            session.shared.clone()
        };

        let outcome = match tokio::time::timeout(HANDSHAKE_TIMEOUT, ack_rx).await {
            Ok(Ok(Ok(()))) => return Ok(()),
            Ok(Ok(Err(reason))) => ClientError::Subscription {
                channel: channel.to_string(),
                reason,
            },
            Ok(Err(_)) => ClientError::Disconnected,
            Err(_) => ClientError::Timeout,
        };

        lock(&shared.handlers).remove(channel);
        lock(&shared.pending).remove(channel);
        Err(outcome)
    }

    pub async fn unsubscribe(&self, channel: &str) {
        let slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            lock(&session.shared.handlers).remove(channel);
            let _ = session.commands.send(GatewayCommand::Unsubscribe {
                channel: channel.to_string(),
            });
        }
    }

    /// Tell the peer we are typing. No-op when not connected.
    pub async fn start_typing(&self, channel: &str) {
        let slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            let _ = session.commands.send(GatewayCommand::StartTyping {
                channel: channel.to_string(),
            });
        }
    }

    /// Tear the session down. Handlers are dropped and no further events arrive.
    pub async fn disconnect(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.task.abort();
            info!("Gateway session closed");
        }
    }

    async fn ensure_session<'a>(&self, slot: &'a mut Option<Session>) -> Result<&'a Session, ClientError> {
        let alive = slot.as_ref().is_some_and(|s| !s.task.is_finished());
        if !alive {
            *slot = Some(self.connect().await?);
        }
        slot.as_ref().ok_or(ClientError::Disconnected)
    }

    async fn connect(&self) -> Result<Session, ClientError> {
        let (mut socket, _) = connect_async(self.url.as_str()).await?;

        let identify = serde_json::to_string(&GatewayCommand::Identify {
            token: self.token.clone(),
        })?;
        socket.send(Message::Text(identify.into())).await?;

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, wait_for_ready(&mut socket)).await {
            Ok(Ok((user_id, role))) => info!("Gateway ready as {} {}", role, user_id),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(ClientError::Timeout),
        }

        let (commands, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SessionShared::default());
        let task = tokio::spawn(run_session(socket, command_rx, shared.clone()));

        Ok(Session {
            commands,
            shared,
            task,
        })
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.task.abort();
        }
    }
}

async fn wait_for_ready(socket: &mut Socket) -> Result<(i64, tutor_types::models::Role), ClientError> {
    while let Some(msg) = socket.next().await {
        if let Message::Text(text) = msg? {
            if let GatewayFrame::Ready { user_id, role } = serde_json::from_str(text.as_str())? {
                return Ok((user_id, role));
            }
        }
    }
    Err(ClientError::Disconnected)
}

async fn run_session(
    socket: Socket,
    mut commands: mpsc::UnboundedReceiver<GatewayCommand>,
    shared: Arc<SessionShared>,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                let Some(cmd) = cmd else { break };
                let text = match serde_json::to_string(&cmd) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode gateway command: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!("Gateway write failed: {}", e);
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_frame(&shared, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Gateway read failed: {}", e);
                        break;
                    }
                }
            }
        }
    }

    // Fail anyone still waiting for an ack
    lock(&shared.pending).clear();
    debug!("Gateway session ended");
}

fn handle_frame(shared: &SessionShared, text: &str) {
    let frame = match serde_json::from_str::<GatewayFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Unreadable gateway frame: {}", e);
            return;
        }
    };

    match frame {
        GatewayFrame::Ready { .. } => {}
        GatewayFrame::Subscribed { channel } => {
            if let Some(ack) = lock(&shared.pending).remove(&channel) {
                let _ = ack.send(Ok(()));
            }
        }
        GatewayFrame::SubscriptionError { channel, reason } => {
            if let Some(ack) = lock(&shared.pending).remove(&channel) {
                let _ = ack.send(Err(reason));
            }
        }
        GatewayFrame::Event { channel, payload } => {
            // Clone out so the callback runs without the lock held
            let handler = lock(&shared.handlers).get(&channel).cloned();
            match handler {
                Some(handler) => handler(payload),
                None => debug!("Dropping {} for unsubscribed {}", payload.name(), channel),
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
