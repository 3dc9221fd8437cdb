//! WebSocket Game Server
//!
//! Async WebSocket adapter over the [`SessionRegistry`]. Each socket gets a
//! fresh [`ConnectionId`]; commands are routed to rooms and every
//! [`RoomChanged`] notification becomes a `game_update` push to the room's
//! connected members.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::game::error::CommandError;
use crate::game::player::ConnectionId;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
use crate::network::session::{RoomChanged, RoomId, SessionRegistry};

/// Outbound queue per client.
const CLIENT_QUEUE: usize = 64;

/// Idle sockets are dropped after this long without a message.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Peer address.
    addr: SocketAddr,
    /// Rooms this connection holds a seat in.
    rooms: BTreeSet<RoomId>,
    /// Last activity.
    last_activity: Instant,
    /// Message sender.
    sender: mpsc::Sender<ServerMessage>,
}

type ClientMap = Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// All rooms.
    registry: Arc<SessionRegistry>,
    /// Connected clients.
    clients: ClientMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.engine.clone()));
        Self::with_registry(config, registry)
    }

    /// Create a server over an existing registry.
    pub fn with_registry(config: ServerConfig, registry: Arc<SessionRegistry>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            registry,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Room registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Bind to the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);

        let broadcast_handle = tokio::spawn(Self::run_broadcast_loop(
            self.registry.subscribe(),
            self.registry.clone(),
            self.clients.clone(),
        ));
        let cleanup_handle = tokio::spawn(Self::run_cleanup_loop(
            self.clients.clone(),
            self.registry.clone(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        broadcast_handle.abort();
        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let registry = self.registry.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let conn = ConnectionId::new();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(CLIENT_QUEUE);

            clients.write().await.insert(conn, ConnectedClient {
                addr,
                rooms: BTreeSet::new(),
                last_activity: Instant::now(),
                sender: msg_tx.clone(),
            });

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if let Some(client) = clients.write().await.get_mut(&conn) {
                                    client.last_activity = Instant::now();
                                }

                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        ))).await;
                                        continue;
                                    }
                                };

                                if let Err(err) = Self::handle_client_message(
                                    conn,
                                    client_msg,
                                    &registry,
                                    &clients,
                                    &msg_tx,
                                ).await {
                                    let _ = msg_tx.send(ServerMessage::Error(ServerError::from(&err))).await;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            sender_task.abort();
            clients.write().await.remove(&conn);

            let rooms = registry.handle_transport_disconnect(conn).await;
            info!("Client {} cleaned up ({} seats held)", addr, rooms.len());
        });
    }

    /// Handle a client message. Rejections are reported back by the caller.
    async fn handle_client_message(
        conn: ConnectionId,
        msg: ClientMessage,
        registry: &Arc<SessionRegistry>,
        clients: &ClientMap,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Result<(), CommandError> {
        match msg {
            ClientMessage::CreateRoom { room_id, name } => {
                let room = match room_id {
                    Some(id) => registry.create_room_with_id(&id).await?,
                    None => registry.create_room().await,
                };
                room.join(conn, &name).await?;
                Self::confirm_join(conn, room.id(), registry, clients, sender).await
            }
            ClientMessage::JoinRoom { room_id, name } => {
                registry.room(&room_id).await?.join(conn, &name).await?;
                Self::confirm_join(conn, &room_id, registry, clients, sender).await
            }
            ClientMessage::JoinBotGame { room_id, name, bot_count } => {
                registry.join_bot_game(&room_id, conn, &name, bot_count).await?;
                Self::confirm_join(conn, &room_id, registry, clients, sender).await
            }
            ClientMessage::SwitchSeat { room_id, seat } => {
                registry.room(&room_id).await?.switch_seat(conn, seat).await
            }
            ClientMessage::SwapCards { room_id, hand_index, face_up_index } => {
                registry.room(&room_id).await?.swap_cards(conn, hand_index, face_up_index).await
            }
            ClientMessage::SortHand { room_id } => {
                registry.room(&room_id).await?.sort_hand(conn).await
            }
            ClientMessage::SetReady { room_id } => {
                registry.room(&room_id).await?.set_ready(conn).await
            }
            ClientMessage::TakePile { room_id } => {
                registry.room(&room_id).await?.take_pile(conn).await
            }
            ClientMessage::PlayCard { room_id, indices, source } => {
                registry.room(&room_id).await?.play_cards(conn, &indices, source).await
            }
            ClientMessage::StartGame { room_id } => {
                registry.room(&room_id).await?.start_game(conn).await
            }
            ClientMessage::GetState { room_id } => {
                let state = registry.room(&room_id).await?.snapshot().await;
                let _ = sender.send(ServerMessage::game_update(state)).await;
                Ok(())
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp,
                    server_time: std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis() as u64,
                }).await;
                Ok(())
            }
        }
    }

    /// Track membership and send the caller its id and the current state.
    async fn confirm_join(
        conn: ConnectionId,
        room_id: &str,
        registry: &Arc<SessionRegistry>,
        clients: &ClientMap,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Result<(), CommandError> {
        if let Some(client) = clients.write().await.get_mut(&conn) {
            client.rooms.insert(room_id.to_string());
        }

        let state = registry.room(room_id).await?.snapshot().await;
        let _ = sender.send(ServerMessage::Joined {
            room_id: room_id.to_string(),
            player_id: conn,
        }).await;
        let _ = sender.send(ServerMessage::game_update(state)).await;
        Ok(())
    }

    /// Push every room change to the room's connected members.
    async fn run_broadcast_loop(
        mut changes: broadcast::Receiver<RoomChanged>,
        registry: Arc<SessionRegistry>,
        clients: ClientMap,
    ) {
        // Last pushed (instance, version) per room id.
        let mut last_sent: BTreeMap<RoomId, (Uuid, u64)> = BTreeMap::new();
        let mut prune = interval(Duration::from_secs(60));

        loop {
            let change = tokio::select! {
                received = changes.recv() => match received {
                    Ok(change) => change,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Broadcast loop lagged, {} notifications skipped", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = prune.tick() => {
                    let mut live = BTreeMap::new();
                    for (id, sent) in last_sent {
                        if registry.room(&id).await.is_ok() {
                            live.insert(id, sent);
                        }
                    }
                    last_sent = live;
                    continue;
                }
            };

            if !Self::should_push(&last_sent, &change) {
                continue;
            }
            let room = match registry.room(&change.room_id).await {
                Ok(room) if room.instance() == change.instance => room,
                // Removed or replaced since the notification was sent.
                Ok(_) => continue,
                Err(_) => {
                    last_sent.remove(&change.room_id);
                    continue;
                }
            };
            let state = room.snapshot().await;
            last_sent.insert(change.room_id.clone(), (change.instance, state.version));

            let message = ServerMessage::game_update(state);
            let clients = clients.read().await;
            for (conn, client) in clients.iter().filter(|(_, c)| c.rooms.contains(&change.room_id)) {
                if client.sender.try_send(message.clone()).is_err() {
                    debug!("Dropped update for {} ({})", conn, client.addr);
                }
            }
        }
    }

    /// False when a snapshot at least as new was already pushed for this room instance.
    fn should_push(last_sent: &BTreeMap<RoomId, (Uuid, u64)>, change: &RoomChanged) -> bool {
        match last_sent.get(&change.room_id) {
            Some((instance, version)) => *instance != change.instance || *version < change.version,
            None => true,
        }
    }

    /// Periodically drop idle sockets and dead rooms.
    async fn run_cleanup_loop(clients: ClientMap, registry: Arc<SessionRegistry>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let now = Instant::now();
            let idle: Vec<ConnectionId> = {
                let clients = clients.read().await;
                clients
                    .iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > IDLE_TIMEOUT)
                    .map(|(conn, _)| *conn)
                    .collect()
            };

            for conn in idle {
                let removed = clients.write().await.remove(&conn);
                if let Some(client) = removed {
                    registry.handle_transport_disconnect(conn).await;
                    info!("Removed idle client {}", client.addr);
                }
            }

            let removed = registry.cleanup().await;
            if removed > 0 {
                debug!("Removed {} idle rooms", removed);
            }
        }
    }

    /// Get connected client count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get active room count.
    pub async fn room_count(&self) -> usize {
        self.registry.room_count().await
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{GameState, GameStatus};
    use tokio_tungstenite::connect_async;

    async fn next_server_message<S>(ws: &mut S) -> ServerMessage
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return ServerMessage::from_json(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {:?}", other),
            }
        }
    }

    async fn next_update(rx: &mut mpsc::Receiver<ServerMessage>) -> Box<GameState> {
        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        match received {
            Ok(Some(ServerMessage::GameUpdate(state))) => state,
            other => panic!("expected game update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_replaced_room_updates_reach_members() {
        let registry = Arc::new(SessionRegistry::default());
        let clients: ClientMap = Arc::new(RwLock::new(BTreeMap::new()));
        let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE);
        clients.write().await.insert(
            ConnectionId::new(),
            ConnectedClient {
                addr: "127.0.0.1:9".parse().unwrap(),
                rooms: BTreeSet::from(["R".to_string()]),
                last_activity: Instant::now(),
                sender: tx,
            },
        );
        tokio::spawn(GameServer::run_broadcast_loop(registry.subscribe(), registry.clone(), clients));

        let ana = ConnectionId::new();
        let mut old = GameState::with_seed("R", 3);
        old.add_player(ana, "Ana").unwrap();
        old.status = GameStatus::Finished;
        old.version = 50;
        let old_room = registry.insert_room(old).await.unwrap();
        old_room.sort_hand(ana).await.unwrap();
        assert_eq!(next_update(&mut rx).await.version, 51);

        let fresh = registry.create_room_with_id("R").await.unwrap();
        assert_ne!(fresh.instance(), old_room.instance());
        fresh.join(ConnectionId::new(), "Bo").await.unwrap();
        fresh.join(ConnectionId::new(), "Cy").await.unwrap();

        let first = next_update(&mut rx).await;
        assert_eq!(first.status, GameStatus::Waiting);
        assert!(first.version <= 2);
        if first.version < 2 {
            assert_eq!(next_update(&mut rx).await.version, 2);
        }
    }

    #[test]
    fn test_should_push_tracks_instance() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let last_sent = BTreeMap::from([("R".to_string(), (a, 50))]);
        let change = |instance, version| RoomChanged { room_id: "R".into(), instance, version };

        assert!(!GameServer::should_push(&last_sent, &change(a, 50)));
        assert!(GameServer::should_push(&last_sent, &change(a, 51)));
        assert!(GameServer::should_push(&last_sent, &change(b, 1)));
        assert!(GameServer::should_push(&BTreeMap::new(), &change(a, 0)));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = GameServer::new(config);

        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = GameServer::new(ServerConfig::default());
        server.shutdown();
        // Should not panic
    }

    #[tokio::test]
    async fn test_create_room_over_websocket() {
        let server = Arc::new(GameServer::new(ServerConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws.send(Message::Text(r#"{"type":"create_room","room_id":"WS1","name":"Ana"}"#.into()))
            .await
            .unwrap();

        let player_id = match next_server_message(&mut ws).await {
            ServerMessage::Joined { room_id, player_id } => {
                assert_eq!(room_id, "WS1");
                player_id
            }
            other => panic!("unexpected {:?}", other),
        };
        match next_server_message(&mut ws).await {
            ServerMessage::GameUpdate(state) => {
                assert_eq!(state.players.len(), 1);
                assert_eq!(state.players[0].id, player_id);
            }
            other => panic!("unexpected {:?}", other),
        }

        ws.send(Message::Text(r#"{"type":"take_pile","room_id":"WS1"}"#.into()))
            .await
            .unwrap();
        loop {
            match next_server_message(&mut ws).await {
                ServerMessage::Error(err) => {
                    assert_eq!(err.code, ErrorCode::NotAllowed);
                    break;
                }
                ServerMessage::GameUpdate(_) => continue,
                other => panic!("unexpected {:?}", other),
            }
        }

        ws.send(Message::Text("not json".into())).await.unwrap();
        loop {
            if let ServerMessage::Error(err) = next_server_message(&mut ws).await {
                assert_eq!(err.code, ErrorCode::InvalidInput);
                break;
            }
        }

        server.shutdown();
    }
}
