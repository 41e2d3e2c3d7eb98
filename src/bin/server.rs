use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use maze_chase_server::advisor::{
    spawn_advisor, AdvisorHandle, AdvisoryProvider, CommandAdvisor, HeuristicAdvisor,
};
use maze_chase_server::advisory::AdvisoryOptions;
use maze_chase_server::engine::{GameEngine, GameEngineOptions};
use maze_chase_server::level::Level;
use maze_chase_server::server_protocol::{parse_client_message, ParsedClientMessage};
use maze_chase_server::server_utils::{AdvisorKind, ServerSettings};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const CLIENT_QUEUE_CAPACITY: usize = 256;

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    game: GameEngine,
    advisor: Option<AdvisorHandle>,
}

impl ServerState {
    fn new(game: GameEngine, advisor: Option<AdvisorHandle>) -> Self {
        Self {
            clients: HashMap::new(),
            game,
            advisor,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = ServerSettings::from_env()?;
    let level = load_level(settings.level_file.as_deref())?;

    let provider = build_provider(&settings.advisor);
    let options = GameEngineOptions {
        seed: settings.seed,
        tick_ms: settings.tick_ms,
        advisory: provider.as_ref().map(|_| AdvisoryOptions::default()),
        ..GameEngineOptions::default()
    };
    let game = GameEngine::new(level, options).context("invalid game configuration")?;
    let advisor = provider.map(|provider| {
        info!(provider = provider.name(), "advisory overlay enabled");
        spawn_advisor(provider, settings.advisor_timeout)
    });

    let state = Arc::new(Mutex::new(ServerState::new(game, advisor)));
    start_tick_loop(state.clone(), Duration::from_millis(settings.tick_ms));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir(settings.static_dir.as_deref()) {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.display(), "serving static client");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static client root not found, serving the websocket endpoint only");
        app
    };

    let bind_addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(port = settings.port, tick_ms = settings.tick_ms, "listening");
    axum::serve(listener, app)
        .await
        .context("server runtime failed")?;
    Ok(())
}

fn load_level(path: Option<&Path>) -> anyhow::Result<Level> {
    let Some(path) = path else {
        return Ok(Level::classic()?);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read level file {}", path.display()))?;
    let level =
        Level::parse_text(&text).with_context(|| format!("invalid level {}", path.display()))?;
    Ok(level)
}

fn build_provider(kind: &AdvisorKind) -> Option<Arc<dyn AdvisoryProvider>> {
    match kind {
        AdvisorKind::Off => None,
        AdvisorKind::Heuristic => Some(Arc::new(HeuristicAdvisor)),
        AdvisorKind::Command(line) => match CommandAdvisor::from_command_line(line) {
            Some(advisor) => Some(Arc::new(advisor)),
            None => {
                warn!(command = %line, "advisor command is empty, overlay disabled");
                None
            }
        },
    }
}

fn resolve_static_dir(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.join("index.html").is_file() {
            return Some(path.to_path_buf());
        }
        warn!(root = %path.display(), "STATIC_DIR has no index.html");
    }

    let candidates = [
        PathBuf::from("dist/client"),
        PathBuf::from("../../dist/client"),
    ];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(CLIENT_QUEUE_CAPACITY);

    {
        let mut guard = state.lock().await;
        guard
            .clients
            .insert(client_id.clone(), ClientContext { tx: tx.clone() });
        send_welcome_and_initial_state(&mut guard, &client_id);
    }
    info!(client_id = %client_id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(&state, &client_id, raw.as_str()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = std::str::from_utf8(&raw) {
                    handle_client_message(&state, &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(&state, &client_id).await;
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: &SharedState, client_id: &str, raw: &str) {
    let Some(message) = parse_client_message(raw) else {
        debug!(client_id, "rejected client message");
        send_error_to_client(state, client_id, "invalid message").await;
        return;
    };

    let mut guard = state.lock().await;
    match message {
        ParsedClientMessage::Input { dir } => {
            guard.game.set_desired_direction(dir);
        }
        ParsedClientMessage::Start => {
            if guard.game.request_start(Instant::now()) {
                info!(
                    client_id,
                    level = guard.game.level_number(),
                    "game started"
                );
                // a new game or level refills the board
                let board = guard.game.board_view();
                broadcast(
                    &mut guard,
                    &json!({
                        "type": "board",
                        "board": board,
                    }),
                    QueuePolicy::DisconnectOnFull,
                );
            }
        }
        ParsedClientMessage::Ping { t } => {
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "pong",
                    "t": t,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

async fn handle_disconnect(state: &SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    disconnect_client_internal(&mut guard, client_id, None);
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str, reason: Option<&str>) {
    let Some(context) = state.clients.remove(client_id) else {
        return;
    };
    if let Some(reason) = reason {
        let _ = context.tx.try_send(OutboundMessage::Close {
            code: 1008,
            reason: reason.to_string(),
        });
    }
    info!(client_id, remaining = state.clients.len(), "client disconnected");
}

fn send_welcome_and_initial_state(state: &mut ServerState, client_id: &str) {
    let board = state.game.board_view();
    let config = state.game.config.clone();
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "welcome",
            "board": board,
            "config": config,
        }),
        QueuePolicy::DisconnectOnFull,
    );

    let snapshot = state.game.build_snapshot(false);
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "state",
            "snapshot": snapshot,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn start_tick_loop(state: SharedState, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_game(&mut guard, Instant::now());
        }
    });
}

fn tick_game(state: &mut ServerState, now: Instant) {
    if let Some(advisor) = state.advisor.as_mut() {
        while let Some(reply) = advisor.try_recv() {
            state.game.offer_advisory(reply, now);
        }
    }

    state.game.advance(now);

    if let Some(request) = state.game.poll_advisory_request(now) {
        if let Some(advisor) = state.advisor.as_ref() {
            advisor.submit(request);
        }
    }

    let snapshot = state.game.build_snapshot(true);
    broadcast(
        state,
        &json!({
            "type": "state",
            "snapshot": snapshot,
        }),
        QueuePolicy::DropOnFull,
    );
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        disconnect_client_internal(state, client_id, Some("outbound queue overflow"));
    }
}

fn broadcast(state: &mut ServerState, message: &Value, policy: QueuePolicy) {
    let payload = message.to_string();
    let mut failed_clients = Vec::new();
    for (client_id, client) in &state.clients {
        if client
            .tx
            .try_send(OutboundMessage::Text(payload.clone()))
            .is_err()
            && policy == QueuePolicy::DisconnectOnFull
        {
            failed_clients.push(client_id.clone());
        }
    }
    for client_id in failed_clients {
        disconnect_client_internal(state, &client_id, Some("outbound queue overflow"));
    }
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "error",
            "message": message,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use maze_chase_server::types::GameState;

    fn test_state() -> ServerState {
        let level = Level::classic().expect("classic level");
        let options = GameEngineOptions {
            seed: Some(7),
            ..GameEngineOptions::default()
        };
        ServerState::new(GameEngine::new(level, options).expect("engine"), None)
    }

    fn attach_client(
        state: &mut ServerState,
        capacity: usize,
    ) -> (String, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        let client_id = make_id("client");
        state
            .clients
            .insert(client_id.clone(), ClientContext { tx });
        (client_id, rx)
    }

    fn next_json(rx: &mut mpsc::Receiver<OutboundMessage>) -> Value {
        match rx.try_recv().expect("queued message") {
            OutboundMessage::Text(payload) => serde_json::from_str(&payload).expect("json"),
            other => panic!("unexpected outbound message: {other:?}"),
        }
    }

    #[test]
    fn make_id_is_unique_and_prefixed() {
        let a = make_id("client");
        let b = make_id("client");
        assert_ne!(a, b);
        assert!(a.starts_with("client_"));
    }

    #[test]
    fn welcome_carries_board_and_config_then_state() {
        let mut state = test_state();
        let (client_id, mut rx) = attach_client(&mut state, 8);
        send_welcome_and_initial_state(&mut state, &client_id);

        let welcome = next_json(&mut rx);
        assert_eq!(welcome["type"], "welcome");
        assert!(welcome["board"].is_object());
        assert_eq!(welcome["config"]["tickMs"], json!(state.game.config.tick_ms));

        let initial = next_json(&mut rx);
        assert_eq!(initial["type"], "state");
        assert!(initial["snapshot"].is_object());
    }

    #[test]
    fn tick_broadcasts_state_to_every_client() {
        let mut state = test_state();
        let (_first, mut first_rx) = attach_client(&mut state, 8);
        let (_second, mut second_rx) = attach_client(&mut state, 8);

        assert!(state.game.request_start(Instant::now()));
        tick_game(&mut state, Instant::now());

        assert_eq!(state.game.state(), GameState::Playing);
        assert_eq!(state.game.tick_count(), 1);
        assert_eq!(next_json(&mut first_rx)["type"], "state");
        assert_eq!(next_json(&mut second_rx)["type"], "state");
    }

    #[test]
    fn full_queue_drops_state_but_keeps_client() {
        let mut state = test_state();
        let (client_id, _rx) = attach_client(&mut state, 1);
        tick_game(&mut state, Instant::now());
        tick_game(&mut state, Instant::now());
        assert!(state.clients.contains_key(&client_id));
    }

    #[test]
    fn full_queue_disconnects_on_direct_reply() {
        let mut state = test_state();
        let (client_id, _rx) = attach_client(&mut state, 1);
        let message = json!({ "type": "pong", "t": 1.0 });
        send_to_client(&mut state, &client_id, &message, QueuePolicy::DisconnectOnFull);
        assert!(state.clients.contains_key(&client_id));
        send_to_client(&mut state, &client_id, &message, QueuePolicy::DisconnectOnFull);
        assert!(!state.clients.contains_key(&client_id));
    }

    #[test]
    fn configured_static_dir_needs_index_file() {
        let dir = std::env::temp_dir().join(make_id("maze-chase-static"));
        std::fs::create_dir_all(&dir).expect("temp dir");
        assert_ne!(resolve_static_dir(Some(&dir)), Some(dir.clone()));

        std::fs::write(dir.join("index.html"), "<html></html>").expect("index file");
        assert_eq!(resolve_static_dir(Some(&dir)), Some(dir.clone()));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
