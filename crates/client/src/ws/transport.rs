//! The real-time transport: one persistent connection per session.
//!
//! [`Transport`] owns the connection loop. It authenticates every fresh
//! connection with the session credential, joins the subject's room, decodes
//! inbound frames into [`ServerEvent`]s and publishes them (together with
//! `connect`/`disconnect`/`connect_failed` lifecycle events) through the
//! [`EventDispatcher`]. Nothing outside this module reads its internal flags;
//! consumers learn about connection changes from the dispatcher.

use std::sync::{Arc, Mutex, MutexGuard};

use futures_channel::mpsc::UnboundedSender;
use futures_util::StreamExt;
use ridewave_shared::{ClientCommand, Coordinates, Role, ServerEvent, Session, WsEnvelope};
use tokio::task::JoinHandle;

use super::connection::{ConnectionState, Connector, Link};
use crate::config::ReconnectConfig;
use crate::dispatcher::EventDispatcher;
use crate::notify::Notifier;
use crate::offline::is_synthetic_token;

pub const SERVER_UNREACHABLE_MESSAGE: &str =
    "Cannot reach the server. Live ride updates are unavailable.";

struct Shared {
    /// Bumped by every initialize/teardown; a loop whose generation is stale
    /// must not touch anything.
    generation: u64,
    state: ConnectionState,
    sender: Option<UnboundedSender<String>>,
    session: Option<Session>,
    task: Option<JoinHandle<()>>,
}

pub struct Transport {
    url: String,
    reconnect: ReconnectConfig,
    synthetic_prefix: String,
    connector: Arc<dyn Connector>,
    dispatcher: EventDispatcher,
    notifier: Notifier,
    shared: Arc<Mutex<Shared>>,
}

impl Transport {
    pub fn new(
        url: impl Into<String>,
        reconnect: ReconnectConfig,
        synthetic_prefix: impl Into<String>,
        connector: Arc<dyn Connector>,
        dispatcher: EventDispatcher,
        notifier: Notifier,
    ) -> Self {
        Self {
            url: url.into(),
            reconnect,
            synthetic_prefix: synthetic_prefix.into(),
            connector,
            dispatcher,
            notifier,
            shared: Arc::new(Mutex::new(Shared {
                generation: 0,
                state: ConnectionState::Disconnected,
                sender: None,
                session: None,
                task: None,
            })),
        }
    }

    /// Start the connection loop for `session`.
    ///
    /// A no-op while a loop is already running. Synthetic sessions never
    /// create a connection. Returns whether a loop is running afterwards.
    /// Must be called from within a tokio runtime.
    pub fn initialize(&self, session: &Session) -> bool {
        if is_synthetic_token(&session.token, &self.synthetic_prefix) {
            crate::log_info!("synthetic session, real-time channel stays offline");
            return false;
        }

        let mut shared = lock(&self.shared);
        if shared.task.as_ref().is_some_and(|t| !t.is_finished()) {
            return true;
        }

        shared.generation += 1;
        shared.session = Some(session.clone());
        shared.state = ConnectionState::Connecting;

        let ctx = LoopContext {
            generation: shared.generation,
            url: self.url.clone(),
            reconnect: self.reconnect.clone(),
            connector: Arc::clone(&self.connector),
            dispatcher: self.dispatcher.clone(),
            notifier: self.notifier.clone(),
            shared: Arc::clone(&self.shared),
        };
        shared.task = Some(tokio::spawn(run_connection_loop(ctx)));
        true
    }

    /// Send an arbitrary event. Returns `false` (and drops the message) when
    /// not connected or the session is synthetic; nothing is queued.
    pub fn emit(&self, event: &str, payload: serde_json::Value) -> bool {
        self.send_envelope(WsEnvelope::new(event, payload))
    }

    /// Push a captain's position to the server.
    pub fn update_location(&self, location: Coordinates) -> bool {
        let user_id = {
            let shared = lock(&self.shared);
            match shared.session.as_ref() {
                Some(s) if s.role == Role::Captain => s.subject_id().to_string(),
                _ => return false,
            }
        };
        self.send_envelope(ClientCommand::UpdateLocation { user_id, location }.into_envelope())
    }

    fn send_envelope(&self, envelope: WsEnvelope) -> bool {
        let shared = lock(&self.shared);
        let synthetic = shared
            .session
            .as_ref()
            .map_or(true, |s| is_synthetic_token(&s.token, &self.synthetic_prefix));
        if synthetic || !shared.state.is_connected() {
            crate::log_debug!("dropping '{}': not connected", envelope.event);
            return false;
        }
        let Some(sender) = shared.sender.as_ref() else {
            return false;
        };
        match encode(&envelope) {
            Some(frame) => sender.unbounded_send(frame).is_ok(),
            None => false,
        }
    }

    /// Close the connection and release every dispatcher registration.
    /// Safe to call repeatedly.
    pub fn teardown(&self) {
        {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            if let Some(task) = shared.task.take() {
                task.abort();
            }
            shared.sender = None;
            shared.session = None;
            shared.state = ConnectionState::Disconnected;
        }
        self.dispatcher.clear();
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.shared).task.take() {
            task.abort();
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

fn encode(envelope: &WsEnvelope) -> Option<String> {
    match serde_json::to_string(envelope) {
        Ok(json) => Some(json),
        Err(e) => {
            crate::log_error!("Serialize failed: {}", e);
            None
        }
    }
}

struct LoopContext {
    generation: u64,
    url: String,
    reconnect: ReconnectConfig,
    connector: Arc<dyn Connector>,
    dispatcher: EventDispatcher,
    notifier: Notifier,
    shared: Arc<Mutex<Shared>>,
}

impl LoopContext {
    /// Session to connect for, or `None` once this loop has been superseded.
    fn current_session(&self) -> Option<Session> {
        let shared = lock(&self.shared);
        if shared.generation != self.generation {
            return None;
        }
        shared.session.clone()
    }

    fn is_current(&self) -> bool {
        lock(&self.shared).generation == self.generation
    }

    /// Update shared state if this loop is still the live one.
    fn update(&self, f: impl FnOnce(&mut Shared)) -> bool {
        let mut shared = lock(&self.shared);
        if shared.generation != self.generation {
            return false;
        }
        f(&mut shared);
        true
    }

    /// Drive one established connection until it closes.
    async fn serve(&self, link: Link, session: &Session) {
        let Link {
            outbound,
            mut inbound,
        } = link;

        // The server is trusted to accept or reject silently; the handshake
        // is repeated after every reconnect.
        let handshake = [
            ClientCommand::Authenticate {
                token: session.token.clone(),
            },
            ClientCommand::Join {
                user_id: session.subject_id().to_string(),
                user_type: session.role,
            },
        ];
        for cmd in handshake {
            if let Some(frame) = encode(&cmd.into_envelope()) {
                let _ = outbound.unbounded_send(frame);
            }
        }

        let installed = self.update(|s| {
            s.sender = Some(outbound.clone());
            s.state = ConnectionState::Connected;
        });
        if !installed {
            return;
        }
        self.dispatcher.dispatch(&ServerEvent::Connected);

        while let Some(text) = inbound.next().await {
            let envelope = match serde_json::from_str::<WsEnvelope>(&text) {
                Ok(envelope) => envelope,
                Err(e) => {
                    crate::log_warn!("Failed to parse frame: {}", e);
                    continue;
                }
            };
            let name = envelope.event.clone();
            match ServerEvent::from_envelope(envelope) {
                Ok(event) => {
                    if !self.is_current() {
                        return;
                    }
                    self.dispatcher.dispatch(&event);
                }
                Err(e) => crate::log_warn!("Malformed '{}' payload: {}", name, e),
            }
        }

        crate::log_info!("WebSocket to {} closed", self.url);
        if self.update(|s| {
            s.sender = None;
            s.state = ConnectionState::Disconnected;
        }) {
            self.dispatcher.dispatch(&ServerEvent::Disconnected {
                reason: "connection closed".to_string(),
            });
        }
    }

    /// Attempts are exhausted: report once for this episode and stop.
    fn give_up(&self, attempts: u32) {
        let reason = format!("Max reconnect attempts ({}) exceeded", attempts);
        if !self.update(|s| {
            s.sender = None;
            s.state = ConnectionState::Failed {
                reason: reason.clone(),
            };
        }) {
            return;
        }
        crate::log_error!("Giving up on {}: {}", self.url, reason);
        self.notifier.error(SERVER_UNREACHABLE_MESSAGE);
        self.dispatcher
            .dispatch(&ServerEvent::ConnectFailed { attempts });
    }
}

async fn run_connection_loop(ctx: LoopContext) {
    let max_attempts = ctx.reconnect.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        let Some(session) = ctx.current_session() else {
            return;
        };

        let connecting = if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt }
        };
        if !ctx.update(|s| s.state = connecting) {
            return;
        }

        match ctx.connector.connect(&ctx.url).await {
            Ok(link) => {
                attempt = 0;
                ctx.serve(link, &session).await;
                if !ctx.is_current() {
                    return;
                }
                tokio::time::sleep(ctx.reconnect.initial_delay).await;
            }
            Err(e) => {
                attempt += 1;
                crate::log_warn!(
                    "WebSocket error for {} (attempt {}/{}): {}",
                    ctx.url,
                    attempt,
                    max_attempts,
                    e
                );
                if attempt >= max_attempts {
                    ctx.give_up(attempt);
                    return;
                }
                let delay = ctx.reconnect.delay_for_attempt(attempt);
                crate::log_info!("Reconnecting to {} in {:?}", ctx.url, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
