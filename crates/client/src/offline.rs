//! Offline / degraded-mode detection.
//!
//! Two independent signals:
//! - whether the installed credential is synthetic (a local placeholder, never
//!   sent to the backend), decided by a prefix test;
//! - whether the backend answers its liveness probe, checked on a fixed
//!   interval with a bounded per-check timeout.
//!
//! A synthetic session suppresses network calls regardless of reachability.
//! A real session with an unreachable backend gets a sticky "offline"
//! notification instead of failing silently.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api_client::{Credential, HealthProbe};
use crate::config::MonitorConfig;
use crate::notify::{Level, Notifier};

pub const OFFLINE_NOTICE_KEY: &str = "offline";
pub const OFFLINE_MESSAGE: &str =
    "You are offline. Showing the last known state until the server is reachable again.";

/// Whether `token` is a locally minted placeholder rather than a server-issued
/// credential.
pub fn is_synthetic_token(token: &str, prefix: &str) -> bool {
    !prefix.is_empty() && token.starts_with(prefix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// No probe has completed yet.
    Unknown,
    Reachable,
    Unreachable,
}

struct Inner {
    probe: Arc<dyn HealthProbe>,
    config: MonitorConfig,
    credential: Credential,
    notifier: Notifier,
    reachability: watch::Sender<Reachability>,
}

#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConnectivityMonitor {
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        config: MonitorConfig,
        credential: Credential,
        notifier: Notifier,
    ) -> Self {
        let (reachability, _) = watch::channel(Reachability::Unknown);
        Self {
            inner: Arc::new(Inner {
                probe,
                config,
                credential,
                notifier,
                reachability,
            }),
            task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn synthetic_prefix(&self) -> &str {
        &self.inner.config.synthetic_prefix
    }

    /// The installed credential is a local placeholder.
    pub fn is_synthetic(&self) -> bool {
        self.inner.is_synthetic()
    }

    /// No server-issued credential is installed, so network-touching
    /// operations should not run.
    pub fn is_offline_mode(&self) -> bool {
        match self.inner.credential.get() {
            None => true,
            Some(token) => is_synthetic_token(&token, &self.inner.config.synthetic_prefix),
        }
    }

    pub fn reachability(&self) -> Reachability {
        *self.inner.reachability.borrow()
    }

    /// Watch reachability transitions.
    pub fn watch(&self) -> watch::Receiver<Reachability> {
        self.inner.reachability.subscribe()
    }

    /// Run one liveness check now. Skipped (returning the last known value)
    /// for synthetic sessions.
    pub async fn check_now(&self) -> Reachability {
        self.inner.check().await
    }

    /// Start the periodic check loop. No-op while already running.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                inner.check().await;
            }
        }));
        crate::log_info!(
            "Liveness checks every {:?} (timeout {:?})",
            self.inner.config.interval,
            self.inner.config.timeout
        );
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

impl Inner {
    fn is_synthetic(&self) -> bool {
        self.credential
            .get()
            .is_some_and(|t| is_synthetic_token(&t, &self.config.synthetic_prefix))
    }

    async fn check(&self) -> Reachability {
        if self.is_synthetic() {
            return *self.reachability.borrow();
        }

        // Dropping the probe future on timeout releases its request.
        let outcome = match tokio::time::timeout(self.config.timeout, self.probe.check_health()).await
        {
            Ok(Ok(())) => Reachability::Reachable,
            Ok(Err(e)) => {
                crate::log_warn!("Health check failed: {}", e);
                Reachability::Unreachable
            }
            Err(_) => {
                crate::log_warn!("Health check timed out after {:?}", self.config.timeout);
                Reachability::Unreachable
            }
        };

        let previous = self.reachability.send_replace(outcome);
        if previous != outcome {
            crate::log_info!("Backend reachability: {:?} -> {:?}", previous, outcome);
        }

        match outcome {
            Reachability::Unreachable if self.credential.get().is_some() => {
                self.notifier
                    .push_sticky(OFFLINE_NOTICE_KEY, Level::Warning, OFFLINE_MESSAGE);
            }
            Reachability::Reachable => {
                self.notifier.dismiss_key(OFFLINE_NOTICE_KEY);
            }
            _ => {}
        }
        outcome
    }
}
