//! Online/offline status broadcasts and the exactly-once shutdown path.
//!
//! Phases move strictly forward:
//! `Idle → AnnouncingOnline → Running → AnnouncingOffline → Exited`.
//! Entering `AnnouncingOffline` is a single compare-and-set, so when several
//! triggers race (signal, fault, `/restart`) only the first one broadcasts
//! and exits. The others park until that exit has happened, so none of them
//! can hand control back to a caller that would end the process on its own.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::config::StatusConfig;
use crate::gateway::{ChatGateway, ProcessExit};
use crate::store::ConfigStore;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAULT: i32 = 1;
pub const EXIT_RESTART: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LifecyclePhase {
    Idle = 0,
    AnnouncingOnline = 1,
    Running = 2,
    AnnouncingOffline = 3,
    Exited = 4,
}

impl LifecyclePhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecyclePhase::Idle,
            1 => LifecyclePhase::AnnouncingOnline,
            2 => LifecyclePhase::Running,
            3 => LifecyclePhase::AnnouncingOffline,
            _ => LifecyclePhase::Exited,
        }
    }
}

/// What asked the process to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownTrigger {
    Interrupt,
    Terminate,
    /// A panic anywhere in the process.
    Fault(String),
    /// The gateway client task ended with an error nobody handled.
    Rejection(String),
    Restart,
}

impl ShutdownTrigger {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownTrigger::Interrupt | ShutdownTrigger::Terminate => EXIT_OK,
            ShutdownTrigger::Fault(_) | ShutdownTrigger::Rejection(_) => EXIT_FAULT,
            ShutdownTrigger::Restart => EXIT_RESTART,
        }
    }
}

impl std::fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownTrigger::Interrupt => write!(f, "SIGINT"),
            ShutdownTrigger::Terminate => write!(f, "SIGTERM"),
            ShutdownTrigger::Fault(msg) => write!(f, "fault: {msg}"),
            ShutdownTrigger::Rejection(msg) => write!(f, "unhandled error: {msg}"),
            ShutdownTrigger::Restart => write!(f, "restart command"),
        }
    }
}

pub struct LifecycleNotifier {
    gateway: Arc<dyn ChatGateway>,
    store: Arc<ConfigStore>,
    exit: Arc<dyn ProcessExit>,
    status: StatusConfig,
    phase: AtomicU8,
    exited: watch::Sender<bool>,
    started_at: DateTime<Utc>,
}

impl LifecycleNotifier {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        store: Arc<ConfigStore>,
        exit: Arc<dyn ProcessExit>,
        status: StatusConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            exit,
            status,
            phase: AtomicU8::new(LifecyclePhase::Idle as u8),
            exited: watch::Sender::new(false),
            started_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        LifecyclePhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn shutdown_initiated(&self) -> bool {
        self.phase() >= LifecyclePhase::AnnouncingOffline
    }

    /// Post the online line to every subscribed channel. Runs once; later
    /// calls (gateway reconnects) do nothing. Returns the delivered count.
    pub async fn announce_online(&self) -> usize {
        if self
            .phase
            .compare_exchange(
                LifecyclePhase::Idle as u8,
                LifecyclePhase::AnnouncingOnline as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            tracing::debug!("online announcement skipped in phase {:?}", self.phase());
            return 0;
        }

        let delivered = self.broadcast(&self.status.online).await;
        tracing::info!("online status delivered to {delivered} channel(s)");

        // A shutdown that started meanwhile keeps its phase.
        let _ = self.phase.compare_exchange(
            LifecyclePhase::AnnouncingOnline as u8,
            LifecyclePhase::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        delivered
    }

    pub async fn shutdown(&self, trigger: ShutdownTrigger) {
        match &trigger {
            ShutdownTrigger::Fault(_) | ShutdownTrigger::Rejection(_) => {
                tracing::error!("shutting down after {trigger}");
            }
            _ => tracing::info!("received {trigger}, shutting down..."),
        }
        self.announce_offline_and_exit(trigger.exit_code()).await;
    }

    /// Broadcast the offline line, close the gateway and exit with `code`.
    /// Only the first call does anything; later calls wait for its exit.
    pub async fn announce_offline_and_exit(&self, code: i32) {
        if !self.begin_shutdown() {
            tracing::debug!("shutdown already in progress, ignoring exit code {code}");
            let mut exited = self.exited.subscribe();
            // Wakes only if `ProcessExit::exit` returned.
            let _ = exited.wait_for(|done| *done).await;
            return;
        }

        let uptime = Utc::now() - self.started_at;
        tracing::info!(
            "going offline after {}s (exit code {code})",
            uptime.num_seconds()
        );

        let delivered = self.broadcast(&self.status.offline).await;
        tracing::info!("offline status delivered to {delivered} channel(s)");

        self.gateway.disconnect().await;
        self.phase.store(LifecyclePhase::Exited as u8, Ordering::SeqCst);
        self.exit.exit(code);
        self.exited.send_replace(true);
    }

    fn begin_shutdown(&self) -> bool {
        self.phase
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                (raw < LifecyclePhase::AnnouncingOffline as u8)
                    .then_some(LifecyclePhase::AnnouncingOffline as u8)
            })
            .is_ok()
    }

    async fn broadcast(&self, content: &str) -> usize {
        let mut delivered = 0;
        for channel_id in self.store.broadcast_channels().await {
            match self.deliver(channel_id, content).await {
                Ok(()) => delivered += 1,
                Err(err) => tracing::warn!("skipping broadcast channel {channel_id}: {err:#}"),
            }
        }
        delivered
    }

    async fn deliver(&self, channel_id: u64, content: &str) -> Result<()> {
        let channel = self
            .gateway
            .fetch_channel(channel_id)
            .await?
            .ok_or_else(|| anyhow!("channel not found"))?;
        if !channel.kind.is_text_capable() {
            return Err(anyhow!("channel {} is a {} channel", channel.name, channel.kind));
        }
        if !self.gateway.can_send(channel_id).await? {
            return Err(anyhow!("missing permission to send in {}", channel.name));
        }
        self.gateway.send_message(channel_id, content).await
    }
}
