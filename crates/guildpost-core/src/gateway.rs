//! Seams between the bot logic and the chat platform.
//!
//! The dispatcher and the lifecycle notifier only talk to the platform through
//! [`ChatGateway`] and [`ReplySink`], so the serenity-backed implementation in
//! `guildpost-channels` can be swapped for a recording fake in tests.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::registry::CommandSpec;

/// Channel kinds the bot cares about. Everything else collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Announcement,
    Forum,
    Voice,
    Category,
    Thread,
    Other,
}

impl ChannelKind {
    /// Plain messages can be posted directly into the channel.
    pub fn is_text_capable(self) -> bool {
        matches!(self, ChannelKind::Text | ChannelKind::Announcement)
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ChannelKind::Text => "text",
            ChannelKind::Announcement => "announcement",
            ChannelKind::Forum => "forum",
            ChannelKind::Voice => "voice",
            ChannelKind::Category => "category",
            ChannelKind::Thread => "thread",
            ChannelKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// A channel as seen by the bot: enough to validate kind and echo its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: u64,
    pub name: String,
    pub kind: ChannelKind,
}

impl ChannelRef {
    pub fn new(id: u64, name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
        }
    }
}

/// A new thread in a forum channel together with its opening message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumPost {
    pub title: String,
    pub content: String,
    pub attachment: Option<PathBuf>,
}

#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// `Ok(None)` when the platform reports the channel as unknown.
    async fn fetch_channel(&self, channel_id: u64) -> Result<Option<ChannelRef>>;

    /// Ids of every plain text channel currently visible in the guild.
    async fn guild_text_channels(&self, guild_id: u64) -> Result<Vec<u64>>;

    /// Whether the bot itself may post into the channel.
    async fn can_send(&self, channel_id: u64) -> Result<bool>;

    async fn send_message(&self, channel_id: u64, content: &str) -> Result<()>;

    async fn create_forum_post(&self, channel_id: u64, post: ForumPost) -> Result<()>;

    /// Replace the whole remote command set.
    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<()>;

    /// Release the session. Failures are swallowed by the implementation.
    async fn disconnect(&self);
}

/// Reply channel scoped to one command event. Every reply is visible to the
/// invoking user only.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn reply_private(&self, content: &str) -> Result<()>;
}

/// Process termination, injectable so shutdown can be observed in tests.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}
