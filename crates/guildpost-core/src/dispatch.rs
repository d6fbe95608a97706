//! Routes authorized command events to their handlers.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::auth::{authorize, Authorization, CallerCapabilities, DENIED_MESSAGE};
use crate::command::{BotCommand, CommandEvent, CommandInvocation, CommandParseError};
use crate::config::PostConfig;
use crate::error::CommandError;
use crate::gateway::{ChannelKind, ChannelRef, ChatGateway, ForumPost, ReplySink};
use crate::lifecycle::{LifecycleNotifier, ShutdownTrigger};
use crate::store::ConfigStore;
use crate::validation::{require_kind, resolve_icon_path, validate_icon_choice};

pub const NO_CONTENT_CHANNEL: &str =
    "No content channel set for this server. Use /set-content-channel first.";
pub const CONTENT_CHANNEL_INVALID: &str = "Content channel not found or invalid type.";
pub const POST_CREATED: &str = "Forum post created!";
pub const INVALID_FORUM_CHANNEL: &str = "Please select a valid forum channel.";
pub const INVALID_TEXT_CHANNEL: &str = "Please select a valid text channel.";
pub const NONE_REMOVED: &str = "No broadcast channels from this server were subscribed.";
pub const RESTARTING: &str = "Restarting...";

pub struct Dispatcher {
    store: Arc<ConfigStore>,
    gateway: Arc<dyn ChatGateway>,
    notifier: Arc<LifecycleNotifier>,
    icons_dir: PathBuf,
    post: PostConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<ConfigStore>,
        gateway: Arc<dyn ChatGateway>,
        notifier: Arc<LifecycleNotifier>,
        icons_dir: PathBuf,
        post: PostConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            icons_dir,
            post,
        }
    }

    /// Entry point for raw platform events. Unknown command names are
    /// dropped; everything else passes the permission gate before its
    /// options are even looked at.
    pub async fn handle_event(&self, event: CommandEvent, reply: &dyn ReplySink) -> Result<()> {
        let parsed = BotCommand::parse(&event.name, &event.options);
        if let Err(CommandParseError::UnknownCommand(name)) = &parsed {
            tracing::debug!("ignoring unknown command /{name}");
            return Ok(());
        }

        let Some(guild_id) = self
            .gate(
                &event.name,
                event.guild_id,
                event.user_id,
                &event.capabilities,
                reply,
            )
            .await?
        else {
            return Ok(());
        };

        match parsed {
            Ok(command) => self.execute(guild_id, command, reply).await,
            Err(err) => {
                tracing::debug!("malformed /{} from user {}: {err}", event.name, event.user_id);
                reply.reply_private(&err.to_string()).await
            }
        }
    }

    /// Authorize and run an already decoded command.
    pub async fn dispatch(&self, invocation: CommandInvocation, reply: &dyn ReplySink) -> Result<()> {
        let Some(guild_id) = self
            .gate(
                invocation.command.name(),
                invocation.guild_id,
                invocation.user_id,
                &invocation.capabilities,
                reply,
            )
            .await?
        else {
            return Ok(());
        };
        self.execute(guild_id, invocation.command, reply).await
    }

    async fn gate(
        &self,
        name: &str,
        guild_id: Option<u64>,
        user_id: u64,
        capabilities: &CallerCapabilities,
        reply: &dyn ReplySink,
    ) -> Result<Option<u64>> {
        match (authorize(guild_id, capabilities), guild_id) {
            (Authorization::Allow, Some(guild_id)) => Ok(Some(guild_id)),
            _ => {
                tracing::info!("denied /{name} for user {user_id} in guild {guild_id:?}");
                reply.reply_private(DENIED_MESSAGE).await?;
                Ok(None)
            }
        }
    }

    async fn execute(&self, guild_id: u64, command: BotCommand, reply: &dyn ReplySink) -> Result<()> {
        let name = command.name();
        tracing::info!("running /{name} in guild {guild_id}");

        let outcome = match command {
            BotCommand::CreateTaggedPost {
                color,
                icon,
                tag,
                invite,
            } => {
                self.create_tagged_post(guild_id, &color, &icon, &tag, &invite)
                    .await
            }
            BotCommand::SetContentChannel { channel } => {
                self.set_content_channel(guild_id, channel).await
            }
            BotCommand::SubscribeBroadcast { channel } => self.subscribe_broadcast(channel).await,
            BotCommand::UnsubscribeBroadcast => self.unsubscribe_broadcast(guild_id).await,
            BotCommand::Restart => {
                if let Err(err) = reply.reply_private(RESTARTING).await {
                    tracing::warn!("failed to acknowledge /restart: {err:#}");
                }
                self.notifier.shutdown(ShutdownTrigger::Restart).await;
                return Ok(());
            }
        };

        let text = match outcome {
            Ok(text) => text,
            Err(err) => {
                match &err {
                    CommandError::Validation(msg) => tracing::debug!("/{name} rejected: {msg}"),
                    CommandError::NotFound(msg) => tracing::info!("/{name} stopped: {msg}"),
                    CommandError::Internal(e) => tracing::error!("/{name} failed: {e:#}"),
                }
                err.reply_text()
            }
        };
        reply.reply_private(&text).await
    }

    async fn create_tagged_post(
        &self,
        guild_id: u64,
        color: &str,
        icon: &str,
        tag: &str,
        invite: &str,
    ) -> Result<String, CommandError> {
        validate_icon_choice(color, icon)?;

        let channel_id = self
            .store
            .content_channel(guild_id)
            .await
            .ok_or_else(|| CommandError::not_found(NO_CONTENT_CHANNEL))?;

        let channel = match self.gateway.fetch_channel(channel_id).await {
            Ok(Some(channel)) if channel.kind == ChannelKind::Forum => channel,
            Ok(_) => return Err(CommandError::not_found(CONTENT_CHANNEL_INVALID)),
            Err(err) => {
                tracing::warn!("failed to fetch content channel {channel_id}: {err:#}");
                return Err(CommandError::not_found(CONTENT_CHANNEL_INVALID));
            }
        };

        let missing_icon =
            || CommandError::not_found(format!("The icon file \"{icon}\" does not exist."));
        let icon_path =
            resolve_icon_path(&self.icons_dir, color, icon).ok_or_else(missing_icon)?;
        let is_file = tokio::fs::metadata(&icon_path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            tracing::warn!("icon asset missing: {}", icon_path.display());
            return Err(missing_icon());
        }

        // The invite suffix is passed through as typed.
        let title = format!("[{tag}]");
        let decoration = &self.post.decoration;
        let content = format!(
            "{decoration} Guild tag: {title}\n{decoration} Invite link: {}{invite}",
            self.post.invite_prefix
        );

        self.gateway
            .create_forum_post(
                channel.id,
                ForumPost {
                    title: title.clone(),
                    content,
                    attachment: Some(icon_path),
                },
            )
            .await?;
        tracing::info!("created post {title} in {} ({})", channel.name, channel.id);
        Ok(POST_CREATED.to_string())
    }

    async fn set_content_channel(
        &self,
        guild_id: u64,
        channel: ChannelRef,
    ) -> Result<String, CommandError> {
        require_kind(&channel, &[ChannelKind::Forum], INVALID_FORUM_CHANNEL)?;
        self.store.set_content_channel(guild_id, channel.id).await?;
        Ok(format!("Content channel set to {}", channel.name))
    }

    async fn subscribe_broadcast(
        &self,
        channel: ChannelRef,
    ) -> Result<String, CommandError> {
        require_kind(&channel, &[ChannelKind::Text], INVALID_TEXT_CHANNEL)?;
        let added = self.store.add_broadcast_channel(channel.id).await?;
        Ok(if added {
            format!("{} will now receive bot status updates.", channel.name)
        } else {
            format!("{} is already receiving bot status updates.", channel.name)
        })
    }

    async fn unsubscribe_broadcast(&self, guild_id: u64) -> Result<String, CommandError> {
        let guild_channels: HashSet<u64> = self
            .gateway
            .guild_text_channels(guild_id)
            .await?
            .into_iter()
            .collect();
        let removed = self
            .store
            .remove_broadcast_channels(|id| guild_channels.contains(&id))
            .await?;
        if removed == 0 {
            Ok(NONE_REMOVED.to_string())
        } else {
            Ok(format!("Removed {removed} broadcast channel(s) from status updates."))
        }
    }
}
