use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use guildpost_core::{
    publish, CallerCapabilities, ChannelKind, ChannelRef, ChatGateway, CommandEvent, CommandSpec,
    Dispatcher, ForumPost, LifecycleNotifier, OptionKind, OptionSpec, OptionValue, ReplySink,
};
use serenity::all::{
    Cache, Channel, ChannelId, ChannelType, Client, Command, CommandInteraction,
    CommandOptionType, Context, CreateAttachment, CreateCommand, CreateCommandOption,
    CreateForumPost, CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage, CreateMessage, EventHandler, GatewayIntents, GuildId, Http,
    Interaction, Permissions, Ready, ResolvedValue, ShardManager,
};
use serenity::async_trait;
use serenity::http::HttpError;
use tokio::sync::RwLock;

#[derive(Clone)]
struct Session {
    http: Arc<Http>,
    cache: Arc<Cache>,
    shards: Arc<ShardManager>,
}

/// [`ChatGateway`] backed by a serenity client. Empty until [`attach`] runs.
///
/// [`attach`]: DiscordGateway::attach
#[derive(Default)]
pub struct DiscordGateway {
    session: RwLock<Option<Session>>,
}

impl DiscordGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, http: Arc<Http>, cache: Arc<Cache>, shards: Arc<ShardManager>) {
        let mut holder = self.session.write().await;
        *holder = Some(Session {
            http,
            cache,
            shards,
        });
    }

    async fn session(&self) -> Result<Session> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow!("discord client not connected"))
    }
}

#[async_trait]
impl ChatGateway for DiscordGateway {
    async fn fetch_channel(&self, channel_id: u64) -> Result<Option<ChannelRef>> {
        let session = self.session().await?;
        let cache_http = (&session.cache, session.http.as_ref());
        match ChannelId::new(channel_id).to_channel(cache_http).await {
            Ok(Channel::Guild(channel)) => Ok(Some(ChannelRef::new(
                channel.id.get(),
                channel.name.clone(),
                channel_kind(channel.kind),
            ))),
            Ok(Channel::Private(channel)) => Ok(Some(ChannelRef::new(
                channel.id.get(),
                channel.name(),
                ChannelKind::Other,
            ))),
            Ok(_) => Ok(None),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn guild_text_channels(&self, guild_id: u64) -> Result<Vec<u64>> {
        let session = self.session().await?;
        let channels = GuildId::new(guild_id).channels(&session.http).await?;
        let mut ids: Vec<u64> = channels
            .values()
            .filter(|channel| channel.kind == ChannelType::Text)
            .map(|channel| channel.id.get())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn can_send(&self, channel_id: u64) -> Result<bool> {
        let session = self.session().await?;
        let cache_http = (&session.cache, session.http.as_ref());
        let Channel::Guild(channel) = ChannelId::new(channel_id).to_channel(cache_http).await?
        else {
            return Ok(false);
        };
        let me = session.cache.current_user().id;
        let permissions = channel.permissions_for_user(&session.cache, me)?;
        Ok(permissions.view_channel() && permissions.send_messages())
    }

    async fn send_message(&self, channel_id: u64, content: &str) -> Result<()> {
        let session = self.session().await?;
        ChannelId::new(channel_id)
            .say(&session.http, content)
            .await?;
        Ok(())
    }

    async fn create_forum_post(&self, channel_id: u64, post: ForumPost) -> Result<()> {
        let session = self.session().await?;
        let mut message = CreateMessage::new().content(post.content);
        if let Some(path) = &post.attachment {
            message = message.add_file(CreateAttachment::path(path).await?);
        }
        ChannelId::new(channel_id)
            .create_forum_post(&session.http, CreateForumPost::new(post.title, message))
            .await?;
        Ok(())
    }

    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<()> {
        let session = self.session().await?;
        Command::set_global_commands(&session.http, build_commands(commands)).await?;
        Ok(())
    }

    async fn disconnect(&self) {
        match self.session().await {
            Ok(session) => {
                session.shards.shutdown_all().await;
                tracing::info!("discord shards shut down");
            }
            Err(err) => tracing::debug!("nothing to disconnect: {err}"),
        }
    }
}

/// Replies to one slash command invocation. The first reply answers the
/// interaction, later ones are followups. All of them are ephemeral.
pub struct InteractionReply {
    http: Arc<Http>,
    interaction: CommandInteraction,
    responded: AtomicBool,
}

impl InteractionReply {
    pub fn new(http: Arc<Http>, interaction: CommandInteraction) -> Self {
        Self {
            http,
            interaction,
            responded: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ReplySink for InteractionReply {
    async fn reply_private(&self, content: &str) -> Result<()> {
        if self.responded.swap(true, Ordering::SeqCst) {
            let followup = CreateInteractionResponseFollowup::new()
                .content(content)
                .ephemeral(true);
            self.interaction
                .create_followup(&self.http, followup)
                .await?;
        } else {
            let message = CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(true);
            self.interaction
                .create_response(&self.http, CreateInteractionResponse::Message(message))
                .await?;
        }
        Ok(())
    }
}

pub struct DiscordBot {
    token: String,
    gateway: Arc<DiscordGateway>,
    dispatcher: Arc<Dispatcher>,
    notifier: Arc<LifecycleNotifier>,
}

impl DiscordBot {
    pub fn new(
        token: String,
        gateway: Arc<DiscordGateway>,
        dispatcher: Arc<Dispatcher>,
        notifier: Arc<LifecycleNotifier>,
    ) -> Self {
        Self {
            token,
            gateway,
            dispatcher,
            notifier,
        }
    }

    pub async fn run_impl(self) -> Result<()> {
        let handler = DiscordHandler {
            gateway: self.gateway.clone(),
            dispatcher: self.dispatcher,
            notifier: self.notifier,
            started: AtomicBool::new(false),
        };

        let mut client = Client::builder(&self.token, GatewayIntents::GUILDS)
            .event_handler(handler)
            .await?;
        self.gateway
            .attach(
                client.http.clone(),
                client.cache.clone(),
                client.shard_manager.clone(),
            )
            .await;
        client.start().await?;
        Ok(())
    }
}

#[async_trait]
impl crate::ChatBot for DiscordBot {
    fn platform(&self) -> &str {
        "discord"
    }

    async fn run(self: Box<Self>) -> Result<()> {
        (*self).run_impl().await
    }
}

struct DiscordHandler {
    gateway: Arc<DiscordGateway>,
    dispatcher: Arc<Dispatcher>,
    notifier: Arc<LifecycleNotifier>,
    started: AtomicBool,
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(
            "discord bot connected as {} in {} guild(s)",
            ready.user.name,
            ready.guilds.len()
        );
        // Fires again after every reconnect.
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        // Registration failure is logged by `publish`; the bot keeps running.
        let _ = publish(self.gateway.as_ref()).await;
        self.notifier.announce_online().await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        let event = command_event(&command);
        let name = event.name.clone();
        let reply = InteractionReply::new(ctx.http.clone(), command);
        if let Err(err) = self.dispatcher.handle_event(event, &reply).await {
            tracing::error!("failed to answer /{name}: {err:#}");
        }
    }
}

fn command_event(command: &CommandInteraction) -> CommandEvent {
    let options = command
        .data
        .options()
        .into_iter()
        .filter_map(|option| {
            let value = match option.value {
                ResolvedValue::String(text) => OptionValue::String(text.to_string()),
                ResolvedValue::Channel(channel) => OptionValue::Channel(ChannelRef::new(
                    channel.id.get(),
                    channel.name.clone().unwrap_or_default(),
                    channel_kind(channel.kind),
                )),
                _ => return None,
            };
            Some((option.name.to_string(), value))
        })
        .collect();

    CommandEvent {
        name: command.data.name.clone(),
        guild_id: command.guild_id.map(|id| id.get()),
        user_id: command.user.id.get(),
        capabilities: capabilities(
            command
                .member
                .as_deref()
                .and_then(|member| member.permissions),
        ),
        options,
    }
}

fn capabilities(permissions: Option<Permissions>) -> CallerCapabilities {
    CallerCapabilities {
        kick_members: permissions.is_some_and(|p| p.kick_members()),
    }
}

fn channel_kind(kind: ChannelType) -> ChannelKind {
    match kind {
        ChannelType::Text => ChannelKind::Text,
        ChannelType::News => ChannelKind::Announcement,
        ChannelType::Forum => ChannelKind::Forum,
        ChannelType::Voice | ChannelType::Stage => ChannelKind::Voice,
        ChannelType::Category => ChannelKind::Category,
        ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread => {
            ChannelKind::Thread
        }
        _ => ChannelKind::Other,
    }
}

fn channel_type(kind: ChannelKind) -> Option<ChannelType> {
    match kind {
        ChannelKind::Text => Some(ChannelType::Text),
        ChannelKind::Announcement => Some(ChannelType::News),
        ChannelKind::Forum => Some(ChannelType::Forum),
        ChannelKind::Voice => Some(ChannelType::Voice),
        ChannelKind::Category => Some(ChannelType::Category),
        ChannelKind::Thread => Some(ChannelType::PublicThread),
        ChannelKind::Other => None,
    }
}

fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404
    )
}

pub fn build_commands(commands: &[CommandSpec]) -> Vec<CreateCommand> {
    commands
        .iter()
        .map(|spec| {
            spec.options.iter().fold(
                CreateCommand::new(spec.name)
                    .description(spec.description)
                    .dm_permission(!spec.guild_only),
                |command, option| command.add_option(build_option(option)),
            )
        })
        .collect()
}

fn build_option(spec: &OptionSpec) -> CreateCommandOption {
    let kind = match spec.kind {
        OptionKind::String => CommandOptionType::String,
        OptionKind::Channel(_) => CommandOptionType::Channel,
    };
    let mut option =
        CreateCommandOption::new(kind, spec.name, spec.description).required(spec.required);
    if let OptionKind::Channel(kinds) = &spec.kind {
        option = option.channel_types(kinds.iter().filter_map(|k| channel_type(*k)).collect());
    }
    for choice in &spec.choices {
        option = option.add_string_choice(choice.name, choice.value);
    }
    option
}
