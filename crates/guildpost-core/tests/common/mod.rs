#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use guildpost_core::{
    CallerCapabilities, ChannelKind, ChannelRef, ChatGateway, CommandEvent, CommandSpec,
    ConfigStore, Dispatcher, ForumPost, LifecycleNotifier, OptionValue, PostConfig,
    ProcessExit, ReplySink, StatusConfig,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const GUILD: u64 = 1000;
pub const OTHER_GUILD: u64 = 2000;
pub const MODERATOR: u64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchChannel(u64),
    GuildTextChannels(u64),
    CanSend(u64),
    Send(u64, String),
    CreateForumPost(u64, ForumPost),
    RegisterCommands(Vec<&'static str>),
    Disconnect,
}

/// In-memory stand-in for the chat platform that records every call.
#[derive(Default)]
pub struct MockGateway {
    channels: Mutex<HashMap<u64, (u64, ChannelRef)>>,
    no_permission: Mutex<HashSet<u64>>,
    failing: Mutex<HashSet<u64>>,
    fail_register: Mutex<bool>,
    fail_posts: Mutex<bool>,
    latency: Mutex<Option<Duration>>,
    disconnected: Mutex<Option<mpsc::UnboundedSender<()>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockGateway {
    pub fn add_channel(&self, guild_id: u64, channel: ChannelRef) {
        self.channels
            .lock()
            .unwrap()
            .insert(channel.id, (guild_id, channel));
    }

    pub fn deny_send(&self, channel_id: u64) {
        self.no_permission.lock().unwrap().insert(channel_id);
    }

    /// Sends, fetches and post creation in this channel fail.
    pub fn break_channel(&self, channel_id: u64) {
        self.failing.lock().unwrap().insert(channel_id);
    }

    pub fn fail_registration(&self) {
        *self.fail_register.lock().unwrap() = true;
    }

    pub fn fail_posts(&self) {
        *self.fail_posts.lock().unwrap() = true;
    }

    /// Sends and disconnects take this long.
    pub fn slow_down(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    /// Signalled as soon as `disconnect` starts, the way closing the shards
    /// ends the client task.
    pub fn on_disconnect(&self, tx: mpsc::UnboundedSender<()>) {
        *self.disconnected.lock().unwrap() = Some(tx);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(u64, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send(id, text) => Some((id, text)),
                _ => None,
            })
            .collect()
    }

    pub fn posts(&self) -> Vec<(u64, ForumPost)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateForumPost(id, post) => Some((id, post)),
                _ => None,
            })
            .collect()
    }

    pub fn disconnects(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == Call::Disconnect)
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn is_failing(&self, channel_id: u64) -> bool {
        self.failing.lock().unwrap().contains(&channel_id)
    }

    async fn lag(&self) {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ChatGateway for MockGateway {
    async fn fetch_channel(&self, channel_id: u64) -> Result<Option<ChannelRef>> {
        self.record(Call::FetchChannel(channel_id));
        if self.is_failing(channel_id) {
            return Err(anyhow!("gateway unavailable"));
        }
        Ok(self
            .channels
            .lock()
            .unwrap()
            .get(&channel_id)
            .map(|(_, channel)| channel.clone()))
    }

    async fn guild_text_channels(&self, guild_id: u64) -> Result<Vec<u64>> {
        self.record(Call::GuildTextChannels(guild_id));
        let mut ids: Vec<u64> = self
            .channels
            .lock()
            .unwrap()
            .values()
            .filter(|(guild, channel)| *guild == guild_id && channel.kind == ChannelKind::Text)
            .map(|(_, channel)| channel.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn can_send(&self, channel_id: u64) -> Result<bool> {
        self.record(Call::CanSend(channel_id));
        Ok(!self.no_permission.lock().unwrap().contains(&channel_id))
    }

    async fn send_message(&self, channel_id: u64, content: &str) -> Result<()> {
        self.lag().await;
        if self.is_failing(channel_id) {
            return Err(anyhow!("send failed"));
        }
        self.record(Call::Send(channel_id, content.to_string()));
        Ok(())
    }

    async fn create_forum_post(&self, channel_id: u64, post: ForumPost) -> Result<()> {
        if self.is_failing(channel_id) || *self.fail_posts.lock().unwrap() {
            return Err(anyhow!("upload failed"));
        }
        self.record(Call::CreateForumPost(channel_id, post));
        Ok(())
    }

    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<()> {
        if *self.fail_register.lock().unwrap() {
            return Err(anyhow!("401 Unauthorized"));
        }
        self.record(Call::RegisterCommands(
            commands.iter().map(|c| c.name).collect(),
        ));
        Ok(())
    }

    async fn disconnect(&self) {
        let disconnected = self.disconnected.lock().unwrap().clone();
        if let Some(tx) = disconnected {
            let _ = tx.send(());
        }
        self.lag().await;
        self.record(Call::Disconnect);
    }
}

#[derive(Default)]
pub struct RecordingReply {
    replies: Mutex<Vec<String>>,
}

impl RecordingReply {
    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().unwrap().clone()
    }

    pub fn only(&self) -> String {
        let replies = self.replies();
        assert_eq!(replies.len(), 1, "expected exactly one reply: {replies:?}");
        replies[0].clone()
    }
}

#[async_trait]
impl ReplySink for RecordingReply {
    async fn reply_private(&self, content: &str) -> Result<()> {
        self.replies.lock().unwrap().push(content.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingExit {
    codes: Mutex<Vec<i32>>,
}

impl RecordingExit {
    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().unwrap().clone()
    }
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.codes.lock().unwrap().push(code);
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub gateway: Arc<MockGateway>,
    pub store: Arc<ConfigStore>,
    pub exit: Arc<RecordingExit>,
    pub notifier: Arc<LifecycleNotifier>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let gateway = Arc::new(MockGateway::default());
        let store = Arc::new(ConfigStore::new(
            tmp.path().join("data/forumChannels.json"),
            tmp.path().join("data/broadcastChannels.json"),
        ));
        let exit = Arc::new(RecordingExit::default());
        let notifier = Arc::new(LifecycleNotifier::new(
            gateway.clone(),
            store.clone(),
            exit.clone(),
            StatusConfig::default(),
        ));
        let dispatcher = Dispatcher::new(
            store.clone(),
            gateway.clone(),
            notifier.clone(),
            tmp.path().join("icons"),
            PostConfig::default(),
        );
        Self {
            tmp,
            gateway,
            store,
            exit,
            notifier,
            dispatcher,
        }
    }

    pub fn icons_dir(&self) -> PathBuf {
        self.tmp.path().join("icons")
    }

    pub fn add_icon(&self, color: &str, icon: &str) -> PathBuf {
        let dir = self.icons_dir().join(color);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(icon);
        std::fs::write(&path, b"\x89PNG").unwrap();
        path
    }

    pub async fn run(&self, event: CommandEvent) -> RecordingReply {
        let reply = RecordingReply::default();
        self.dispatcher.handle_event(event, &reply).await.unwrap();
        reply
    }
}

pub fn event(name: &str, options: Vec<(&str, OptionValue)>) -> CommandEvent {
    CommandEvent {
        name: name.to_string(),
        guild_id: Some(GUILD),
        user_id: MODERATOR,
        capabilities: CallerCapabilities { kick_members: true },
        options: options
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    }
}

pub fn text(value: &str) -> OptionValue {
    OptionValue::String(value.to_string())
}

pub fn channel(id: u64, name: &str, kind: ChannelKind) -> OptionValue {
    OptionValue::Channel(ChannelRef::new(id, name, kind))
}
