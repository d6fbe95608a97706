//! File-backed configuration records.
//!
//! Two JSON documents, each read and rewritten whole on every access:
//!
//! - content channels: `{ "<guildId>": "<channelId>" }`
//! - broadcast channels: `["<channelId>", ...]`
//!
//! A missing, empty or unparsable document reads as empty. Every
//! read-modify-write holds the store lock for its full duration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

pub struct ConfigStore {
    content_path: PathBuf,
    broadcast_path: PathBuf,
    lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(content_path: impl Into<PathBuf>, broadcast_path: impl Into<PathBuf>) -> Self {
        Self {
            content_path: content_path.into(),
            broadcast_path: broadcast_path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn content_path(&self) -> &Path {
        &self.content_path
    }

    pub fn broadcast_path(&self) -> &Path {
        &self.broadcast_path
    }

    /// The forum channel bound to `guild_id`, if any.
    pub async fn content_channel(&self, guild_id: u64) -> Option<u64> {
        let _guard = self.lock.lock().await;
        let bindings: BTreeMap<String, String> = read_document(&self.content_path).await;
        let raw = bindings.get(&guild_id.to_string())?;
        match raw.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(
                    "ignoring malformed channel id {raw:?} for guild {guild_id} in {}",
                    self.content_path.display()
                );
                None
            }
        }
    }

    /// Bind `channel_id` as the content channel of `guild_id`. Last write wins.
    pub async fn set_content_channel(&self, guild_id: u64, channel_id: u64) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut bindings: BTreeMap<String, String> = read_document(&self.content_path).await;
        bindings.insert(guild_id.to_string(), channel_id.to_string());
        write_document(&self.content_path, &bindings).await
    }

    pub async fn broadcast_channels(&self) -> Vec<u64> {
        let _guard = self.lock.lock().await;
        self.load_broadcast().await
    }

    /// Returns `true` when the channel was not subscribed before.
    pub async fn add_broadcast_channel(&self, channel_id: u64) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut channels = self.load_broadcast().await;
        if channels.contains(&channel_id) {
            return Ok(false);
        }
        channels.push(channel_id);
        self.save_broadcast(&channels).await?;
        Ok(true)
    }

    /// Drop every subscribed channel matching `predicate`; returns how many went.
    pub async fn remove_broadcast_channels<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(u64) -> bool,
    {
        let _guard = self.lock.lock().await;
        let mut channels = self.load_broadcast().await;
        let before = channels.len();
        channels.retain(|id| !predicate(*id));
        let removed = before - channels.len();
        if removed > 0 {
            self.save_broadcast(&channels).await?;
        }
        Ok(removed)
    }

    async fn load_broadcast(&self) -> Vec<u64> {
        let raw: Vec<String> = read_document(&self.broadcast_path).await;
        let mut channels = Vec::with_capacity(raw.len());
        for entry in raw {
            match entry.parse::<u64>() {
                Ok(id) if !channels.contains(&id) => channels.push(id),
                Ok(_) => {}
                Err(_) => tracing::warn!(
                    "skipping malformed broadcast channel id {entry:?} in {}",
                    self.broadcast_path.display()
                ),
            }
        }
        channels
    }

    async fn save_broadcast(&self, channels: &[u64]) -> Result<()> {
        let raw: Vec<String> = channels.iter().map(u64::to_string).collect();
        write_document(&self.broadcast_path, &raw).await
    }
}

async fn read_document<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(err) => {
            tracing::error!("failed to read {}: {err}", path.display());
            return T::default();
        }
    };
    if content.trim().is_empty() {
        return T::default();
    }
    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(
                "failed to parse {}, treating it as empty: {err}",
                path.display()
            );
            T::default()
        }
    }
}

async fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let data = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}
