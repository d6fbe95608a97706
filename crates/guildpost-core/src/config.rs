use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
}

fn default_content_channels() -> PathBuf {
    PathBuf::from("data/forumChannels.json")
}

fn default_broadcast_channels() -> PathBuf {
    PathBuf::from("data/broadcastChannels.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_content_channels")]
    pub content_channels: PathBuf,
    #[serde(default = "default_broadcast_channels")]
    pub broadcast_channels: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            content_channels: default_content_channels(),
            broadcast_channels: default_broadcast_channels(),
        }
    }
}

fn default_icons_dir() -> PathBuf {
    PathBuf::from("icons")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_icons_dir")]
    pub icons_dir: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            icons_dir: default_icons_dir(),
        }
    }
}

fn default_decoration() -> String {
    "<:bear_shroom:1372536537916375060>".to_string()
}

fn default_invite_prefix() -> String {
    "https://discord.gg/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostConfig {
    /// Emoji placed in front of each line of a tagged post.
    #[serde(default = "default_decoration")]
    pub decoration: String,
    #[serde(default = "default_invite_prefix")]
    pub invite_prefix: String,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            decoration: default_decoration(),
            invite_prefix: default_invite_prefix(),
        }
    }
}

fn default_online_message() -> String {
    "🟢 Bot is online.".to_string()
}

fn default_offline_message() -> String {
    "🔴 Bot is going offline.".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_online_message")]
    pub online: String,
    #[serde(default = "default_offline_message")]
    pub offline: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            online: default_online_message(),
            offline: default_offline_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub discord: DiscordConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub post: PostConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

impl BotConfig {
    /// Rebase every relative path onto `root`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.storage.content_channels = rebase(root, self.storage.content_channels);
        self.storage.broadcast_channels = rebase(root, self.storage.broadcast_channels);
        self.assets.icons_dir = rebase(root, self.assets.icons_dir);
        self
    }
}

fn rebase(root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

/// Expand `${VAR}` placeholders; unset variables expand to nothing and an
/// unclosed `${` is kept verbatim.
pub fn resolve_env_var(raw: &str) -> String {
    let mut resolved = String::with_capacity(raw.len());
    let mut remaining = raw;

    while let Some(open) = remaining.find("${") {
        let after = &remaining[open + 2..];
        let Some(close) = after.find('}') else {
            break;
        };
        resolved.push_str(&remaining[..open]);
        resolved.push_str(&std::env::var(&after[..close]).unwrap_or_default());
        remaining = &after[close + 1..];
    }

    resolved.push_str(remaining);
    resolved
}

/// Load `<root>/config.yaml`, resolve `${VAR}` placeholders, validate, and
/// rebase relative paths onto `root`.
pub fn load_config(root: &Path) -> Result<BotConfig> {
    let path = root.join(CONFIG_FILE);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config = parse_config(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config.rooted_at(root))
}

pub fn parse_config(content: &str) -> Result<BotConfig> {
    let mut config: BotConfig = serde_yaml::from_str(content)?;
    resolve_config_env(&mut config);
    Ok(config)
}

fn resolve_config_env(config: &mut BotConfig) {
    config.discord.token = resolve_env_var(&config.discord.token);
    config.post.decoration = resolve_env_var(&config.post.decoration);
    config.post.invite_prefix = resolve_env_var(&config.post.invite_prefix);
}

pub fn validate_config(config: &BotConfig) -> Result<()> {
    if config.discord.token.trim().is_empty() {
        return Err(anyhow!("discord.token is empty"));
    }
    if !config.post.invite_prefix.starts_with("https://") {
        return Err(anyhow!(
            "post.invite_prefix must start with https://: {}",
            config.post.invite_prefix
        ));
    }
    if config.storage.content_channels == config.storage.broadcast_channels {
        return Err(anyhow!(
            "storage.content_channels and storage.broadcast_channels must be different files"
        ));
    }
    Ok(())
}
