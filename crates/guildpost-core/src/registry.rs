//! Static declaration of the slash commands the bot exposes.

use anyhow::Result;
use serde::Serialize;

use crate::gateway::{ChannelKind, ChatGateway};
use crate::validation::{ICON_COLORS, TAG_ICONS};

pub const CREATE_TAGGED_POST: &str = "create-tagged-post";
pub const SET_CONTENT_CHANNEL: &str = "set-content-channel";
pub const SUBSCRIBE_BROADCAST: &str = "subscribe-broadcast";
pub const RESTART: &str = "restart";
pub const UNSUBSCRIBE_BROADCAST: &str = "unsubscribe-broadcast";

pub const OPT_ICON_COLOR: &str = "icon-color";
pub const OPT_TAG_ICON: &str = "tag-icon";
pub const OPT_GUILD_TAG: &str = "guild-tag";
pub const OPT_INVITE_LINK: &str = "invite-link";
pub const OPT_CHANNEL: &str = "channel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub name: &'static str,
    pub value: &'static str,
}

impl Choice {
    pub const fn new(name: &'static str, value: &'static str) -> Self {
        Self { name, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "channel_kinds")]
pub enum OptionKind {
    String,
    /// Channel picker restricted to the listed kinds.
    Channel(Vec<ChannelKind>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: OptionKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
}

impl OptionSpec {
    fn string(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: OptionKind::String,
            required: true,
            choices: Vec::new(),
        }
    }

    fn channel(name: &'static str, description: &'static str, kind: ChannelKind) -> Self {
        Self {
            name,
            description,
            kind: OptionKind::Channel(vec![kind]),
            required: true,
            choices: Vec::new(),
        }
    }

    fn with_choices(mut self, choices: &[Choice]) -> Self {
        self.choices = choices.to_vec();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub options: Vec<OptionSpec>,
    /// Hidden from direct messages.
    pub guild_only: bool,
}

impl CommandSpec {
    fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            options: Vec::new(),
            guild_only: true,
        }
    }

    fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }
}

pub fn all_commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new(CREATE_TAGGED_POST, "Creates a forum post with icon and tag")
            .option(
                OptionSpec::string(OPT_ICON_COLOR, "Select the icon color").with_choices(ICON_COLORS),
            )
            .option(OptionSpec::string(OPT_TAG_ICON, "Select the tag icon").with_choices(TAG_ICONS))
            .option(OptionSpec::string(
                OPT_GUILD_TAG,
                "The guild tag (e.g., ABC)",
            ))
            .option(OptionSpec::string(
                OPT_INVITE_LINK,
                "The invite link for the guild (DO NOT INCLUDE THE https://discord.gg/ PART)",
            )),
        CommandSpec::new(
            SET_CONTENT_CHANNEL,
            "Sets the forum channel to be used for tag posts",
        )
        .option(OptionSpec::channel(
            OPT_CHANNEL,
            "The forum channel",
            ChannelKind::Forum,
        )),
        CommandSpec::new(
            SUBSCRIBE_BROADCAST,
            "Posts bot online/offline status updates in a text channel",
        )
        .option(OptionSpec::channel(
            OPT_CHANNEL,
            "The text channel",
            ChannelKind::Text,
        )),
        CommandSpec::new(RESTART, "Restarts the bot"),
        CommandSpec::new(
            UNSUBSCRIBE_BROADCAST,
            "Stops status updates in every channel of this server",
        ),
    ]
}

/// Replace the remote command set. Failures are logged and returned; the
/// previously registered commands stay in effect.
pub async fn publish(gateway: &dyn ChatGateway) -> Result<()> {
    let commands = all_commands();
    match gateway.register_commands(&commands).await {
        Ok(()) => {
            tracing::info!("registered {} slash commands", commands.len());
            Ok(())
        }
        Err(err) => {
            tracing::error!("failed to register slash commands: {err:#}");
            Err(err)
        }
    }
}
