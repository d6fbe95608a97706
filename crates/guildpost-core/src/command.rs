//! Typed form of an incoming slash command.

use thiserror::Error;

use crate::auth::CallerCapabilities;
use crate::gateway::ChannelRef;
use crate::registry::{
    CREATE_TAGGED_POST, OPT_CHANNEL, OPT_GUILD_TAG, OPT_ICON_COLOR, OPT_INVITE_LINK,
    OPT_TAG_ICON, RESTART, SET_CONTENT_CHANNEL, SUBSCRIBE_BROADCAST, UNSUBSCRIBE_BROADCAST,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    String(String),
    Channel(ChannelRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    CreateTaggedPost {
        color: String,
        icon: String,
        tag: String,
        invite: String,
    },
    SetContentChannel {
        channel: ChannelRef,
    },
    SubscribeBroadcast {
        channel: ChannelRef,
    },
    Restart,
    UnsubscribeBroadcast,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("Missing required option `{0}`.")]
    MissingOption(&'static str),
    #[error("Option `{0}` has the wrong type.")]
    WrongOptionType(&'static str),
}

impl BotCommand {
    pub fn parse(name: &str, options: &[(String, OptionValue)]) -> Result<Self, CommandParseError> {
        let args = Args(options);
        match name {
            CREATE_TAGGED_POST => Ok(BotCommand::CreateTaggedPost {
                color: args.string(OPT_ICON_COLOR)?,
                icon: args.string(OPT_TAG_ICON)?,
                tag: args.string(OPT_GUILD_TAG)?,
                invite: args.string(OPT_INVITE_LINK)?,
            }),
            SET_CONTENT_CHANNEL => Ok(BotCommand::SetContentChannel {
                channel: args.channel(OPT_CHANNEL)?,
            }),
            SUBSCRIBE_BROADCAST => Ok(BotCommand::SubscribeBroadcast {
                channel: args.channel(OPT_CHANNEL)?,
            }),
            RESTART => Ok(BotCommand::Restart),
            UNSUBSCRIBE_BROADCAST => Ok(BotCommand::UnsubscribeBroadcast),
            other => Err(CommandParseError::UnknownCommand(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BotCommand::CreateTaggedPost { .. } => CREATE_TAGGED_POST,
            BotCommand::SetContentChannel { .. } => SET_CONTENT_CHANNEL,
            BotCommand::SubscribeBroadcast { .. } => SUBSCRIBE_BROADCAST,
            BotCommand::Restart => RESTART,
            BotCommand::UnsubscribeBroadcast => UNSUBSCRIBE_BROADCAST,
        }
    }
}

struct Args<'a>(&'a [(String, OptionValue)]);

impl Args<'_> {
    fn get(&self, name: &'static str) -> Result<&OptionValue, CommandParseError> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
            .ok_or(CommandParseError::MissingOption(name))
    }

    fn string(&self, name: &'static str) -> Result<String, CommandParseError> {
        match self.get(name)? {
            OptionValue::String(value) => Ok(value.clone()),
            OptionValue::Channel(_) => Err(CommandParseError::WrongOptionType(name)),
        }
    }

    fn channel(&self, name: &'static str) -> Result<ChannelRef, CommandParseError> {
        match self.get(name)? {
            OptionValue::Channel(channel) => Ok(channel.clone()),
            OptionValue::String(_) => Err(CommandParseError::WrongOptionType(name)),
        }
    }
}

/// A raw command event: name and options as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    pub name: String,
    pub guild_id: Option<u64>,
    pub user_id: u64,
    pub capabilities: CallerCapabilities,
    pub options: Vec<(String, OptionValue)>,
}

/// One command event, already decoded from the platform payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub guild_id: Option<u64>,
    pub user_id: u64,
    pub capabilities: CallerCapabilities,
    pub command: BotCommand,
}
