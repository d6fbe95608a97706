//! Blanket permission gate applied before every command.

pub const DENIED_MESSAGE: &str = "You do not have permission to use this command.";

/// Permissions of the invoking member, as resolved by the platform for the
/// guild the event came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallerCapabilities {
    pub kick_members: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Allow,
    Deny,
}

/// Events outside a guild never pass: there is no member to hold the permission.
pub fn authorize(guild_id: Option<u64>, caller: &CallerCapabilities) -> Authorization {
    match guild_id {
        Some(_) if caller.kick_members => Authorization::Allow,
        _ => Authorization::Deny,
    }
}
