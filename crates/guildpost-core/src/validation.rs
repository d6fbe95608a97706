//! Closed value sets and input checks shared by the command handlers.

use std::path::{Path, PathBuf};

use crate::error::CommandError;
use crate::gateway::{ChannelKind, ChannelRef};
use crate::registry::Choice;

pub const ICON_COLORS: &[Choice] = &[
    Choice::new("Red", "red"),
    Choice::new("Blue", "blue"),
    Choice::new("Green", "green"),
    Choice::new("Gold", "gold"),
    Choice::new("Purple", "purple"),
];

pub const TAG_ICONS: &[Choice] = &[
    Choice::new("Sword", "sword.png"),
    Choice::new("Shield", "shield.png"),
    Choice::new("Crown", "crown.png"),
    Choice::new("Skull", "skull.png"),
    Choice::new("Star", "star.png"),
];

pub fn check_choice(value: &str, choices: &[Choice]) -> bool {
    choices.iter().any(|c| c.value == value)
}

pub fn choice_values(choices: &[Choice]) -> Vec<&'static str> {
    choices.iter().map(|c| c.value).collect()
}

/// Validate the icon color / tag icon pair, reporting every bad value at once.
pub fn validate_icon_choice(color: &str, icon: &str) -> Result<(), CommandError> {
    let mut problems = Vec::new();
    if !check_choice(color, ICON_COLORS) {
        problems.push(format!(
            "Invalid icon color \"{color}\". Valid choices: {}",
            choice_values(ICON_COLORS).join(", ")
        ));
    }
    if !check_choice(icon, TAG_ICONS) {
        problems.push(format!(
            "Invalid tag icon \"{icon}\". Valid choices: {}",
            choice_values(TAG_ICONS).join(", ")
        ));
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(CommandError::Validation(problems.join("\n")))
    }
}

/// Strip path separators so a user value can only name a single path segment.
/// Returns `None` when nothing usable is left.
pub fn sanitize_segment(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '/' | '\\')).collect();
    match cleaned.as_str() {
        "" | "." | ".." => None,
        _ => Some(cleaned),
    }
}

/// `<base>/<color>/<icon>` with both segments sanitized.
pub fn resolve_icon_path(base: &Path, color: &str, icon: &str) -> Option<PathBuf> {
    let color = sanitize_segment(color)?;
    let icon = sanitize_segment(icon)?;
    Some(base.join(color).join(icon))
}

pub fn require_kind(
    channel: &ChannelRef,
    allowed: &[ChannelKind],
    message: &str,
) -> Result<(), CommandError> {
    if allowed.contains(&channel.kind) {
        Ok(())
    } else {
        tracing::debug!(
            "channel {} ({}) rejected: kind {} not in {allowed:?}",
            channel.name,
            channel.id,
            channel.kind
        );
        Err(CommandError::validation(message))
    }
}
