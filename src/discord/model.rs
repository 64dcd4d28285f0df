//! Discord data model.
//!
//! Deserialisation targets for the subset of REST and gateway payloads
//! this bridge consumes. Snowflake IDs stay in their wire form (strings);
//! creation timestamps are derived from them on demand.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// The Discord epoch (2015-01-01T00:00:00Z) in milliseconds.
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Derives the creation time encoded in a snowflake ID.
///
/// Returns `None` for IDs that are not decimal integers.
#[must_use]
pub fn snowflake_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let id: u64 = id.parse().ok()?;
    let offset_ms = i64::try_from(id >> 22).ok()?;
    Utc.timestamp_millis_opt(offset_ms + DISCORD_EPOCH_MS).single()
}

/// A Discord user.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// Snowflake ID.
    pub id: String,
    /// Account name.
    pub username: String,
    /// Legacy discriminator ("0" for migrated accounts).
    #[serde(default)]
    pub discriminator: String,
    /// Whether the account belongs to a bot.
    #[serde(default)]
    pub bot: bool,
}

impl User {
    /// Returns the `name#discriminator` tag.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{}#{}", self.username, self.discriminator)
    }

    /// Returns the chat mention form of this user.
    #[must_use]
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }

    /// Returns the account creation time derived from the snowflake.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        snowflake_timestamp(&self.id)
    }
}

/// A guild (server), from either the full or the partial listing payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Guild {
    /// Snowflake ID.
    pub id: String,
    /// Guild name.
    pub name: String,
    /// Owning user's snowflake ID (absent on partial payloads).
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Guild description.
    #[serde(default)]
    pub description: Option<String>,
    /// Server boost tier.
    #[serde(default)]
    pub premium_tier: u8,
    /// Member count (present when requested with counts).
    #[serde(default)]
    pub approximate_member_count: Option<u64>,
    /// Explicit content filter level.
    #[serde(default)]
    pub explicit_content_filter: u8,
}

impl Guild {
    /// Returns the guild creation time derived from the snowflake.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        snowflake_timestamp(&self.id)
    }
}

/// A guild role.
#[derive(Debug, Clone, Deserialize)]
pub struct Role {
    /// Snowflake ID.
    pub id: String,
    /// Role name.
    pub name: String,
}

/// A guild member.
#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    /// The underlying user (absent in some gateway payloads).
    #[serde(default)]
    pub user: Option<User>,
    /// Per-guild nickname.
    #[serde(default)]
    pub nick: Option<String>,
    /// Snowflake IDs of the member's roles (never includes `@everyone`).
    #[serde(default)]
    pub roles: Vec<String>,
    /// When the member joined the guild.
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

/// A reaction emoji, either Unicode or custom.
#[derive(Debug, Clone, Deserialize)]
pub struct Emoji {
    /// Custom emoji snowflake ID (`None` for Unicode emoji).
    #[serde(default)]
    pub id: Option<String>,
    /// Emoji name or the Unicode character itself.
    #[serde(default)]
    pub name: Option<String>,
}

impl Emoji {
    /// Best-effort display form: name, falling back to the custom ID.
    #[must_use]
    pub fn display(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| "?".to_string())
    }
}

/// An aggregated reaction on a message.
#[derive(Debug, Clone, Deserialize)]
pub struct Reaction {
    /// The emoji reacted with.
    pub emoji: Emoji,
    /// How many users reacted with it.
    #[serde(default)]
    pub count: u64,
}

/// A channel.
#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    /// Snowflake ID.
    pub id: String,
    /// Channel name (absent for DM channels).
    #[serde(default)]
    pub name: Option<String>,
    /// Channel type discriminant.
    #[serde(rename = "type", default)]
    pub kind: u8,
    /// Owning guild's snowflake ID (absent for DM channels).
    #[serde(default)]
    pub guild_id: Option<String>,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Snowflake ID.
    pub id: String,
    /// Channel the message was posted in.
    pub channel_id: String,
    /// Guild the message belongs to (absent for DMs and REST fetches).
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Message author.
    pub author: User,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// When the message was posted.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Users mentioned in the message.
    #[serde(default)]
    pub mentions: Vec<User>,
    /// Role snowflake IDs mentioned in the message.
    #[serde(default)]
    pub mention_roles: Vec<String>,
    /// Aggregated reactions.
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}
