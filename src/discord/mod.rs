//! Discord platform client.
//!
//! This module realises the platform side of the bridge: a REST client
//! over HTTPS ([`http`]), a gateway websocket connection that maintains
//! presence and readiness ([`gateway`]), the event responder for incoming
//! messages ([`events`]), and the owning handle tying them together
//! ([`client`]).
//!
//! The tool dispatcher consumes the platform exclusively through the
//! [`ChatApi`] trait, so tests can substitute a stub without touching the
//! network.

pub mod client;
pub mod events;
pub mod gateway;
pub mod http;
pub mod model;

pub use client::DiscordClient;
pub use http::Http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::discord::model::{Channel, Guild, Member, Message, Role, User};

/// Failures surfaced by the platform client.
///
/// The bridge never retries a failed platform operation; failures
/// propagate to the caller as error envelopes.
#[derive(Error, Debug)]
pub enum DiscordError {
    /// The HTTP transport failed before a response was obtained.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Discord answered with a non-success status.
    #[error("Discord API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Discord's error message.
        message: String,
    },

    /// The gateway connection failed or was lost.
    #[error("gateway error: {0}")]
    Gateway(String),
}

impl DiscordError {
    /// Returns the HTTP status for API errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this failure is a permission rejection (HTTP 403).
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Api { status: 403, .. })
    }

    /// Whether this failure is a missing resource (HTTP 404).
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

/// The query/command operations the tool dispatcher consumes.
///
/// Implemented by [`Http`] against the real API and by recording stubs in
/// tests.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Posts a message to a channel.
    async fn create_message(&self, channel_id: u64, content: &str) -> Result<Message, DiscordError>;

    /// Fetches the most recent messages of a channel, newest first.
    async fn channel_messages(&self, channel_id: u64, limit: u8)
        -> Result<Vec<Message>, DiscordError>;

    /// Fetches a single message.
    async fn get_message(&self, channel_id: u64, message_id: u64) -> Result<Message, DiscordError>;

    /// Deletes a message.
    async fn delete_message(
        &self,
        channel_id: u64,
        message_id: u64,
        reason: Option<&str>,
    ) -> Result<(), DiscordError>;

    /// Fetches a channel.
    async fn get_channel(&self, channel_id: u64) -> Result<Channel, DiscordError>;

    /// Fetches a user.
    async fn get_user(&self, user_id: u64) -> Result<User, DiscordError>;

    /// Fetches a guild, including member counts.
    async fn get_guild(&self, guild_id: u64) -> Result<Guild, DiscordError>;

    /// Lists the guilds the bot account belongs to.
    async fn current_user_guilds(&self) -> Result<Vec<Guild>, DiscordError>;

    /// Lists members of a guild.
    async fn list_members(&self, guild_id: u64, limit: u16) -> Result<Vec<Member>, DiscordError>;

    /// Fetches a single guild member.
    async fn get_member(&self, guild_id: u64, user_id: u64) -> Result<Member, DiscordError>;

    /// Lists the roles of a guild.
    async fn guild_roles(&self, guild_id: u64) -> Result<Vec<Role>, DiscordError>;

    /// Adds a role to a member.
    async fn add_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: Option<&str>,
    ) -> Result<(), DiscordError>;

    /// Removes a role from a member.
    async fn remove_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: Option<&str>,
    ) -> Result<(), DiscordError>;

    /// Creates a text channel in a guild.
    async fn create_text_channel(
        &self,
        guild_id: u64,
        name: &str,
        category_id: Option<u64>,
        topic: Option<&str>,
        reason: Option<&str>,
    ) -> Result<Channel, DiscordError>;

    /// Deletes a channel.
    async fn delete_channel(&self, channel_id: u64, reason: Option<&str>)
        -> Result<(), DiscordError>;

    /// Adds the bot's reaction to a message.
    async fn create_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<(), DiscordError>;

    /// Removes the bot's own reaction from a message.
    async fn delete_own_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<(), DiscordError>;

    /// Times a member out until the given instant.
    async fn timeout_member(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<(), DiscordError>;
}
