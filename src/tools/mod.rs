//! Tool registry and dispatcher.
//!
//! Each tool is a thin call into the Discord client; the interesting part
//! is the dispatch contract consumed by the protocol server:
//! `list_tools` returns the static catalog, `call_tool` routes by name
//! and converts every failure into a typed [`ToolError`].
//!
//! Tool calls are logically guaranteed a ready client (the coordinator
//! starts the protocol server only after readiness), but the readiness
//! latch is still checked so a stray call can never hit a half-connected
//! client. Nothing is retried here.

pub mod catalog;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::discord::model::{Member, Message};
use crate::discord::{ChatApi, DiscordError};
use crate::mcp::protocol::{ContentItem, ToolDescriptor};
use crate::mcp::server::{CallToolHandler, HandlerError, ListToolsHandler};
use crate::runtime::ReadinessLatch;

/// Failures raised while dispatching a tool call.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The requested tool does not exist.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The Discord client has not reported readiness yet.
    #[error("Discord client not ready")]
    ClientNotReady,

    /// The arguments do not satisfy the tool's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The platform operation failed.
    #[error(transparent)]
    Discord(#[from] DiscordError),
}

/// Routes tool calls into the platform client.
pub struct ToolDispatcher {
    api: Arc<dyn ChatApi>,
    ready: ReadinessLatch,
    catalog: Vec<ToolDescriptor>,
}

impl ToolDispatcher {
    /// Creates a dispatcher over the given platform API.
    ///
    /// The readiness latch comes from the client owned by the lifecycle
    /// coordinator.
    #[must_use]
    pub fn new(api: Arc<dyn ChatApi>, ready: ReadinessLatch) -> Self {
        Self {
            api,
            ready,
            catalog: catalog::build(),
        }
    }

    /// Routes one call by tool name.
    async fn dispatch(
        &self,
        tool: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        if !self.ready.is_set() {
            return Err(ToolError::ClientNotReady);
        }

        match tool {
            "get_server_info" => self.get_server_info(arguments).await,
            "list_members" => self.list_members(arguments).await,
            "add_role" => self.add_role(arguments).await,
            "remove_role" => self.remove_role(arguments).await,
            "create_text_channel" => self.create_text_channel(arguments).await,
            "delete_channel" => self.delete_channel(arguments).await,
            "add_reaction" => self.add_reaction(arguments).await,
            "add_multiple_reactions" => self.add_multiple_reactions(arguments).await,
            "remove_reaction" => self.remove_reaction(arguments).await,
            "send_message" => self.send_message(arguments).await,
            "read_messages" => self.read_messages(arguments).await,
            "get_user_info" => self.get_user_info(arguments).await,
            "moderate_message" => self.moderate_message(arguments).await,
            "get_user_roles" => self.get_user_roles(arguments).await,
            _ => Err(ToolError::UnknownTool(tool.to_string())),
        }
    }

    async fn send_message(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let channel_id = require_id(arguments, "channel_id")?;
        let content = require_str(arguments, "content")?;

        let message = self.api.create_message(channel_id, content).await?;
        Ok(text(format!(
            "Message sent successfully. Message ID: {}",
            message.id
        )))
    }

    async fn read_messages(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let channel_id = require_id(arguments, "channel_id")?;
        let limit = optional_u64(arguments, "limit")?.unwrap_or(10).min(100);
        let limit = u8::try_from(limit).unwrap_or(100);

        let messages = self.api.channel_messages(channel_id, limit).await?;
        let formatted: Vec<String> = messages.iter().map(format_message).collect();

        Ok(text(format!(
            "Retrieved {} messages:\n\n{}",
            messages.len(),
            formatted.join("\n\n")
        )))
    }

    async fn get_user_info(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let user = self.api.get_user(require_id(arguments, "user_id")?).await?;
        let created = user
            .created_at()
            .map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339());

        Ok(text(format!(
            "User information:\nName: {}\nID: {}\nBot: {}\nCreated: {}",
            user.tag(),
            user.id,
            user.bot,
            created
        )))
    }

    async fn moderate_message(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let channel_id = require_id(arguments, "channel_id")?;
        let message_id = require_id(arguments, "message_id")?;
        let reason = require_str(arguments, "reason")?;

        let message = self.api.get_message(channel_id, message_id).await?;
        self.api
            .delete_message(channel_id, message_id, Some(reason))
            .await?;

        let timeout_minutes = optional_u64(arguments, "timeout_minutes")?.unwrap_or(0);
        if timeout_minutes > 0 {
            // A timeout needs the guild; DM messages have none and are
            // left at plain deletion, as is an unparseable author id.
            let channel = self.api.get_channel(channel_id).await?;
            let guild_id = channel.guild_id.as_deref().and_then(|id| id.parse::<u64>().ok());
            let author_id = message.author.id.parse::<u64>().ok();

            if let (Some(guild_id), Some(author_id)) = (guild_id, author_id) {
                let minutes = i64::try_from(timeout_minutes).unwrap_or(0);
                let until = Utc::now() + chrono::Duration::minutes(minutes);

                return match self
                    .api
                    .timeout_member(guild_id, author_id, until, Some(reason))
                    .await
                {
                    Ok(()) => Ok(text(format!(
                        "Message deleted and user timed out for {timeout_minutes} minutes."
                    ))),
                    Err(e) if e.is_permission_denied() => Ok(text(
                        "Message deleted but lacking permissions to timeout user.",
                    )),
                    Err(e) => Err(e.into()),
                };
            }
        }

        Ok(text("Message deleted successfully."))
    }

    async fn get_server_info(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let guild = self.api.get_guild(require_id(arguments, "server_id")?).await?;

        let created = guild
            .created_at()
            .map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339());
        let member_count = guild
            .approximate_member_count
            .map_or_else(|| "unknown".to_string(), |count| count.to_string());

        Ok(text(format!(
            "Server Information:\nname: {}\nid: {}\nowner_id: {}\nmember_count: {}\ncreated_at: {}\ndescription: {}\npremium_tier: {}\nexplicit_content_filter: {}",
            guild.name,
            guild.id,
            guild.owner_id.as_deref().unwrap_or("unknown"),
            member_count,
            created,
            guild.description.as_deref().unwrap_or("None"),
            guild.premium_tier,
            guild.explicit_content_filter
        )))
    }

    async fn list_members(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let guild_id = require_id(arguments, "server_id")?;
        let limit = optional_u64(arguments, "limit")?.unwrap_or(100).min(1000);
        let limit = u16::try_from(limit).unwrap_or(1000);

        let members = self.api.list_members(guild_id, limit).await?;
        let lines: Vec<String> = members
            .iter()
            .map(|member| {
                format!(
                    "{} (ID: {}, Roles: {})",
                    member_name(member),
                    member_id(member),
                    member.roles.join(", ")
                )
            })
            .collect();

        Ok(text(format!(
            "Server Members ({}):\n{}",
            members.len(),
            lines.join("\n")
        )))
    }

    async fn add_role(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let guild_id = require_id(arguments, "server_id")?;
        let user_id = require_id(arguments, "user_id")?;
        let role_id = require_id(arguments, "role_id")?;

        let member = self.api.get_member(guild_id, user_id).await?;
        let role_name = self.role_name(guild_id, role_id).await?;
        self.api
            .add_member_role(guild_id, user_id, role_id, Some("Role added via MCP"))
            .await?;

        Ok(text(format!(
            "Added role {role_name} to user {}",
            member_name(&member)
        )))
    }

    async fn remove_role(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let guild_id = require_id(arguments, "server_id")?;
        let user_id = require_id(arguments, "user_id")?;
        let role_id = require_id(arguments, "role_id")?;

        let member = self.api.get_member(guild_id, user_id).await?;
        let role_name = self.role_name(guild_id, role_id).await?;
        self.api
            .remove_member_role(guild_id, user_id, role_id, Some("Role removed via MCP"))
            .await?;

        Ok(text(format!(
            "Removed role {role_name} from user {}",
            member_name(&member)
        )))
    }

    async fn create_text_channel(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let guild_id = require_id(arguments, "server_id")?;
        let name = require_str(arguments, "name")?;
        let category_id = optional_id(arguments, "category_id")?;
        let topic = optional_str(arguments, "topic");

        let channel = self
            .api
            .create_text_channel(
                guild_id,
                name,
                category_id,
                topic,
                Some("Channel created via MCP"),
            )
            .await?;

        Ok(text(format!(
            "Created text channel #{} (ID: {})",
            channel.name.as_deref().unwrap_or(name),
            channel.id
        )))
    }

    async fn delete_channel(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let channel_id = require_id(arguments, "channel_id")?;
        let reason = optional_str(arguments, "reason").unwrap_or("Channel deleted via MCP");

        self.api.delete_channel(channel_id, Some(reason)).await?;
        Ok(text("Deleted channel successfully"))
    }

    async fn add_reaction(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let channel_id = require_id(arguments, "channel_id")?;
        let message_id = require_id(arguments, "message_id")?;
        let emoji = require_str(arguments, "emoji")?;

        // API rejections (bad emoji, missing permissions) are reported as
        // a result, keeping parity with the other reaction tools' caller
        // expectations.
        match self.api.create_reaction(channel_id, message_id, emoji).await {
            Ok(()) => Ok(text(format!("Added reaction {emoji} to message"))),
            Err(e @ DiscordError::Api { .. }) => {
                Ok(text(format!("Failed to add reaction: {e}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn add_multiple_reactions(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let channel_id = require_id(arguments, "channel_id")?;
        let message_id = require_id(arguments, "message_id")?;
        let emojis = require_str_array(arguments, "emojis")?;

        for emoji in &emojis {
            self.api.create_reaction(channel_id, message_id, emoji).await?;
        }

        Ok(text(format!(
            "Added reactions: {} to message",
            emojis.join(", ")
        )))
    }

    async fn remove_reaction(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let channel_id = require_id(arguments, "channel_id")?;
        let message_id = require_id(arguments, "message_id")?;
        let emoji = require_str(arguments, "emoji")?;

        self.api
            .delete_own_reaction(channel_id, message_id, emoji)
            .await?;
        Ok(text(format!("Removed reaction {emoji} from message")))
    }

    async fn get_user_roles(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<ContentItem>, ToolError> {
        let user_id = require_id(arguments, "user_id")?;

        let guilds = self.api.current_user_guilds().await?;
        let mut lines = Vec::new();

        for guild in guilds {
            let Ok(guild_id) = guild.id.parse::<u64>() else {
                continue;
            };

            let member = match self.api.get_member(guild_id, user_id).await {
                Ok(member) => member,
                // Not a member of this mutual guild
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };

            let roles = self.api.guild_roles(guild_id).await?;
            for role_id in &member.roles {
                let name = roles
                    .iter()
                    .find(|role| &role.id == role_id)
                    .map_or(role_id.as_str(), |role| role.name.as_str());
                lines.push(format!("Server {}: {} (ID: {})", guild.name, name, role_id));
            }
        }

        Ok(text(format!("User Roles:\n{}", lines.join("\n"))))
    }

    /// Resolves a role name within a guild, falling back to the raw ID.
    async fn role_name(&self, guild_id: u64, role_id: u64) -> Result<String, ToolError> {
        let roles = self.api.guild_roles(guild_id).await?;
        let wanted = role_id.to_string();
        Ok(roles
            .into_iter()
            .find(|role| role.id == wanted)
            .map_or(wanted, |role| role.name))
    }
}

#[async_trait]
impl ListToolsHandler for ToolDispatcher {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.catalog.clone()
    }
}

#[async_trait]
impl CallToolHandler for ToolDispatcher {
    async fn call_tool(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<Vec<ContentItem>, HandlerError> {
        self.dispatch(tool, &arguments).await.map_err(Into::into)
    }
}

/// Wraps a single text into the result content sequence.
fn text(message: impl Into<String>) -> Vec<ContentItem> {
    vec![ContentItem::text(message)]
}

/// Display name of a member.
fn member_name(member: &Member) -> String {
    member
        .user
        .as_ref()
        .map(|user| user.username.clone())
        .or_else(|| member.nick.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Snowflake ID of a member.
fn member_id(member: &Member) -> &str {
    member.user.as_ref().map_or("unknown", |user| user.id.as_str())
}

/// Formats one message for `read_messages`.
fn format_message(message: &Message) -> String {
    let reactions = if message.reactions.is_empty() {
        "No reactions".to_string()
    } else {
        message
            .reactions
            .iter()
            .map(|reaction| format!("{}({})", reaction.emoji.display(), reaction.count))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let timestamp = message
        .timestamp
        .map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339());

    format!(
        "{} ({}):\n{}\nReactions: {}",
        message.author.tag(),
        timestamp,
        message.content,
        reactions
    )
}

/// Extracts a required string argument.
fn require_str<'a>(arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    arguments.get(key).and_then(Value::as_str).ok_or_else(|| {
        ToolError::InvalidArguments(format!("missing required string argument `{key}`"))
    })
}

/// Extracts a required snowflake ID, accepting strings and numbers.
fn require_id(arguments: &Map<String, Value>, key: &str) -> Result<u64, ToolError> {
    match arguments.get(key) {
        Some(Value::String(s)) => s.parse().map_err(|_| {
            ToolError::InvalidArguments(format!("argument `{key}` is not a valid ID: {s}"))
        }),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
            ToolError::InvalidArguments(format!("argument `{key}` is not a valid ID"))
        }),
        _ => Err(ToolError::InvalidArguments(format!(
            "missing required ID argument `{key}`"
        ))),
    }
}

/// Extracts an optional snowflake ID; absent yields `None`, malformed errors.
fn optional_id(arguments: &Map<String, Value>, key: &str) -> Result<Option<u64>, ToolError> {
    if arguments.get(key).map_or(true, Value::is_null) {
        return Ok(None);
    }
    require_id(arguments, key).map(Some)
}

/// Extracts an optional string argument.
fn optional_str<'a>(arguments: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

/// Extracts an optional non-negative integer, accepting strings and numbers.
fn optional_u64(arguments: &Map<String, Value>, key: &str) -> Result<Option<u64>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
            ToolError::InvalidArguments(format!("argument `{key}` must be a non-negative integer"))
        }),
        Some(Value::String(s)) => s.parse().map(Some).map_err(|_| {
            ToolError::InvalidArguments(format!("argument `{key}` must be a non-negative integer"))
        }),
        Some(_) => Err(ToolError::InvalidArguments(format!(
            "argument `{key}` must be a non-negative integer"
        ))),
    }
}

/// Extracts a required array of strings.
fn require_str_array(
    arguments: &Map<String, Value>,
    key: &str,
) -> Result<Vec<String>, ToolError> {
    let values = arguments.get(key).and_then(Value::as_array).ok_or_else(|| {
        ToolError::InvalidArguments(format!("missing required array argument `{key}`"))
    })?;

    values
        .iter()
        .map(|value| {
            value.as_str().map(String::from).ok_or_else(|| {
                ToolError::InvalidArguments(format!("argument `{key}` must contain only strings"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn require_id_accepts_strings_and_numbers() {
        let arguments = args(json!({"a": "42", "b": 7}));
        assert_eq!(require_id(&arguments, "a").unwrap(), 42);
        assert_eq!(require_id(&arguments, "b").unwrap(), 7);
    }

    #[test]
    fn require_id_rejects_garbage() {
        let arguments = args(json!({"a": "not-a-number", "b": -3}));
        assert!(require_id(&arguments, "a").is_err());
        assert!(require_id(&arguments, "b").is_err());
        assert!(require_id(&arguments, "missing").is_err());
    }

    #[test]
    fn optional_id_distinguishes_absent_from_malformed() {
        let arguments = args(json!({"bad": "xyz"}));
        assert_eq!(optional_id(&arguments, "absent").unwrap(), None);
        assert!(optional_id(&arguments, "bad").is_err());
    }

    #[test]
    fn optional_u64_accepts_both_forms() {
        let arguments = args(json!({"a": 10, "b": "20"}));
        assert_eq!(optional_u64(&arguments, "a").unwrap(), Some(10));
        assert_eq!(optional_u64(&arguments, "b").unwrap(), Some(20));
        assert_eq!(optional_u64(&arguments, "c").unwrap(), None);
    }

    #[test]
    fn require_str_array_rejects_mixed_content() {
        let arguments = args(json!({"emojis": ["👍", 5]}));
        assert!(require_str_array(&arguments, "emojis").is_err());

        let arguments = args(json!({"emojis": ["👍", "🎉"]}));
        assert_eq!(
            require_str_array(&arguments, "emojis").unwrap(),
            vec!["👍", "🎉"]
        );
    }

    #[test]
    fn unknown_tool_error_names_the_tool() {
        let error = ToolError::UnknownTool("frobnicate".to_string());
        assert_eq!(error.to_string(), "Unknown tool: frobnicate");
    }

    #[test]
    fn not_ready_error_matches_wire_text() {
        assert_eq!(
            ToolError::ClientNotReady.to_string(),
            "Discord client not ready"
        );
    }

    #[test]
    fn format_message_without_reactions() {
        let message = Message {
            id: "1".to_string(),
            channel_id: "2".to_string(),
            guild_id: None,
            author: crate::discord::model::User {
                id: "7".to_string(),
                username: "alice".to_string(),
                discriminator: "1234".to_string(),
                bot: false,
            },
            content: "hello".to_string(),
            timestamp: None,
            mentions: Vec::new(),
            mention_roles: Vec::new(),
            reactions: Vec::new(),
        };

        let formatted = format_message(&message);
        assert!(formatted.starts_with("alice#1234 (unknown):\nhello"));
        assert!(formatted.ends_with("Reactions: No reactions"));
    }
}
