//! Discord REST client.
//!
//! A thin wrapper over the Discord HTTP API (v10). Every [`ChatApi`]
//! operation maps to exactly one endpoint; non-success statuses become
//! [`DiscordError::Api`] carrying Discord's own error message. Nothing is
//! retried here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::discord::model::{Channel, Guild, Member, Message, Role, User};
use crate::discord::{ChatApi, DiscordError};

/// Base URL of the Discord HTTP API.
const API_BASE: &str = "https://discord.com/api/v10";

/// Audit log reason header.
const AUDIT_REASON_HEADER: &str = "X-Audit-Log-Reason";

/// The REST client.
///
/// Cheap to share behind an `Arc`; the underlying connection pool is
/// reused across requests.
pub struct Http {
    client: reqwest::Client,
    base: Url,
    auth: String,
}

impl Http {
    /// Creates a REST client authenticated as a bot.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(token: &str) -> Result<Self, DiscordError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("discord-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base = Url::parse(API_BASE).expect("static API base URL is valid");

        Ok(Self {
            client,
            base,
            auth: format!("Bot {token}"),
        })
    }

    /// Builds an endpoint URL from path segments.
    ///
    /// Segments are percent-encoded individually, which is what makes
    /// emoji path parameters safe.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .expect("API base URL is not opaque")
            .extend(segments);
        url
    }

    /// Starts a request with the bot authorisation header attached.
    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(AUTHORIZATION, self.auth.as_str())
    }

    /// Attaches an audit log reason header when one is given.
    ///
    /// Reasons that cannot be carried in a header are dropped rather than
    /// failing the request.
    fn with_reason(builder: RequestBuilder, reason: Option<&str>) -> RequestBuilder {
        match reason.and_then(|r| HeaderValue::from_str(r).ok()) {
            Some(value) => builder.header(AUDIT_REASON_HEADER, value),
            None => builder,
        }
    }

    /// Sends a request and maps non-success statuses to API errors.
    async fn execute(&self, builder: RequestBuilder) -> Result<Response, DiscordError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| body.trim().to_string());

        Err(DiscordError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Sends a request and deserialises the JSON response body.
    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, DiscordError> {
        let response = self.execute(builder).await?;
        Ok(response.json().await?)
    }

    /// Sends a request and discards the response body.
    async fn fire(&self, builder: RequestBuilder) -> Result<(), DiscordError> {
        self.execute(builder).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for Http {
    async fn create_message(&self, channel_id: u64, content: &str) -> Result<Message, DiscordError> {
        let url = self.endpoint(&["channels", &channel_id.to_string(), "messages"]);
        let builder = self
            .request(Method::POST, url)
            .json(&json!({ "content": content }));
        self.fetch(builder).await
    }

    async fn channel_messages(
        &self,
        channel_id: u64,
        limit: u8,
    ) -> Result<Vec<Message>, DiscordError> {
        let mut url = self.endpoint(&["channels", &channel_id.to_string(), "messages"]);
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn get_message(&self, channel_id: u64, message_id: u64) -> Result<Message, DiscordError> {
        let url = self.endpoint(&[
            "channels",
            &channel_id.to_string(),
            "messages",
            &message_id.to_string(),
        ]);
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn delete_message(
        &self,
        channel_id: u64,
        message_id: u64,
        reason: Option<&str>,
    ) -> Result<(), DiscordError> {
        let url = self.endpoint(&[
            "channels",
            &channel_id.to_string(),
            "messages",
            &message_id.to_string(),
        ]);
        self.fire(Self::with_reason(self.request(Method::DELETE, url), reason))
            .await
    }

    async fn get_channel(&self, channel_id: u64) -> Result<Channel, DiscordError> {
        let url = self.endpoint(&["channels", &channel_id.to_string()]);
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn get_user(&self, user_id: u64) -> Result<User, DiscordError> {
        let url = self.endpoint(&["users", &user_id.to_string()]);
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn get_guild(&self, guild_id: u64) -> Result<Guild, DiscordError> {
        let mut url = self.endpoint(&["guilds", &guild_id.to_string()]);
        url.query_pairs_mut().append_pair("with_counts", "true");
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn current_user_guilds(&self) -> Result<Vec<Guild>, DiscordError> {
        let url = self.endpoint(&["users", "@me", "guilds"]);
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn list_members(&self, guild_id: u64, limit: u16) -> Result<Vec<Member>, DiscordError> {
        let mut url = self.endpoint(&["guilds", &guild_id.to_string(), "members"]);
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn get_member(&self, guild_id: u64, user_id: u64) -> Result<Member, DiscordError> {
        let url = self.endpoint(&[
            "guilds",
            &guild_id.to_string(),
            "members",
            &user_id.to_string(),
        ]);
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn guild_roles(&self, guild_id: u64) -> Result<Vec<Role>, DiscordError> {
        let url = self.endpoint(&["guilds", &guild_id.to_string(), "roles"]);
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn add_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: Option<&str>,
    ) -> Result<(), DiscordError> {
        let url = self.endpoint(&[
            "guilds",
            &guild_id.to_string(),
            "members",
            &user_id.to_string(),
            "roles",
            &role_id.to_string(),
        ]);
        self.fire(Self::with_reason(self.request(Method::PUT, url), reason))
            .await
    }

    async fn remove_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: Option<&str>,
    ) -> Result<(), DiscordError> {
        let url = self.endpoint(&[
            "guilds",
            &guild_id.to_string(),
            "members",
            &user_id.to_string(),
            "roles",
            &role_id.to_string(),
        ]);
        self.fire(Self::with_reason(self.request(Method::DELETE, url), reason))
            .await
    }

    async fn create_text_channel(
        &self,
        guild_id: u64,
        name: &str,
        category_id: Option<u64>,
        topic: Option<&str>,
        reason: Option<&str>,
    ) -> Result<Channel, DiscordError> {
        let mut body = Map::new();
        body.insert("name".to_string(), Value::from(name));
        // type 0 = guild text channel
        body.insert("type".to_string(), Value::from(0));
        if let Some(parent) = category_id {
            body.insert("parent_id".to_string(), Value::from(parent.to_string()));
        }
        if let Some(topic) = topic {
            body.insert("topic".to_string(), Value::from(topic));
        }

        let url = self.endpoint(&["guilds", &guild_id.to_string(), "channels"]);
        let builder = Self::with_reason(self.request(Method::POST, url), reason).json(&body);
        self.fetch(builder).await
    }

    async fn delete_channel(
        &self,
        channel_id: u64,
        reason: Option<&str>,
    ) -> Result<(), DiscordError> {
        let url = self.endpoint(&["channels", &channel_id.to_string()]);
        self.fire(Self::with_reason(self.request(Method::DELETE, url), reason))
            .await
    }

    async fn create_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<(), DiscordError> {
        let url = self.endpoint(&[
            "channels",
            &channel_id.to_string(),
            "messages",
            &message_id.to_string(),
            "reactions",
            emoji,
            "@me",
        ]);
        self.fire(self.request(Method::PUT, url)).await
    }

    async fn delete_own_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<(), DiscordError> {
        let url = self.endpoint(&[
            "channels",
            &channel_id.to_string(),
            "messages",
            &message_id.to_string(),
            "reactions",
            emoji,
            "@me",
        ]);
        self.fire(self.request(Method::DELETE, url)).await
    }

    async fn timeout_member(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<(), DiscordError> {
        let url = self.endpoint(&[
            "guilds",
            &guild_id.to_string(),
            "members",
            &user_id.to_string(),
        ]);
        let body = json!({ "communication_disabled_until": until.to_rfc3339() });
        let builder = Self::with_reason(self.request(Method::PATCH, url), reason).json(&body);
        self.fire(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http() -> Http {
        Http::new("test-token").unwrap()
    }

    #[test]
    fn endpoint_joins_segments() {
        let url = http().endpoint(&["channels", "42", "messages"]);
        assert_eq!(
            url.as_str(),
            "https://discord.com/api/v10/channels/42/messages"
        );
    }

    #[test]
    fn endpoint_percent_encodes_emoji() {
        let url = http().endpoint(&["channels", "1", "messages", "2", "reactions", "👍", "@me"]);
        assert!(url.as_str().contains("reactions/%F0%9F%91%8D/@me"));
    }

    #[test]
    fn auth_header_is_bot_scheme() {
        assert_eq!(http().auth, "Bot test-token");
    }
}
