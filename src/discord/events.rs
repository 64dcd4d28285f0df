//! Gateway message event responder.
//!
//! Answers `MESSAGE_CREATE` dispatches with templated replies: a welcome
//! on a user's first direct message, and short acknowledgements when the
//! bot (or one of its roles) is mentioned in a guild channel. Failures
//! are logged and answered with the `error` template on a best-effort
//! basis; they never propagate into the gateway loop.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;

use crate::config::BotConfig;
use crate::discord::model::{Message, User};
use crate::discord::{ChatApi, DiscordError};
use crate::error::TemplateError;
use crate::templates::TemplateManager;

/// Internal responder failure.
#[derive(Error, Debug)]
enum ResponderError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Discord(#[from] DiscordError),

    #[error("event carries a non-numeric id: {0}")]
    BadId(String),
}

/// Responds to incoming message events.
pub struct MessageResponder {
    api: Arc<dyn ChatApi>,
    templates: Arc<TemplateManager>,
    bot: BotConfig,
    /// Set once the READY dispatch names the bot account.
    bot_user_id: OnceLock<String>,
    /// Users already greeted in a direct message.
    welcomed: Mutex<HashSet<String>>,
}

impl MessageResponder {
    /// Creates a responder over the given platform API and templates.
    #[must_use]
    pub fn new(api: Arc<dyn ChatApi>, templates: Arc<TemplateManager>, bot: BotConfig) -> Self {
        Self {
            api,
            templates,
            bot,
            bot_user_id: OnceLock::new(),
            welcomed: Mutex::new(HashSet::new()),
        }
    }

    /// Records the bot account announced by READY.
    pub(crate) fn note_ready(&self, user: &User) {
        let _ = self.bot_user_id.set(user.id.clone());
    }

    /// Handles one incoming message, swallowing all failures.
    pub async fn handle_message(&self, message: Message) {
        if message.author.bot {
            return;
        }

        if let Err(e) = self.respond(&message).await {
            tracing::error!(error = %e, channel = %message.channel_id, "message handling failed");
            self.send_error_reply(&message, &e).await;
        }
    }

    /// Best-effort templated error reply; its own failure is only logged.
    async fn send_error_reply(&self, message: &Message, failure: &ResponderError) {
        let Ok(channel_id) = message.channel_id.parse::<u64>() else {
            return;
        };
        let context = BTreeMap::from([("error", failure.to_string())]);
        match self.templates.get("error", context) {
            Ok(text) => {
                if let Err(e) = self.api.create_message(channel_id, &text).await {
                    tracing::error!(error = %e, "failed to send error reply");
                }
            }
            Err(e) => tracing::error!(error = %e, "error template unavailable"),
        }
    }

    async fn respond(&self, message: &Message) -> Result<(), ResponderError> {
        let channel_id: u64 = message
            .channel_id
            .parse()
            .map_err(|_| ResponderError::BadId(message.channel_id.clone()))?;

        // Direct messages: greet first-time users
        if message.guild_id.is_none() {
            let first_contact = self
                .welcomed
                .lock()
                .map(|mut seen| seen.insert(message.author.id.clone()))
                .unwrap_or(false);

            if first_contact {
                let context = BTreeMap::from([
                    ("user", message.author.mention()),
                    ("bot_name", self.bot.name.clone()),
                    ("orga_name", self.bot.orga_name.clone()),
                    ("website", self.bot.website_url.clone()),
                    ("discord_invite", self.bot.discord_invite.clone()),
                ]);
                let text = self.templates.get("welcome", context)?;
                self.api.create_message(channel_id, &text).await?;
            }
            return Ok(());
        }

        let Some(bot_id) = self.bot_user_id.get() else {
            return Ok(());
        };

        // Direct bot mention
        if message.mentions.iter().any(|user| &user.id == bot_id) {
            let context = BTreeMap::from([("user", message.author.mention())]);
            let text = self.templates.get("bot_mention", context)?;
            self.api.create_message(channel_id, &text).await?;
            return Ok(());
        }

        // Mention of a role the bot holds
        if !message.mention_roles.is_empty() {
            let guild_id: u64 = message
                .guild_id
                .as_deref()
                .unwrap_or_default()
                .parse()
                .map_err(|_| ResponderError::BadId(message.guild_id.clone().unwrap_or_default()))?;
            let bot_user_id: u64 = bot_id
                .parse()
                .map_err(|_| ResponderError::BadId(bot_id.clone()))?;

            let member = self.api.get_member(guild_id, bot_user_id).await?;
            if let Some(role_id) = message
                .mention_roles
                .iter()
                .find(|role| member.roles.contains(role))
            {
                let context = BTreeMap::from([
                    ("user", message.author.mention()),
                    ("role", format!("<@&{role_id}>")),
                ]);
                let text = self.templates.get("role_mention", context)?;
                self.api.create_message(channel_id, &text).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use crate::discord::model::{Channel, Guild, Member, Role};

    /// Records sent messages; every other operation is unreachable in
    /// these tests.
    #[derive(Default)]
    struct RecordingApi {
        sent: Mutex<Vec<(u64, String)>>,
        member_roles: Vec<String>,
    }

    fn not_stubbed<T>() -> Result<T, DiscordError> {
        Err(DiscordError::Gateway("operation not stubbed".to_string()))
    }

    #[async_trait]
    impl ChatApi for RecordingApi {
        async fn create_message(
            &self,
            channel_id: u64,
            content: &str,
        ) -> Result<Message, DiscordError> {
            self.sent
                .lock()
                .unwrap()
                .push((channel_id, content.to_string()));
            Ok(Message {
                id: "1".to_string(),
                channel_id: channel_id.to_string(),
                guild_id: None,
                author: bot_user(),
                content: content.to_string(),
                timestamp: None,
                mentions: Vec::new(),
                mention_roles: Vec::new(),
                reactions: Vec::new(),
            })
        }

        async fn channel_messages(&self, _: u64, _: u8) -> Result<Vec<Message>, DiscordError> {
            not_stubbed()
        }

        async fn get_message(&self, _: u64, _: u64) -> Result<Message, DiscordError> {
            not_stubbed()
        }

        async fn delete_message(&self, _: u64, _: u64, _: Option<&str>) -> Result<(), DiscordError> {
            not_stubbed()
        }

        async fn get_channel(&self, _: u64) -> Result<Channel, DiscordError> {
            not_stubbed()
        }

        async fn get_user(&self, _: u64) -> Result<User, DiscordError> {
            not_stubbed()
        }

        async fn get_guild(&self, _: u64) -> Result<Guild, DiscordError> {
            not_stubbed()
        }

        async fn current_user_guilds(&self) -> Result<Vec<Guild>, DiscordError> {
            not_stubbed()
        }

        async fn list_members(&self, _: u64, _: u16) -> Result<Vec<Member>, DiscordError> {
            not_stubbed()
        }

        async fn get_member(&self, _: u64, _: u64) -> Result<Member, DiscordError> {
            Ok(Member {
                user: Some(bot_user()),
                nick: None,
                roles: self.member_roles.clone(),
                joined_at: None,
            })
        }

        async fn guild_roles(&self, _: u64) -> Result<Vec<Role>, DiscordError> {
            not_stubbed()
        }

        async fn add_member_role(
            &self,
            _: u64,
            _: u64,
            _: u64,
            _: Option<&str>,
        ) -> Result<(), DiscordError> {
            not_stubbed()
        }

        async fn remove_member_role(
            &self,
            _: u64,
            _: u64,
            _: u64,
            _: Option<&str>,
        ) -> Result<(), DiscordError> {
            not_stubbed()
        }

        async fn create_text_channel(
            &self,
            _: u64,
            _: &str,
            _: Option<u64>,
            _: Option<&str>,
            _: Option<&str>,
        ) -> Result<Channel, DiscordError> {
            not_stubbed()
        }

        async fn delete_channel(&self, _: u64, _: Option<&str>) -> Result<(), DiscordError> {
            not_stubbed()
        }

        async fn create_reaction(&self, _: u64, _: u64, _: &str) -> Result<(), DiscordError> {
            not_stubbed()
        }

        async fn delete_own_reaction(&self, _: u64, _: u64, _: &str) -> Result<(), DiscordError> {
            not_stubbed()
        }

        async fn timeout_member(
            &self,
            _: u64,
            _: u64,
            _: DateTime<Utc>,
            _: Option<&str>,
        ) -> Result<(), DiscordError> {
            not_stubbed()
        }
    }

    fn bot_user() -> User {
        User {
            id: "99".to_string(),
            username: "bridge".to_string(),
            discriminator: "0".to_string(),
            bot: true,
        }
    }

    fn human(id: &str) -> User {
        User {
            id: id.to_string(),
            username: "alice".to_string(),
            discriminator: "1234".to_string(),
            bot: false,
        }
    }

    fn dm(author: User) -> Message {
        Message {
            id: "10".to_string(),
            channel_id: "555".to_string(),
            guild_id: None,
            author,
            content: "hi".to_string(),
            timestamp: None,
            mentions: Vec::new(),
            mention_roles: Vec::new(),
            reactions: Vec::new(),
        }
    }

    fn templates() -> Arc<TemplateManager> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("welcome.md"), "Welcome {{ user }}!").unwrap();
        std::fs::write(dir.path().join("bot_mention.md"), "Hi {{ user }}, you rang?").unwrap();
        std::fs::write(
            dir.path().join("role_mention.md"),
            "{{ user }} pinged {{ role }}",
        )
        .unwrap();
        std::fs::write(dir.path().join("error.md"), "Error: {{ error }}").unwrap();
        Arc::new(TemplateManager::load(dir.path()).unwrap())
    }

    fn responder(api: Arc<RecordingApi>) -> MessageResponder {
        let responder = MessageResponder::new(api, templates(), BotConfig::default());
        responder.note_ready(&bot_user());
        responder
    }

    #[tokio::test]
    async fn first_dm_gets_welcomed_once() {
        let api = Arc::new(RecordingApi::default());
        let responder = responder(Arc::clone(&api));

        responder.handle_message(dm(human("7"))).await;
        responder.handle_message(dm(human("7"))).await;

        let sent = api.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 555);
        assert_eq!(sent[0].1, "Welcome <@7>!");
    }

    #[tokio::test]
    async fn bot_authors_are_ignored() {
        let api = Arc::new(RecordingApi::default());
        let responder = responder(Arc::clone(&api));

        responder.handle_message(dm(bot_user())).await;

        assert!(api.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bot_mention_gets_a_reply() {
        let api = Arc::new(RecordingApi::default());
        let responder = responder(Arc::clone(&api));

        let mut message = dm(human("7"));
        message.guild_id = Some("42".to_string());
        message.mentions = vec![bot_user()];

        responder.handle_message(message).await;

        let sent = api.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Hi <@7>, you rang?");
    }

    #[tokio::test]
    async fn role_mention_matching_bot_role_gets_a_reply() {
        let api = Arc::new(RecordingApi {
            member_roles: vec!["800".to_string()],
            ..RecordingApi::default()
        });
        let responder = responder(Arc::clone(&api));

        let mut message = dm(human("7"));
        message.guild_id = Some("42".to_string());
        message.mention_roles = vec!["800".to_string()];

        responder.handle_message(message).await;

        let sent = api.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "<@7> pinged <@&800>");
    }

    #[tokio::test]
    async fn unrelated_guild_message_is_ignored() {
        let api = Arc::new(RecordingApi::default());
        let responder = responder(Arc::clone(&api));

        let mut message = dm(human("7"));
        message.guild_id = Some("42".to_string());

        responder.handle_message(message).await;

        assert!(api.sent.lock().unwrap().is_empty());
    }
}
