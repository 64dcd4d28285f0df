//! The static tool catalog.
//!
//! Built once at dispatcher construction and returned verbatim on every
//! `list_tools` request, in this order.

use serde_json::json;

use crate::mcp::protocol::ToolDescriptor;

/// Builds the full tool catalog.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn build() -> Vec<ToolDescriptor> {
    vec![
        // === Server Information ===
        ToolDescriptor {
            name: "get_server_info".to_string(),
            description: "Get information about a Discord server".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "server_id": {
                        "type": "string",
                        "description": "Discord server (guild) ID"
                    }
                },
                "required": ["server_id"]
            }),
        },
        ToolDescriptor {
            name: "list_members".to_string(),
            description: "Get a list of members in a server".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "server_id": {
                        "type": "string",
                        "description": "Discord server (guild) ID"
                    },
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of members to fetch",
                        "minimum": 1,
                        "maximum": 1000
                    }
                },
                "required": ["server_id"]
            }),
        },
        // === Role Management ===
        ToolDescriptor {
            name: "add_role".to_string(),
            description: "Add a role to a user".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "server_id": {
                        "type": "string",
                        "description": "Discord server ID"
                    },
                    "user_id": {
                        "type": "string",
                        "description": "User to add role to"
                    },
                    "role_id": {
                        "type": "string",
                        "description": "Role ID to add"
                    }
                },
                "required": ["server_id", "user_id", "role_id"]
            }),
        },
        ToolDescriptor {
            name: "remove_role".to_string(),
            description: "Remove a role from a user".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "server_id": {
                        "type": "string",
                        "description": "Discord server ID"
                    },
                    "user_id": {
                        "type": "string",
                        "description": "User to remove role from"
                    },
                    "role_id": {
                        "type": "string",
                        "description": "Role ID to remove"
                    }
                },
                "required": ["server_id", "user_id", "role_id"]
            }),
        },
        // === Channel Management ===
        ToolDescriptor {
            name: "create_text_channel".to_string(),
            description: "Create a new text channel".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "server_id": {
                        "type": "string",
                        "description": "Discord server ID"
                    },
                    "name": {
                        "type": "string",
                        "description": "Channel name"
                    },
                    "category_id": {
                        "type": "string",
                        "description": "Optional category ID to place channel in"
                    },
                    "topic": {
                        "type": "string",
                        "description": "Optional channel topic"
                    }
                },
                "required": ["server_id", "name"]
            }),
        },
        ToolDescriptor {
            name: "delete_channel".to_string(),
            description: "Delete a channel".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "channel_id": {
                        "type": "string",
                        "description": "ID of channel to delete"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Reason for deletion"
                    }
                },
                "required": ["channel_id"]
            }),
        },
        // === Message Reactions ===
        ToolDescriptor {
            name: "add_reaction".to_string(),
            description: "Add a reaction to a message".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "channel_id": {
                        "type": "string",
                        "description": "Channel containing the message"
                    },
                    "message_id": {
                        "type": "string",
                        "description": "Message to react to"
                    },
                    "emoji": {
                        "type": "string",
                        "description": "Emoji to react with (Unicode or custom emoji ID)"
                    }
                },
                "required": ["channel_id", "message_id", "emoji"]
            }),
        },
        ToolDescriptor {
            name: "add_multiple_reactions".to_string(),
            description: "Add multiple reactions to a message".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "channel_id": {
                        "type": "string",
                        "description": "Channel containing the message"
                    },
                    "message_id": {
                        "type": "string",
                        "description": "Message to react to"
                    },
                    "emojis": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "description": "Emoji to react with (Unicode or custom emoji ID)"
                        },
                        "description": "List of emojis to add as reactions"
                    }
                },
                "required": ["channel_id", "message_id", "emojis"]
            }),
        },
        ToolDescriptor {
            name: "remove_reaction".to_string(),
            description: "Remove a reaction from a message".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "channel_id": {
                        "type": "string",
                        "description": "Channel containing the message"
                    },
                    "message_id": {
                        "type": "string",
                        "description": "Message to remove reaction from"
                    },
                    "emoji": {
                        "type": "string",
                        "description": "Emoji to remove (Unicode or custom emoji ID)"
                    }
                },
                "required": ["channel_id", "message_id", "emoji"]
            }),
        },
        // === Messaging ===
        ToolDescriptor {
            name: "send_message".to_string(),
            description: "Send a message to a specific channel".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "channel_id": {
                        "type": "string",
                        "description": "Discord channel ID"
                    },
                    "content": {
                        "type": "string",
                        "description": "Message content"
                    }
                },
                "required": ["channel_id", "content"]
            }),
        },
        ToolDescriptor {
            name: "read_messages".to_string(),
            description: "Read recent messages from a channel".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "channel_id": {
                        "type": "string",
                        "description": "Discord channel ID"
                    },
                    "limit": {
                        "type": "number",
                        "description": "Number of messages to fetch (max 100)",
                        "minimum": 1,
                        "maximum": 100
                    }
                },
                "required": ["channel_id"]
            }),
        },
        ToolDescriptor {
            name: "get_user_info".to_string(),
            description: "Get information about a Discord user".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {
                        "type": "string",
                        "description": "Discord user ID"
                    }
                },
                "required": ["user_id"]
            }),
        },
        // === Moderation ===
        ToolDescriptor {
            name: "moderate_message".to_string(),
            description: "Delete a message and optionally timeout the user".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "channel_id": {
                        "type": "string",
                        "description": "Channel ID containing the message"
                    },
                    "message_id": {
                        "type": "string",
                        "description": "ID of message to moderate"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Reason for moderation"
                    },
                    "timeout_minutes": {
                        "type": "number",
                        "description": "Optional timeout duration in minutes",
                        "minimum": 0,
                        "maximum": 40320
                    }
                },
                "required": ["channel_id", "message_id", "reason"]
            }),
        },
        // === User Roles ===
        ToolDescriptor {
            name: "get_user_roles".to_string(),
            description: "Get all roles of a user across all mutual servers".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {
                        "type": "string",
                        "description": "Discord user ID"
                    }
                },
                "required": ["user_id"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_has_fourteen_tools() {
        assert_eq!(build().len(), 14);
    }

    #[test]
    fn tool_names_are_unique() {
        let catalog = build();
        let names: HashSet<&str> = catalog.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names.len(), catalog.len());
    }

    #[test]
    fn every_schema_is_an_object_schema() {
        for tool in build() {
            assert_eq!(
                tool.input_schema["type"], "object",
                "tool {} must accept an object",
                tool.name
            );
            assert!(!tool.description.is_empty());
        }
    }

    #[test]
    fn catalog_is_stable_across_builds() {
        let first: Vec<String> = build().into_iter().map(|t| t.name).collect();
        let second: Vec<String> = build().into_iter().map(|t| t.name).collect();
        assert_eq!(first, second);
    }
}
