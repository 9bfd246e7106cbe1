//! Render-time normalization of conversation turns

use crate::models::{ConversationTurn, ResponseKind, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// How a normalized message should be shown
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Text typed by the user
    User,
    /// Conversational reply, shown in the chat timeline
    Conversation,
    /// Recipe reply; the recipe panel shows it instead of the timeline
    Recipe,
}

/// A turn ready for display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormattedMessage {
    /// Who sent the message
    pub role: Role,
    /// Display text (markdown)
    pub content: String,
    /// Display kind
    pub kind: MessageKind,
}

/// Normalize a stored turn for display.
///
/// Assistant content is the serialized payload. Returns `None` when it does
/// not parse or has no recognized `type`; callers render nothing for it.
pub fn normalize(turn: &ConversationTurn) -> Option<FormattedMessage> {
    if turn.role == Role::User {
        return Some(FormattedMessage {
            role: Role::User,
            content: turn.content.clone(),
            kind: MessageKind::User,
        });
    }

    let payload: Value = match serde_json::from_str(&turn.content) {
        Ok(payload) => payload,
        Err(e) => {
            if !turn.is_placeholder() {
                debug!("Skipping assistant message with malformed content: {}", e);
            }
            return None;
        }
    };

    let kind = payload
        .get("type")
        .and_then(Value::as_str)
        .and_then(ResponseKind::from_wire)?;

    let (content, kind) = match kind {
        ResponseKind::ConversationalResponse => (
            nested_text(&payload, "response"),
            MessageKind::Conversation,
        ),
        ResponseKind::RecipeResponse => (nested_text(&payload, "name"), MessageKind::Recipe),
    };

    Some(FormattedMessage {
        role: Role::Assistant,
        content,
        kind,
    })
}

/// Normalize a whole turn list into the chat timeline.
///
/// Unrenderable turns and recipe replies are left out.
pub fn timeline(turns: &[ConversationTurn]) -> Vec<FormattedMessage> {
    turns
        .iter()
        .filter_map(normalize)
        .filter(|message| message.kind != MessageKind::Recipe)
        .collect()
}

fn nested_text(payload: &Value, field: &str) -> String {
    payload
        .get("response")
        .and_then(|response| response.get(field))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
