//! Core data models for the recipe backend

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User/human input
    User,
    /// Backend reply
    Assistant,
}

/// One message in the chat timeline.
///
/// Assistant content holds the serialized response payload (element 1 of
/// the envelope), not display text. See [`crate::format::normalize`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    /// Who sent the message
    pub role: Role,
    /// Raw message content
    pub content: String,
}

impl ConversationTurn {
    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create the empty assistant turn shown while a reply streams in
    pub fn placeholder() -> Self {
        Self::assistant(String::new())
    }

    /// Whether this is an assistant turn with nothing streamed into it yet
    pub fn is_placeholder(&self) -> bool {
        self.role == Role::Assistant && self.content.is_empty()
    }
}

/// One ingredient in a recipe
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Ingredient {
    /// Identifier in the form `$I1`, `$I2`, ...
    pub id: String,
    /// Quantity or number of units; blank for "to taste" items
    pub quantity: String,
    /// Ingredient name including qualifiers like "chopped"
    pub name: String,
    /// Section the ingredient belongs to, like "For the sauce"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Substitutions, conversions and other requested notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<String>,
}

/// One step in a recipe
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Instruction {
    /// Identifier in the form `$S1`, `$S2`, ...
    pub id: String,
    /// The step text
    pub text: String,
    /// Requested notes, like time estimates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<String>,
}

/// A recipe, possibly still streaming in.
///
/// Every field defaults so that any prefix of a recipe object decodes.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Recipe {
    /// Name of the recipe
    pub name: String,
    /// Ingredients in display order
    pub ingredients: Vec<Ingredient>,
    /// Steps in display order
    pub instructions: Vec<Instruction>,
    /// Preparation time, e.g. "30 minutes"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<String>,
    /// Cooking time, e.g. "1 hour"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cook_time: Option<String>,
    /// Yield, e.g. "4 servings"
    #[serde(alias = "yield", skip_serializing_if = "Option::is_none")]
    pub recipe_yield: Option<String>,
    /// Free-form extra information from the page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

impl Recipe {
    /// Decode a possibly partial recipe value.
    ///
    /// Returns `None` when the value has the wrong shape (not an object, or
    /// fields of the wrong type) rather than failing.
    pub fn from_partial(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        Recipe::deserialize(value).ok()
    }
}

/// Discriminator carried in the payload's `type` field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    /// `response` is a [`Recipe`]
    RecipeResponse,
    /// `response` is a [`ConversationalReply`]
    ConversationalResponse,
}

impl ResponseKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::RecipeResponse => "RecipeResponse",
            ResponseKind::ConversationalResponse => "ConversationalResponse",
        }
    }

    /// Match a wire name exactly; partial names are not recognized
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "RecipeResponse" => Some(ResponseKind::RecipeResponse),
            "ConversationalResponse" => Some(ResponseKind::ConversationalResponse),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a `ConversationalResponse`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ConversationalReply {
    /// Reply text (markdown)
    #[serde(default)]
    pub response: String,
}

/// Element 0 of the envelope
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Meta {
    /// Session identifier; may be truncated mid-stream
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Opaque session identifier returned by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Wrap an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request body for `POST /api/recipe`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipeRequest {
    /// Page to extract the recipe from
    pub url: String,
    /// Extra instructions for the extraction
    #[serde(default)]
    pub annotations: String,
}

impl RecipeRequest {
    /// Create an extraction request
    pub fn new(url: impl Into<String>, annotations: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            annotations: annotations.into(),
        }
    }
}

/// Request body for `POST /api/chat/{thread_id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// The user's message
    pub message: String,
}

/// Response of `GET /api/chat_history/{thread_id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatHistory {
    /// Thread the history belongs to
    pub thread_id: ThreadId,
    /// Turns after the extraction prompt
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recipe_from_partial_defaults_missing_fields() {
        let recipe = Recipe::from_partial(&json!({
            "name": "Pancakes",
            "ingredients": [{"id": "$I1", "quantity": "2 cups"}]
        }))
        .unwrap();

        assert_eq!(recipe.name, "Pancakes");
        assert_eq!(recipe.ingredients.len(), 1);
        assert_eq!(recipe.ingredients[0].quantity, "2 cups");
        assert!(recipe.ingredients[0].name.is_empty());
        assert!(recipe.instructions.is_empty());
        assert!(recipe.prep_time.is_none());
    }

    #[test]
    fn test_recipe_from_partial_rejects_wrong_shape() {
        assert!(Recipe::from_partial(&json!("Pancakes")).is_none());
        assert!(Recipe::from_partial(&json!({"ingredients": "flour"})).is_none());
    }

    #[test]
    fn test_recipe_yield_alias() {
        let recipe = Recipe::from_partial(&json!({"yield": "4 servings"})).unwrap();
        assert_eq!(recipe.recipe_yield.as_deref(), Some("4 servings"));
    }

    #[test]
    fn test_response_kind_exact_match() {
        assert_eq!(
            ResponseKind::from_wire("RecipeResponse"),
            Some(ResponseKind::RecipeResponse)
        );
        assert_eq!(ResponseKind::from_wire("Recipe"), None);
        assert_eq!(ResponseKind::from_wire(""), None);
    }

    #[test]
    fn test_turn_serialization() {
        let turn = ConversationTurn::user("Double it");
        assert_eq!(
            serde_json::to_value(&turn).unwrap(),
            json!({"role": "user", "content": "Double it"})
        );
        assert!(ConversationTurn::placeholder().is_placeholder());
        assert!(!ConversationTurn::user("").is_placeholder());
    }
}
