//! Reconciliation of classified partial payloads into session state

use crate::{
    classify::Classification,
    format::{self, FormattedMessage},
    models::{ConversationTurn, Recipe, ResponseKind, ThreadId},
};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Everything the presentation layer renders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Recipe shown in the recipe panel
    pub recipe: Option<Recipe>,
    /// Chat turns in order
    pub turns: Vec<ConversationTurn>,
    /// Thread for chat continuation, set when a cycle completes
    pub thread_id: Option<ThreadId>,
    /// Whether a request cycle is in flight
    pub is_streaming: bool,
    /// User-visible failure from the last cycle
    pub error: Option<String>,
}

/// What a reconcile step changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// Nothing new to show
    Idle,
    /// The displayed recipe was replaced
    Recipe,
    /// The cycle's assistant turn was rewritten
    Reply,
}

impl Update {
    /// Whether state changed
    pub fn changed(self) -> bool {
        self != Update::Idle
    }
}

impl SessionState {
    /// Set up a chat cycle: append the user's turn and an empty assistant
    /// turn, returning the assistant turn's index.
    pub fn begin_chat(&mut self, message: impl Into<String>) -> usize {
        self.turns.push(ConversationTurn::user(message));
        self.turns.push(ConversationTurn::placeholder());
        self.turns.len() - 1
    }

    /// Apply one classification.
    ///
    /// A recipe payload replaces the displayed recipe. A conversational
    /// payload overwrites the cycle's assistant turn at `reply`; when the
    /// cycle has none yet, one is appended and `reply` records it, so a
    /// cycle never creates more than one.
    pub fn reconcile(
        &mut self,
        classification: &Classification,
        reply: &mut Option<usize>,
    ) -> Update {
        let Some(payload) = &classification.payload else {
            return Update::Idle;
        };

        match payload.kind {
            ResponseKind::RecipeResponse => {
                let Some(recipe) = Recipe::from_partial(&payload.response) else {
                    trace!("Recipe payload does not decode yet");
                    return Update::Idle;
                };
                if self.recipe.as_ref() == Some(&recipe) {
                    return Update::Idle;
                }
                self.recipe = Some(recipe);
                Update::Recipe
            }
            ResponseKind::ConversationalResponse => {
                let content = payload.raw.to_string();
                match *reply {
                    Some(index) if index < self.turns.len() => {
                        let turn = &mut self.turns[index];
                        if turn.content == content {
                            return Update::Idle;
                        }
                        turn.content = content;
                    }
                    _ => {
                        self.turns.push(ConversationTurn::assistant(content));
                        *reply = Some(self.turns.len() - 1);
                    }
                }
                Update::Reply
            }
        }
    }

    /// The chat timeline, ready to render
    pub fn timeline(&self) -> Vec<FormattedMessage> {
        format::timeline(&self.turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::models::Role;
    use crate::parser::parse_partial;

    fn classification(text: &str) -> Classification {
        classify(parse_partial(text).unwrap().as_ref())
    }

    #[test]
    fn test_incomplete_is_idle() {
        let mut state = SessionState::default();
        let mut reply = None;
        let update = state.reconcile(
            &classification(r#"[{"thread_id":"t1"},{"type":"RecipeResponse""#),
            &mut reply,
        );
        assert_eq!(update, Update::Idle);
        assert_eq!(state, SessionState::default());
    }

    #[test]
    fn test_recipe_replaced_as_it_grows() {
        let mut state = SessionState::default();
        let mut reply = None;
        let prefix = r#"[{"thread_id":"t1"},{"type":"RecipeResponse","response":{"name":"Te"#;

        assert_eq!(state.reconcile(&classification(prefix), &mut reply), Update::Recipe);
        assert_eq!(state.recipe.as_ref().unwrap().name, "Te");

        let longer = format!("{}a\",\"ingredients\":[{{\"id\":\"$I1\"", prefix);
        assert_eq!(state.reconcile(&classification(&longer), &mut reply), Update::Recipe);
        let recipe = state.recipe.as_ref().unwrap();
        assert_eq!(recipe.name, "Tea");
        assert_eq!(recipe.ingredients[0].id, "$I1");

        // Same value again is an idle tick
        assert_eq!(state.reconcile(&classification(&longer), &mut reply), Update::Idle);
        assert!(reply.is_none());
    }

    #[test]
    fn test_chat_reply_rewrites_placeholder_in_place() {
        let mut state = SessionState::default();
        let index = state.begin_chat("Is this spicy?");
        let mut reply = Some(index);
        assert_eq!(state.turns.len(), 2);
        assert!(state.turns[1].is_placeholder());

        let prefix = r#"[{"thread_id":"t1"},{"type":"ConversationalResponse","response":{"response":"Mild"#;
        for text in [prefix.to_string(), format!("{}ly, yes.", prefix)] {
            assert_eq!(state.reconcile(&classification(&text), &mut reply), Update::Reply);
        }

        assert_eq!(state.turns.len(), 2);
        assert_eq!(state.turns[1].role, Role::Assistant);
        let timeline = state.timeline();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[1].content, "Mildly, yes.");
    }

    #[test]
    fn test_reply_without_placeholder_appends_once() {
        let mut state = SessionState::default();
        let mut reply = None;
        let prefix = r#"[{"thread_id":"t1"},{"type":"ConversationalResponse","response":{"response":"No recipe"#;

        state.reconcile(&classification(prefix), &mut reply);
        state.reconcile(&classification(&format!("{} found", prefix)), &mut reply);

        assert_eq!(state.turns.len(), 1);
        assert_eq!(reply, Some(0));
        assert_eq!(state.timeline()[0].content, "No recipe found");
    }

    #[test]
    fn test_recipe_reply_in_chat_leaves_placeholder() {
        let mut state = SessionState::default();
        let mut reply = Some(state.begin_chat("Make it vegan"));

        let update = state.reconcile(
            &classification(
                r#"[{"thread_id":"t1"},{"type":"RecipeResponse","response":{"name":"Vegan Tea"}}]"#,
            ),
            &mut reply,
        );

        assert_eq!(update, Update::Recipe);
        assert_eq!(state.recipe.as_ref().unwrap().name, "Vegan Tea");
        assert!(state.turns[1].is_placeholder());
        assert_eq!(state.timeline().len(), 1);
    }
}
