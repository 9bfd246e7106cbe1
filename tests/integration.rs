use futures::stream;
use recipe_stream::prelude::*;
use recipe_stream::{classify, parse_partial, Error, PartialParser, StreamBuffer};
use tokio_util::sync::CancellationToken;

const RECIPE: &str = r#"[{"thread_id":"t1"},{"type":"RecipeResponse","response":{"name":"Chai","ingredients":[{"id":"$I1","quantity":"2","name":"tea bags"},{"id":"$I2","quantity":"1 cup","name":"milk"}],"instructions":[{"id":"$S1","text":"Simmer."}],"prep_time":"5 min"}}]"#;

const SHORT: &str = r#"[{"thread_id":"t9"},{"type":"RecipeResponse","response":{"name":"Tea","ingredients":[{"id":"$I1","name":"leaf"}]}}]"#;

const REPLY: &str = r#"[{"thread_id":"t1"},{"type":"ConversationalResponse","response":{"response":"Use **oat milk** instead."}}]"#;

fn client() -> RecipeClient {
    RecipeClientBuilder::default()
        .base_url("http://localhost:4000")
        .build()
        .unwrap()
}

fn parts(text: &str, cuts: &[usize]) -> Vec<recipe_stream::Result<String>> {
    let mut out = Vec::new();
    let mut start = 0;
    for &cut in cuts.iter().chain(std::iter::once(&text.len())) {
        out.push(Ok(text[start..cut].to_string()));
        start = cut;
    }
    out
}

async fn run_recipe(client: &RecipeClient, text: &str, cuts: &[usize]) -> SessionState {
    let mut session = Session::new(client.clone());
    session
        .consume_recipe_stream(stream::iter(parts(text, cuts)), &CancellationToken::new())
        .await
        .unwrap();
    session.state().clone()
}

#[tokio::test]
async fn test_every_two_and_three_way_split_matches_single_chunk() {
    let client = client();
    let whole = run_recipe(&client, SHORT, &[]).await;
    assert_eq!(whole.recipe.as_ref().unwrap().name, "Tea");
    assert_eq!(whole.thread_id, Some(ThreadId::new("t9")));

    for a in 1..SHORT.len() {
        assert_eq!(run_recipe(&client, SHORT, &[a]).await, whole, "split at {}", a);
        for b in (a + 1)..SHORT.len() {
            assert_eq!(run_recipe(&client, SHORT, &[a, b]).await, whole, "split at {} {}", a, b);
        }
    }
}

#[test]
fn test_no_prefix_is_rejected() {
    for text in [RECIPE, SHORT, REPLY] {
        for end in 0..=text.len() {
            assert!(parse_partial(&text[..end]).is_ok(), "{}", &text[..end]);
        }
    }
}

fn extends(earlier: &str, later: &str) -> bool {
    later.starts_with(earlier)
}

#[test]
fn test_recipe_display_is_monotonic() {
    let mut buffer = StreamBuffer::new();
    let mut parser = PartialParser::new();
    let mut state = SessionState::default();
    let mut reply = None;
    let mut history: Vec<Recipe> = Vec::new();

    for i in 0..RECIPE.len() {
        buffer.append(&RECIPE[i..i + 1]);
        let classification = classify(parser.parse(buffer.as_str()));
        state.reconcile(&classification, &mut reply);
        if let Some(recipe) = &state.recipe {
            history.push(recipe.clone());
        }
    }

    assert_eq!(parser.rejected(), 0);
    for pair in history.windows(2) {
        let (earlier, later) = (&pair[0], &pair[1]);
        assert!(extends(&earlier.name, &later.name));
        assert!(later.ingredients.len() >= earlier.ingredients.len());
        for (before, after) in earlier.ingredients.iter().zip(&later.ingredients) {
            assert!(extends(&before.id, &after.id));
            assert!(extends(&before.quantity, &after.quantity));
            assert!(extends(&before.name, &after.name));
        }
        assert!(later.instructions.len() >= earlier.instructions.len());
    }

    let last = history.last().unwrap();
    assert_eq!(last.ingredients.len(), 2);
    assert_eq!(last.ingredients[1].name, "milk");
    assert_eq!(last.prep_time.as_deref(), Some("5 min"));
}

#[tokio::test]
async fn test_one_assistant_turn_per_chat_cycle() {
    let mut session = Session::new(client());
    let cancel = CancellationToken::new();
    session
        .consume_recipe_stream(stream::iter(parts(RECIPE, &[])), &cancel)
        .await
        .unwrap();

    let cuts: Vec<usize> = (1..REPLY.len()).collect();
    session
        .consume_chat_stream("No dairy please", stream::iter(parts(REPLY, &cuts)), &cancel)
        .await
        .unwrap();
    session
        .consume_chat_stream("Thanks", stream::iter(parts(REPLY, &[40, 90])), &cancel)
        .await
        .unwrap();

    let turns = session.conversation_turns();
    assert_eq!(turns.len(), 4);
    assert_eq!(
        turns.iter().filter(|t| t.role == Role::Assistant).count(),
        2
    );

    let timeline = session.timeline();
    assert_eq!(timeline.len(), 4);
    assert_eq!(timeline[1].kind, MessageKind::Conversation);
    assert_eq!(timeline[1].content, "Use **oat milk** instead.");
}

#[tokio::test]
async fn test_recipe_reply_in_chat_is_not_in_timeline() {
    let mut session = Session::new(client());
    let cancel = CancellationToken::new();
    session
        .consume_recipe_stream(stream::iter(parts(RECIPE, &[])), &cancel)
        .await
        .unwrap();

    let modified = RECIPE.replace("\"Chai\"", "\"Iced Chai\"");
    session
        .consume_chat_stream("Make it iced", stream::iter(parts(&modified, &[33, 71])), &cancel)
        .await
        .unwrap();

    assert_eq!(session.current_recipe().unwrap().name, "Iced Chai");
    let timeline = session.timeline();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].kind, MessageKind::User);
    assert!(timeline.iter().all(|m| m.kind != MessageKind::Recipe));
}

#[tokio::test]
async fn test_three_chunk_extraction_sequence() {
    let chunks = [
        "[{\"thread_",
        "id\":\"t1\"}, {\"type\":\"RecipeResponse\",\"respo",
        "nse\":{\"name\":\"Tea\"}}]",
    ];

    let mut text = String::new();
    text.push_str(chunks[0]);
    text.push_str(chunks[1]);
    assert!(classify(parse_partial(&text).unwrap().as_ref()).is_incomplete());

    let mut session = Session::new(client());
    let cancel = CancellationToken::new();
    let thread_id = session
        .consume_recipe_stream(
            stream::iter(chunks.iter().map(|c| Ok(c.to_string())).collect::<Vec<_>>()),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(thread_id, ThreadId::new("t1"));
    assert_eq!(
        session.current_recipe(),
        Some(&Recipe {
            name: "Tea".to_string(),
            ..Default::default()
        })
    );
}

#[tokio::test]
async fn test_dangling_comma_fails_once_and_keeps_state() {
    let mut session = Session::new(client());
    let cancel = CancellationToken::new();
    session
        .consume_recipe_stream(stream::iter(parts(SHORT, &[])), &cancel)
        .await
        .unwrap();
    let before = session.state().clone();
    let mut updates = session.subscribe();

    let broken = format!("{},", &REPLY[..REPLY.len() - 1]);
    let err = session
        .consume_chat_stream("More?", stream::iter(parts(&broken, &[50])), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Json(_)));
    assert!(err.is_transport());

    let after = updates.borrow_and_update().clone();
    assert_eq!(after.recipe, before.recipe);
    assert_eq!(after.turns, before.turns);
    assert_eq!(after.thread_id, before.thread_id);
    assert!(!after.is_streaming);
    assert!(after.error.is_some());
}

#[tokio::test]
async fn test_empty_body_is_a_failure() {
    let mut session = Session::new(client());
    let err = session
        .consume_recipe_stream(stream::iter(parts("", &[])), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert!(session.current_recipe().is_none());
}
