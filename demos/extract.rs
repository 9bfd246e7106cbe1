use anyhow::Result;
use recipe_stream::prelude::*;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Load backend settings from environment
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: extract <recipe-url> [question]"))?;
    let question = args.next();

    let mut session = Session::from_env()?;
    let mut updates = session.subscribe();
    let cancel = CancellationToken::new();

    // Print the recipe name as it streams in
    let watcher = tokio::spawn(async move {
        let mut shown = String::new();
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if let Some(recipe) = state.recipe {
                if recipe.name != shown {
                    println!("... {}", recipe.name);
                    shown = recipe.name;
                }
            }
        }
    });

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    session.submit_recipe_url(&url, "", &cancel).await?;

    if let Some(recipe) = session.current_recipe() {
        println!("\n{}", recipe.name);
        for ingredient in &recipe.ingredients {
            println!("  - {} {}", ingredient.quantity, ingredient.name);
        }
        for (i, step) in recipe.instructions.iter().enumerate() {
            println!("  {}. {}", i + 1, step.text);
        }
    }

    if let Some(question) = question {
        session.send_chat_message(&question, &cancel).await?;
        for message in session.timeline() {
            println!("{:?}: {}", message.role, message.content);
        }
    }

    drop(session);
    watcher.await?;
    Ok(())
}
