//! # recipe-stream
//!
//! Incremental client for a recipe extraction and recipe chat backend.
//!
//! The backend answers every request with a single JSON envelope,
//! `[{"thread_id": ...}, {"type": ..., "response": ...}]`, written over a
//! chunked response body. This crate renders the envelope while it is
//! still arriving:
//!
//! - **Accumulation**: decoded text chunks are appended to a per-request
//!   [`StreamBuffer`]
//! - **Tolerant parsing**: [`parse_partial`] recovers the best value from a
//!   truncated document
//! - **Classification**: [`classify`] decides whether the payload is usable
//!   yet and of which [`ResponseKind`]
//! - **Reconciliation**: [`SessionState::reconcile`] replaces the recipe or
//!   rewrites the cycle's single assistant turn
//! - **Finalization**: [`finalize`] strictly parses the finished body and
//!   extracts the [`ThreadId`] for chat continuation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recipe_stream::{RecipeClient, Session};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RecipeClient::builder()
//!         .base_url("http://localhost:4000")
//!         .build()?;
//!     let mut session = Session::new(client);
//!     let cancel = CancellationToken::new();
//!
//!     session
//!         .submit_recipe_url("https://example.com/pancakes", "", &cancel)
//!         .await?;
//!     println!("{:?}", session.current_recipe());
//!
//!     session
//!         .send_chat_message("Can I make these vegan?", &cancel)
//!         .await?;
//!     for message in session.timeline() {
//!         println!("{:?}: {}", message.role, message.content);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod models;
pub mod parser;
pub mod reconcile;
pub mod session;
pub mod streaming;

// Re-export main types
pub use classify::{classify, Classification, Payload};
pub use client::{ChunkStream, RecipeClient, RecipeClientBuilder};
pub use config::{HttpConfig, RecipeStreamConfig};
pub use error::{Error, Result};
pub use format::{normalize, FormattedMessage, MessageKind};
pub use models::*;
pub use parser::{parse_partial, PartialParser, SyntaxError, SyntaxErrorKind};
pub use reconcile::{SessionState, Update};
pub use session::{Flow, Session};
pub use streaming::{finalize, Finalized, StreamBuffer, Utf8Decoder};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ConversationTurn, FormattedMessage, MessageKind, Recipe, RecipeClient,
        RecipeClientBuilder, Result, Role, Session, SessionState, ThreadId,
    };
}
