//! # Taskframe - Core API Documentation
//!
//! Taskframe pulls structured task lists out of unstructured conversational
//! text by prompting a locally hosted language model for schema-constrained
//! JSON output and validating what comes back.
//!
//! ## Features
//!
//! - **LLM Clients**: a unified [`completion::CompletionModel`] interface over
//!   chat endpoints, with token usage tracking
//! - **Providers**: a builtin [Ollama](https://ollama.com) completion model
//! - **Extractors**: structured output generation from LLM responses, with the
//!   response schema derived from the target type
//! - **Task extraction**: the [`extractor::TaskExtractor`] component with a
//!   validated [`extractor::Task`] data model
//!
//! ## Extracting tasks
//!
//! ```rust,no_run
//! use taskframe::completion::CompletionModel;
//! use taskframe::extractor::TaskExtractor;
//! use taskframe::providers::completions::Ollama;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Ollama::new(None)
//!         .build_client("You are a helpful assistant that extracts structured data from text.");
//!     let mut extractor = TaskExtractor::new(client);
//!
//!     let tasks = extractor
//!         .extract("Need to send the invoice by 2026-06-01, it's urgent.")
//!         .await;
//!     for task in tasks {
//!         println!("[{}] {}", task.priority, task.title);
//!     }
//! }
//! ```
//!
//! Extraction degrades to an empty list when the model is unreachable or its
//! output fails validation; use [`extractor::TaskExtractor::try_extract`] to
//! keep the failure reason.

/// Language model completion and schema-constrained extraction
///
/// Contains:
/// - Client for managing LLM interactions
/// - Response extraction
pub mod completion;

/// Error types for all library operations
pub mod error;

/// Task extraction from conversational text
///
/// The task data model, its validation rules, and the extractor component.
pub mod extractor;

/// Builtin completion model providers
pub mod providers;
