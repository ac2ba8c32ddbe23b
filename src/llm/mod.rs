//! LLM integration for dataset-cleaner.
//!
//! This module provides the chat-completion client used to classify and
//! scrub records, and the [`LlmProvider`] seam that lets the cleaning engine
//! run against any implementation.
//!
//! ```ignore
//! use dataset_cleaner::config::LlmSettings;
//! use dataset_cleaner::llm::{ChatCompletionClient, GenerationRequest, LlmProvider, Message};
//!
//! let client = ChatCompletionClient::from_settings(&LlmSettings::from_env()?)?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello!")])
//!     .with_temperature(0.3);
//! let response = client.generate(request).await?;
//! ```

pub mod client;

pub use client::{
    ChatCompletionClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message,
    Usage,
};
