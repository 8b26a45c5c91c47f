//! LLM integration for prompt-forge.
//!
//! Two layers:
//!
//! - [`LlmProvider`] speaks the chat-completions protocol ([`LiteLlmClient`]
//!   is the HTTP implementation).
//! - [`CompletionClient`] is what the optimizer consumes: a single
//!   instruction addressed to the task or optimizer role. [`RoleRoutedClient`]
//!   binds each role to a provider and model.
//!
//! ```ignore
//! use prompt_forge::llm::{LiteLlmClient, ModelRole, RoleRoutedClient, CompletionClient};
//! use std::sync::Arc;
//!
//! let provider = Arc::new(LiteLlmClient::new("https://api.deepseek.com/v1", Some(key), "deepseek-chat")?);
//! let client = RoleRoutedClient::shared(provider, "gpt-4o-mini", "deepseek-chat");
//! let answer = client.complete(ModelRole::Task, "What is 2 + 2?", None).await?;
//! ```

pub mod completion;
pub mod litellm;

pub use completion::{CompletionClient, ModelRole, RoleBinding, RoleRoutedClient};
pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
    DEFAULT_MAX_ATTEMPTS,
};
