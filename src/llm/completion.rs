//! Role-addressed completion capability.
//!
//! Every optimizer component talks to models through [`CompletionClient`]:
//! one instruction in, raw text out, addressed to either the task role or
//! the optimizer role. Tests substitute deterministic implementations.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::litellm::{GenerationRequest, LlmProvider, Message};
use crate::error::LlmError;
use crate::metrics;

/// The model role a completion is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    /// Answers dataset questions using the prompt under test.
    Task,
    /// Tags and rewrites the prompt itself.
    Optimizer,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Task => "task",
            ModelRole::Optimizer => "optimizer",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-turn completion addressed to a model role.
///
/// Implementations may fail on any call; callers decide their own recovery.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        role: ModelRole,
        message: &str,
        temperature: Option<f64>,
    ) -> Result<String, LlmError>;
}

/// A provider and model bound to one role.
#[derive(Clone)]
pub struct RoleBinding {
    pub provider: Arc<dyn LlmProvider>,
    pub model: String,
}

impl RoleBinding {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

/// Routes task and optimizer completions to independently configured models.
pub struct RoleRoutedClient {
    task: RoleBinding,
    optimizer: RoleBinding,
}

impl RoleRoutedClient {
    pub fn new(task: RoleBinding, optimizer: RoleBinding) -> Self {
        Self { task, optimizer }
    }

    /// Use one provider for both roles with different models.
    pub fn shared(
        provider: Arc<dyn LlmProvider>,
        task_model: impl Into<String>,
        optimizer_model: impl Into<String>,
    ) -> Self {
        Self {
            task: RoleBinding::new(provider.clone(), task_model),
            optimizer: RoleBinding::new(provider, optimizer_model),
        }
    }

    pub fn binding(&self, role: ModelRole) -> &RoleBinding {
        match role {
            ModelRole::Task => &self.task,
            ModelRole::Optimizer => &self.optimizer,
        }
    }
}

#[async_trait]
impl CompletionClient for RoleRoutedClient {
    async fn complete(
        &self,
        role: ModelRole,
        message: &str,
        temperature: Option<f64>,
    ) -> Result<String, LlmError> {
        let binding = self.binding(role);
        let mut request = GenerationRequest::new(&binding.model, vec![Message::user(message)]);
        if let Some(temperature) = temperature {
            request = request.with_temperature(temperature);
        }

        let started = Instant::now();
        let result = binding.provider.generate(request).await.and_then(|response| {
            let content = response
                .first_content()
                .ok_or_else(|| LlmError::ParseError("No choices in LLM response".to_string()))?;
            // An empty task answer is a wrong answer; an empty optimizer reply is unusable.
            if role == ModelRole::Optimizer && content.trim().is_empty() {
                return Err(LlmError::ParseError(
                    "No content in optimizer response".to_string(),
                ));
            }
            Ok(content.to_string())
        });
        let elapsed = started.elapsed().as_secs_f64();

        metrics::record_completion(
            role.as_str(),
            if result.is_ok() { "success" } else { "error" },
            elapsed,
        );
        debug!(
            role = %role,
            model = %binding.model,
            elapsed_ms = (elapsed * 1000.0) as u64,
            ok = result.is_ok(),
            "Completion finished"
        );

        result
    }
}
