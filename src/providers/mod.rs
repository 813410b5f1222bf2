use async_trait::async_trait;

use crate::types::{CompletionRequest, CompletionResponse};
use crate::LLMError;

pub mod scripted;

pub use scripted::ScriptedProvider;

/// The completion capability agent nodes call out to.
///
/// Concrete network providers live outside this crate; anything that can turn a
/// [`CompletionRequest`] into a [`CompletionResponse`] can back an agent node.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LLMError>;

    fn name(&self) -> &'static str;
}
