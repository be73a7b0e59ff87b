use crate::config::*;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Check if API key is set
    fn has_api_key(&self) -> bool;

    /// Set API key
    fn set_api_key(&mut self, key: String);

    /// Chat completion
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Model used when a request does not name one
    fn default_model(&self) -> &str;
}
