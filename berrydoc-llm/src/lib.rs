//! berrydoc-llm: hosted language model access for the chatbot

pub mod bridge;
pub mod config;
pub mod error;
pub mod providers;

pub use bridge::{build_prompt, AssistantBridge, OFF_TOPIC_REFUSAL};
pub use config::*;
pub use error::*;
pub use providers::{GoogleProvider, Provider};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_timeout_detection() {
        assert!(LLMError::Timeout(std::time::Duration::from_secs(1)).is_timeout());
        assert!(!LLMError::RateLimit.is_timeout());
    }
}
