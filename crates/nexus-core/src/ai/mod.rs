pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;

use crate::error::Result;

/// A remote service that turns one user utterance into one reply.
///
/// Each call is stateless from the service's point of view: no history is
/// sent. Every failure is reported as [`crate::Error::Remote`].
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, user_text: &str) -> Result<String>;
}
