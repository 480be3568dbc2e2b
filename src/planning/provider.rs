use anyhow::Result;
use async_trait::async_trait;

/// External text generator used to classify requests keyword routing could
/// not place. Implementations talk to whatever model or service they like.
#[async_trait]
pub trait ResponseProvider: Send + Sync {
    async fn generate_response(&self, query: &str, context: &str) -> Result<String>;
}
