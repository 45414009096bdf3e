//! MessageHandler - the consumer's callback
//!
//! The consumer owns the envelope (retry counter, ack, requeue). A handler only ever
//! sees the decoded task and answers with an output or a classified [`HandleError`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::domain::HandleError;

/// Processes one decoded task.
///
/// # 使用例
/// ```ignore
/// struct Echo;
///
/// #[async_trait]
/// impl MessageHandler for Echo {
///     type Task = serde_json::Value;
///     type Output = ();
///
///     async fn handle(&self, task: serde_json::Value) -> Result<(), HandleError> {
///         tracing::info!(%task, "got task");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    type Task: DeserializeOwned + Send + 'static;
    type Output: Send;

    async fn handle(&self, task: Self::Task) -> Result<Self::Output, HandleError>;
}
