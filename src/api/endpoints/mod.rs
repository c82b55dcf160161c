pub mod document_types;
pub mod extraction;
pub mod info;

use super::error::ApiError;

/// Run synchronous store or LLM work on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
