use super::FetchResult;
use async_trait::async_trait;

/// A sink for completed fetches
///
/// Handlers run on the worker task that produced the result, in completion
/// order, and never see robots-excluded links.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, result: &FetchResult);
}

/// Logs one line per fetch at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

#[async_trait]
impl Handler for LoggingHandler {
    async fn handle(&self, result: &FetchResult) {
        match (&result.response, &result.fetch_error) {
            (Some(response), _) => tracing::info!(
                url = %result.url,
                status = response.status,
                bytes = result.content.len(),
                truncated = result.content_truncated,
                "Fetched"
            ),
            (None, Some(error)) => tracing::info!(url = %result.url, error = %error, "Fetch failed"),
            (None, None) => tracing::info!(url = %result.url, "Fetch produced no response"),
        }
    }
}
