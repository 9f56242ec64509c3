//! Execution-layer RPC retry helpers.
use std::time::Duration;

use alloy::transports::{
    RpcError, TransportError,
    layers::{RetryBackoffLayer, RetryPolicy},
};
use alloy_json_rpc::ErrorPayload;
use tokio_retry::{RetryIf, strategy::ExponentialBackoff};

/// The default maximum number of retries for a transport error.
///
/// With a `DEFAULT_INITIAL_BACKOFF_MS` of 1ms we can do 9 retries in ~500ms:
const DEFAULT_MAX_RETRIES: u32 = 9;

/// The default initial backoff time in milliseconds for a transport error.
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1;

/// Compute units per second assumed for the provider.
const DEFAULT_COMPUTE_UNITS_PER_SECOND: u64 = 100;

/// The default [`RetryBackoffLayer`] for execution-layer RPC clients.
pub const DEFAULT_RETRY_LAYER: RetryBackoffLayer<ExecutionRetryPolicy> =
    RetryBackoffLayer::new_with_policy(
        DEFAULT_MAX_RETRIES,
        DEFAULT_INITIAL_BACKOFF_MS,
        DEFAULT_COMPUTE_UNITS_PER_SECOND,
        ExecutionRetryPolicy,
    );

/// Retries rate limits, server errors and refused connections.
///
/// Some providers report oversized log queries with the same -32005 code they
/// use for rate limiting. Those are never retried, so the deposit scanner sees
/// them at once and can narrow its range.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionRetryPolicy;

impl RetryPolicy for ExecutionRetryPolicy {
    fn should_retry(&self, error: &TransportError) -> bool {
        match error {
            RpcError::Transport(kind) => kind.is_retry_err() || is_connection_refused(kind),
            RpcError::ErrorResp(resp) => is_retryable_payload(resp),
            // some providers send error payloads that fail to parse as a response
            RpcError::DeserError { text, .. } => serde_json::from_str::<ErrorPayload>(text)
                .is_ok_and(|resp| is_retryable_payload(&resp)),
            RpcError::NullResp => true,
            _ => false,
        }
    }

    fn backoff_hint(&self, error: &TransportError) -> Option<Duration> {
        let RpcError::ErrorResp(resp) = error else { return None };
        // infura returns the requested backoff once the daily limit is hit
        let data = resp.try_data_as::<serde_json::Value>()?.ok()?;
        let backoff_seconds = &data["rate"]["backoff_seconds"];
        if let Some(seconds) = backoff_seconds.as_u64() {
            return Some(Duration::from_secs(seconds));
        }
        backoff_seconds.as_f64().map(|seconds| Duration::from_secs(seconds as u64 + 1))
    }
}

fn is_retryable_payload(resp: &ErrorPayload) -> bool {
    !is_oversized_result(resp) && resp.is_retry_err()
}

/// Whether the node refused a log query because its result set is too large.
pub fn is_oversized_result(resp: &ErrorPayload) -> bool {
    let message = resp.message.to_lowercase();
    message.contains("query returned more than") || message.contains("response size exceeded")
}

/// Checks whether the error message contains "connection refused".
#[inline]
pub fn is_connection_refused<S: ToString>(e: S) -> bool {
    e.to_string().to_lowercase().contains("connection refused")
}

/// Retry the provided async operation using [`ExponentialBackoff`].
///
/// Retries are attempted as long as `condition` returns `true` for the error
/// produced by the operation, using the same limits as [`DEFAULT_RETRY_LAYER`].
pub async fn retry_with_backoff_if<F, Fut, T, E, C>(op: F, condition: C) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
{
    let strategy = ExponentialBackoff::from_millis(DEFAULT_INITIAL_BACKOFF_MS)
        .take(DEFAULT_MAX_RETRIES as usize);
    RetryIf::spawn(strategy, op, condition).await
}
