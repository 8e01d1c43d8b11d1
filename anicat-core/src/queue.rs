//! Serialized access to the AniList GraphQL endpoint.
//!
//! Every query goes through one worker task that drains a FIFO channel, so
//! at most one upstream call is outstanding per process. The worker applies
//! the retry policy for 429/5xx responses and pauses proactively when the
//! upstream reports its remaining quota is nearly spent.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::QueueError;

/// Body of a GraphQL POST.
#[derive(Debug, Clone, Serialize)]
pub struct GraphqlRequest {
    pub query: String,
    pub variables: Value,
}

/// The parts of an upstream HTTP response the queue cares about.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    /// `Retry-After`, in seconds.
    pub retry_after: Option<u64>,
    /// `X-RateLimit-Remaining`.
    pub remaining: Option<u32>,
    /// `X-RateLimit-Reset`, as a unix timestamp in seconds.
    pub reset_at: Option<i64>,
    pub body: String,
}

/// Issues one HTTP call. Implementations must not retry on their own.
#[async_trait]
pub trait GraphqlTransport: Send + Sync {
    async fn post(
        &self,
        request: &GraphqlRequest,
    ) -> Result<TransportResponse, String>;
}

#[derive(Debug, Clone)]
pub struct QueuePolicy {
    /// Attempts per task, shared between 429 and 5xx retries.
    pub max_attempts: u32,
    /// Lower bound on the wait after a 429, whatever `Retry-After` says.
    pub rate_limit_floor: Duration,
    /// 5xx retries wait `attempt * server_error_step`.
    pub server_error_step: Duration,
    /// Pause before the next task when fewer calls than this remain.
    pub low_water_mark: u32,
    /// Added to the reported reset time before resuming.
    pub reset_buffer: Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_floor: Duration::from_secs(60),
            server_error_step: Duration::from_secs(10),
            low_water_mark: 10,
            reset_buffer: Duration::from_secs(1),
        }
    }
}

struct QueueTask {
    request: GraphqlRequest,
    reply: oneshot::Sender<Result<Value, QueueError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphqlErrorMessage>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorMessage {
    message: String,
}

/// Handle to the single-flight GraphQL worker. Cloning shares the worker;
/// the worker exits once every handle is dropped.
#[derive(Clone)]
pub struct QueryQueue {
    tx: mpsc::UnboundedSender<QueueTask>,
}

impl fmt::Debug for QueryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryQueue")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl QueryQueue {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(
        transport: Arc<dyn GraphqlTransport>,
        policy: QueuePolicy,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = QueueWorker { transport, policy };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    /// Enqueue a query and wait for its `data` payload.
    pub async fn submit(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<Value, QueueError> {
        let (reply, rx) = oneshot::channel();
        let task = QueueTask {
            request: GraphqlRequest {
                query: query.to_owned(),
                variables,
            },
            reply,
        };
        self.tx.send(task).map_err(|_| QueueError::Closed)?;
        rx.await.map_err(|_| QueueError::Closed)?
    }

    /// [`QueryQueue::submit`] and decode the `data` payload into `T`.
    pub async fn submit_as<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, QueueError> {
        let data = self.submit(query, variables).await?;
        serde_json::from_value(data).map_err(|e| QueueError::Decode(e.to_string()))
    }
}

struct QueueWorker {
    transport: Arc<dyn GraphqlTransport>,
    policy: QueuePolicy,
}

impl QueueWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<QueueTask>) {
        debug!("GraphQL query queue worker started");
        while let Some(task) = rx.recv().await {
            let (result, pause) = self.execute(&task.request).await;
            // The caller may have stopped waiting; the result is simply dropped.
            let _ = task.reply.send(result);
            if let Some(pause) = pause {
                info!(
                    pause_secs = pause.as_secs(),
                    "GraphQL quota nearly exhausted; pausing queue until reset"
                );
                tokio::time::sleep(pause).await;
            }
        }
        debug!("GraphQL query queue worker stopped");
    }

    async fn execute(
        &self,
        request: &GraphqlRequest,
    ) -> (Result<Value, QueueError>, Option<Duration>) {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let response = match self.transport.post(request).await {
                Ok(response) => response,
                Err(err) => return (Err(QueueError::Transport(err)), None),
            };

            match response.status {
                429 => {
                    if attempt >= max_attempts {
                        return (
                            Err(QueueError::RateLimitExceeded {
                                attempts: attempt,
                            }),
                            None,
                        );
                    }
                    let wait = self.rate_limit_wait(response.retry_after);
                    warn!(
                        attempt,
                        wait_secs = wait.as_secs(),
                        "GraphQL upstream rate limited; retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                500..=599 => {
                    if attempt >= max_attempts {
                        return (
                            Err(QueueError::MaxRetriesExceeded {
                                attempts: attempt,
                                status: response.status,
                            }),
                            None,
                        );
                    }
                    let wait = self.policy.server_error_step * attempt;
                    warn!(
                        attempt,
                        status = response.status,
                        wait_secs = wait.as_secs(),
                        "GraphQL upstream server error; retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                200..=299 => {
                    let pause = self.quota_pause(&response);
                    return (decode_envelope(&response.body), pause);
                }
                status => {
                    return (
                        Err(QueueError::Upstream {
                            status,
                            body: response.body,
                        }),
                        None,
                    );
                }
            }
        }
    }

    fn rate_limit_wait(&self, retry_after: Option<u64>) -> Duration {
        let advertised = Duration::from_secs(retry_after.unwrap_or(0));
        advertised.max(self.policy.rate_limit_floor)
    }

    fn quota_pause(&self, response: &TransportResponse) -> Option<Duration> {
        let remaining = response.remaining?;
        if remaining >= self.policy.low_water_mark {
            return None;
        }
        let reset_at = response.reset_at?;
        let until_reset = reset_at - Utc::now().timestamp();
        let until_reset = Duration::from_secs(until_reset.max(0) as u64);
        Some(until_reset + self.policy.reset_buffer)
    }
}

fn decode_envelope(body: &str) -> Result<Value, QueueError> {
    let envelope: GraphqlEnvelope = serde_json::from_str(body)
        .map_err(|e| QueueError::Decode(e.to_string()))?;

    if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
        let message = errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(QueueError::Graphql(message));
    }

    envelope
        .data
        .ok_or_else(|| QueueError::Decode("response has no data".into()))
}
