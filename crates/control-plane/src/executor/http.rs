//! HTTP stage executor.
//!
//! Posts the stage request to the configured endpoint and classifies the
//! response:
//!
//! - `2xx` with a JSON body (or no body) succeeds with that payload
//! - `408`, `429`, `5xx`, connect errors and timeouts are transient
//! - any other status or an undecodable body is permanent

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use termination_saga::model::{AccountId, ExecutionId, Stage, StageError, StageOutcome};
use termination_saga::stage::{StageContext, StageExecutor};
use uuid::Uuid;

/// Longest response body excerpt kept in an error detail.
const MAX_BODY_EXCERPT: usize = 1024;

/// Request body sent to every stage endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StageRequest<'a> {
    account_id: &'a AccountId,
    execution_id: ExecutionId,
    correlation_id: Uuid,
    attempt: u32,
    context: &'a BTreeMap<Stage, Value>,
}

#[derive(Debug, Clone)]
pub struct HttpStageExecutor {
    client: reqwest::Client,
    stage: Stage,
    url: String,
    name: String,
}

impl HttpStageExecutor {
    pub fn new(client: reqwest::Client, stage: Stage, url: impl Into<String>) -> Self {
        Self {
            client,
            stage,
            url: url.into(),
            name: format!("http:{}", stage),
        }
    }
}

#[async_trait]
impl StageExecutor for HttpStageExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, account_id: &AccountId, context: &StageContext) -> StageOutcome {
        let request = StageRequest {
            account_id,
            execution_id: context.execution_id,
            correlation_id: context.correlation_id,
            attempt: context.attempt,
            context: &context.prior,
        };

        let response = match self
            .client
            .post(&self.url)
            .timeout(context.timeout)
            .header("x-correlation-id", context.correlation_id.to_string())
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return StageOutcome::failure(classify_transport(&e)),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return StageOutcome::failure(StageError::transient(format!(
                    "Failed to read {} response: {}",
                    self.stage, e
                )))
            }
        };

        tracing::debug!(
            stage = %self.stage,
            url = %self.url,
            status = status.as_u16(),
            attempt = context.attempt,
            "Stage endpoint responded"
        );
        classify_response(status, &body).into()
    }
}

/// Classify a stage endpoint response.
pub fn classify_response(status: StatusCode, body: &str) -> Result<Value, StageError> {
    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(body).map_err(|e| {
            StageError::permanent(format!("Malformed response body: {}", e))
                .with_detail(detail(status, body))
        });
    }

    let message = format!("Endpoint returned {}", status);
    let error = if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        StageError::transient(message)
    } else {
        StageError::permanent(message)
    };
    Err(error.with_detail(detail(status, body)))
}

fn classify_transport(err: &reqwest::Error) -> StageError {
    let message = format!("Request failed: {}", err);
    if err.is_timeout() || err.is_connect() || err.is_request() {
        StageError::transient(message)
    } else {
        StageError::permanent(message)
    }
}

fn detail(status: StatusCode, body: &str) -> Value {
    json!({
        "status": status.as_u16(),
        "body": body.chars().take(MAX_BODY_EXCERPT).collect::<String>(),
    })
}
