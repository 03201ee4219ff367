//! Stage executors backed by remote HTTP endpoints.

mod http;

pub use http::{classify_response, HttpStageExecutor};

use std::sync::Arc;

use termination_saga::model::Stage;
use termination_saga::stage::StageExecutors;

use crate::config::EndpointConfig;

/// One HTTP executor per stage, sharing a single client.
pub fn http_executors(client: reqwest::Client, endpoints: &EndpointConfig) -> StageExecutors {
    let executor = |stage: Stage| Arc::new(HttpStageExecutor::new(client.clone(), stage, endpoints.url(stage)));
    StageExecutors::new(
        executor(Stage::PreCheck),
        executor(Stage::AccountManagement),
        executor(Stage::MetadataUpdate),
        executor(Stage::VendorDecommission),
    )
}
