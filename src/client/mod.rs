//! Pool server capability: register, fetch a task, submit an answer.
//!
//! The supervision loop only ever sees `Option`s: `None` means the call
//! failed and the cause has already been logged by the implementation.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::model::{Answer, AnswerStatus, Task, UserInfo};

/// Sentinel `--url` value selecting the offline mock client.
pub const MOCK_URL: &str = "mock";

#[async_trait]
pub trait PoolClient: Send + Sync {
    async fn register(&self) -> Option<UserInfo>;
    async fn get_task(&self) -> Option<Task>;
    async fn send_answer(&self, answer: &Answer) -> Option<AnswerStatus>;
}

/// Pick the client implementation for the configured pool URL.
pub fn build(cfg: &Config) -> Box<dyn PoolClient> {
    if cfg.pool_url == MOCK_URL {
        info!("using the offline mock pool client");
        Box::new(mock::MockClient::new())
    } else {
        Box::new(http::HttpClient::new(&cfg.pool_url, &cfg.token))
    }
}
