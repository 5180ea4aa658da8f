//! Offline pool client with canned responses.
//!
//! Used when `--url mock` is given, so the whole supervision loop can be
//! exercised against a local stub miner without a pool account.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use super::PoolClient;
use crate::model::{Answer, AnswerStatus, Task, UserInfo};

/// How long a canned task stays valid.
const MOCK_TASK_LIFETIME_SECS: i64 = 5;

pub struct MockClient;

impl MockClient {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

fn default_user_info() -> UserInfo {
    UserInfo {
        pool_address: "pool_address".into(),
        user_address: "user_address".into(),
        shares: 10,
    }
}

fn default_task() -> Task {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Task {
        seed: "229760179690128740373110445116482216837".into(),
        complexity: "53919893334301279589334030174039261347274288845081144962207220498432".into(),
        giver_address: "kf-kkdY_B7p-77TLn2hUhM6QidWrrsl8FYWCIvBMpZKprBtN".into(),
        pool_address: "kQBWkNKqzCAwA9vjMwRmg7aY75Rf8lByPA9zKXoqGkHi8SM7".into(),
        expires: now + MOCK_TASK_LIFETIME_SECS,
    }
}

#[async_trait]
impl PoolClient for MockClient {
    async fn register(&self) -> Option<UserInfo> {
        Some(default_user_info())
    }

    async fn get_task(&self) -> Option<Task> {
        Some(default_task())
    }

    async fn send_answer(&self, _answer: &Answer) -> Option<AnswerStatus> {
        Some(AnswerStatus { accepted: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_round() {
        let client = MockClient::new();
        let info = client.register().await.unwrap();
        assert_eq!(info.shares, 10);

        let task = client.get_task().await.unwrap();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        assert!(task.expires > now);

        let answer = Answer {
            giver_address: task.giver_address,
            boc: vec![1, 2, 3],
            statistic: None,
        };
        assert!(client.send_answer(&answer).await.unwrap().accepted);
    }
}
