//! HTTPS pool client.
//!
//! Three endpoints on the configured host, all authenticated with the
//! token as a query parameter:
//!
//!   GET  /api/v1/register?auth_token=<T>
//!   GET  /api/v1/task?auth_token=<T>
//!   POST /api/v1/send_answer?auth_token=<T>   (JSON body, 200/202/400 ok)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use super::PoolClient;
use crate::model::{Answer, AnswerStatus, Task, UserInfo};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpClient {
    pub fn new(url: &str, token: &str) -> Self {
        // `--url server.tonguys.com` is the common form; a bare host is
        // reached over HTTPS.
        let base_url = if url.starts_with("http://") || url.starts_with("https://") {
            url.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", url.trim_end_matches('/'))
        };
        Self {
            client: reqwest::Client::new(),
            base_url,
            token: token.to_string(),
        }
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/api/v1/{}?auth_token={}",
            self.base_url, endpoint, self.token
        )
    }

    // The URL carries the auth token, so only the endpoint name is logged.
    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Option<T> {
        debug!("GET {}", endpoint);
        let response = self
            .client
            .get(self.endpoint_url(endpoint))
            .header(ACCEPT, "application/json")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await;
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                error!("{} request failed: {}", endpoint, e);
                return None;
            }
        };
        if response.status() != StatusCode::OK {
            error!("{} returned unexpected status {}", endpoint, response.status());
            return None;
        }
        match response.json::<T>().await {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                error!("can't decode {} response: {}", endpoint, e);
                None
            }
        }
    }
}

#[async_trait]
impl PoolClient for HttpClient {
    async fn register(&self) -> Option<UserInfo> {
        self.get_json("register").await
    }

    async fn get_task(&self) -> Option<Task> {
        self.get_json("task").await
    }

    async fn send_answer(&self, answer: &Answer) -> Option<AnswerStatus> {
        debug!("POST send_answer");
        let response = self
            .client
            .post(self.endpoint_url("send_answer"))
            .header(ACCEPT, "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(answer)
            .send()
            .await;
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                error!("send_answer request failed: {}", e);
                return None;
            }
        };
        // 400 means the server parsed the answer and rejected it; the body
        // still carries a status record.
        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::BAD_REQUEST => {}
            other => {
                error!("send_answer returned unexpected status {}", other);
                return None;
            }
        }
        match response.json::<AnswerStatus>().await {
            Ok(status) => Some(status),
            Err(e) => {
                error!("can't decode send_answer response: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_gets_https() {
        let client = HttpClient::new("server.tonguys.com", "tok");
        assert_eq!(
            client.endpoint_url("task"),
            "https://server.tonguys.com/api/v1/task?auth_token=tok"
        );
    }

    #[test]
    fn test_explicit_scheme_kept() {
        let client = HttpClient::new("http://localhost:8080/", "tok");
        assert_eq!(
            client.endpoint_url("register"),
            "http://localhost:8080/api/v1/register?auth_token=tok"
        );
        assert_eq!(client.token, "tok");
    }
}
