//! Trait abstraction for HTTP POST to enable testing

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Result, TelemetryError};

/// Trait for request/response transport
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST a body and return the response status code
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<u16>;
}

/// `reqwest` client implementing [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("csi-telemetry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TelemetryError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<u16> {
        let mut request = self.client.post(url).timeout(timeout).body(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted outcome of one mock request
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockReply {
        Status(u16),
        Error,
        /// Never completes; only the caller's timeout ends it
        Hang,
    }

    /// One captured request
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub url: String,
        pub body: Vec<u8>,
        pub headers: Vec<(String, String)>,
    }

    impl RecordedRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    /// Mock HTTP transport for testing
    #[derive(Clone)]
    pub struct MockHttpTransport {
        pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
        pub replies: Arc<Mutex<VecDeque<MockReply>>>,
        pub fallback: Arc<Mutex<MockReply>>,
    }

    impl MockHttpTransport {
        pub fn new() -> Self {
            Self::with_fallback(MockReply::Status(200))
        }

        pub fn with_fallback(reply: MockReply) -> Self {
            Self {
                requests: Arc::new(Mutex::new(Vec::new())),
                replies: Arc::new(Mutex::new(VecDeque::new())),
                fallback: Arc::new(Mutex::new(reply)),
            }
        }

        /// Queue replies used before the fallback
        pub fn push_replies(&self, replies: &[MockReply]) {
            self.replies.lock().unwrap().extend(replies.iter().copied());
        }

        pub fn get_requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn attempts(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpTransport for MockHttpTransport {
        async fn post(
            &self,
            url: &str,
            body: Vec<u8>,
            headers: &[(String, String)],
            _timeout: Duration,
        ) -> Result<u16> {
            self.requests.lock().unwrap().push(RecordedRequest {
                url: url.to_string(),
                body,
                headers: headers.to_vec(),
            });

            let reply = {
                let mut replies = self.replies.lock().unwrap();
                replies.pop_front().unwrap_or(*self.fallback.lock().unwrap())
            };

            match reply {
                MockReply::Status(code) => Ok(code),
                MockReply::Error => {
                    Err(TelemetryError::Transport("Mock connection refused".to_string()))
                }
                MockReply::Hang => std::future::pending().await,
            }
        }
    }
}
