//! Trait abstraction for the persistent connection to enable testing

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{Result, TelemetryError};

/// Frame received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Binary(Vec<u8>),
    Text(String),
}

/// One established connection
#[async_trait]
pub trait StreamLink: Send {
    /// Write one binary frame
    async fn send(&mut self, frame: Bytes) -> Result<()>;

    /// Next inbound frame; `None` once the peer has closed the connection
    async fn recv(&mut self) -> Option<Result<Inbound>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens connections to the collection service
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        device_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Box<dyn StreamLink>>;
}

fn ws_error(e: tokio_tungstenite::tungstenite::Error) -> TelemetryError {
    TelemetryError::Transport(e.to_string())
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| TelemetryError::InvalidArgument(format!("Invalid header value: {}", e)))
}

/// WebSocket connector built on `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(
        &self,
        url: &str,
        device_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Box<dyn StreamLink>> {
        let mut request = url.into_client_request().map_err(ws_error)?;
        let headers = request.headers_mut();
        headers.insert("X-Device-ID", header_value(device_id)?);
        if let Some(token) = auth_token {
            headers.insert("Authorization", header_value(&format!("Bearer {}", token))?);
        }

        let (ws, response) = tokio_tungstenite::connect_async(request).await.map_err(ws_error)?;
        debug!("WebSocket upgrade to {} answered {}", url, response.status());

        Ok(Box::new(WsLink { ws }))
    }
}

struct WsLink {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl StreamLink for WsLink {
    async fn send(&mut self, frame: Bytes) -> Result<()> {
        self.ws.send(Message::Binary(frame.to_vec())).await.map_err(ws_error)
    }

    async fn recv(&mut self) -> Option<Result<Inbound>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Binary(data)) => return Some(Ok(Inbound::Binary(data))),
                Ok(Message::Text(text)) => return Some(Ok(Inbound::Text(text))),
                Ok(Message::Close(frame)) => {
                    debug!("Server closed connection: {:?}", frame);
                    return None;
                }
                // Protocol-level ping/pong is answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(ws_error(e))),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.ws.close(None).await.map_err(ws_error)
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    /// Mock connection; the paired [`MockLinkHandle`] plays the server
    pub struct MockLink {
        outbound: mpsc::UnboundedSender<Bytes>,
        inbound: mpsc::UnboundedReceiver<Result<Inbound>>,
    }

    /// Server side of a [`MockLink`]. Dropping it closes the connection.
    pub struct MockLinkHandle {
        pub sent: mpsc::UnboundedReceiver<Bytes>,
        pub inject: mpsc::UnboundedSender<Result<Inbound>>,
    }

    impl MockLinkHandle {
        pub fn push_binary(&self, frame: &[u8]) {
            let _ = self.inject.send(Ok(Inbound::Binary(frame.to_vec())));
        }

        pub fn push_text(&self, text: &str) {
            let _ = self.inject.send(Ok(Inbound::Text(text.to_string())));
        }

        pub fn push_error(&self) {
            let reset = TelemetryError::Transport("Mock connection reset".to_string());
            let _ = self.inject.send(Err(reset));
        }

        /// Frames written so far, without waiting
        pub fn drain_sent(&mut self) -> Vec<Bytes> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.sent.try_recv() {
                frames.push(frame);
            }
            frames
        }
    }

    pub fn mock_link() -> (MockLink, MockLinkHandle) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            MockLink {
                outbound: out_tx,
                inbound: in_rx,
            },
            MockLinkHandle {
                sent: out_rx,
                inject: in_tx,
            },
        )
    }

    #[async_trait]
    impl StreamLink for MockLink {
        async fn send(&mut self, frame: Bytes) -> Result<()> {
            self.outbound
                .send(frame)
                .map_err(|_| TelemetryError::Transport("Mock peer gone".to_string()))
        }

        async fn recv(&mut self) -> Option<Result<Inbound>> {
            self.inbound.recv().await
        }

        async fn close(&mut self) -> Result<()> {
            self.inbound.close();
            Ok(())
        }
    }

    pub enum MockConnect {
        Fail,
        /// Never completes; only the caller's timeout or stop ends it
        Hang,
        Accept(MockLink),
    }

    /// Mock connector for testing
    #[derive(Clone)]
    pub struct MockConnector {
        pub script: Arc<Mutex<VecDeque<MockConnect>>>,
        pub attempts: Arc<Mutex<Vec<Instant>>>,
        pub headers: Arc<Mutex<Vec<(String, Option<String>)>>>,
        pub hang_when_empty: bool,
    }

    impl MockConnector {
        /// Connector that fails every attempt once its script runs out
        pub fn new() -> Self {
            Self {
                script: Arc::new(Mutex::new(VecDeque::new())),
                attempts: Arc::new(Mutex::new(Vec::new())),
                headers: Arc::new(Mutex::new(Vec::new())),
                hang_when_empty: false,
            }
        }

        /// Connector that hangs every attempt once its script runs out
        pub fn hanging() -> Self {
            Self {
                hang_when_empty: true,
                ..Self::new()
            }
        }

        pub fn push(&self, step: MockConnect) {
            self.script.lock().unwrap().push_back(step);
        }

        /// Script the next attempt to succeed and return the server side
        pub fn accept_next(&self) -> MockLinkHandle {
            let (link, handle) = mock_link();
            self.push(MockConnect::Accept(link));
            handle
        }

        pub fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }

        pub fn attempt_count(&self) -> usize {
            self.attempts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StreamConnector for MockConnector {
        async fn connect(
            &self,
            _url: &str,
            device_id: &str,
            auth_token: Option<&str>,
        ) -> Result<Box<dyn StreamLink>> {
            self.attempts.lock().unwrap().push(Instant::now());
            self.headers
                .lock()
                .unwrap()
                .push((device_id.to_string(), auth_token.map(str::to_string)));

            let step = self.script.lock().unwrap().pop_front();
            let step = match step {
                Some(step) => step,
                None if self.hang_when_empty => MockConnect::Hang,
                None => MockConnect::Fail,
            };

            match step {
                MockConnect::Fail => {
                    Err(TelemetryError::Transport("Mock connection refused".to_string()))
                }
                MockConnect::Hang => std::future::pending().await,
                MockConnect::Accept(link) => Ok(Box::new(link)),
            }
        }
    }
}
