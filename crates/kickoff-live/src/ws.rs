//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::LiveError;
use crate::transport::{Connector, Link, LinkEvent, LinkPeer};

/// Connects to the raw-WebSocket endpoint of the update service.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    auth_token: Option<String>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
        }
    }

    /// Also send `Authorization: Bearer <token>` on the upgrade request.
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Link, LiveError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| LiveError::ConnectionFailed(e.to_string()))?;
        if let Some(token) = &self.auth_token {
            if let Ok(value) = format!("Bearer {}", token).parse() {
                request.headers_mut().insert("Authorization", value);
            }
        }

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| LiveError::ConnectionFailed(e.to_string()))?;
        info!(url = %self.url, status = %response.status(), "websocket connected");

        let (mut write, mut read) = stream.split();
        let (link, peer) = Link::pair();
        let LinkPeer { mut sent, events } = peer;

        // writer: client frames -> socket; closes the socket once the client drops its sender
        tokio::spawn(async move {
            while let Some(text) = sent.recv().await {
                if let Err(e) = write.send(Message::Text(text)).await {
                    debug!(error = %e, "websocket write failed");
                    return;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        // reader: socket -> client events
        tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(LinkEvent::Frame(text)).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            if events.send(LinkEvent::Frame(text)).is_err() {
                                return;
                            }
                        }
                        Err(_) => warn!("dropping non-UTF-8 binary message"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                }
            };
            let _ = events.send(LinkEvent::Closed(reason));
        });

        Ok(link)
    }
}
