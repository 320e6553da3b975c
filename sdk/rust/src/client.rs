//! Client SDK for the peer relay: account and credential calls over HTTP,
//! plus a WebSocket peer connection that speaks `target:payload` frames.

use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relay returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("relay refused the connection with status {0}")]
    Rejected(u16),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

impl SdkError {
    /// HTTP status behind an API error or refused upgrade.
    pub fn status(&self) -> Option<u16> {
        match self {
            SdkError::Api { status, .. } | SdkError::Rejected(status) => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub profile_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Deserialize)]
struct Created {
    user_id: u64,
}

#[derive(Deserialize)]
struct AccessGrant {
    access_token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Register a user and return its id.
    pub async fn create_user(&self, name: &str, email: &str, password: &str) -> Result<u64, SdkError> {
        let resp = self
            .client
            .post(format!("{}/users", self.base_url))
            .json(&serde_json::json!({ "name": name, "email": email, "password": password }))
            .send()
            .await?;
        Ok(decode::<Created>(resp).await?.user_id)
    }

    pub async fn login(&self, user_id: u64, password: &str) -> Result<TokenPair, SdkError> {
        let resp = self
            .client
            .post(format!("{}/login", self.base_url))
            .query(&[("id", user_id.to_string()), ("password", password.to_string())])
            .send()
            .await?;
        decode(resp).await
    }

    /// Exchange a renewal credential for a fresh access credential.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, SdkError> {
        let resp = self
            .client
            .post(format!("{}/refresh", self.base_url))
            .query(&[("refresh_token", refresh_token)])
            .send()
            .await?;
        Ok(decode::<AccessGrant>(resp).await?.access_token)
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<(), SdkError> {
        let resp = self
            .client
            .post(format!("{}/logout", self.base_url))
            .query(&[("refresh_token", refresh_token)])
            .send()
            .await?;
        check(resp).await.map(drop)
    }

    /// Profile of the credential's owner.
    pub async fn me(&self, access_token: &str) -> Result<Profile, SdkError> {
        let resp = self
            .client
            .get(format!("{}/users", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await?;
        decode(resp).await
    }

    /// Profiles of every connected peer.
    pub async fn active(&self, access_token: &str) -> Result<Vec<Profile>, SdkError> {
        let resp = self
            .client
            .get(format!("{}/active", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn health(&self) -> Result<serde_json::Value, SdkError> {
        let resp = self.client.get(format!("{}/health", self.base_url)).send().await?;
        decode(resp).await
    }

    /// Open a relay session authenticated by `access_token`.
    pub async fn connect(&self, access_token: &str) -> Result<PeerConnection, SdkError> {
        let url = format!("{}/ws?token={}", websocket_base(&self.base_url), access_token);
        match tokio_tungstenite::connect_async(url).await {
            Ok((stream, _)) => Ok(PeerConnection { stream }),
            Err(tungstenite::Error::Http(response)) => Err(SdkError::Rejected(response.status().as_u16())),
            Err(e) => Err(e.into()),
        }
    }
}

fn websocket_base(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    }
}

async fn check(resp: Response) -> Result<Response, SdkError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(SdkError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, SdkError> {
    Ok(check(resp).await?.json().await?)
}

/// One live relay session.
pub struct PeerConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PeerConnection {
    /// Send `payload` to the peer named `target`.
    pub async fn send_to(&mut self, target: &str, payload: &str) -> Result<(), SdkError> {
        self.send_raw(&format!("{target}:{payload}")).await
    }

    /// Send an already-framed message as is.
    pub async fn send_raw(&mut self, message: &str) -> Result<(), SdkError> {
        self.stream.send(Message::Text(message.into())).await?;
        Ok(())
    }

    /// Next payload delivered to this peer, or `None` once the relay closes the session.
    pub async fn recv(&mut self) -> Result<Option<String>, SdkError> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Ok(Message::Close(_)) => return Ok(None),
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Ok(None)
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), SdkError> {
        match self.stream.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_scheme_follows_http_scheme() {
        assert_eq!(websocket_base("http://127.0.0.1:8080"), "ws://127.0.0.1:8080");
        assert_eq!(websocket_base("https://relay.example.com"), "wss://relay.example.com");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = RelayClient::new("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
