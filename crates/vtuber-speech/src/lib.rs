//! Client to the remote speech-synthesis (sayer) service.
//!
//! The service is stateless: `POST /say` with `(role, text)` answers with
//! the audio format and base64 audio bytes. Clients live in a pool with
//! consecutive-failure eviction, same pattern as the chatbot pool.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vtuber_core::ellipsis;
use vtuber_core::pool::{Pool, PoolError, Poolable};

pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;
pub const DEFAULT_POOL_SIZE: i64 = 8;
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("say RPC timed out")]
    RpcTimeout,

    #[error("say RPC transport failed: {0}")]
    RpcTransport(String),

    #[error("sayer service error: {0}")]
    Api(String),

    #[error("invalid response from sayer service: {0}")]
    InvalidResponse(String),

    #[error("sayer address is empty")]
    EmptyAddr,

    #[error("failed to get a sayer client from the pool: {0}")]
    GetClient(#[from] PoolError),
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SpeechError::RpcTimeout
        } else {
            SpeechError::RpcTransport(err.to_string())
        }
    }
}

/// Converts text to speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns `(format, audio bytes)` for the role's voice saying `text`.
    async fn say(&self, role: &str, text: &str) -> Result<(String, Vec<u8>), SpeechError>;
}

#[derive(Debug, Serialize)]
struct SayRequest<'a> {
    role: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SayResponse {
    format: String,
    /// base64-encoded audio bytes
    audio: String,
}

pub struct SayerClient {
    addr: String,
    http: reqwest::Client,
    failed: u32,
}

impl SayerClient {
    pub fn new(addr: &str) -> Result<SayerClient, SpeechError> {
        if addr.is_empty() {
            return Err(SpeechError::EmptyAddr);
        }
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_RPC_TIMEOUT)
            .build()?;
        Ok(SayerClient {
            addr: addr.trim_end_matches('/').to_string(),
            http,
            failed: 0,
        })
    }

    pub async fn say(&mut self, role: &str, text: &str) -> Result<(String, Vec<u8>), SpeechError> {
        match self.do_say(role, text).await {
            Ok(out) => {
                self.failed = 0;
                Ok(out)
            }
            Err(e) => {
                self.failed += 1;
                Err(e)
            }
        }
    }

    async fn do_say(&self, role: &str, text: &str) -> Result<(String, Vec<u8>), SpeechError> {
        let response = self
            .http
            .post(format!("{}/say", self.addr))
            .json(&SayRequest { role, text })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Api(format!("Say {status}: {body}")));
        }

        let say: SayResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::InvalidResponse(e.to_string()))?;
        let audio = BASE64
            .decode(&say.audio)
            .map_err(|e| SpeechError::InvalidResponse(format!("bad audio base64: {e}")))?;

        Ok((say.format, audio))
    }
}

#[async_trait]
impl Poolable for SayerClient {
    async fn close(&mut self) {}
}

/// Pool of [`SayerClient`]s; usable directly as a [`SpeechSynthesizer`].
pub struct SayerClientPool {
    pool: Pool<SayerClient>,
}

impl SayerClientPool {
    pub fn new(addr: &str, size: i64) -> Result<SayerClientPool, SpeechError> {
        if addr.is_empty() {
            return Err(SpeechError::EmptyAddr);
        }
        let addr = addr.to_string();
        let pool = Pool::new(size, move || {
            SayerClient::new(&addr).map_err(|e| PoolError::Create(e.to_string()))
        });
        Ok(SayerClientPool { pool })
    }
}

#[async_trait]
impl SpeechSynthesizer for SayerClientPool {
    async fn say(&self, role: &str, text: &str) -> Result<(String, Vec<u8>), SpeechError> {
        let mut client = self.pool.get()?;

        let result = client.say(role, text).await;
        if result.is_err() && client.failed >= MAX_CONSECUTIVE_FAILURES {
            tracing::warn!(
                failed = client.failed,
                text = %ellipsis::centering(text, 11),
                "sayer client evicted after consecutive failures"
            );
            self.pool.release(client).await;
        } else {
            let _ = self.pool.put(client).await;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_addr_is_rejected() {
        assert!(matches!(SayerClient::new(""), Err(SpeechError::EmptyAddr)));
        assert!(matches!(
            SayerClientPool::new("", 8),
            Err(SpeechError::EmptyAddr)
        ));
    }

    #[test]
    fn say_response_decodes_base64_audio() {
        let raw = format!(
            r#"{{"format":"audio/wav","audio":"{}"}}"#,
            BASE64.encode(b"RIFFxxxx")
        );
        let say: SayResponse = serde_json::from_str(&raw).unwrap();
        assert_eq!(say.format, "audio/wav");
        assert_eq!(BASE64.decode(&say.audio).unwrap(), b"RIFFxxxx");
    }

    #[tokio::test]
    async fn transport_failure_counts_against_client() {
        let mut client = SayerClient::new("http://127.0.0.1:1").unwrap();
        assert!(client.say("miku", "hello").await.is_err());
        assert_eq!(client.failed, 1);
        assert!(client.say("miku", "hello").await.is_err());
        assert_eq!(client.failed, 2);
    }
}
