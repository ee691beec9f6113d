//! Chatbot backends and dispatch.
//!
//! A [`Chatbot`] turns a `TextIn` into a `TextOut`. The concrete backends
//! are session-oriented remote services (see [`client`]); the
//! [`PrioritizedChatbot`] picks among them by message priority, and
//! [`CooldownChatbot`] rate-limits an expensive one.

pub mod client;
pub mod config;
pub mod cooldown;
pub mod prioritized;
pub mod rpc;

pub use client::{SessionClient, SessionClientsPool};
pub use config::{ChatGptConfig, NoSessionConfig, SessionConfig};
pub use cooldown::CooldownChatbot;
pub use prioritized::PrioritizedChatbot;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use vtuber_core::pool::PoolError;
use vtuber_core::{TextIn, TextOut};

/// A session client is evicted from its pool after this many consecutive
/// chat failures.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CLIENT_POOL_SIZE: i64 = 10;

#[derive(Debug, Error)]
pub enum ChatbotError {
    #[error("chatbot is cooling down ({left:?} left)")]
    CoolingDown { left: Duration },

    #[error("no chatbot available")]
    NoChatbotAvailable,

    #[error("chat RPC timed out")]
    RpcTimeout,

    #[error("chat RPC transport failed: {0}")]
    RpcTransport(String),

    #[error("chat service error: {0}")]
    Api(String),

    #[error("invalid response from chat service: {0}")]
    InvalidResponse(String),

    #[error("no session established")]
    NoSession,

    #[error("chatbot address is empty")]
    EmptyAddr,

    #[error("no session configs given")]
    NoConfigs,

    #[error("failed to get a session client from the pool: {0}")]
    GetSessionClient(#[from] PoolError),

    #[error(
        "chat failed, session client evicted after {failures} consecutive failures: {source}"
    )]
    MaxFailures {
        failures: u32,
        source: Box<ChatbotError>,
    },
}

impl From<reqwest::Error> for ChatbotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatbotError::RpcTimeout
        } else {
            ChatbotError::RpcTransport(err.to_string())
        }
    }
}

/// Something that can answer a chat message.
///
/// `Ok(None)` means "no answer for this input" without being an error;
/// the prioritized dispatcher keeps falling through on it.
#[async_trait]
pub trait Chatbot: Send + Sync {
    async fn chat(&self, text_in: &TextIn) -> Result<Option<TextOut>, ChatbotError>;
}

/// Pipeline stage: drain `text_in` through the chatbot into `text_out`.
///
/// Errors are logged and the input dropped; the stage ends when either
/// channel closes.
pub async fn text_out_from_chatbot(
    chatbot: impl Chatbot,
    mut text_in: mpsc::Receiver<TextIn>,
    text_out: mpsc::Sender<TextOut>,
) {
    while let Some(input) = text_in.recv().await {
        match chatbot.chat(&input).await {
            Ok(Some(output)) => {
                if text_out.send(output).await.is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    author = %input.author,
                    error = %e,
                    "chatbot failed, input dropped"
                );
            }
        }
    }
}
