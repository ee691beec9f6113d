//! Session-oriented chatbot client and its pool.
//!
//! A [`SessionClient`] is lazy: both the HTTP client and the remote session
//! are created on the first chat. The [`SessionClientsPool`] keeps up to N
//! of them alive, hands configs out round-robin, and evicts a client after
//! too many consecutive failures (closing its session server-side).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use vtuber_core::ellipsis;
use vtuber_core::pool::{Pool, PoolError, Poolable};
use vtuber_core::{TextIn, TextOut};

use crate::config::SessionConfig;
use crate::rpc::{
    chat_url, delete_session_url, new_session_url, ChatRequest, ChatResponse,
    DeleteSessionRequest, NewSessionRequest, NewSessionResponse,
};
use crate::{
    Chatbot, ChatbotError, DEFAULT_CLIENT_POOL_SIZE, DEFAULT_RPC_TIMEOUT,
    MAX_CONSECUTIVE_FAILURES,
};

pub struct SessionClient {
    addr: String,
    config: Arc<dyn SessionConfig>,
    name: String,
    rpc_timeout: Duration,

    // both created on first chat
    http: Option<reqwest::Client>,
    session_id: Option<String>,

    successive_failures: u32,
}

impl SessionClient {
    pub fn new(addr: &str, config: Arc<dyn SessionConfig>) -> Result<SessionClient, ChatbotError> {
        if addr.is_empty() {
            return Err(ChatbotError::EmptyAddr);
        }
        Ok(SessionClient {
            addr: addr.to_string(),
            config,
            name: String::new(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            http: None,
            session_id: None,
            successive_failures: 0,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> SessionClient {
        self.name = name.into();
        self
    }

    pub fn successive_failures(&self) -> u32 {
        self.successive_failures
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Chat over this client's session, creating client and session first if
    /// needed. The failure counter tracks the chat RPC only.
    pub async fn chat(&mut self, text_in: &TextIn) -> Result<TextOut, ChatbotError> {
        tracing::info!(
            chatbot = %self.name,
            text_in = %ellipsis::centering(&text_in.content, 11),
            "chat"
        );

        self.init_client_if_nil()?;
        self.init_session_if_nil().await?;

        match self.do_chat(&text_in.content).await {
            Ok(content) => {
                self.successive_failures = 0;
                let author = if self.name.is_empty() {
                    "AnonymousChatbot".to_string()
                } else {
                    self.name.clone()
                };
                Ok(TextOut {
                    author,
                    content,
                    priority: text_in.priority,
                })
            }
            Err(e) => {
                self.successive_failures += 1;
                Err(e)
            }
        }
    }

    fn init_client_if_nil(&mut self) -> Result<(), ChatbotError> {
        if self.http.is_some() {
            return Ok(());
        }
        let client = reqwest::Client::builder()
            .timeout(self.rpc_timeout)
            .build()?;
        self.http = Some(client);
        Ok(())
    }

    async fn init_session_if_nil(&mut self) -> Result<(), ChatbotError> {
        if self.session_id.is_some() {
            return Ok(());
        }
        // init_client_if_nil ran just before
        let Some(http) = self.http.as_ref() else {
            return Err(ChatbotError::RpcTransport("http client missing".into()));
        };

        let request = NewSessionRequest {
            config: self.config.config(),
            initial_prompt: self.config.initial_prompt(),
        };
        let response = http
            .post(new_session_url(&self.addr))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatbotError::Api(format!("NewSession {status}: {body}")));
        }
        let created: NewSessionResponse = response
            .json()
            .await
            .map_err(|e| ChatbotError::InvalidResponse(e.to_string()))?;

        tracing::info!(
            chatbot = %self.name,
            addr = %self.addr,
            session = %ellipsis::ending(&created.session_id, 10),
            "session created"
        );
        self.session_id = Some(created.session_id);
        Ok(())
    }

    async fn do_chat(&self, prompt: &str) -> Result<String, ChatbotError> {
        let (Some(http), Some(session_id)) = (self.http.as_ref(), self.session_id.as_deref())
        else {
            return Err(ChatbotError::NoSession);
        };

        let request = ChatRequest {
            session_id: session_id.to_string(),
            prompt: prompt.to_string(),
        };
        let response = http.post(chat_url(&self.addr)).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatbotError::Api(format!("Chat {status}: {body}")));
        }
        let answer: ChatResponse = response
            .json()
            .await
            .map_err(|e| ChatbotError::InvalidResponse(e.to_string()))?;
        Ok(answer.response)
    }
}

#[async_trait]
impl Poolable for SessionClient {
    /// Dispose of the remote session (best effort) and drop the connection.
    async fn close(&mut self) {
        let (Some(http), Some(session_id)) = (self.http.take(), self.session_id.take()) else {
            return;
        };
        let request = DeleteSessionRequest {
            session_id: session_id.clone(),
        };
        if let Err(e) = http
            .post(delete_session_url(&self.addr))
            .json(&request)
            .send()
            .await
        {
            tracing::debug!(
                session = %ellipsis::ending(&session_id, 10),
                error = %e,
                "DeleteSession failed"
            );
        }
    }
}

/// Pool of session clients, usable directly as a [`Chatbot`].
pub struct SessionClientsPool {
    pool: Pool<SessionClient>,
    name: String,
}

impl SessionClientsPool {
    /// `configs` are assigned to successive clients round-robin.
    pub fn new(
        addr: &str,
        configs: Vec<Arc<dyn SessionConfig>>,
    ) -> Result<SessionClientsPool, ChatbotError> {
        if addr.is_empty() {
            return Err(ChatbotError::EmptyAddr);
        }
        if configs.is_empty() {
            return Err(ChatbotError::NoConfigs);
        }

        let addr = addr.to_string();
        let next_config_idx = Mutex::new(0usize);
        let pool = Pool::new(DEFAULT_CLIENT_POOL_SIZE, move || {
            let config = {
                let mut idx = next_config_idx.lock();
                let config = configs[*idx].clone();
                *idx = (*idx + 1) % configs.len();
                config
            };
            SessionClient::new(&addr, config).map_err(|e| PoolError::Create(e.to_string()))
        });

        Ok(SessionClientsPool {
            pool,
            name: String::new(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> SessionClientsPool {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Chatbot for SessionClientsPool {
    async fn chat(&self, text_in: &TextIn) -> Result<Option<TextOut>, ChatbotError> {
        let mut client = self.pool.get()?;
        if !self.name.is_empty() {
            client = client.with_name(self.name.clone());
        }

        match client.chat(text_in).await {
            Ok(text_out) => {
                let _ = self.pool.put(client).await;
                Ok(Some(text_out))
            }
            Err(e) if client.successive_failures() >= MAX_CONSECUTIVE_FAILURES => {
                // won't reuse this session anymore
                let failures = client.successive_failures();
                let addr = client.addr().to_string();
                self.pool.release(client).await;

                // never log the config: it may carry an API key
                let err = ChatbotError::MaxFailures {
                    failures,
                    source: Box::new(e),
                };
                tracing::error!(chatbot = %self.name, addr = %addr, error = %err, "chat failed");
                Err(err)
            }
            Err(e) => {
                // below the threshold: keep the client for another try
                let failures = client.successive_failures();
                let _ = self.pool.put(client).await;
                tracing::warn!(
                    chatbot = %self.name,
                    failures,
                    max = MAX_CONSECUTIVE_FAILURES,
                    error = %e,
                    "chat failed, client kept for retry"
                );
                Err(e)
            }
        }
    }
}
