//! Wire types of the remote chatbot service.
//!
//! The service is session-oriented: `POST /sessions` creates a conversation
//! from a config plus initial prompt, `POST /chat` continues it, and
//! `POST /sessions/delete` disposes of it server-side.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct NewSessionRequest {
    pub config: String,
    pub initial_prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct NewSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteSessionRequest {
    pub session_id: String,
}

pub fn new_session_url(addr: &str) -> String {
    format!("{}/sessions", addr.trim_end_matches('/'))
}

pub fn chat_url(addr: &str) -> String {
    format!("{}/chat", addr.trim_end_matches('/'))
}

pub fn delete_session_url(addr: &str) -> String {
    format!("{}/sessions/delete", addr.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_tolerate_trailing_slash() {
        assert_eq!(
            new_session_url("http://chatbot:50052/"),
            "http://chatbot:50052/sessions"
        );
        assert_eq!(chat_url("http://chatbot:50052"), "http://chatbot:50052/chat");
        assert_eq!(
            delete_session_url("http://chatbot:50052"),
            "http://chatbot:50052/sessions/delete"
        );
    }
}
