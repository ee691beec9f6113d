//! Session configs for the chatbot backends.

use serde::{Deserialize, Serialize};

use vtuber_core::ellipsis;

/// Config for one backend session.
///
/// `config()` is the opaque payload the backend consumes; the initial
/// prompt is carried separately because the service wants it that way.
pub trait SessionConfig: Send + Sync {
    fn config(&self) -> String;
    fn initial_prompt(&self) -> String;
}

/// For backends that need no per-session config.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSessionConfig;

impl SessionConfig for NoSessionConfig {
    fn config(&self) -> String {
        String::new()
    }

    fn initial_prompt(&self) -> String {
        String::new()
    }
}

/// Config of the chatgpt backend family: a key variant plus a persona
/// prompt. Never log this in full.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatGptConfig {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_prompt: Option<String>,
}

impl ChatGptConfig {
    /// Copy with the secrets ellipsized, safe to log.
    pub fn desensitized(&self) -> ChatGptConfig {
        ChatGptConfig {
            version: self.version,
            access_token: self.access_token.as_deref().map(|t| ellipsis::centering(t, 9)),
            api_key: self.api_key.as_deref().map(|k| ellipsis::centering(k, 9)),
            initial_prompt: self.initial_prompt.clone(),
        }
    }
}

impl SessionConfig for ChatGptConfig {
    fn config(&self) -> String {
        // the initial prompt travels in its own request field
        let mut copy = self.clone();
        copy.initial_prompt = None;
        serde_json::to_string(&copy).unwrap_or_default()
    }

    fn initial_prompt(&self) -> String {
        self.initial_prompt.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_payload_excludes_initial_prompt() {
        let cfg = ChatGptConfig {
            version: 3,
            api_key: Some("sk_secret".into()),
            access_token: None,
            initial_prompt: Some("you are an AI vtuber".into()),
        };
        let payload = cfg.config();
        assert!(payload.contains("sk_secret"));
        assert!(!payload.contains("vtuber"));
        assert_eq!(cfg.initial_prompt(), "you are an AI vtuber");
    }

    #[test]
    fn desensitized_hides_secrets() {
        let cfg = ChatGptConfig {
            version: 3,
            api_key: Some("sk_0123456789abcdef".into()),
            access_token: Some("eyJhb.payload.99A".into()),
            initial_prompt: Some("hello".into()),
        };
        let safe = cfg.desensitized();
        assert!(!safe.api_key.as_deref().unwrap().contains("0123456789"));
        assert!(safe.api_key.as_deref().unwrap().contains("..."));
        assert!(!safe.access_token.as_deref().unwrap().contains("payload"));
        assert_eq!(safe.initial_prompt.as_deref(), Some("hello"));
    }

    #[test]
    fn no_session_config_is_empty() {
        assert_eq!(NoSessionConfig.config(), "");
        assert_eq!(NoSessionConfig.initial_prompt(), "");
    }
}
