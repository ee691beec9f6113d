//! YAML configuration of the driver process.
//!
//! Loaded once at startup and passed into each component's constructor;
//! nothing reads it ambiently afterwards. Secrets must go through
//! [`Settings::desensitized`] before any of this is logged.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vtuber_chatbot::ChatGptConfig;
use vtuber_sayer::LipsyncStrategy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file is required (-c <path>)")]
    Missing,

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Live-chat relay to read comments from.
    pub blivedm: BlivedmConfig,
    /// Optional HTTP sink for answered texts.
    pub text_out_http: TextOutHttpConfig,
    /// Avatar renderer endpoints.
    pub live2d: Live2dConfig,
    pub chatbot: ChatbotSettings,
    pub sayer: SayerSettings,
    /// Addresses this process listens on.
    pub listen: ListenConfig,

    /// Read every comment aloud before answering it.
    pub read_dm: bool,
    /// Reducer window, in seconds.
    pub reduce_duration: u64,
    pub too_long: TooLongConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlivedmConfig {
    pub server: String,
    pub roomid: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextOutHttpConfig {
    pub server: String,
    /// 0..=100: percentage of texts randomly not forwarded.
    pub drop_rate: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Live2dConfig {
    pub driver: String,
    pub forwarder: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatbotSettings {
    pub musharing: MusharingChatbotConfig,
    pub chatgpt: ChatgptChatbotConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MusharingChatbotConfig {
    pub server: String,
    pub disabled: bool,
}

impl MusharingChatbotConfig {
    /// Whether this backend is enabled, and if so whether it is usable.
    pub fn is_enabled_and_valid(&self) -> (bool, Result<(), ConfigError>) {
        if self.disabled {
            return (false, Ok(()));
        }
        if self.server.is_empty() {
            return (
                true,
                Err(ConfigError::Invalid(
                    "musharing chatbot server address is empty".into(),
                )),
            );
        }
        (true, Ok(()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatgptChatbotConfig {
    pub server: String,
    pub configs: Vec<ChatGptConfig>,
    /// Cooldown between calls, in seconds; 0 falls back to the
    /// `COOLDOWN_INTERVAL` environment variable (then 60s).
    pub cooldown: u64,
    pub disabled: bool,
}

impl ChatgptChatbotConfig {
    pub fn is_enabled_and_valid(&self) -> (bool, Result<(), ConfigError>) {
        if self.disabled {
            return (false, Ok(()));
        }
        if self.server.is_empty() {
            return (
                true,
                Err(ConfigError::Invalid(
                    "chatgpt chatbot server address is empty".into(),
                )),
            );
        }
        if self.configs.is_empty() {
            return (
                true,
                Err(ConfigError::Invalid("chatgpt chatbot configs is empty".into())),
            );
        }
        (true, Ok(()))
    }

    pub fn cooldown_duration(&self) -> Duration {
        Duration::from_secs(self.cooldown)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SayerSettings {
    pub server: String,
    pub role: String,
    pub lipsync: LipsyncStrategy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListenConfig {
    /// Text-in HTTP ingress, e.g. `0.0.0.0:51080`.
    pub text_in_http: String,
    /// Audio-view WebSocket endpoint, e.g. `0.0.0.0:51081`.
    pub audio_controller_ws: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TooLongConfig {
    /// Han characters + Latin words; answers over this are not synthesised.
    pub max_words: i64,
    /// Canned dismissals, said round-robin for rejected answers.
    pub quibbles: Vec<String>,
}

impl Settings {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn reduce_duration(&self) -> Duration {
        Duration::from_secs(self.reduce_duration)
    }

    /// Copy with every secret ellipsized; the only form that may be logged.
    pub fn desensitized(&self) -> Settings {
        let mut copy = self.clone();
        for config in &mut copy.chatbot.chatgpt.configs {
            *config = config.desensitized();
        }
        copy
    }

    /// A filled-in example, for `--gen-example-config`.
    pub fn example() -> Settings {
        Settings {
            blivedm: BlivedmConfig {
                server: "ws://blivechat:12450/api/chat".into(),
                roomid: 26949229,
            },
            text_out_http: TextOutHttpConfig {
                server: String::new(),
                drop_rate: 0,
            },
            live2d: Live2dConfig {
                driver: "http://live2ddriver:9004/driver".into(),
                forwarder: "http://live2ddriver:9002/live2d".into(),
            },
            chatbot: ChatbotSettings {
                musharing: MusharingChatbotConfig {
                    server: "http://musharing_chatbot:50051".into(),
                    disabled: false,
                },
                chatgpt: ChatgptChatbotConfig {
                    server: "http://chatgpt_chatbot:50052".into(),
                    configs: vec![ChatGptConfig {
                        version: 3,
                        api_key: Some("sk_xxx".into()),
                        access_token: None,
                        initial_prompt: Some("you are muli, an AI VTuber live streaming.".into()),
                    }],
                    cooldown: 15,
                    disabled: false,
                },
            },
            sayer: SayerSettings {
                server: "http://externalsayer:50010".into(),
                role: "miku".into(),
                lipsync: LipsyncStrategy::KeepMotion,
            },
            listen: ListenConfig {
                text_in_http: "0.0.0.0:51080".into(),
                audio_controller_ws: "0.0.0.0:51081".into(),
            },
            read_dm: true,
            reduce_duration: 5,
            too_long: TooLongConfig {
                max_words: 500,
                quibbles: vec![
                    "太长了，不想说。".into(),
                    "禁則事項です。".into(),
                    "爬。".into(),
                ],
            },
        }
    }
}
