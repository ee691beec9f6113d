//! Client to the live2d avatar renderer.
//!
//! Two endpoints: the driver proper (takes the spoken text and picks
//! expressions from it) and the message forwarder (takes raw motion /
//! speak commands for the browser view).

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use vtuber_audio::encode_data_url;
use vtuber_core::TextOut;

#[derive(Debug, Error)]
pub enum Live2dError {
    #[error("live2d request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// The avatar driver seam. The sayer only needs motion hints and
/// audio-analyze speech; the orchestrator also nudges it with each answer.
#[async_trait]
pub trait AvatarDriver: Send + Sync {
    /// Feed an answered text to the driver (it derives expressions from it).
    async fn text_out(&self, text_out: &TextOut) -> Result<(), Live2dError>;

    /// Hint a motion ("flick_head", "idle"). Best effort: failures are
    /// logged, not returned.
    async fn to_motion(&self, motion: &str);

    /// Ship raw audio for mouth-shape analysis while it plays.
    async fn speak(
        &self,
        audio: &[u8],
        expression: &str,
        motion: &str,
    ) -> Result<(), Live2dError>;
}

pub struct Live2dDriver {
    server: String,
    msg_forward_server: String,
    http: reqwest::Client,
}

impl Live2dDriver {
    pub fn new(server: impl Into<String>, msg_forward_server: impl Into<String>) -> Live2dDriver {
        Live2dDriver {
            server: server.into(),
            msg_forward_server: msg_forward_server.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct MotionCommand<'a> {
    motion: &'a str,
}

#[derive(Serialize)]
struct SpeakCommand {
    speak: Speak,
}

#[derive(Serialize)]
struct Speak {
    #[serde(skip_serializing_if = "String::is_empty")]
    audio: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    expression: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    motion: String,
}

fn speak_command(audio: &[u8], expression: &str, motion: &str) -> SpeakCommand {
    SpeakCommand {
        speak: Speak {
            audio: encode_data_url("audio/wav", audio),
            expression: expression.to_string(),
            motion: motion.to_string(),
        },
    }
}

#[async_trait]
impl AvatarDriver for Live2dDriver {
    async fn text_out(&self, text_out: &TextOut) -> Result<(), Live2dError> {
        self.http
            .post(&self.server)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(text_out.content.clone())
            .send()
            .await?;
        Ok(())
    }

    async fn to_motion(&self, motion: &str) {
        let result = self
            .http
            .post(&self.msg_forward_server)
            .json(&MotionCommand { motion })
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!(motion, error = %e, "live2d motion hint failed");
        }
    }

    async fn speak(
        &self,
        audio: &[u8],
        expression: &str,
        motion: &str,
    ) -> Result<(), Live2dError> {
        self.http
            .post(&self.msg_forward_server)
            .json(&speak_command(audio, expression, motion))
            .send()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speak_command_wraps_audio_as_data_url() {
        let cmd = speak_command(b"pcm", "", "");
        let j = serde_json::to_string(&cmd).unwrap();
        assert!(j.starts_with(r#"{"speak":{"audio":"data:audio/wav;base64,"#));
        // empty hints are omitted entirely
        assert!(!j.contains("expression"));
        assert!(!j.contains("motion"));
    }

    #[test]
    fn motion_command_shape() {
        let j = serde_json::to_string(&MotionCommand { motion: "idle" }).unwrap();
        assert_eq!(j, r#"{"motion":"idle"}"#);
    }
}
