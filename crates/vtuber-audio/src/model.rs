//! Wire model shared with the audio-view client.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// A self-contained audio playback unit.
///
/// `id` is a deterministic function of the audio bytes, so replaying the
/// same audio produces the same id and reports addressed to either are
/// indistinguishable. `src` carries the audio inline as a data URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub src: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(
        rename = "playMode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub play_mode: Option<PlayAt>,
}

/// When the audio-view should schedule a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayAt {
    /// After the current track.
    Next,
    /// Interrupt the current track.
    Now,
    /// Clear the queue, then play after the current track.
    ResetNext,
    /// Clear the queue and interrupt.
    ResetNow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayStatus {
    Start,
    End,
    Err,
}

impl fmt::Display for PlayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayStatus::Start => f.write_str("start"),
            PlayStatus::End => f.write_str("end"),
            PlayStatus::Err => f.write_str("err"),
        }
    }
}

/// Playback acknowledgement from the audio-view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub status: PlayStatus,
}

impl Report {
    pub fn start(id: impl Into<String>) -> Report {
        Report {
            id: id.into(),
            status: PlayStatus::Start,
        }
    }

    pub fn end(id: impl Into<String>) -> Report {
        Report {
            id: id.into(),
            status: PlayStatus::End,
        }
    }

    /// The key under which a receipt is remembered.
    pub fn key(&self) -> String {
        format!("Report({}: {})", self.id, self.status)
    }
}

/// A frame on the audio-view WebSocket, both directions.
///
/// `data` is polymorphic (a [`Track`] out, a [`Report`] in, or absent);
/// dispatch on `cmd` before parsing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// commands to the audio-view
pub const CMD_PLAY_BGM: &str = "playBgm";
pub const CMD_PLAY_FX: &str = "playFx";
pub const CMD_PLAY_SING: &str = "playSing";
pub const CMD_PLAY_VOCAL: &str = "playVocal";
pub const CMD_RESET: &str = "reset";

// commands from the audio-view
pub const CMD_KEEP_ALIVE: &str = "keepAlive";
pub const CMD_REPORT: &str = "report";

/// Encode audio bytes as a `data:<format>;base64,<payload>` URL.
pub fn encode_data_url(format: &str, audio: &[u8]) -> String {
    let mut url = String::with_capacity(format.len() + audio.len() * 4 / 3 + 16);
    url.push_str("data:");
    url.push_str(format);
    url.push_str(";base64,");
    url.push_str(&BASE64.encode(audio));
    url
}

/// Build a [`Track`] from raw audio: content-hash id plus data-URL src.
///
/// The id is the first 128 bits of the BLAKE3 hash of the audio bytes, hex
/// encoded. Identical audio yields identical ids.
pub fn audio_to_track(format: &str, audio: &[u8]) -> Track {
    let digest = blake3::hash(audio);
    Track {
        id: hex::encode(&digest.as_bytes()[..16]),
        src: encode_data_url(format, audio),
        format: format.to_string(),
        volume: None,
        play_mode: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_id_is_deterministic() {
        let a = audio_to_track("audio/wav", b"somebytes");
        let b = audio_to_track("audio/wav", b"somebytes");
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 32);

        let c = audio_to_track("audio/wav", b"otherbytes");
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn data_url_round_trips() {
        let audio = b"\x00\x01\x02RIFFdata";
        let track = audio_to_track("audio/wav", audio);

        let payload = track
            .src
            .strip_prefix("data:audio/wav;base64,")
            .expect("data url prefix");
        let decoded = BASE64.decode(payload).unwrap();
        assert_eq!(decoded, audio);
    }

    #[test]
    fn report_key_format() {
        let r = Report::start("abc123");
        assert_eq!(r.key(), "Report(abc123: start)");
        assert_eq!(Report::end("abc123").key(), "Report(abc123: end)");
        assert_ne!(Report::start("abc123").key(), Report::end("abc123").key());
    }

    #[test]
    fn frame_json_shapes() {
        let track = audio_to_track("audio/wav", b"x");
        let frame = Frame {
            cmd: CMD_PLAY_VOCAL.into(),
            data: Some(serde_json::to_value(&track).unwrap()),
        };
        let j = serde_json::to_string(&frame).unwrap();
        assert!(j.starts_with(r#"{"cmd":"playVocal","#));

        let frame: Frame =
            serde_json::from_str(r#"{"cmd":"report","data":{"id":"t1","status":"end"}}"#).unwrap();
        let report: Report = serde_json::from_value(frame.data.unwrap()).unwrap();
        assert_eq!(report, Report::end("t1"));

        let frame: Frame = serde_json::from_str(r#"{"cmd":"keepAlive"}"#).unwrap();
        assert!(frame.data.is_none());
    }

    #[test]
    fn play_mode_serialises_as_camel_case() {
        assert_eq!(
            serde_json::to_string(&PlayAt::ResetNext).unwrap(),
            r#""resetNext""#
        );
        assert_eq!(serde_json::to_string(&PlayAt::Now).unwrap(), r#""now""#);
    }
}
