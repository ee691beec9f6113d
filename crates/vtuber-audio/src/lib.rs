//! Audio playback control for the vtuber's audio-view client.
//!
//! The [`AudioController`] is a WebSocket fan-out bus: play commands go out
//! to every attached audio-view, and the views answer with start/end
//! reports that callers can block on (see [`AudioController::wait`]).

pub mod controller;
pub mod forwarder;
pub mod model;
pub mod ws;

pub use controller::{AudioController, AudioError, CLEAN_REPORT_AFTER};
pub use forwarder::MessageForwarder;
pub use model::{audio_to_track, encode_data_url, Frame, PlayAt, PlayStatus, Report, Track};
