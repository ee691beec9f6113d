//! The sayer: text in, spoken audio on the audio-view, lips in sync.
//!
//! [`LipsyncSayer::say`] is blocking and mutex-serialised: at most one
//! utterance is in flight. It synthesises speech, submits the track to the
//! audio controller, and waits for the audio-view to confirm playback,
//! escalating reset hints as desync failures accumulate.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;

use vtuber_audio::{AudioController, AudioError, PlayAt, Report, Track};
use vtuber_core::ellipsis;
use vtuber_live2d::AvatarDriver;
use vtuber_speech::{SpeechError, SpeechSynthesizer};

pub const PLAYBACK_START_TIMEOUT: Duration = Duration::from_secs(10);
pub const PLAYBACK_END_TIMEOUT: Duration = Duration::from_secs(300);

/// After this many consecutive failures a `reset` is sent to the
/// audio-view, asking it to reload and reconnect.
const RESET_AFTER_FAILS: i32 = 3;

#[derive(Debug, Error)]
pub enum SayError {
    #[error("speech synthesis failed: {0}")]
    Speech(#[from] SpeechError),

    #[error("audio controller failed: {0}")]
    Audio(#[from] AudioError),

    #[error("synthesis produced a track without an id")]
    EmptyTrackId,

    #[error("no END report from the audio-view (timeout)")]
    PlaybackEndTimeout,
}

/// How to keep the avatar's mouth moving while audio plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LipsyncStrategy {
    /// No lipsync at all.
    #[default]
    None,
    /// Toggle a talking motion around the utterance.
    KeepMotion,
    /// Ship the audio to the avatar driver for mouth-shape analysis.
    AudioAnalyze,
}

pub struct LipsyncSayer {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    controller: Arc<AudioController>,
    live2d: Arc<dyn AvatarDriver>,

    lipsync_strategy: LipsyncStrategy,
    tts_role: String,

    saying: tokio::sync::Mutex<()>,
    fails: AtomicI32,

    start_timeout: Duration,
    end_timeout: Duration,
}

impl LipsyncSayer {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        controller: Arc<AudioController>,
        live2d: Arc<dyn AvatarDriver>,
        lipsync_strategy: LipsyncStrategy,
        tts_role: impl Into<String>,
    ) -> LipsyncSayer {
        let mut tts_role = tts_role.into();
        if tts_role.is_empty() {
            tts_role = "default".to_string();
        }
        LipsyncSayer {
            synthesizer,
            controller,
            live2d,
            lipsync_strategy,
            tts_role,
            saying: tokio::sync::Mutex::new(()),
            fails: AtomicI32::new(0),
            start_timeout: PLAYBACK_START_TIMEOUT,
            end_timeout: PLAYBACK_END_TIMEOUT,
        }
    }

    /// Override the playback wait bounds (tests use short ones).
    pub fn with_playback_timeouts(mut self, start: Duration, end: Duration) -> LipsyncSayer {
        self.start_timeout = start;
        self.end_timeout = end;
        self
    }

    /// Say `text`: synthesise, play on the audio-view, block until the view
    /// reports the playback ended.
    pub async fn say(&self, text: &str) -> Result<(), SayError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let _saying = self.saying.lock().await;

        let result = self.say_locked(text).await;

        // lots of errors: the view is probably desynced, ask it to reload
        if result.is_err() && self.fails.load(Ordering::SeqCst) > RESET_AFTER_FAILS {
            let _ = self.controller.reset();
        }

        result
    }

    async fn say_locked(&self, text: &str) -> Result<(), SayError> {
        let keep_motion = self.lipsync_strategy == LipsyncStrategy::KeepMotion;
        if keep_motion {
            // sent before synthesis: looks more synchronous
            self.live2d.to_motion("flick_head").await;
        }

        let result = self.speak(text).await;

        if keep_motion {
            self.live2d.to_motion("idle").await;
        }

        match &result {
            Ok(()) => {
                tracing::info!(text = %ellipsis::centering(text, 15), "say done");
            }
            Err(e) => {
                tracing::warn!(
                    text = %ellipsis::centering(text, 15),
                    fails = self.fails.load(Ordering::SeqCst),
                    error = %e,
                    "say failed"
                );
            }
        }
        result
    }

    /// text -> audio -> track -> playback & lipsync -> wait
    async fn speak(&self, text: &str) -> Result<(), SayError> {
        let (format, audio) = match self.synthesizer.say(&self.tts_role, text).await {
            Ok(out) => out,
            Err(e) => return Err(SayError::Speech(e)),
        };
        tracing::debug!(format, len = audio.len(), "synthesis done");

        let mut track = self.controller.audio_to_track(&format, &audio);
        track.play_mode = Some(self.should_play_at());

        let mut fell_back_to_motion = false;
        if self.lipsync_strategy == LipsyncStrategy::AudioAnalyze {
            if let Err(e) = self.live2d.speak(&audio, "", "").await {
                tracing::warn!(error = %e, "audio analysis failed, falling back to keep_motion");
                self.live2d.to_motion("flick_head").await;
                fell_back_to_motion = true;
            }
        }

        let played = self.blocking_playback(&track).await;

        if fell_back_to_motion {
            self.live2d.to_motion("idle").await;
        }

        match played {
            Ok(()) => {
                self.fails.store(0, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.fails.fetch_add(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// PlayAt by accumulated desync: escalate reset hints as failures pile
    /// up.
    fn should_play_at(&self) -> PlayAt {
        let fails = self.fails.load(Ordering::SeqCst);
        match fails {
            f if f > 2 => PlayAt::ResetNow,
            f if f > 0 => PlayAt::ResetNext,
            _ => PlayAt::Next,
        }
    }

    async fn blocking_playback(&self, track: &Track) -> Result<(), SayError> {
        if track.id.is_empty() {
            return Err(SayError::EmptyTrackId);
        }

        self.controller.play_vocal(track)?;
        self.wait_playing(&track.id).await
    }

    /// Wait for the view's start/end reports, independently bounded.
    ///
    /// - END in time => success, whatever happened to START
    /// - END missing => [`SayError::PlaybackEndTimeout`]
    /// - START timing out alone is not fatal: the report may simply have
    ///   been lost, keep waiting for END
    async fn wait_playing(&self, track_id: &str) -> Result<(), SayError> {
        let start_report = Report::start(track_id);
        let end_report = Report::end(track_id);
        let start_wait = timeout(self.start_timeout, self.controller.wait(&start_report));
        let end_wait = timeout(self.end_timeout, self.controller.wait(&end_report));
        tokio::pin!(start_wait);
        tokio::pin!(end_wait);

        let mut start_pending = true;
        loop {
            tokio::select! {
                end = &mut end_wait => {
                    return match end {
                        Ok(()) => Ok(()),
                        Err(_) => Err(SayError::PlaybackEndTimeout),
                    };
                }
                start = &mut start_wait, if start_pending => {
                    start_pending = false;
                    match start {
                        Ok(()) => {
                            tracing::debug!(
                                track = %ellipsis::ending(track_id, 10),
                                "audio-view reported playback started"
                            );
                        }
                        Err(_) => {
                            tracing::warn!(
                                track = %ellipsis::ending(track_id, 10),
                                "no START report in time, still waiting for END"
                            );
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vtuber_audio::{audio_to_track, Frame, PlayStatus};
    use vtuber_core::TextOut;
    use vtuber_live2d::Live2dError;

    struct FakeTts {
        audio: Vec<u8>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeTts {
        async fn say(&self, _role: &str, _text: &str) -> Result<(String, Vec<u8>), SpeechError> {
            Ok(("audio/wav".to_string(), self.audio.clone()))
        }
    }

    #[derive(Default)]
    struct FakeAvatar {
        motions: std::sync::Mutex<Vec<String>>,
    }

    impl FakeAvatar {
        fn motions(&self) -> Vec<String> {
            self.motions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AvatarDriver for FakeAvatar {
        async fn text_out(&self, _text_out: &TextOut) -> Result<(), Live2dError> {
            Ok(())
        }

        async fn to_motion(&self, motion: &str) {
            self.motions.lock().unwrap().push(motion.to_string());
        }

        async fn speak(
            &self,
            _audio: &[u8],
            _expression: &str,
            _motion: &str,
        ) -> Result<(), Live2dError> {
            Ok(())
        }
    }

    fn sayer_with(
        controller: Arc<AudioController>,
        strategy: LipsyncStrategy,
        start: Duration,
        end: Duration,
    ) -> Arc<LipsyncSayer> {
        Arc::new(
            LipsyncSayer::new(
                Arc::new(FakeTts {
                    audio: b"fake-pcm".to_vec(),
                }),
                controller,
                Arc::new(FakeAvatar::default()),
                strategy,
                "miku",
            )
            .with_playback_timeouts(start, end),
        )
    }

    fn report_frame(id: &str, status: PlayStatus) -> String {
        format!(r#"{{"cmd":"report","data":{{"id":"{id}","status":"{status}"}}}}"#)
    }

    #[tokio::test]
    async fn empty_text_is_a_no_op() {
        let controller = AudioController::new();
        let mut peer = controller.attach_peer();
        let sayer = sayer_with(
            controller,
            LipsyncStrategy::None,
            Duration::from_millis(50),
            Duration::from_millis(100),
        );

        sayer.say("   ").await.unwrap();
        assert!(peer.try_recv().is_err());
    }

    #[tokio::test]
    async fn say_succeeds_on_start_then_end_report() {
        let controller = AudioController::new();
        let track_id = audio_to_track("audio/wav", b"fake-pcm").id;
        let sayer = sayer_with(
            controller.clone(),
            LipsyncStrategy::None,
            Duration::from_secs(1),
            Duration::from_secs(2),
        );

        let saying = {
            let sayer = sayer.clone();
            tokio::spawn(async move { sayer.say("hi").await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        controller.handle_frame(&report_frame(&track_id, PlayStatus::Start));
        controller.handle_frame(&report_frame(&track_id, PlayStatus::End));

        saying.await.unwrap().unwrap();
        assert_eq!(sayer.fails.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn end_alone_is_enough() {
        let controller = AudioController::new();
        let track_id = audio_to_track("audio/wav", b"fake-pcm").id;
        let sayer = sayer_with(
            controller.clone(),
            LipsyncStrategy::None,
            Duration::from_millis(40),
            Duration::from_secs(2),
        );

        let saying = {
            let sayer = sayer.clone();
            tokio::spawn(async move { sayer.say("hi").await })
        };

        // let the start wait time out, then report only the end
        tokio::time::sleep(Duration::from_millis(80)).await;
        controller.handle_frame(&report_frame(&track_id, PlayStatus::End));

        saying.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn missing_reports_fail_and_escalate_to_reset() {
        let controller = AudioController::new();
        let mut peer = controller.attach_peer();
        let sayer = sayer_with(
            controller,
            LipsyncStrategy::None,
            Duration::from_millis(20),
            Duration::from_millis(40),
        );

        for i in 1..=4 {
            let err = sayer.say("hi").await.unwrap_err();
            assert!(matches!(err, SayError::PlaybackEndTimeout));
            assert_eq!(sayer.fails.load(Ordering::SeqCst), i);
        }

        // four playVocal frames, then exactly one reset
        let mut cmds = Vec::new();
        while let Ok(msg) = peer.try_recv() {
            let frame: Frame = serde_json::from_slice(&msg).unwrap();
            cmds.push(frame.cmd);
        }
        assert_eq!(
            cmds,
            vec!["playVocal", "playVocal", "playVocal", "playVocal", "reset"]
        );
    }

    #[tokio::test]
    async fn play_mode_escalates_with_failures() {
        let controller = AudioController::new();
        let sayer = sayer_with(
            controller,
            LipsyncStrategy::None,
            Duration::from_millis(10),
            Duration::from_millis(10),
        );

        assert_eq!(sayer.should_play_at(), PlayAt::Next);
        sayer.fails.store(1, Ordering::SeqCst);
        assert_eq!(sayer.should_play_at(), PlayAt::ResetNext);
        sayer.fails.store(3, Ordering::SeqCst);
        assert_eq!(sayer.should_play_at(), PlayAt::ResetNow);
    }

    #[tokio::test]
    async fn keep_motion_toggles_motions_even_on_failure() {
        let controller = AudioController::new();
        let avatar = Arc::new(FakeAvatar::default());
        let sayer = LipsyncSayer::new(
            Arc::new(FakeTts {
                audio: b"fake-pcm".to_vec(),
            }),
            controller,
            avatar.clone(),
            LipsyncStrategy::KeepMotion,
            "miku",
        )
        .with_playback_timeouts(Duration::from_millis(10), Duration::from_millis(20));

        let _ = sayer.say("hi").await;
        assert_eq!(avatar.motions(), vec!["flick_head", "idle"]);
    }
}
