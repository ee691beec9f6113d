//! The audio controller: publishes play commands to the audio-view peers
//! and collects their start/end reports.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

use vtuber_core::ellipsis;

use crate::model::{
    audio_to_track, Frame, PlayStatus, Report, Track, CMD_KEEP_ALIVE, CMD_PLAY_BGM, CMD_PLAY_FX,
    CMD_PLAY_SING, CMD_PLAY_VOCAL, CMD_REPORT, CMD_RESET,
};
use crate::MessageForwarder;

/// Reports nobody waited for are swept after this long; the sweeper also
/// sleeps this long before another sweep may start.
pub const CLEAN_REPORT_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Receipts from the audio-view, keyed by `Report.key()`.
struct ReportStore {
    entries: Mutex<HashMap<String, Instant>>,
    notify: Notify,
    sweeping: tokio::sync::Mutex<()>,
    ttl: Duration,
}

impl ReportStore {
    fn new(ttl: Duration) -> Arc<ReportStore> {
        Arc::new(ReportStore {
            entries: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            sweeping: tokio::sync::Mutex::new(()),
            ttl,
        })
    }

    fn insert(&self, key: String) {
        self.entries.lock().insert(key, Instant::now());
        self.notify.notify_waiters();
    }

    fn take(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    async fn wait(&self, key: &str) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register interest before checking, so an insert landing in
            // between is not missed
            notified.as_mut().enable();
            if self.take(key) {
                return;
            }
            notified.await;
        }
    }

    /// Drop receipts older than the TTL.
    ///
    /// Serialised by try-lock: at most one sweep at a time, contenders
    /// return immediately. The guard is held across a TTL-long sleep so
    /// bursts of inbound frames coalesce into one sweep per TTL.
    async fn sweep(self: Arc<Self>) {
        let Ok(_guard) = self.sweeping.try_lock() else {
            return;
        };

        let ttl = self.ttl;
        self.entries.lock().retain(|_, t| t.elapsed() <= ttl);

        tokio::time::sleep(ttl).await;
    }
}

/// Controller to the audio-view: a WebSocket fan-out bus plus a report
/// store that callers can block on.
///
/// If several audio-views are attached, any one of them reporting a status
/// satisfies a [`AudioController::wait`] on it.
pub struct AudioController {
    forwarder: MessageForwarder,
    reports: Arc<ReportStore>,
}

impl AudioController {
    pub fn new() -> Arc<AudioController> {
        AudioController::with_report_ttl(CLEAN_REPORT_AFTER)
    }

    /// Like [`AudioController::new`] with a custom report TTL. Tests use a
    /// short one so sweeps finish quickly.
    pub fn with_report_ttl(ttl: Duration) -> Arc<AudioController> {
        Arc::new(AudioController {
            forwarder: MessageForwarder::new(),
            reports: ReportStore::new(ttl),
        })
    }

    pub fn audio_to_track(&self, format: &str, audio: &[u8]) -> Track {
        audio_to_track(format, audio)
    }

    pub fn play_vocal(&self, track: &Track) -> Result<(), AudioError> {
        self.send_play_cmd(CMD_PLAY_VOCAL, track)
    }

    pub fn play_sing(&self, track: &Track) -> Result<(), AudioError> {
        self.send_play_cmd(CMD_PLAY_SING, track)
    }

    pub fn play_fx(&self, track: &Track) -> Result<(), AudioError> {
        self.send_play_cmd(CMD_PLAY_FX, track)
    }

    pub fn play_bgm(&self, track: &Track) -> Result<(), AudioError> {
        self.send_play_cmd(CMD_PLAY_BGM, track)
    }

    /// Ask every audio-view to reload and reconnect.
    pub fn reset(&self) -> Result<(), AudioError> {
        tracing::info!("sending reset to audio-view");
        let frame = Frame {
            cmd: CMD_RESET.into(),
            data: None,
        };
        self.forwarder.send_message(&serde_json::to_vec(&frame)?);
        Ok(())
    }

    fn send_play_cmd(&self, cmd: &str, track: &Track) -> Result<(), AudioError> {
        let frame = Frame {
            cmd: cmd.into(),
            data: Some(serde_json::to_value(track)?),
        };
        tracing::info!(
            cmd,
            track = %ellipsis::ending(&track.id, 10),
            "sending play command to audio-view"
        );
        self.forwarder.send_message(&serde_json::to_vec(&frame)?);
        Ok(())
    }

    /// Attach an outbound peer buffer (one per WebSocket connection).
    pub fn attach_peer(&self) -> mpsc::Receiver<Vec<u8>> {
        self.forwarder.attach()
    }

    /// Block until the audio-view reports `report`; the receipt is consumed.
    ///
    /// Bound the wait with `tokio::time::timeout` — dropping the future
    /// cancels it immediately.
    pub async fn wait(&self, report: &Report) {
        self.reports.wait(&report.key()).await
    }

    /// Process one inbound frame from an audio-view peer.
    ///
    /// `keepAlive` is ignored, `report` is stored, anything else is logged
    /// and dropped. Parse errors drop the frame.
    pub fn handle_frame(&self, raw: &str) {
        let frame: Frame = match serde_json::from_str(raw) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "bad frame from audio-view, dropped");
                return;
            }
        };

        match frame.cmd.as_str() {
            CMD_KEEP_ALIVE => {}
            CMD_REPORT => self.handle_report(frame.data),
            other => tracing::warn!(cmd = other, "unknown cmd from audio-view"),
        }

        tokio::spawn(self.reports.clone().sweep());
    }

    fn handle_report(&self, data: Option<serde_json::Value>) {
        let Some(data) = data else {
            tracing::warn!("report without data");
            return;
        };
        let report: Report = match serde_json::from_value(data) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable report data");
                return;
            }
        };

        if report.id.is_empty() {
            tracing::warn!("report with empty id");
            return;
        }
        if report.status == PlayStatus::Err {
            tracing::warn!(
                id = %ellipsis::ending(&report.id, 10),
                "audio-view reported a playback error"
            );
            return;
        }

        tracing::info!(
            id = %ellipsis::ending(&report.id, 10),
            status = %report.status,
            "report from audio-view"
        );

        self.reports.insert(report.key());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn report_frame(id: &str, status: &str) -> String {
        format!(r#"{{"cmd":"report","data":{{"id":"{id}","status":"{status}"}}}}"#)
    }

    #[tokio::test]
    async fn wait_returns_on_stored_report() {
        let ctrl = AudioController::new();
        ctrl.handle_frame(&report_frame("t1", "start"));

        timeout(Duration::from_secs(1), ctrl.wait(&Report::start("t1")))
            .await
            .expect("wait should return");
    }

    #[tokio::test]
    async fn wait_wakes_on_late_report() {
        let ctrl = AudioController::new();

        let waiter = {
            let ctrl = ctrl.clone();
            tokio::spawn(async move {
                timeout(Duration::from_secs(1), ctrl.wait(&Report::end("t2"))).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctrl.handle_frame(&report_frame("t2", "end"));

        waiter.await.unwrap().expect("wait should be woken");
    }

    #[tokio::test]
    async fn wait_consumes_the_receipt() {
        let ctrl = AudioController::new();
        ctrl.handle_frame(&report_frame("t3", "end"));

        timeout(Duration::from_millis(100), ctrl.wait(&Report::end("t3")))
            .await
            .expect("first wait hits");
        // the receipt was removed; a second wait must time out
        assert!(
            timeout(Duration::from_millis(50), ctrl.wait(&Report::end("t3")))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn wait_keys_on_id_and_status() {
        let ctrl = AudioController::new();
        ctrl.handle_frame(&report_frame("t4", "start"));

        assert!(
            timeout(Duration::from_millis(50), ctrl.wait(&Report::end("t4")))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn bad_reports_are_dropped() {
        let ctrl = AudioController::new();
        ctrl.handle_frame(r#"{"cmd":"report","data":{"id":"","status":"start"}}"#);
        ctrl.handle_frame(r#"{"cmd":"report","data":{"id":"t5","status":"err"}}"#);
        ctrl.handle_frame(r#"{"cmd":"report"}"#);
        ctrl.handle_frame("not json");
        ctrl.handle_frame(r#"{"cmd":"keepAlive"}"#);

        assert!(ctrl.reports.entries.lock().is_empty());
    }

    #[tokio::test]
    async fn play_commands_reach_attached_peers() {
        let ctrl = AudioController::new();
        let mut peer = ctrl.attach_peer();

        let track = audio_to_track("audio/wav", b"pcm");
        ctrl.play_vocal(&track).unwrap();
        ctrl.reset().unwrap();

        let frame: Frame = serde_json::from_slice(&peer.recv().await.unwrap()).unwrap();
        assert_eq!(frame.cmd, CMD_PLAY_VOCAL);
        let sent: Track = serde_json::from_value(frame.data.unwrap()).unwrap();
        assert_eq!(sent.id, track.id);

        let frame: Frame = serde_json::from_slice(&peer.recv().await.unwrap()).unwrap();
        assert_eq!(frame.cmd, CMD_RESET);
        assert!(frame.data.is_none());
    }

    #[tokio::test]
    async fn sweeper_removes_stale_reports() {
        let ctrl = AudioController::with_report_ttl(Duration::from_millis(20));
        ctrl.reports.insert(Report::end("old").key());

        tokio::time::sleep(Duration::from_millis(50)).await;
        // trigger a sweep via an inbound frame
        ctrl.handle_frame(r#"{"cmd":"keepAlive"}"#);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(ctrl.reports.entries.lock().is_empty());
    }

    #[tokio::test]
    async fn concurrent_sweeps_coalesce() {
        let ctrl = AudioController::with_report_ttl(Duration::from_millis(50));

        // the first frame's sweep holds the lock asleep; these return fast
        for _ in 0..5 {
            ctrl.handle_frame(r#"{"cmd":"keepAlive"}"#);
        }
        // nothing to assert beyond "no deadlock": the try-lock makes
        // contenders return immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
