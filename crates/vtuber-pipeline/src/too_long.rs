//! Length gate: texts over a word budget are dropped, and the orchestrator
//! gets a canned quibble to say instead.

use tokio::sync::mpsc;

use vtuber_core::ellipsis;
use vtuber_core::Text;

use crate::CHANNEL_BUFFER;

/// Called with `(text, quibble)` for each rejected record.
pub type RejectCallback = Box<dyn FnMut(&str, Option<&str>) + Send>;

pub struct TooLongFilter {
    max_words: i64,
    quibbles: Vec<String>,
    quibble_index: usize,
}

impl TooLongFilter {
    pub fn new(max_words: i64, quibbles: Vec<String>) -> TooLongFilter {
        TooLongFilter {
            max_words,
            quibbles,
            quibble_index: 0,
        }
    }

    fn next_quibble(&mut self) -> Option<String> {
        if self.quibbles.is_empty() {
            return None;
        }
        let quibble = self.quibbles[self.quibble_index].clone();
        self.quibble_index = (self.quibble_index + 1) % self.quibbles.len();
        Some(quibble)
    }

    /// Stage: pass records within the budget, reject the rest through
    /// `on_reject`.
    pub fn spawn(
        mut self,
        mut rx: mpsc::Receiver<Text>,
        mut on_reject: RejectCallback,
    ) -> mpsc::Receiver<Text> {
        let (tx, out) = mpsc::channel(CHANNEL_BUFFER);
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if !too_long(&text.content, self.max_words) {
                    if tx.send(text).await.is_err() {
                        return;
                    }
                    continue;
                }

                let quibble = self.next_quibble();
                tracing::warn!(
                    content = %ellipsis::centering(&text.content, 17),
                    quibble = quibble.as_deref().unwrap_or(""),
                    "too long, filtered out"
                );
                on_reject(&text.content, quibble.as_deref());
            }
        });
        out
    }
}

/// Whether `text` exceeds `max_words` words.
///
/// Mixed-script counting: every non-Latin code point (including whitespace
/// and punctuation) counts as one word, and a run of Latin letters counts
/// as one more when the text ends with it. A text whose byte length is
/// within the budget is short evidently and skips the scan.
pub fn too_long(text: &str, max_words: i64) -> bool {
    if (text.len() as i64) <= max_words {
        return false;
    }

    let mut words: i64 = 0;
    let mut last_is_latin = false;
    for c in text.chars() {
        if is_latin(c) {
            last_is_latin = true;
        } else {
            last_is_latin = false;
            words += 1;
        }
        if words > max_words {
            return true;
        }
    }
    if last_is_latin {
        words += 1;
    }
    words > max_words
}

fn is_latin(c: char) -> bool {
    c.is_ascii_alphabetic()
        || matches!(c, '\u{00C0}'..='\u{024F}') // Latin-1 Supplement letters through Extended-B
}
