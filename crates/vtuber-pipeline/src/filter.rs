//! Predicate filter stage.

use tokio::sync::mpsc;

use vtuber_core::Text;

use crate::CHANNEL_BUFFER;

/// Pass records whose content satisfies `predicate`; drop the rest.
pub fn filter_text<F>(mut rx: mpsc::Receiver<Text>, mut predicate: F) -> mpsc::Receiver<Text>
where
    F: FnMut(&str) -> bool + Send + 'static,
{
    let (tx, out) = mpsc::channel(CHANNEL_BUFFER);
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if predicate(&text.content) && tx.send(text).await.is_err() {
                return;
            }
        }
    });
    out
}

/// Keep only texts containing at least one Han character.
pub fn chinese_only(text: &str) -> bool {
    text.trim().chars().any(is_han)
}

fn is_han(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'   // CJK Unified Ideographs
        | '\u{3400}'..='\u{4DBF}' // Extension A
        | '\u{F900}'..='\u{FAFF}' // Compatibility Ideographs
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtuber_core::Priority;

    #[test]
    fn chinese_only_wants_han() {
        assert!(chinese_only("你好"));
        assert!(chinese_only("hello 你好 world"));
        assert!(!chinese_only("hello world"));
        assert!(!chinese_only("  "));
        assert!(!chinese_only("こんにちは"));
    }

    #[tokio::test]
    async fn predicate_drops_and_passes() {
        let (tx, rx) = mpsc::channel(8);
        let mut out = filter_text(rx, |t| !t.contains("spam"));

        tx.send(Text::new("a", "hello", Priority::LOW)).await.unwrap();
        tx.send(Text::new("b", "buy spam", Priority::LOW)).await.unwrap();
        tx.send(Text::new("c", "bye", Priority::LOW)).await.unwrap();
        drop(tx);

        assert_eq!(out.recv().await.unwrap().content, "hello");
        assert_eq!(out.recv().await.unwrap().content, "bye");
        assert!(out.recv().await.is_none());
    }
}
