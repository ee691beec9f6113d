use serde::{Deserialize, Serialize};

/// Priority of a [`Text`] record.
///
/// Priorities are totally ordered, non-negative integers. The named levels
/// are what the pipeline usually deals in, but any value is valid: super-chat
/// records derive their priority from the paid price and can exceed
/// [`Priority::HIGHEST`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Priority(pub u32);

impl Priority {
    pub const LOW: Priority = Priority(0);
    pub const NORMAL: Priority = Priority(1);
    pub const HIGH: Priority = Priority(2);
    pub const HIGHEST: Priority = Priority::HIGH;

    /// Derive a priority from a super-chat price, in tens of the stream's
    /// currency.
    pub fn from_price(price: u64) -> Priority {
        Priority((price / 10) as u32)
    }

    /// Clamp to [`Priority::HIGHEST`].
    pub fn capped(self) -> Priority {
        self.min(Priority::HIGHEST)
    }
}

/// A chat message flowing through the pipeline.
///
/// The same shape is used on both sides of the chatbot: `TextIn` is what the
/// vtuber reads, `TextOut` is what it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    pub author: String,
    pub content: String,
    #[serde(default)]
    pub priority: Priority,
}

impl Text {
    pub fn new(author: impl Into<String>, content: impl Into<String>, priority: Priority) -> Text {
        Text {
            author: author.into(),
            content: content.into(),
            priority,
        }
    }
}

pub type TextIn = Text;
pub type TextOut = Text;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_and_cap() {
        assert!(Priority::LOW < Priority::NORMAL);
        assert!(Priority::NORMAL < Priority::HIGH);
        assert_eq!(Priority::HIGHEST, Priority::HIGH);
        assert_eq!(Priority(9).capped(), Priority::HIGHEST);
        assert_eq!(Priority::LOW.capped(), Priority::LOW);
    }

    #[test]
    fn priority_from_price() {
        assert_eq!(Priority::from_price(0), Priority(0));
        assert_eq!(Priority::from_price(30), Priority(3));
        assert_eq!(Priority::from_price(35), Priority(3));
    }

    #[test]
    fn text_json_shape() {
        let t = Text::new("A", "你好", Priority::LOW);
        let j = serde_json::to_string(&t).unwrap();
        assert_eq!(j, r#"{"author":"A","content":"你好","priority":0}"#);

        // priority may be omitted on input
        let t: Text = serde_json::from_str(r#"{"author":"B","content":"hi"}"#).unwrap();
        assert_eq!(t.priority, Priority::LOW);
    }
}
