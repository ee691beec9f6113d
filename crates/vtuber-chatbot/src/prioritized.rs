//! Priority-ordered chatbot dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use vtuber_core::ellipsis;
use vtuber_core::{Priority, TextIn, TextOut};

use crate::{Chatbot, ChatbotError};

/// Tries chatbots in descending priority, falling through on error.
///
/// Higher levels should hold the better conversationalists; level 0 is the
/// safety net. Input priorities above [`Priority::HIGHEST`] start the scan
/// at `HIGHEST`.
pub struct PrioritizedChatbot {
    chatbots: BTreeMap<Priority, Arc<dyn Chatbot>>,
}

impl PrioritizedChatbot {
    pub fn new(chatbots: BTreeMap<Priority, Arc<dyn Chatbot>>) -> PrioritizedChatbot {
        PrioritizedChatbot { chatbots }
    }
}

#[async_trait]
impl Chatbot for PrioritizedChatbot {
    async fn chat(&self, text_in: &TextIn) -> Result<Option<TextOut>, ChatbotError> {
        let start = text_in.priority.capped().0;

        for level in (0..=start).rev() {
            let Some(chatbot) = self.chatbots.get(&Priority(level)) else {
                continue;
            };

            match chatbot.chat(text_in).await {
                Ok(Some(text_out)) => {
                    tracing::info!(
                        level,
                        text_in = %ellipsis::centering(&text_in.content, 11),
                        text_out = %ellipsis::centering(&text_out.content, 11),
                        "chat answered"
                    );
                    return Ok(Some(text_out));
                }
                Ok(None) => {}
                Err(e) if level == 0 => {
                    tracing::warn!(error = %e, "all chatbots failed");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(level, error = %e, "chatbot failed, trying next level");
                }
            }
        }

        Err(ChatbotError::NoChatbotAvailable)
    }
}
