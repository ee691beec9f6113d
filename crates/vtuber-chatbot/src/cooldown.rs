//! Cooldown-gated chatbot wrapper.

use async_trait::async_trait;

use vtuber_core::{Cooldown, TextIn, TextOut};

use crate::{Chatbot, ChatbotError};

/// Gates an expensive chatbot by a [`Cooldown`]: while cooling down, `chat`
/// fails fast without touching the backend.
pub struct CooldownChatbot<C> {
    inner: C,
    cooldown: Cooldown,
}

impl<C: Chatbot> CooldownChatbot<C> {
    pub fn new(inner: C, cooldown: Cooldown) -> CooldownChatbot<C> {
        CooldownChatbot { inner, cooldown }
    }
}

#[async_trait]
impl<C: Chatbot> Chatbot for CooldownChatbot<C> {
    async fn chat(&self, text_in: &TextIn) -> Result<Option<TextOut>, ChatbotError> {
        if !self.cooldown.try_acquire() {
            return Err(ChatbotError::CoolingDown {
                left: self.cooldown.left_time(),
            });
        }
        self.inner.chat(text_in).await
    }
}
