//! Conversation history with the assistant

use serde::{Deserialize, Serialize};

use super::{ReviewError, ReviewService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

/// Ordered user/assistant turns
#[derive(Debug, Clone, Default)]
pub struct ChatTranscript {
    messages: Vec<ChatMessage>,
}

impl ChatTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Record `prompt`, ask the assistant and record its answer.
    ///
    /// The user turn stays in the transcript when the call fails.
    pub async fn send(
        &mut self,
        service: &dyn ReviewService,
        prompt: &str,
    ) -> Result<&ChatMessage, ReviewError> {
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            text: prompt.to_string(),
        });

        let answer = service.ask(prompt).await?;
        self.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            text: answer,
        });
        Ok(&self.messages[self.messages.len() - 1])
    }
}
