use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FIRST_STEP: i64 = 1;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub produced_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            produced_at: Utc::now(),
        }
    }
}

/// Display log of the conversation. Entries are only ever appended.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages appended after the first `start` entries.
    pub fn since(&self, start: usize) -> &[Message] {
        self.messages.get(start..).unwrap_or(&[])
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Everything the server needs echoed back to resume the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationState {
    pub step: i64,
    pub topic: String,
    pub genre: String,
    pub interview_questions: Vec<String>,
    pub outline_result: Value,
    pub character_result: Value,
    pub stories: Vec<String>,
}

impl ConversationState {
    pub fn new(genre: &str) -> Self {
        Self {
            step: FIRST_STEP,
            topic: String::new(),
            genre: genre.to_string(),
            interview_questions: Vec::new(),
            // The server treats an empty string as "nothing generated yet".
            outline_result: Value::String(String::new()),
            character_result: Value::String(String::new()),
            stories: Vec::new(),
        }
    }

    /// Number of newline-separated answers the server accepts for the
    /// current step, if it checks the count at all.
    pub fn expected_answers(&self) -> Option<usize> {
        (self.step == 2).then_some(self.interview_questions.len())
    }
}

pub fn answer_count(text: &str) -> usize {
    text.split('\n').count()
}
