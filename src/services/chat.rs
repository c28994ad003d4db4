use crate::core::session::Session;
use crate::core::state::{ConversationState, Message, Transcript};
use crate::services::api::{ApiError, StoryApi};
use crate::services::protocol::{ChatRequest, StepResponse};
use crate::services::render::render;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Blank input, nothing sent.
    Ignored,
    /// Another submission is still waiting for its reply.
    Busy,
    /// No token, or the server rejected it. The caller should show login.
    LoginRequired,
    /// Reply applied; `appended` assistant messages were added.
    Applied { step: i64, appended: usize },
    /// Reply arrived after the conversation was reset and was dropped.
    Stale,
    Failed(String),
}

struct Conversation {
    state: ConversationState,
    transcript: Transcript,
}

impl Conversation {
    fn new(genre: &str) -> Self {
        Self {
            state: ConversationState::new(genre),
            transcript: Transcript::default(),
        }
    }
}

/// Clears the busy flag on every exit path of a submission.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives the guided story-creation conversation for one story.
///
/// At most one `/chat/` request is outstanding at a time. The conversation
/// state only changes when the reply to the most recently issued request
/// arrives; the server's `step` always wins.
pub struct ChatController {
    api: Arc<dyn StoryApi>,
    session: Arc<dyn Session>,
    story_id: u64,
    conversation: Mutex<Conversation>,
    busy: AtomicBool,
    latest_request: AtomicU64,
}

impl ChatController {
    pub fn new(api: Arc<dyn StoryApi>, session: Arc<dyn Session>, story_id: u64, genre: &str) -> Self {
        Self {
            api,
            session,
            story_id,
            conversation: Mutex::new(Conversation::new(genre)),
            busy: AtomicBool::new(false),
            latest_request: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Conversation> {
        self.conversation.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn story_id(&self) -> u64 {
        self.story_id
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConversationState {
        self.lock().state.clone()
    }

    pub fn transcript(&self) -> Transcript {
        self.lock().transcript.clone()
    }

    pub fn messages_since(&self, start: usize) -> Vec<Message> {
        self.lock().transcript.since(start).to_vec()
    }

    pub fn expected_answers(&self) -> Option<usize> {
        self.lock().state.expected_answers()
    }

    /// Starts over at step 1. A reply still in flight will be dropped.
    pub fn reset(&self) {
        let mut conversation = self.lock();
        self.latest_request.fetch_add(1, Ordering::AcqRel);
        let genre = conversation.state.genre.clone();
        *conversation = Conversation::new(&genre);
        info!("Conversation for story {} reset", self.story_id);
    }

    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return SubmitOutcome::Ignored;
        }

        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            debug!("Submission rejected, a request is already in flight");
            return SubmitOutcome::Busy;
        };

        let Some(token) = self.session.token() else {
            warn!("No access token, login required");
            return SubmitOutcome::LoginRequired;
        };

        let (request_id, request) = {
            let mut conversation = self.lock();
            conversation.transcript.push(Message::user(trimmed));
            let id = self.latest_request.fetch_add(1, Ordering::AcqRel) + 1;
            (id, ChatRequest::new(&conversation.state, text, self.story_id))
        };

        info!("Sending step {} for story {}", request.step, self.story_id);

        match self.api.chat(&token, &request).await {
            Ok(response) => self.apply(request_id, response),
            Err(ApiError::Unauthorized) => {
                warn!("Token rejected by server, clearing session");
                if let Err(e) = self.session.clear_token() {
                    error!("Failed to clear token: {:#}", e);
                }
                SubmitOutcome::LoginRequired
            }
            Err(e) => {
                error!("Error sending message: {}", e);
                SubmitOutcome::Failed(e.to_string())
            }
        }
    }

    fn apply(&self, request_id: u64, response: StepResponse) -> SubmitOutcome {
        let mut conversation = self.lock();
        if self.latest_request.load(Ordering::Acquire) != request_id {
            warn!("Dropping stale reply for request {}", request_id);
            return SubmitOutcome::Stale;
        }

        let step = response.step();
        let rendered = render(&response);
        let state = &mut conversation.state;

        match response {
            StepResponse::Interview { topic, questions } => {
                state.interview_questions = questions;
                if let Some(topic) = topic {
                    state.topic = topic;
                }
            }
            StepResponse::Outline { topic, outline, interview } => {
                state.outline_result = outline;
                state.interview_questions = interview;
                if let Some(topic) = topic {
                    state.topic = topic;
                }
            }
            StepResponse::Characters { topic, characters } => {
                state.character_result = characters;
                if let Some(topic) = topic {
                    state.topic = topic;
                }
            }
            StepResponse::Drafts { stories } => {
                state.stories = stories;
            }
            StepResponse::Unrecognized { step } => {
                debug!("No rendering for step {}", step);
            }
        }
        state.step = step;

        let appended = rendered.len();
        for content in rendered {
            conversation.transcript.push(Message::assistant(content));
        }

        info!("Story {} now at step {}", self.story_id, step);
        SubmitOutcome::Applied { step, appended }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::MemorySession;
    use crate::core::state::Role;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use tokio::sync::Notify;

    // Mock API returning scripted replies
    struct MockApi {
        replies: Mutex<VecDeque<Result<StepResponse, ApiError>>>,
        requests: Arc<Mutex<Vec<(String, ChatRequest)>>>,
        gate: Option<Arc<Notify>>,
    }

    impl MockApi {
        fn new(replies: Vec<Result<StepResponse, ApiError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Arc::new(Mutex::new(Vec::new())),
                gate: None,
            }
        }

        fn gated(replies: Vec<Result<StepResponse, ApiError>>, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(replies)
            }
        }
    }

    #[async_trait]
    impl StoryApi for MockApi {
        async fn chat(&self, token: &str, request: &ChatRequest) -> Result<StepResponse, ApiError> {
            self.requests
                .lock()
                .unwrap()
                .push((token.to_string(), request.clone()));

            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ApiError::Decode("no scripted reply".to_string())))
        }
    }

    fn interview(questions: &[&str]) -> StepResponse {
        StepResponse::Interview {
            topic: Some("dragons".to_string()),
            questions: questions.iter().map(|q| q.to_string()).collect(),
        }
    }

    fn controller(api: Arc<MockApi>, session: Arc<MemorySession>) -> ChatController {
        ChatController::new(api, session, 42, "Adventure")
    }

    fn assistant_texts(controller: &ChatController) -> Vec<String> {
        controller
            .transcript()
            .messages()
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_interview_questions_appended_in_order() {
        let api = Arc::new(MockApi::new(vec![Ok(interview(&["Q1", "Q2"]))]));
        let session = Arc::new(MemorySession::with_token("tok"));
        let controller = controller(api.clone(), session);

        let outcome = controller.submit("  a story about dragons  ").await;
        assert_eq!(outcome, SubmitOutcome::Applied { step: 2, appended: 2 });

        let transcript = controller.transcript();
        let messages = transcript.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "a story about dragons");
        assert_eq!(messages[1].content, "Q1");
        assert_eq!(messages[2].content, "Q2");

        let state = controller.state();
        assert_eq!(state.step, 2);
        assert_eq!(state.topic, "dragons");
        assert_eq!(state.interview_questions, vec!["Q1", "Q2"]);
        assert_eq!(controller.expected_answers(), Some(2));

        let requests = api.requests.lock().unwrap();
        let (token, request) = &requests[0];
        assert_eq!(token, "tok");
        assert_eq!(request.step, 1);
        assert_eq!(request.story_id, 42);
        assert_eq!(request.message, "  a story about dragons  ");
    }

    #[tokio::test]
    async fn test_full_conversation_threads_state() {
        let outline = json!([["chapters", [[["chapter_number", 1], ["chapter_title", "Intro"]]]]]);
        let characters = json!([["characters", [[["name", "Ada"], ["appearance", "Tall"]]]]]);
        let api = Arc::new(MockApi::new(vec![
            Ok(interview(&["Q1", "Q2"])),
            Ok(StepResponse::Outline {
                topic: Some("dragons".to_string()),
                outline: outline.clone(),
                interview: vec!["Q: Q1\nA: yes".to_string(), "Q: Q2\nA: no".to_string()],
            }),
            Ok(StepResponse::Characters {
                topic: Some("dragons".to_string()),
                characters: characters.clone(),
            }),
            Ok(StepResponse::Drafts {
                stories: vec!["Chapter one text".to_string(), "Chapter two text".to_string()],
            }),
        ]));
        let controller = controller(api.clone(), Arc::new(MemorySession::with_token("tok")));

        controller.submit("dragons").await;
        controller.submit("yes\nno").await;
        controller.submit("continue").await;
        let last = controller.submit("write it").await;
        assert_eq!(last, SubmitOutcome::Applied { step: 5, appended: 1 });

        assert_eq!(
            assistant_texts(&controller),
            vec![
                "Q1",
                "Q2",
                "Chapter 1: Intro",
                "Name: Ada\nAppearance: Tall\nBiography: No biography available.",
                "Chapter one text\nChapter two text",
            ]
        );

        let requests = api.requests.lock().unwrap();
        let steps: Vec<i64> = requests.iter().map(|(_, r)| r.step).collect();
        assert_eq!(steps, vec![1, 2, 3, 4]);

        // Step 2 request carries the questions and the answers as typed
        assert_eq!(requests[1].1.interview_questions, vec!["Q1", "Q2"]);
        assert_eq!(requests[1].1.answers, "yes\nno");
        // Later requests echo what the server produced
        assert_eq!(requests[2].1.outline_result, outline);
        assert_eq!(requests[2].1.interview_questions.len(), 2);
        assert_eq!(requests[3].1.character_result, characters);

        let state = controller.state();
        assert_eq!(state.step, 5);
        assert_eq!(state.stories.len(), 2);
    }

    #[tokio::test]
    async fn test_submit_while_in_flight_is_noop() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(MockApi::gated(vec![Ok(interview(&["Q1"]))], gate.clone()));
        let controller = controller(api.clone(), Arc::new(MemorySession::with_token("tok")));

        let (first, second) = tokio::join!(controller.submit("dragons"), async {
            let outcome = controller.submit("second message").await;
            gate.notify_one();
            outcome
        });

        assert_eq!(first, SubmitOutcome::Applied { step: 2, appended: 1 });
        assert_eq!(second, SubmitOutcome::Busy);
        assert_eq!(api.requests.lock().unwrap().len(), 1);

        let contents: Vec<String> = controller
            .transcript()
            .messages()
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(contents, vec!["dragons", "Q1"]);
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_state() {
        let api = Arc::new(MockApi::new(vec![
            Ok(interview(&["Q1"])),
            Err(ApiError::Server {
                status: 500,
                message: "boom".to_string(),
            }),
        ]));
        let controller = controller(api.clone(), Arc::new(MemorySession::with_token("tok")));

        controller.submit("dragons").await;
        let before = controller.state();

        let outcome = controller.submit("my answer").await;
        assert!(matches!(outcome, SubmitOutcome::Failed(ref reason) if reason.contains("boom")));

        assert_eq!(controller.state(), before);
        assert_eq!(controller.state().step, 2);
        assert_eq!(assistant_texts(&controller), vec!["Q1"]);

        // The echoed user message stays visible
        let transcript = controller.transcript();
        let last = transcript.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "my answer");
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_missing_token_sends_nothing() {
        let api = Arc::new(MockApi::new(vec![Ok(interview(&["Q1"]))]));
        let controller = controller(api.clone(), Arc::new(MemorySession::new()));

        let outcome = controller.submit("dragons").await;
        assert_eq!(outcome, SubmitOutcome::LoginRequired);
        assert!(api.requests.lock().unwrap().is_empty());
        assert!(controller.transcript().is_empty());
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_unauthorized_clears_token() {
        let api = Arc::new(MockApi::new(vec![Err(ApiError::Unauthorized)]));
        let session = Arc::new(MemorySession::with_token("expired"));
        let controller = controller(api, session.clone());

        let outcome = controller.submit("dragons").await;
        assert_eq!(outcome, SubmitOutcome::LoginRequired);
        assert!(session.token().is_none());
        assert_eq!(controller.state().step, 1);
    }

    #[tokio::test]
    async fn test_blank_input_ignored() {
        let api = Arc::new(MockApi::new(vec![]));
        let controller = controller(api.clone(), Arc::new(MemorySession::with_token("tok")));

        assert_eq!(controller.submit("   \n ").await, SubmitOutcome::Ignored);
        assert!(api.requests.lock().unwrap().is_empty());
        assert!(controller.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_step_only_updates_step() {
        let api = Arc::new(MockApi::new(vec![Ok(StepResponse::Unrecognized { step: 6 })]));
        let controller = controller(api, Arc::new(MemorySession::with_token("tok")));

        let outcome = controller.submit("what now").await;
        assert_eq!(outcome, SubmitOutcome::Applied { step: 6, appended: 0 });
        assert_eq!(controller.state().step, 6);
        assert_eq!(controller.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_reply_after_reset_is_dropped() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(MockApi::gated(vec![Ok(interview(&["Q1"]))], gate.clone()));
        let controller = controller(api, Arc::new(MemorySession::with_token("tok")));

        let (outcome, _) = tokio::join!(controller.submit("dragons"), async {
            controller.reset();
            gate.notify_one();
        });

        assert_eq!(outcome, SubmitOutcome::Stale);
        assert_eq!(controller.state().step, 1);
        assert!(controller.transcript().is_empty());
        assert_eq!(controller.state().genre, "Adventure");
    }
}
