use crate::core::state::ConversationState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /chat/`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub step: i64,
    pub message: String,
    pub topic: String,
    pub genre: String,
    pub interview_questions: Vec<String>,
    pub outline_result: Value,
    pub character_result: Value,
    pub answers: String,
    #[serde(rename = "storyId")]
    pub story_id: u64,
}

impl ChatRequest {
    /// `message` and `answers` both carry the user's text as typed; the
    /// server reads whichever one the current step needs.
    pub fn new(state: &ConversationState, text: &str, story_id: u64) -> Self {
        Self {
            step: state.step,
            message: text.to_string(),
            topic: state.topic.clone(),
            genre: state.genre.clone(),
            interview_questions: state.interview_questions.clone(),
            outline_result: state.outline_result.clone(),
            character_result: state.character_result.clone(),
            answers: text.to_string(),
            story_id,
        }
    }
}

/// Reply of `POST /chat/`, one variant per step the server can move to.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(from = "RawStepResponse")]
pub enum StepResponse {
    Interview {
        topic: Option<String>,
        questions: Vec<String>,
    },
    Outline {
        topic: Option<String>,
        outline: Value,
        interview: Vec<String>,
    },
    Characters {
        topic: Option<String>,
        characters: Value,
    },
    Drafts {
        stories: Vec<String>,
    },
    Unrecognized {
        step: i64,
    },
}

impl StepResponse {
    pub fn step(&self) -> i64 {
        match self {
            StepResponse::Interview { .. } => 2,
            StepResponse::Outline { .. } => 3,
            StepResponse::Characters { .. } => 4,
            StepResponse::Drafts { .. } => 5,
            StepResponse::Unrecognized { step } => *step,
        }
    }
}

/// Wire shape: a `step` tag plus optional fields whose meaning depends on it.
/// Only the fields of the tagged step are read, and a field of the wrong
/// type reads as empty.
#[derive(Deserialize)]
struct RawStepResponse {
    step: i64,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl RawStepResponse {
    fn take<T: DeserializeOwned + Default>(&mut self, key: &str) -> T {
        self.fields
            .remove(key)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    fn take_value(&mut self, key: &str) -> Value {
        match self.fields.remove(key) {
            Some(Value::Null) | None => Value::Array(Vec::new()),
            Some(v) => v,
        }
    }
}

impl From<RawStepResponse> for StepResponse {
    fn from(mut raw: RawStepResponse) -> Self {
        match raw.step {
            2 => StepResponse::Interview {
                topic: raw.take("topic"),
                questions: raw.take("interview_questions"),
            },
            3 => StepResponse::Outline {
                topic: raw.take("topic"),
                outline: raw.take_value("outline_result"),
                interview: raw.take("interview_questions"),
            },
            4 => StepResponse::Characters {
                topic: raw.take("topic"),
                characters: raw.take_value("character_result"),
            },
            5 => StepResponse::Drafts {
                stories: raw.take("stories"),
            },
            step => StepResponse::Unrecognized { step },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_names() {
        let mut state = ConversationState::new("Adventure");
        state.topic = "dragons".to_string();
        let request = ChatRequest::new(&state, "a story about dragons", 42);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["step"], 1);
        assert_eq!(json["storyId"], 42);
        assert_eq!(json["message"], "a story about dragons");
        assert_eq!(json["answers"], "a story about dragons");
        assert_eq!(json["outline_result"], "");
        assert_eq!(json["genre"], "Adventure");
        assert!(json.get("story_id").is_none());
    }

    #[test]
    fn test_decode_interview() {
        let response: StepResponse = serde_json::from_value(json!({
            "step": 2,
            "interview_questions": ["Q1", "Q2"],
            "topic": "dragons"
        }))
        .unwrap();

        assert_eq!(
            response,
            StepResponse::Interview {
                topic: Some("dragons".to_string()),
                questions: vec!["Q1".to_string(), "Q2".to_string()],
            }
        );
    }

    #[test]
    fn test_decode_ignores_fields_of_other_steps() {
        let response: StepResponse = serde_json::from_value(json!({
            "step": 5,
            "stories": ["Once upon a time"],
            "interview_questions": ["ignored"],
            "outline_result": [["chapters", []]]
        }))
        .unwrap();

        assert_eq!(
            response,
            StepResponse::Drafts {
                stories: vec!["Once upon a time".to_string()]
            }
        );
    }

    #[test]
    fn test_decode_missing_fields_default_to_empty() {
        let response: StepResponse = serde_json::from_value(json!({ "step": 2 })).unwrap();
        assert_eq!(
            response,
            StepResponse::Interview {
                topic: None,
                questions: vec![]
            }
        );

        let response: StepResponse = serde_json::from_value(json!({ "step": 3 })).unwrap();
        match response {
            StepResponse::Outline { outline, interview, .. } => {
                assert_eq!(outline, json!([]));
                assert!(interview.is_empty());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_step() {
        let response: StepResponse = serde_json::from_value(json!({ "step": 9 })).unwrap();
        assert_eq!(response, StepResponse::Unrecognized { step: 9 });
        assert_eq!(response.step(), 9);
    }

    #[test]
    fn test_decode_tolerates_wrong_types_in_other_steps_fields() {
        let response: StepResponse = serde_json::from_value(json!({
            "step": 5,
            "stories": ["x"],
            "topic": 7,
            "interview_questions": [["Q", 1]]
        }))
        .unwrap();

        assert_eq!(
            response,
            StepResponse::Drafts {
                stories: vec!["x".to_string()]
            }
        );
    }

    #[test]
    fn test_decode_wrong_typed_field_reads_as_empty() {
        let response: StepResponse =
            serde_json::from_value(json!({ "step": 5, "stories": "text" })).unwrap();
        assert_eq!(response, StepResponse::Drafts { stories: vec![] });

        let response: StepResponse = serde_json::from_value(json!({
            "step": 2,
            "topic": ["not", "a", "string"],
            "interview_questions": "Q1"
        }))
        .unwrap();
        assert_eq!(
            response,
            StepResponse::Interview {
                topic: None,
                questions: vec![]
            }
        );
    }

    #[test]
    fn test_decode_negative_step_is_unrecognized() {
        let response: StepResponse = serde_json::from_value(json!({ "step": -1 })).unwrap();
        assert_eq!(response, StepResponse::Unrecognized { step: -1 });
    }

    #[test]
    fn test_decode_requires_step() {
        let result: Result<StepResponse, _> =
            serde_json::from_value(json!({ "stories": ["x"] }));
        assert!(result.is_err());
    }
}
