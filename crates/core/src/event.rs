//! Event and EventActions — the immutable record of what happened.
//!
//! Every agent, pipeline step, and tool dispatch produces `Event`s. An event
//! is never mutated after it is handed to a caller; derived events are made
//! with the `with_*` copy-with-override constructors. Events live forever in
//! the session log (partial events excepted — they are transient and never
//! persisted).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::{Content, FunctionCall, FunctionResponse, Part};

/// Reserved author name for events originating from the end user.
pub const USER_AUTHOR: &str = "user";

/// Side effects requested by the producer of an event.
///
/// Actions are applied when the event is appended to a session (state delta)
/// or observed by the orchestration layer (transfer, escalate).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    /// Auth configurations requested by tools, keyed by credential name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub requested_auth_configs: HashMap<String, serde_json::Value>,

    /// Hand the rest of the invocation to the named agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to_agent: Option<String>,

    /// Key/value upserts merged into session state on append.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub state_delta: serde_json::Map<String, serde_json::Value>,

    /// Artifact versions written while producing this event (filename → version).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub artifact_delta: HashMap<String, u64>,

    /// Suppress any summarization of this event's function responses.
    #[serde(default)]
    pub skip_summarization: bool,

    /// Escalate out of the enclosing loop.
    #[serde(default)]
    pub escalate: bool,

    /// The live turn is complete.
    #[serde(default)]
    pub turn_complete: bool,
}

impl EventActions {
    /// Merge `other` into `self`.
    ///
    /// Maps shallow-merge with `other` winning on key conflicts;
    /// `transfer_to_agent` — other wins if set; booleans OR-combine.
    pub fn merge(&mut self, other: EventActions) {
        self.requested_auth_configs.extend(other.requested_auth_configs);
        if other.transfer_to_agent.is_some() {
            self.transfer_to_agent = other.transfer_to_agent;
        }
        for (key, value) in other.state_delta {
            self.state_delta.insert(key, value);
        }
        self.artifact_delta.extend(other.artifact_delta);
        self.skip_summarization |= other.skip_summarization;
        self.escalate |= other.escalate;
        self.turn_complete |= other.turn_complete;
    }
}

/// An immutable record of one thing that happened during an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique id within a session.
    pub id: String,

    /// The invocation this event belongs to.
    pub invocation_id: String,

    /// Agent name (or "user") that produced this event.
    pub author: String,

    /// Dot-joined lineage of agent names that produced this event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// When this event was created.
    pub timestamp: DateTime<Utc>,

    /// Partial events carry in-flight streaming text; they are excluded from
    /// persistence and from the final-response check.
    #[serde(default)]
    pub partial: bool,

    /// The content of the event, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,

    /// Requested side effects.
    #[serde(default)]
    pub actions: EventActions,

    /// Ids of function calls whose tools are long-running; tracked for
    /// out-of-band correlation instead of being awaited inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_running_tool_ids: Option<HashSet<String>>,
}

impl Event {
    /// Create an event with a fresh id and timestamp.
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: Self::new_id(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            branch: None,
            timestamp: Utc::now(),
            partial: false,
            content: None,
            actions: EventActions::default(),
            long_running_tool_ids: None,
        }
    }

    /// Generate a fresh event id.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Copy with content replaced.
    pub fn with_content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    /// Copy with branch replaced.
    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    /// Copy with actions replaced.
    pub fn with_actions(mut self, actions: EventActions) -> Self {
        self.actions = actions;
        self
    }

    /// Copy with the partial flag replaced.
    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Copy with the author replaced.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Copy with the long-running-tool id set replaced.
    pub fn with_long_running_tool_ids(mut self, ids: HashSet<String>) -> Self {
        self.long_running_tool_ids = if ids.is_empty() { None } else { Some(ids) };
        self
    }

    /// Function calls carried by this event's content.
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.content
            .as_ref()
            .map(|c| c.function_calls())
            .unwrap_or_default()
    }

    /// Function responses carried by this event's content.
    pub fn function_responses(&self) -> Vec<&FunctionResponse> {
        self.content
            .as_ref()
            .map(|c| c.function_responses())
            .unwrap_or_default()
    }

    /// Whether this event terminates one model-call loop.
    ///
    /// True when summarization is skipped, when a long-running tool id is
    /// tracked, or when the event is a plain completed response: no function
    /// calls, no function responses, not partial, and not trailed by a
    /// code-execution result (which the model still needs to observe).
    pub fn is_final_response(&self) -> bool {
        if self.actions.skip_summarization {
            return true;
        }
        if self
            .long_running_tool_ids
            .as_ref()
            .is_some_and(|ids| !ids.is_empty())
        {
            return true;
        }
        self.function_calls().is_empty()
            && self.function_responses().is_empty()
            && !self.partial
            && !self.has_trailing_code_execution_result()
    }

    fn has_trailing_code_execution_result(&self) -> bool {
        self.content
            .as_ref()
            .and_then(|c| c.parts.last())
            .is_some_and(|p| matches!(p, Part::CodeExecutionResult { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FunctionResponse;

    fn call(id: &str) -> FunctionCall {
        FunctionCall {
            id: Some(id.into()),
            name: "lookup".into(),
            args: serde_json::Map::new(),
        }
    }

    #[test]
    fn merge_state_delta_later_write_wins() {
        let mut a = EventActions::default();
        a.state_delta.insert("a".into(), serde_json::json!(1));

        let mut b = EventActions::default();
        b.state_delta.insert("a".into(), serde_json::json!(2));
        b.state_delta.insert("b".into(), serde_json::json!(3));

        a.merge(b);
        assert_eq!(a.state_delta.get("a"), Some(&serde_json::json!(2)));
        assert_eq!(a.state_delta.get("b"), Some(&serde_json::json!(3)));
        assert_eq!(a.state_delta.len(), 2);
    }

    #[test]
    fn merge_transfer_other_wins_when_set() {
        let mut a = EventActions {
            transfer_to_agent: Some("alpha".into()),
            ..Default::default()
        };
        a.merge(EventActions::default());
        assert_eq!(a.transfer_to_agent.as_deref(), Some("alpha"));

        a.merge(EventActions {
            transfer_to_agent: Some("beta".into()),
            ..Default::default()
        });
        assert_eq!(a.transfer_to_agent.as_deref(), Some("beta"));
    }

    #[test]
    fn merge_booleans_or_combine() {
        let mut a = EventActions {
            escalate: true,
            ..Default::default()
        };
        a.merge(EventActions {
            skip_summarization: true,
            ..Default::default()
        });
        assert!(a.escalate);
        assert!(a.skip_summarization);
        assert!(!a.turn_complete);
    }

    #[test]
    fn plain_text_event_is_final() {
        let event = Event::new("inv_1", "helper").with_content(Content::model_text("done"));
        assert!(event.is_final_response());
    }

    #[test]
    fn partial_event_is_not_final() {
        let event = Event::new("inv_1", "helper")
            .with_content(Content::model_text("stream"))
            .with_partial(true);
        assert!(!event.is_final_response());
    }

    #[test]
    fn function_call_event_is_not_final() {
        let event = Event::new("inv_1", "helper").with_content(Content::new(
            "model",
            vec![Part::function_call(call("call_1"))],
        ));
        assert!(!event.is_final_response());
    }

    #[test]
    fn long_running_function_call_is_final() {
        let event = Event::new("inv_1", "helper")
            .with_content(Content::new(
                "model",
                vec![Part::function_call(call("call_1"))],
            ))
            .with_long_running_tool_ids(HashSet::from(["call_1".to_string()]));
        assert!(event.is_final_response());
    }

    #[test]
    fn skip_summarization_forces_final() {
        let event = Event::new("inv_1", "helper")
            .with_content(Content::new(
                "model",
                vec![Part::function_response(FunctionResponse {
                    id: Some("call_1".into()),
                    name: "lookup".into(),
                    response: serde_json::json!({"found": true}),
                })],
            ))
            .with_actions(EventActions {
                skip_summarization: true,
                ..Default::default()
            });
        assert!(event.is_final_response());
    }

    #[test]
    fn trailing_code_execution_result_is_not_final() {
        let event = Event::new("inv_1", "coder").with_content(Content::new(
            "model",
            vec![
                Part::text("ran it"),
                Part::CodeExecutionResult {
                    outcome: "ok".into(),
                    output: "4".into(),
                },
            ],
        ));
        assert!(!event.is_final_response());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::new("inv_1", "helper")
            .with_branch(Some("root.helper".into()))
            .with_content(Content::model_text("hello"));
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
