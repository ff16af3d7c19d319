//! The Session — durable per-conversation event log and state.
//!
//! A session is mutated only by appending events; committed state changes
//! ride on a non-partial event's `state_delta`. No other code path writes
//! committed state, which keeps partial or uncommitted events out of the
//! durable record.

use canopy_core::event::Event;
use canopy_core::state::TEMP_PREFIX;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One conversation's durable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session id.
    pub id: String,

    /// The application this session belongs to.
    pub app_name: String,

    /// The user this session belongs to.
    pub user_id: String,

    /// Committed state, including layered `app:`/`user:` keys at read time.
    #[serde(default)]
    pub state: serde_json::Map<String, serde_json::Value>,

    /// Ordered event log.
    #[serde(default)]
    pub events: Vec<Event>,

    /// When the last event was appended.
    pub last_update_time: DateTime<Utc>,
}

impl Session {
    /// Create an empty session. A fresh id is generated when none is given.
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            id: session_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            app_name: app_name.into(),
            user_id: user_id.into(),
            state: serde_json::Map::new(),
            events: Vec::new(),
            last_update_time: Utc::now(),
        }
    }

    /// Append an event, applying its state delta.
    ///
    /// Partial events are transient: they are never appended and never
    /// touch state. `temp:`-prefixed delta keys are invocation-scoped and
    /// skipped. Returns whether the event was appended.
    pub fn append(&mut self, event: &Event) -> bool {
        if event.partial {
            return false;
        }
        for (key, value) in &event.actions.state_delta {
            if key.starts_with(TEMP_PREFIX) {
                continue;
            }
            self.state.insert(key.clone(), value.clone());
        }
        self.events.push(event.clone());
        self.last_update_time = event.timestamp.max(self.last_update_time);
        true
    }
}
