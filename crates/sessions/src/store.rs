//! Session store trait and the in-memory reference implementation.
//!
//! A store layers app-scoped and user-scoped state on top of per-session
//! state: at read time the merged view has precedence
//! session-specific > user-scoped > app-scoped. Persistent backends are
//! external collaborators implementing the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use canopy_core::event::Event;
use canopy_core::state::{APP_PREFIX, TEMP_PREFIX, USER_PREFIX};
use canopy_core::SessionError;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::session::Session;

/// Windowing options for `get_session`.
#[derive(Debug, Clone, Default)]
pub struct GetSessionConfig {
    /// Keep only the most recent N events.
    pub num_recent_events: Option<usize>,

    /// Keep only events after this timestamp.
    pub after_timestamp: Option<DateTime<Utc>>,
}

/// The session store contract.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session, optionally seeding state and fixing the id.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        initial_state: Option<serde_json::Map<String, serde_json::Value>>,
        session_id: Option<String>,
    ) -> Result<Session, SessionError>;

    /// Fetch a session with the layered state view, or None.
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<GetSessionConfig>,
    ) -> Result<Option<Session>, SessionError>;

    /// List a user's sessions (event logs elided).
    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Result<Vec<Session>, SessionError>;

    /// Delete a session.
    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), SessionError>;

    /// List one session's events.
    async fn list_events(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<Event>, SessionError>;

    /// Append an event to a session, routing scoped state delta keys.
    ///
    /// Default merge semantics: partial events are skipped entirely;
    /// `temp:` keys never persist; `app:`/`user:` keys land in the shared
    /// scopes; everything else is session state.
    async fn append_event(
        &self,
        session: &mut Session,
        event: Event,
    ) -> Result<Event, SessionError>;
}

/// In-memory session store with app/user state layering.
pub struct InMemorySessionStore {
    /// (app, user, session id) → session.
    sessions: RwLock<HashMap<(String, String, String), Session>>,
    /// app → shared state (keys stored without the `app:` prefix).
    app_state: RwLock<HashMap<String, serde_json::Map<String, serde_json::Value>>>,
    /// (app, user) → shared state (keys stored without the `user:` prefix).
    user_state: RwLock<HashMap<(String, String), serde_json::Map<String, serde_json::Value>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            app_state: RwLock::new(HashMap::new()),
            user_state: RwLock::new(HashMap::new()),
        }
    }

    /// Merge layered scopes into a session clone, session keys winning.
    async fn merged_view(&self, session: &Session) -> Session {
        let mut merged = session.clone();
        let mut state = serde_json::Map::new();

        if let Some(app) = self.app_state.read().await.get(&session.app_name) {
            for (key, value) in app {
                state.insert(format!("{APP_PREFIX}{key}"), value.clone());
            }
        }
        if let Some(user) = self
            .user_state
            .read()
            .await
            .get(&(session.app_name.clone(), session.user_id.clone()))
        {
            for (key, value) in user {
                state.insert(format!("{USER_PREFIX}{key}"), value.clone());
            }
        }
        for (key, value) in &session.state {
            state.insert(key.clone(), value.clone());
        }

        merged.state = state;
        merged
    }

    fn apply_window(session: &mut Session, config: GetSessionConfig) {
        if let Some(after) = config.after_timestamp {
            session.events.retain(|e| e.timestamp > after);
        }
        if let Some(recent) = config.num_recent_events {
            let len = session.events.len();
            if len > recent {
                session.events.drain(..len - recent);
            }
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        initial_state: Option<serde_json::Map<String, serde_json::Value>>,
        session_id: Option<String>,
    ) -> Result<Session, SessionError> {
        let mut session = Session::new(app_name, user_id, session_id);
        if let Some(state) = initial_state {
            session.state = state;
        }
        debug!(app = app_name, user = user_id, session = %session.id, "Created session");

        let key = (
            app_name.to_string(),
            user_id.to_string(),
            session.id.clone(),
        );
        self.sessions.write().await.insert(key, session.clone());
        Ok(self.merged_view(&session).await)
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<GetSessionConfig>,
    ) -> Result<Option<Session>, SessionError> {
        let key = (
            app_name.to_string(),
            user_id.to_string(),
            session_id.to_string(),
        );
        let Some(session) = self.sessions.read().await.get(&key).cloned() else {
            return Ok(None);
        };

        let mut merged = self.merged_view(&session).await;
        if let Some(config) = config {
            Self::apply_window(&mut merged, config);
        }
        Ok(Some(merged))
    }

    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Result<Vec<Session>, SessionError> {
        let sessions = self.sessions.read().await;
        let mut result: Vec<Session> = sessions
            .iter()
            .filter(|((app, user, _), _)| app == app_name && user == user_id)
            .map(|(_, session)| {
                let mut listed = session.clone();
                listed.events.clear();
                listed
            })
            .collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(result)
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), SessionError> {
        let key = (
            app_name.to_string(),
            user_id.to_string(),
            session_id.to_string(),
        );
        self.sessions.write().await.remove(&key);
        Ok(())
    }

    async fn list_events(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<Event>, SessionError> {
        let key = (
            app_name.to_string(),
            user_id.to_string(),
            session_id.to_string(),
        );
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&key)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        Ok(session.events.clone())
    }

    async fn append_event(
        &self,
        session: &mut Session,
        event: Event,
    ) -> Result<Event, SessionError> {
        if event.partial {
            return Ok(event);
        }

        // Route scoped delta keys into the shared tables.
        for (key, value) in &event.actions.state_delta {
            if key.starts_with(TEMP_PREFIX) {
                continue;
            }
            if let Some(stripped) = key.strip_prefix(APP_PREFIX) {
                self.app_state
                    .write()
                    .await
                    .entry(session.app_name.clone())
                    .or_default()
                    .insert(stripped.to_string(), value.clone());
            } else if let Some(stripped) = key.strip_prefix(USER_PREFIX) {
                self.user_state
                    .write()
                    .await
                    .entry((session.app_name.clone(), session.user_id.clone()))
                    .or_default()
                    .insert(stripped.to_string(), value.clone());
            }
        }

        session.append(&event);

        let key = (
            session.app_name.clone(),
            session.user_id.clone(),
            session.id.clone(),
        );
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&key)
            .ok_or_else(|| SessionError::NotFound(session.id.clone()))?;
        stored.append(&event);

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{Content, EventActions};

    fn delta_event(delta: &[(&str, serde_json::Value)]) -> Event {
        let mut actions = EventActions::default();
        for (key, value) in delta {
            actions.state_delta.insert((*key).into(), value.clone());
        }
        Event::new("inv_1", "helper")
            .with_content(Content::model_text("ok"))
            .with_actions(actions)
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let store = InMemorySessionStore::new();
        let session = store
            .create_session("app", "u1", None, Some("s1".into()))
            .await
            .unwrap();
        assert_eq!(session.id, "s1");

        let fetched = store.get_session("app", "u1", "s1", None).await.unwrap();
        assert!(fetched.is_some());
        assert!(store.get_session("app", "u1", "nope", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scoped_keys_are_shared_across_sessions() {
        let store = InMemorySessionStore::new();
        let mut first = store
            .create_session("app", "u1", None, Some("s1".into()))
            .await
            .unwrap();

        store
            .append_event(
                &mut first,
                delta_event(&[
                    ("app:motd", serde_json::json!("hello")),
                    ("user:tier", serde_json::json!("pro")),
                    ("topic", serde_json::json!("rust")),
                ]),
            )
            .await
            .unwrap();

        // A different session of the same user sees app: and user: keys.
        let second = store
            .create_session("app", "u1", None, Some("s2".into()))
            .await
            .unwrap();
        assert_eq!(second.state.get("app:motd"), Some(&serde_json::json!("hello")));
        assert_eq!(second.state.get("user:tier"), Some(&serde_json::json!("pro")));
        assert!(!second.state.contains_key("topic"));

        // A different user only sees app: keys.
        let other = store
            .create_session("app", "u2", None, Some("s3".into()))
            .await
            .unwrap();
        assert_eq!(other.state.get("app:motd"), Some(&serde_json::json!("hello")));
        assert!(!other.state.contains_key("user:tier"));
    }

    #[tokio::test]
    async fn session_specific_wins_over_scoped() {
        let store = InMemorySessionStore::new();
        let mut writer = store
            .create_session("app", "u1", None, Some("s1".into()))
            .await
            .unwrap();
        store
            .append_event(&mut writer, delta_event(&[("app:mode", serde_json::json!("shared"))]))
            .await
            .unwrap();

        // A session seeded with the same full key keeps its own value on top.
        let mut seeded = serde_json::Map::new();
        seeded.insert("app:mode".into(), serde_json::json!("local"));
        let session = store
            .create_session("app", "u1", Some(seeded), Some("s2".into()))
            .await
            .unwrap();
        assert_eq!(session.state.get("app:mode"), Some(&serde_json::json!("local")));
    }

    #[tokio::test]
    async fn partial_event_leaves_store_unchanged() {
        let store = InMemorySessionStore::new();
        let mut session = store
            .create_session("app", "u1", None, Some("s1".into()))
            .await
            .unwrap();

        let partial = delta_event(&[("x", serde_json::json!(1))]).with_partial(true);
        store.append_event(&mut session, partial).await.unwrap();

        assert!(session.events.is_empty());
        let events = store.list_events("app", "u1", "s1").await.unwrap();
        assert!(events.is_empty());
        let fetched = store
            .get_session("app", "u1", "s1", None)
            .await
            .unwrap()
            .unwrap();
        assert!(!fetched.state.contains_key("x"));
    }

    #[tokio::test]
    async fn get_session_windows_events() {
        let store = InMemorySessionStore::new();
        let mut session = store
            .create_session("app", "u1", None, Some("s1".into()))
            .await
            .unwrap();
        for i in 0..5 {
            store
                .append_event(&mut session, delta_event(&[("i", serde_json::json!(i))]))
                .await
                .unwrap();
        }

        let windowed = store
            .get_session(
                "app",
                "u1",
                "s1",
                Some(GetSessionConfig {
                    num_recent_events: Some(2),
                    after_timestamp: None,
                }),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(windowed.events.len(), 2);
    }

    #[tokio::test]
    async fn list_and_delete_sessions() {
        let store = InMemorySessionStore::new();
        store
            .create_session("app", "u1", None, Some("s1".into()))
            .await
            .unwrap();
        store
            .create_session("app", "u1", None, Some("s2".into()))
            .await
            .unwrap();
        store
            .create_session("app", "u2", None, Some("s3".into()))
            .await
            .unwrap();

        let listed = store.list_sessions("app", "u1").await.unwrap();
        assert_eq!(listed.len(), 2);

        store.delete_session("app", "u1", "s1").await.unwrap();
        let listed = store.list_sessions("app", "u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "s2");
    }
}
