use crate::error::{RenameError, Result};
use crate::session::store::{LoadOrigin, SessionStore};
use crate::session::{enforce_cap, Message, Role, SessionSnapshot, ATTACHMENT_MARKER};
use tracing::{debug, info};

/// The live, single-owner view of one session.
///
/// Every mutation is written through to the store immediately. A failed write
/// is returned to the caller but the in-memory change is kept.
#[derive(Debug)]
pub struct ConversationState {
    store: SessionStore,
    session_id: String,
    snapshot: SessionSnapshot,
}

impl ConversationState {
    /// A brand new session. Nothing is written until the first mutation.
    pub fn create(store: SessionStore, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            snapshot: SessionSnapshot::default(),
        }
    }

    /// Loads `session_id` from the store, reporting how the history was obtained.
    pub fn open(store: SessionStore, session_id: impl Into<String>) -> (Self, LoadOrigin) {
        let session_id = session_id.into();
        let loaded = store.load(&session_id);
        info!(session_id = %session_id, origin = ?loaded.origin, "session opened");
        let state = Self {
            store,
            session_id,
            snapshot: loaded.snapshot,
        };
        (state, loaded.origin)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[cfg(test)]
    pub fn project_context(&self) -> &str {
        &self.snapshot.project_context
    }

    #[cfg(test)]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Current history, preamble first.
    pub fn get_context(&self) -> &[Message] {
        &self.snapshot.history
    }

    pub fn save(&self) -> Result<()> {
        self.store.save(&self.session_id, &self.snapshot)
    }

    pub fn append_message(&mut self, role: Role, content: impl Into<String>) -> Result<()> {
        self.snapshot.history.push(Message::new(role, content));
        enforce_cap(&mut self.snapshot.history);
        self.save()
    }

    pub fn attach_file_content(&mut self, filename: &str, content: &str) -> Result<()> {
        self.snapshot
            .project_context
            .push_str(&format!("\n--- FILE: {filename} ---\n{content}\n"));
        debug!(
            session_id = %self.session_id,
            filename,
            context_len = self.snapshot.project_context.len(),
            "file attached"
        );
        self.append_message(Role::System, format!("{ATTACHMENT_MARKER} File: {filename}"))
    }

    /// Messages to send for `query`: history, attached files, then the query.
    pub fn prompt_for(&self, query: &str) -> Vec<Message> {
        let mut messages = self.snapshot.history.clone();
        if !self.snapshot.project_context.is_empty() {
            let files = Message::system(format!("FILES:\n{}", self.snapshot.project_context));
            messages.insert(1.min(messages.len()), files);
        }
        messages.push(Message::user(query));
        messages
    }

    /// Records a completed exchange. Both messages are kept even if a save fails.
    pub fn commit_exchange(&mut self, query: &str, reply: &str) -> Result<()> {
        let user_saved = self.append_message(Role::User, query);
        let assistant_saved = self.append_message(Role::Assistant, reply);
        user_saved.and(assistant_saved)
    }

    pub fn rename(&mut self, new_name: &str) -> std::result::Result<String, RenameError> {
        let new_id = self
            .store
            .rename(&self.session_id, new_name, &self.snapshot)?;
        self.session_id = new_id.clone();
        Ok(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{default_history, HISTORY_CAP};
    use std::fs;
    use tempfile::TempDir;

    fn fresh() -> (TempDir, ConversationState) {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = SessionStore::new(temp_dir.path().join("sessions"));
        (temp_dir, ConversationState::create(store, "12-00-00"))
    }

    #[test]
    fn create_does_not_persist() {
        let (_tmp, state) = fresh();
        assert_eq!(state.get_context(), default_history().as_slice());
        assert!(!state.store().exists("12-00-00"));
    }

    #[test]
    fn every_append_keeps_invariants_and_saves() {
        let (_tmp, mut state) = fresh();
        for i in 0..50 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            state.append_message(role, format!("message {i}")).expect("append message");

            let history = state.get_context();
            assert_eq!(history[0].role, Role::System);
            assert!(history.len() <= HISTORY_CAP);
        }

        let history = state.get_context();
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history[0], default_history()[0]);
        assert_eq!(history.last().expect("history is not empty").content, "message 49");

        let reloaded = state.store().load(state.session_id()).snapshot;
        assert_eq!(reloaded.history, history);
    }

    #[test]
    fn attach_adds_context_block_and_notice() {
        let (_tmp, mut state) = fresh();
        state.attach_file_content("x.py", "print(1)").expect("attach file");

        assert!(state.project_context().contains("FILE: x.py"));
        assert!(state.project_context().contains("print(1)"));
        let last = state.get_context().last().expect("history is not empty");
        assert_eq!(last.role, Role::System);
        assert!(last.is_attachment_notice());
        assert!(last.content.contains("x.py"));
        assert!(state.store().exists("12-00-00"));
    }

    #[test]
    fn prompt_inserts_files_after_preamble_and_query_last() {
        let (_tmp, mut state) = fresh();
        state.append_message(Role::User, "earlier").expect("append message");
        state.attach_file_content("lib.rs", "pub fn f() {}").expect("attach file");

        let prompt = state.prompt_for("explain f");
        assert_eq!(prompt.len(), state.get_context().len() + 2);
        assert_eq!(prompt[0], state.get_context()[0]);
        assert_eq!(prompt[1].role, Role::System);
        assert!(prompt[1].content.starts_with("FILES:\n"));
        assert!(prompt[1].content.contains("pub fn f() {}"));
        assert_eq!(prompt.last().expect("history is not empty"), &Message::user("explain f"));
        // Query is not committed by building a prompt.
        assert_eq!(state.get_context().last().expect("history is not empty").role, Role::System);
    }

    #[test]
    fn prompt_without_context_is_history_plus_query() {
        let (_tmp, state) = fresh();
        let prompt = state.prompt_for("hi");
        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[1], Message::user("hi"));
    }

    #[test]
    fn rename_updates_id_only_on_success() {
        let (_tmp, mut state) = fresh();
        state.append_message(Role::User, "hello").expect("append message");
        state.store().save("taken", &SessionSnapshot::default()).expect("save session");

        assert!(state.rename("taken").is_err());
        assert_eq!(state.session_id(), "12-00-00");

        assert_eq!(state.rename("my: chat").expect("rename session"), "my chat");
        assert_eq!(state.session_id(), "my chat");
        assert!(state.store().exists("my chat"));
        assert!(!state.store().exists("12-00-00"));
    }

    #[test]
    fn rename_keeps_old_id_when_new_file_cannot_be_written() {
        let (_tmp, mut state) = fresh();
        state
            .append_message(Role::User, "keep me")
            .expect("initial save");
        fs::create_dir(state.store().dir().join("B.json.tmp"))
            .expect("block the temp file path");

        let result = state.rename("B");

        assert!(matches!(result, Err(RenameError::Storage(_))));
        assert_eq!(state.session_id(), "12-00-00");
        assert!(state.store().exists("12-00-00"));
        assert!(!state.store().exists("B"));
        let reloaded = state.store().load("12-00-00").snapshot;
        assert_eq!(reloaded.history.last(), Some(&Message::user("keep me")));
    }

    #[test]
    fn open_restores_saved_context() {
        let (_tmp, mut state) = fresh();
        state.attach_file_content("a.txt", "alpha").expect("attach file");

        let (reopened, origin) = ConversationState::open(state.store().clone(), "12-00-00");
        assert_eq!(origin, LoadOrigin::Existing);
        assert_eq!(reopened.project_context(), state.project_context());
        assert_eq!(reopened.get_context(), state.get_context());
    }
}
