use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub mod state;
pub mod store;

/// Maximum number of messages kept in a session, preamble included.
pub const HISTORY_CAP: usize = 20;

/// Prefix of the system message recorded when a file is attached.
pub const ATTACHMENT_MARKER: &str = "📎";

const TITLE_QUERY_CHARS: usize = 25;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a Pragmatic Senior Developer with 'Adaptive Complexity' logic. \
Follow these rules for every request:\n\
1. ANALYZE SCALE: Determine if the task is a 'Simple Logic/Algorithm' or a 'Production System'.\n\
2. SIMPLE TASKS: If the request is a basic algorithm (e.g., prime numbers, sorting, math), provide a clean, standard solution.\n\
3. PRODUCTION TASKS: If the request involves I/O, Web, or API work, use robust patterns.\n\
4. LANGUAGE INTEGRITY: Never suggest libraries from one language when writing in another.\n\
5. BE CONCISE: Avoid fluff. Focus on high-quality, idiomatic code.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_attachment_notice(&self) -> bool {
        self.role == Role::System && self.content.starts_with(ATTACHMENT_MARKER)
    }
}

/// Persisted contents of one session file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default = "default_history")]
    pub history: Vec<Message>,
    #[serde(default)]
    pub project_context: String,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            history: default_history(),
            project_context: String::new(),
        }
    }
}

pub fn default_history() -> Vec<Message> {
    vec![Message::system(DEFAULT_SYSTEM_PROMPT)]
}

/// Keeps the leading system message and the most recent `HISTORY_CAP - 1` others.
pub fn enforce_cap(history: &mut Vec<Message>) {
    if history.len() > HISTORY_CAP {
        let excess = history.len() - HISTORY_CAP;
        history.drain(1..=excess);
    }
}

/// Strips everything but alphanumerics, spaces, hyphens and underscores, then trims.
pub fn sanitize_session_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Session title derived from the first characters of a query.
pub fn title_from_query(query: &str) -> Option<String> {
    let head: String = query.chars().take(TITLE_QUERY_CHARS).collect();
    let title = sanitize_session_id(&head);
    (!title.is_empty()).then_some(title)
}

/// Time-based id (`HH-MM-SS`) that does not collide with `existing`.
pub fn generate_session_id(existing: &BTreeSet<String>) -> String {
    unique_id(Local::now().format("%H-%M-%S").to_string(), existing)
}

fn unique_id(base: String, existing: &BTreeSet<String>) -> String {
    if !existing.contains(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or(base)
}

/// True while a session still carries an id produced by [`generate_session_id`].
pub fn is_generated_id(id: &str) -> bool {
    let parts: Vec<&str> = id.split('-').collect();
    if !(3..=4).contains(&parts.len()) {
        return false;
    }
    let clock_ok = parts[..3]
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_digit()));
    let suffix_ok = parts
        .get(3)
        .map_or(true, |part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    clock_ok && suffix_ok
}
