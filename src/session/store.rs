use crate::error::{Error, RenameError, Result};
use crate::session::{
    default_history, enforce_cap, sanitize_session_id, Message, Role, SessionSnapshot,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where a loaded snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOrigin {
    /// Current `{history, project_context}` file.
    Existing,
    /// Bare message array written by older versions.
    Legacy,
    /// No file yet; default history.
    Fresh,
    /// The file was unreadable or invalid; default history was substituted.
    Recovered(String),
}

#[derive(Debug, Clone)]
pub struct Loaded {
    pub snapshot: SessionSnapshot,
    pub origin: LoadOrigin,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SessionFile {
    Legacy(Vec<Message>),
    Current(SessionSnapshot),
}

/// One JSON file per session under a single directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.session_path(session_id).exists()
    }

    fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Never fails: missing or broken files yield the default history.
    pub fn load(&self, session_id: &str) -> Loaded {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Loaded {
                snapshot: SessionSnapshot::default(),
                origin: LoadOrigin::Fresh,
            };
        }

        match read_session_file(&path) {
            Ok(loaded) => loaded,
            Err(reason) => {
                warn!(session_id, %reason, "session file unusable, starting from default history");
                Loaded {
                    snapshot: SessionSnapshot::default(),
                    origin: LoadOrigin::Recovered(reason),
                }
            }
        }
    }

    /// Overwrites the session file in full. Last write wins.
    pub fn save(&self, session_id: &str, snapshot: &SessionSnapshot) -> Result<()> {
        self.ensure_dir()?;
        let final_path = self.session_path(session_id);
        let tmp_path = self.dir.join(format!("{session_id}.json.tmp"));
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        fs::write(&tmp_path, bytes)?;
        match fs::rename(&tmp_path, &final_path) {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                if final_path.exists() {
                    fs::remove_file(&final_path)?;
                    fs::rename(&tmp_path, &final_path)?;
                    Ok(())
                } else {
                    Err(rename_err.into())
                }
            }
        }
    }

    /// Ids of every `*.json` file in the storage directory.
    pub fn list_sessions(&self) -> BTreeSet<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(dir = %self.dir.display(), %err, "failed to read sessions directory");
                }
                return BTreeSet::new();
            }
        };

        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension() == Some(OsStr::new("json")))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect()
    }

    /// Moves `old_id` to the sanitized `new_name` and rewrites it from `snapshot`.
    ///
    /// Returns the id actually used. On any error the store is left as it was.
    pub fn rename(
        &self,
        old_id: &str,
        new_name: &str,
        snapshot: &SessionSnapshot,
    ) -> std::result::Result<String, RenameError> {
        let new_id = sanitize_session_id(new_name);
        if new_id.is_empty() {
            return Err(RenameError::EmptyName);
        }
        if self.exists(&new_id) {
            return Err(RenameError::Taken(new_id));
        }
        let new_path = self.session_path(&new_id);

        let old_path = self.session_path(old_id);
        let moved = old_path.exists();
        if moved {
            fs::rename(&old_path, &new_path).map_err(Error::from)?;
        }

        if let Err(err) = self.save(&new_id, snapshot) {
            if moved {
                if let Err(revert_err) = fs::rename(&new_path, &old_path) {
                    warn!(old_id, new_id, %revert_err, "failed to restore session file after rename error");
                }
            } else {
                let _ = fs::remove_file(&new_path);
            }
            return Err(err.into());
        }

        info!(old_id, new_id, "session renamed");
        Ok(new_id)
    }

    /// Removes the session file. A missing file is not an error.
    pub fn delete(&self, session_id: &str) -> Result<()> {
        match fs::remove_file(self.session_path(session_id)) {
            Ok(()) => {
                info!(session_id, "session deleted");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn read_session_file(path: &Path) -> std::result::Result<Loaded, String> {
    let data = fs::read(path).map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    let file: SessionFile = serde_json::from_slice(&data)
        .map_err(|err| format!("failed to parse {}: {err}", path.display()))?;

    let (mut snapshot, origin) = match file {
        SessionFile::Legacy(history) => (
            SessionSnapshot {
                history,
                project_context: String::new(),
            },
            LoadOrigin::Legacy,
        ),
        SessionFile::Current(snapshot) => (snapshot, LoadOrigin::Existing),
    };

    if snapshot.history.is_empty() {
        return Err(format!("{} has an empty history", path.display()));
    }
    if snapshot.history[0].role != Role::System {
        let mut history = default_history();
        history.append(&mut snapshot.history);
        snapshot.history = history;
    }
    enforce_cap(&mut snapshot.history);

    Ok(Loaded { snapshot, origin })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{HISTORY_CAP, DEFAULT_SYSTEM_PROMPT};
    use tempfile::TempDir;

    fn store() -> (TempDir, SessionStore) {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = SessionStore::new(temp_dir.path().join("sessions"));
        (temp_dir, store)
    }

    fn sample_snapshot() -> SessionSnapshot {
        SessionSnapshot {
            history: vec![
                Message::system("be brief"),
                Message::user("hi"),
                Message::assistant("hello"),
            ],
            project_context: "\n--- FILE: a.rs ---\nfn main() {}\n".to_string(),
        }
    }

    #[test]
    fn load_missing_file_is_fresh_default() {
        let (_tmp, store) = store();
        let loaded = store.load("nope");
        assert_eq!(loaded.origin, LoadOrigin::Fresh);
        assert_eq!(loaded.snapshot.history, default_history());
        assert!(loaded.snapshot.project_context.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_tmp, store) = store();
        let snapshot = sample_snapshot();
        store.save("s1", &snapshot).expect("save session");

        let loaded = store.load("s1");
        assert_eq!(loaded.origin, LoadOrigin::Existing);
        assert_eq!(loaded.snapshot, snapshot);
    }

    #[test]
    fn save_writes_history_and_project_context_keys() {
        let (_tmp, store) = store();
        store.save("s1", &sample_snapshot()).expect("save session");

        let raw = fs::read_to_string(store.session_path("s1")).expect("read session file");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("session file is JSON");
        assert_eq!(value["history"][1]["role"], "user");
        assert_eq!(value["history"][1]["content"], "hi");
        assert!(value["project_context"].as_str().expect("project_context is a string").contains("FILE: a.rs"));
    }

    #[test]
    fn repeated_saves_keep_last_write() {
        let (_tmp, store) = store();
        let mut snapshot = sample_snapshot();
        store.save("s1", &snapshot).expect("save session");
        snapshot.history.push(Message::user("again"));
        store.save("s1", &snapshot).expect("save session");

        assert_eq!(store.load("s1").snapshot, snapshot);
        assert_eq!(store.list_sessions().len(), 1);
    }

    #[test]
    fn load_accepts_legacy_bare_array() {
        let (_tmp, store) = store();
        fs::create_dir_all(store.dir()).expect("create sessions dir");
        fs::write(
            store.session_path("old"),
            r#"[{"role":"system","content":"x"}]"#,
        )
        .expect("write fixture");

        let loaded = store.load("old");
        assert_eq!(loaded.origin, LoadOrigin::Legacy);
        assert_eq!(loaded.snapshot.history, vec![Message::system("x")]);
        assert_eq!(loaded.snapshot.project_context, "");
    }

    #[test]
    fn load_recovers_from_malformed_json() {
        let (_tmp, store) = store();
        fs::create_dir_all(store.dir()).expect("create sessions dir");
        fs::write(store.session_path("bad"), "{not json").expect("write fixture");

        let loaded = store.load("bad");
        assert!(matches!(loaded.origin, LoadOrigin::Recovered(_)));
        assert_eq!(loaded.snapshot, SessionSnapshot::default());
    }

    #[test]
    fn load_recovers_from_unknown_role() {
        let (_tmp, store) = store();
        fs::create_dir_all(store.dir()).expect("create sessions dir");
        fs::write(
            store.session_path("odd"),
            r#"{"history":[{"role":"wizard","content":"x"}],"project_context":""}"#,
        )
        .expect("write fixture");

        assert!(matches!(store.load("odd").origin, LoadOrigin::Recovered(_)));
    }

    #[test]
    fn load_prepends_preamble_and_applies_cap() {
        let (_tmp, store) = store();
        let history: Vec<Message> = (0..25).map(|i| Message::user(format!("u{i}"))).collect();
        fs::create_dir_all(store.dir()).expect("create sessions dir");
        fs::write(
            store.session_path("long"),
            serde_json::to_string(&history).expect("serialize history"),
        )
        .expect("write fixture");

        let loaded = store.load("long").snapshot;
        assert_eq!(loaded.history.len(), HISTORY_CAP);
        assert_eq!(loaded.history[0], Message::system(DEFAULT_SYSTEM_PROMPT));
        assert_eq!(loaded.history.last().expect("history is not empty").content, "u24");
    }

    #[test]
    fn list_sessions_only_reports_json_files() {
        let (_tmp, store) = store();
        store.save("alpha", &sample_snapshot()).expect("save session");
        store.save("beta", &sample_snapshot()).expect("save session");
        fs::write(store.dir().join("notes.txt"), "x").expect("write fixture");
        fs::write(store.dir().join("gamma.json.tmp"), "x").expect("write fixture");

        let ids: Vec<String> = store.list_sessions().into_iter().collect();
        assert_eq!(ids, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn list_sessions_without_directory_is_empty() {
        let (_tmp, store) = store();
        assert!(store.list_sessions().is_empty());
    }

    #[test]
    fn rename_moves_existing_file() {
        let (_tmp, store) = store();
        let snapshot = sample_snapshot();
        store.save("10-00-00", &snapshot).expect("save session");

        let new_id = store.rename("10-00-00", "sorting help", &snapshot).expect("rename session");
        assert_eq!(new_id, "sorting help");
        assert!(!store.exists("10-00-00"));
        assert_eq!(store.load("sorting help").snapshot, snapshot);
    }

    #[test]
    fn rename_of_unsaved_session_creates_file() {
        let (_tmp, store) = store();
        let snapshot = SessionSnapshot::default();

        store.rename("never-saved", "fresh", &snapshot).expect("rename session");
        assert!(store.exists("fresh"));
        assert!(!store.exists("never-saved"));
    }

    #[test]
    fn rename_rejects_taken_name_without_touching_files() {
        let (_tmp, store) = store();
        let a = sample_snapshot();
        let mut c = sample_snapshot();
        c.history.push(Message::user("c only"));
        store.save("A", &a).expect("save session");
        store.save("C", &c).expect("save session");

        store.rename("A", "B", &a).expect("rename session");
        let err = store.rename("C", "B", &c).expect_err("target name is taken");

        assert!(matches!(err, RenameError::Taken(ref id) if id == "B"));
        assert_eq!(store.load("C").snapshot, c);
        assert_eq!(store.load("B").snapshot, a);
    }

    #[test]
    fn rename_sanitizes_target() {
        let (_tmp, store) = store();
        let snapshot = sample_snapshot();
        store.save("s", &snapshot).expect("save session");

        let new_id = store.rename("s", "../evil:name!", &snapshot).expect("rename session");
        assert_eq!(new_id, "evilname");
        assert!(store.exists("evilname"));
        assert!(!store.dir().parent().expect("sessions dir has a parent").join("evil:name!.json").exists());
    }

    #[test]
    fn rename_rejects_empty_sanitized_name() {
        let (_tmp, store) = store();
        let snapshot = sample_snapshot();
        store.save("s", &snapshot).expect("save session");

        assert!(matches!(
            store.rename("s", " !?/ ", &snapshot),
            Err(RenameError::EmptyName)
        ));
        assert!(store.exists("s"));
    }

    #[test]
    fn failed_rename_restores_original_file() {
        let (_tmp, store) = store();
        let snapshot = sample_snapshot();
        store.save("A", &snapshot).expect("save A");
        fs::create_dir(store.dir().join("B.json.tmp")).expect("block the temp file path");

        let err = store
            .rename("A", "B", &snapshot)
            .expect_err("saving B must fail");

        assert!(matches!(err, RenameError::Storage(_)));
        assert!(store.exists("A"));
        assert!(!store.exists("B"));
        assert_eq!(store.load("A").snapshot, snapshot);
    }

    #[test]
    fn failed_rename_of_unsaved_session_leaves_nothing_behind() {
        let (_tmp, store) = store();
        fs::create_dir_all(store.dir().join("B.json.tmp")).expect("block the temp file path");

        let result = store.rename("A", "B", &SessionSnapshot::default());

        assert!(matches!(result, Err(RenameError::Storage(_))));
        assert!(!store.exists("A"));
        assert!(!store.exists("B"));
    }

    #[test]
    fn load_keeps_context_when_history_is_missing() {
        let (_tmp, store) = store();
        fs::create_dir_all(store.dir()).expect("create sessions dir");
        fs::write(store.session_path("ctx"), r#"{"project_context":"notes"}"#)
            .expect("write session fixture");

        let loaded = store.load("ctx");
        assert_eq!(loaded.origin, LoadOrigin::Existing);
        assert_eq!(loaded.snapshot.history, default_history());
        assert_eq!(loaded.snapshot.project_context, "notes");
    }

    #[test]
    fn delete_removes_file_and_tolerates_missing() {
        let (_tmp, store) = store();
        store.save("gone", &sample_snapshot()).expect("save session");

        store.delete("gone").expect("delete session");
        assert!(!store.exists("gone"));
        store.delete("gone").expect("delete session");
    }
}
