use crate::attachment::{read_attachment, SOURCE_EXTENSIONS};
use crate::chat::{ChatOrchestrator, TurnEvent, TurnHandle};
use crate::error::{Error, RenameError};
use crate::session::state::ConversationState;
use crate::session::store::{LoadOrigin, SessionStore};
use crate::session::{generate_session_id, is_generated_id, sanitize_session_id, title_from_query};
use crate::theme::Theme;
use crate::transcript::{entries_from_history, split_code_blocks, EntryKind, Segment, TranscriptEntry};
use chrono::Local;
use eframe::egui::{self, Color32, Margin, RichText, ScrollArea};
use rfd::FileDialog;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Status {
    Idle,
    Thinking,
    TextCopied,
    Failed(String),
}

struct RenameDraft {
    target: String,
    name: String,
}

pub struct CodechatApp {
    store: SessionStore,
    orchestrator: ChatOrchestrator,
    /// `None` while a turn owns the session.
    session: Option<ConversationState>,
    active_id: String,
    sessions: BTreeSet<String>,
    transcript: Vec<TranscriptEntry>,
    in_progress_reply: String,
    turn: Option<TurnHandle>,
    input_buffer: String,
    status: Status,
    diagnostics_log: Vec<String>,
    rename_draft: Option<RenameDraft>,
    pending_delete: Option<String>,
    theme: Theme,
    scroll_to_bottom: bool,
}

impl CodechatApp {
    pub fn new(store: SessionStore, orchestrator: ChatOrchestrator, theme: Theme) -> Self {
        let sessions = store.list_sessions();
        let active_id = generate_session_id(&sessions);
        let session = ConversationState::create(store.clone(), active_id.clone());
        let transcript = entries_from_history(session.get_context());

        Self {
            store,
            orchestrator,
            session: Some(session),
            active_id,
            sessions,
            transcript,
            in_progress_reply: String::new(),
            turn: None,
            input_buffer: String::new(),
            status: Status::Idle,
            diagnostics_log: Vec::new(),
            rename_draft: None,
            pending_delete: None,
            theme,
            scroll_to_bottom: false,
        }
    }

    fn is_busy(&self) -> bool {
        self.turn.is_some()
    }

    fn log_diagnostic(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.diagnostics_log
            .push(format!("[{}] {}", Local::now().format("%H:%M:%S"), message));
    }

    fn refresh_sessions(&mut self) {
        self.sessions = self.store.list_sessions();
    }

    /// Saved ids plus the active one, which may not have a file yet.
    fn taken_ids(&self) -> BTreeSet<String> {
        let mut ids = self.sessions.clone();
        ids.insert(self.active_id.clone());
        ids
    }

    fn create_new_session(&mut self) {
        let session_id = generate_session_id(&self.taken_ids());
        info!(session_id = %session_id, "new session");
        self.activate(ConversationState::create(self.store.clone(), session_id));
    }

    fn switch_session(&mut self, session_id: &str) {
        if self.is_busy() {
            return;
        }
        let (session, origin) = ConversationState::open(self.store.clone(), session_id);
        if let LoadOrigin::Recovered(reason) = origin {
            self.log_diagnostic(format!(
                "session '{session_id}' could not be read, started fresh: {reason}"
            ));
        }
        self.activate(session);
    }

    fn activate(&mut self, session: ConversationState) {
        self.active_id = session.session_id().to_string();
        self.transcript = entries_from_history(session.get_context());
        self.session = Some(session);
        self.in_progress_reply.clear();
        self.status = Status::Idle;
        self.scroll_to_bottom = true;
        self.refresh_sessions();
    }

    fn rename_session(&mut self, target: &str, new_name: &str) {
        if self.is_busy() {
            return;
        }
        let new_id = sanitize_session_id(new_name);
        if target != self.active_id && new_id == self.active_id {
            let err = RenameError::Taken(new_id);
            self.log_diagnostic(format!("rename of '{target}' rejected: {err}"));
            return;
        }
        let result = match self.session.as_mut() {
            Some(session) if session.session_id() == target => session.rename(new_name),
            _ => ConversationState::open(self.store.clone(), target)
                .0
                .rename(new_name),
        };

        match result {
            Ok(new_id) => {
                if target == self.active_id {
                    self.active_id = new_id;
                }
            }
            Err(err) => self.log_diagnostic(format!("rename of '{target}' rejected: {err}")),
        }
        self.refresh_sessions();
    }

    fn delete_session(&mut self, session_id: &str) {
        if self.is_busy() {
            return;
        }
        if let Err(err) = self.store.delete(session_id) {
            self.log_diagnostic(format!("failed to delete '{session_id}': {err}"));
            return;
        }
        if session_id == self.active_id {
            self.create_new_session();
        } else {
            self.refresh_sessions();
        }
    }

    fn pick_attachment(&mut self) {
        let picked = FileDialog::new()
            .set_title("Attach file")
            .add_filter("Code Files", SOURCE_EXTENSIONS)
            .add_filter("All Files", &["*"])
            .pick_file();
        match picked {
            Some(path) => self.attach_file(&path),
            None => debug!("attachment picker dismissed"),
        }
    }

    fn attach_file(&mut self, path: &Path) {
        if self.session.is_none() {
            return;
        }

        let attachment = match read_attachment(path) {
            Ok(attachment) => attachment,
            Err(err) => {
                self.status = Status::Failed(err.to_string());
                self.log_diagnostic(err.to_string());
                return;
            }
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let saved = session.attach_file_content(&attachment.name, &attachment.content);
        let notice = session.get_context().last().map(|message| message.content.clone());

        if let Some(notice) = notice {
            self.transcript
                .push(TranscriptEntry::new(EntryKind::Notice, notice));
        }
        if let Err(err) = saved {
            self.log_diagnostic(format!("failed to persist session: {err}"));
        }
        self.scroll_to_bottom = true;
        self.refresh_sessions();
    }

    fn submit_prompt(&mut self, ctx: &egui::Context) {
        let query = self.input_buffer.trim().to_string();
        if query.is_empty() || self.is_busy() {
            return;
        }
        let Some(mut session) = self.session.take() else {
            return;
        };

        if is_generated_id(session.session_id()) {
            if let Some(title) = title_from_query(&query) {
                match session.rename(&title) {
                    Ok(new_id) => self.active_id = new_id,
                    Err(err) => debug!(%err, "auto title skipped"),
                }
            }
        }

        self.transcript
            .push(TranscriptEntry::new(EntryKind::User, &query));
        self.in_progress_reply.clear();
        self.input_buffer.clear();
        self.status = Status::Thinking;
        self.scroll_to_bottom = true;

        let repaint = ctx.clone();
        self.turn = Some(
            self.orchestrator
                .spawn_turn(session, query, move || repaint.request_repaint()),
        );
        self.refresh_sessions();
    }

    fn drain_turn_events(&mut self) {
        while let Some(event) = self.turn.as_ref().and_then(TurnHandle::try_next) {
            match event {
                TurnEvent::Fragment(fragment) => {
                    self.in_progress_reply.push_str(&fragment);
                    self.scroll_to_bottom = true;
                }
                TurnEvent::Finished { state, result } => {
                    self.turn = None;
                    self.active_id = state.session_id().to_string();
                    self.session = Some(*state);
                    let partial = std::mem::take(&mut self.in_progress_reply);

                    match result {
                        Ok(reply) => {
                            self.transcript
                                .push(TranscriptEntry::new(EntryKind::Agent, reply.text));
                            if let Some(warning) = reply.persist_warning {
                                self.log_diagnostic(format!("failed to persist session: {warning}"));
                            }
                            self.status = Status::Idle;
                        }
                        Err(err) => {
                            if !partial.is_empty() {
                                self.transcript.push(TranscriptEntry::new(
                                    EntryKind::Agent,
                                    format!("{partial}\n(discarded)"),
                                ));
                            }
                            let message = match err {
                                Error::Cancelled => "Cancelled".to_string(),
                                other => format!("Error: {other}"),
                            };
                            self.transcript
                                .push(TranscriptEntry::new(EntryKind::Error, &message));
                            self.status = Status::Failed(message);
                        }
                    }
                    self.scroll_to_bottom = true;
                    self.refresh_sessions();
                }
                TurnEvent::Abandoned => {
                    self.turn = None;
                    self.in_progress_reply.clear();
                    let message = "Error: the reply task stopped unexpectedly".to_string();
                    self.log_diagnostic(format!(
                        "turn for '{}' abandoned, reloading the session from disk",
                        self.active_id
                    ));
                    let (session, origin) =
                        ConversationState::open(self.store.clone(), self.active_id.clone());
                    if let LoadOrigin::Recovered(reason) = origin {
                        self.log_diagnostic(format!("session could not be read: {reason}"));
                    }
                    self.session = Some(session);
                    self.transcript
                        .push(TranscriptEntry::new(EntryKind::Error, &message));
                    self.status = Status::Failed(message);
                    self.scroll_to_bottom = true;
                    self.refresh_sessions();
                }
            }
        }
    }

    fn status_label(&self) -> (String, Color32) {
        match &self.status {
            Status::Idle => ("SYSTEM STATUS: IDLE".to_string(), self.theme.text_muted),
            Status::Thinking => ("SYSTEM STATUS: THINKING...".to_string(), self.theme.accent_agent),
            Status::TextCopied => ("SYSTEM STATUS: TEXT COPIED".to_string(), self.theme.accent_user),
            Status::Failed(message) => (format!("SYSTEM STATUS: {message}"), self.theme.danger),
        }
    }

    fn render_left_panel(&mut self, ctx: &egui::Context) {
        let idle = !self.is_busy();
        let mut new_session = false;
        let mut clicked_session: Option<String> = None;
        let mut commit_rename: Option<(String, String)> = None;
        let mut cancel_rename = false;
        let mut start_rename: Option<String> = None;

        egui::SidePanel::left("session_panel")
            .resizable(true)
            .default_width(240.0)
            .frame(
                egui::Frame::new()
                    .fill(self.theme.surface_0)
                    .inner_margin(Margin::same(12)),
            )
            .show(ctx, |ui| {
                ui.add_enabled_ui(idle, |ui| {
                    let button = egui::Button::new(RichText::new("+ New Session").strong())
                        .fill(self.theme.new_session);
                    if ui.add(button).clicked() {
                        new_session = true;
                    }
                    ui.separator();

                    ScrollArea::vertical()
                        .id_salt("session_list")
                        .show(ui, |ui| {
                            for session_id in &self.sessions {
                                ui.horizontal(|ui| {
                                    if let Some(draft) = self
                                        .rename_draft
                                        .as_mut()
                                        .filter(|draft| &draft.target == session_id)
                                    {
                                        let response = ui.add(
                                            egui::TextEdit::singleline(&mut draft.name)
                                                .desired_width(130.0),
                                        );
                                        let submitted = response.lost_focus()
                                            && ui.input(|i| i.key_pressed(egui::Key::Enter));
                                        if ui.small_button("OK").clicked() || submitted {
                                            commit_rename =
                                                Some((draft.target.clone(), draft.name.clone()));
                                        }
                                        if ui.small_button("Cancel").clicked() {
                                            cancel_rename = true;
                                        }
                                        return;
                                    }

                                    let selected = *session_id == self.active_id;
                                    if ui.selectable_label(selected, session_id.as_str()).clicked() {
                                        clicked_session = Some(session_id.clone());
                                    }
                                    if ui.small_button("✏").on_hover_text("Rename").clicked() {
                                        start_rename = Some(session_id.clone());
                                    }
                                    let delete = egui::Button::new("X").fill(self.theme.danger);
                                    if ui.add(delete).clicked() {
                                        self.pending_delete = Some(session_id.clone());
                                    }
                                });
                            }
                        });
                });
            });

        if new_session {
            self.create_new_session();
        }
        if let Some(session_id) = clicked_session {
            self.switch_session(&session_id);
        }
        if let Some(target) = start_rename {
            self.rename_draft = Some(RenameDraft {
                name: target.clone(),
                target,
            });
        }
        if cancel_rename {
            self.rename_draft = None;
        }
        if let Some((target, name)) = commit_rename {
            self.rename_draft = None;
            self.rename_session(&target, &name);
        }
    }

    fn render_delete_dialog(&mut self, ctx: &egui::Context) {
        let Some(session_id) = self.pending_delete.clone() else {
            return;
        };
        let mut confirmed = false;
        let mut dismissed = false;

        egui::Window::new("Delete")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(format!("Delete {session_id}?"));
                ui.horizontal(|ui| {
                    confirmed = ui.button("Yes").clicked();
                    dismissed = ui.button("No").clicked();
                });
            });

        if confirmed {
            self.pending_delete = None;
            self.delete_session(&session_id);
        } else if dismissed {
            self.pending_delete = None;
        }
    }

    fn render_entry(&self, ui: &mut egui::Ui, entry: &TranscriptEntry) -> bool {
        let color = self.theme.entry_color(entry.kind);
        let mut copy_requested = false;

        match entry.kind {
            EntryKind::Notice | EntryKind::Error => {
                ui.label(RichText::new(&entry.text).color(color));
            }
            EntryKind::User => {
                ui.label(RichText::new(Theme::entry_label(entry.kind)).color(color).strong());
                ui.label(&entry.text);
            }
            EntryKind::Agent => {
                ui.horizontal(|ui| {
                    ui.label(RichText::new(Theme::entry_label(entry.kind)).color(color).strong());
                    copy_requested = ui.small_button("📋 Copy").clicked();
                });
                self.render_reply_text(ui, &entry.text);
            }
        }
        ui.add_space(self.theme.spacing_8);
        copy_requested
    }

    fn render_reply_text(&self, ui: &mut egui::Ui, text: &str) {
        for segment in split_code_blocks(text) {
            match segment {
                Segment::Text(text) => {
                    ui.label(text);
                }
                Segment::Code { language, body } => {
                    self.theme.code_frame().show(ui, |ui| {
                        if let Some(language) = language {
                            ui.label(RichText::new(language).small().color(self.theme.text_muted));
                        }
                        ui.label(RichText::new(body).monospace());
                    });
                }
            }
        }
    }

    fn render_center_panel(&mut self, ctx: &egui::Context) {
        let (status_text, status_color) = self.status_label();
        let mut copy_text: Option<String> = None;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.label(RichText::new(status_text).small().color(status_color));
            });
            ui.separator();

            let transcript_height = (ui.available_height() - 190.0).max(120.0);
            ScrollArea::vertical()
                .id_salt("chat_transcript")
                .max_height(transcript_height)
                .stick_to_bottom(true)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    for entry in &self.transcript {
                        if self.render_entry(ui, entry) {
                            copy_text = Some(entry.text.clone());
                        }
                    }

                    if self.is_busy() {
                        let label = Theme::entry_label(EntryKind::Agent);
                        ui.label(RichText::new(label).color(self.theme.accent_agent).strong());
                        self.render_reply_text(ui, &self.in_progress_reply);
                    }

                    if self.scroll_to_bottom {
                        ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                    }
                });
            self.scroll_to_bottom = false;

            ui.separator();
            egui::CollapsingHeader::new("Diagnostics")
                .default_open(false)
                .show(ui, |ui| {
                    ScrollArea::vertical()
                        .id_salt("diagnostics_log")
                        .max_height(90.0)
                        .stick_to_bottom(true)
                        .show(ui, |ui| {
                            for entry in &self.diagnostics_log {
                                ui.label(entry);
                            }
                        });
                });

            let idle = !self.is_busy();
            let mut attach_now = false;
            let mut send_now = false;
            let mut cancel_now = false;

            self.theme.composer_frame().show(ui, |ui| {
                ui.horizontal(|ui| {
                    attach_now = ui
                        .add_enabled(idle, egui::Button::new("+"))
                        .on_hover_text("Attach file")
                        .clicked();

                    let hint = if idle {
                        "Ask about your code..."
                    } else {
                        "Waiting for response..."
                    };
                    let response = ui.add_enabled(
                        idle,
                        egui::TextEdit::singleline(&mut self.input_buffer)
                            .desired_width(ui.available_width() - 70.0)
                            .hint_text(hint),
                    );
                    if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                        send_now = true;
                    }

                    if idle {
                        send_now |= ui
                            .add_enabled(
                                !self.input_buffer.trim().is_empty(),
                                egui::Button::new("Send"),
                            )
                            .clicked();
                    } else {
                        cancel_now = ui.button("Cancel").clicked();
                    }
                });
            });

            if attach_now && idle {
                self.pick_attachment();
            }
            if send_now && idle {
                self.submit_prompt(ctx);
            }
            if cancel_now {
                if let Some(turn) = &self.turn {
                    info!(query = %turn.query(), "cancel requested");
                    turn.cancel();
                }
            }
        });

        if let Some(text) = copy_text {
            ctx.copy_text(text);
            self.status = Status::TextCopied;
        }
    }
}

impl eframe::App for CodechatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_turn_events();
        self.render_left_panel(ctx);
        self.render_center_panel(ctx);
        self.render_delete_dialog(ctx);
    }
}
