use crate::session::{Message, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Agent,
    /// Attachment notices and other status lines.
    Notice,
    /// A failed turn. Shown once, never persisted.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub kind: EntryKind,
    pub text: String,
}

impl TranscriptEntry {
    pub fn new(kind: EntryKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Rebuilds the visible transcript of a stored history.
///
/// The preamble and any other plain system messages stay hidden.
pub fn entries_from_history(history: &[Message]) -> Vec<TranscriptEntry> {
    history
        .iter()
        .filter_map(|message| match message.role {
            Role::User => Some(TranscriptEntry::new(EntryKind::User, &message.content)),
            Role::Assistant => Some(TranscriptEntry::new(EntryKind::Agent, &message.content)),
            Role::System if message.is_attachment_notice() => {
                Some(TranscriptEntry::new(EntryKind::Notice, &message.content))
            }
            Role::System => None,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Code {
        language: Option<&'a str>,
        body: &'a str,
    },
}

/// Splits reply text on ``` fences. An unterminated fence runs to the end.
pub fn split_code_blocks(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        if open > 0 {
            segments.push(Segment::Text(&rest[..open]));
        }
        let after_fence = &rest[open + 3..];
        let (info, body_start) = match after_fence.find('\n') {
            Some(newline) => (after_fence[..newline].trim(), &after_fence[newline + 1..]),
            None => ("", after_fence),
        };
        let language = (!info.is_empty()).then_some(info);

        match body_start.find("```") {
            Some(close) => {
                let body = body_start[..close].strip_suffix('\n').unwrap_or(&body_start[..close]);
                segments.push(Segment::Code { language, body });
                rest = &body_start[close + 3..];
            }
            None => {
                segments.push(Segment::Code {
                    language,
                    body: body_start,
                });
                rest = "";
            }
        }
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}
