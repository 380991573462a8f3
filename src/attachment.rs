use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Extensions of the "Code Files" filter offered first by the file picker.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "java", "js", "ts", "html", "css", "txt", "rs", "go", "c", "cpp", "h", "md", "json",
    "toml",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content: String,
}

/// Reads a local file as text. Invalid UTF-8 sequences are dropped.
pub fn read_attachment(path: &Path) -> Result<Attachment> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Attachment(format!("{} is not a file path", path.display())))?;
    let bytes = fs::read(path)
        .map_err(|err| Error::Attachment(format!("failed to read {}: {err}", path.display())))?;

    Ok(Attachment {
        name,
        content: decode_ignoring_invalid(&bytes),
    })
}

fn decode_ignoring_invalid(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}
