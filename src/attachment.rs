use std::fs;
use std::io::Read;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::warn;

use crate::error::{GcliError, Result};
use crate::history::Part;

/// Most attachments that can wait for the next prompt.
pub const ATTACHMENT_LIMIT: usize = 1024;
/// Name given to text read from standard input.
pub const STDIN_NAME: &str = "stdin";

/// Relative path without parent traversal.
pub fn is_path_safe(path: &str) -> bool {
    if path.is_empty() || path.contains("..") {
        return false;
    }
    if path.starts_with('/') {
        return false;
    }
    if cfg!(windows) {
        let bytes = path.as_bytes();
        if path.starts_with('\\') || (bytes.len() > 1 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':') {
            return false;
        }
    }
    true
}

pub fn ensure_safe_path(path: &str) -> Result<()> {
    if is_path_safe(path) {
        Ok(())
    } else {
        Err(GcliError::UnsafePath(path.to_owned()))
    }
}

/// MIME type guessed from the file extension; unknown types are `text/plain`.
pub fn mime_type(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("html") => "text/html",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "text/plain",
    }
}

/// How attachments are carried to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Text spliced into the prompt between marker lines (key-free endpoint).
    Framed,
    /// Base64 `inlineData` part (official API).
    Inline,
}

impl Encoding {
    pub fn for_free_mode(free_mode: bool) -> Self {
        if free_mode {
            Encoding::Framed
        } else {
            Encoding::Inline
        }
    }
}

pub fn frame_pasted(text: &str) -> String {
    format!("\n--- Pasted Text ---\n{text}\n--- End of Pasted Text ---\n")
}

pub fn frame_file(name: &str, text: &str) -> String {
    format!("\n--- Attached File: {name} ---\n{text}\n--- End of File ---\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub size: usize,
    pub part: Part,
}

impl Attachment {
    fn new(name: &str, mime_type: &str, bytes: &[u8], encoding: Encoding) -> Self {
        let part = match encoding {
            Encoding::Framed => {
                let text = String::from_utf8_lossy(bytes);
                if name == STDIN_NAME {
                    Part::text(frame_pasted(&text))
                } else {
                    Part::text(frame_file(name, &text))
                }
            }
            Encoding::Inline => Part::file(name, mime_type, STANDARD.encode(bytes)),
        };
        let mime_type = match encoding {
            Encoding::Framed => "text/plain",
            Encoding::Inline => mime_type,
        };
        Self {
            name: name.to_owned(),
            mime_type: mime_type.to_owned(),
            size: bytes.len(),
            part,
        }
    }
}

/// Attachments waiting to be sent with the next prompt.
#[derive(Debug, Clone, Default)]
pub struct Attachments {
    items: Vec<Attachment>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a file from disk. Path safety is the caller's concern.
    pub fn add_file(&mut self, path: &str, encoding: Encoding) -> Result<Option<&Attachment>> {
        self.check_limit()?;
        let bytes = fs::read(path)?;
        if bytes.is_empty() {
            warn!(path, "file is empty or invalid; attachment skipped");
            return Ok(None);
        }
        self.add_bytes(path, mime_type(path), &bytes, encoding)
    }

    /// Attach everything `reader` yields until end of input.
    pub fn add_reader<R: Read>(
        &mut self,
        mut reader: R,
        name: &str,
        encoding: Encoding,
    ) -> Result<Option<&Attachment>> {
        self.check_limit()?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.add_bytes(name, "text/plain", &bytes, encoding)
    }

    fn add_bytes(
        &mut self,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
        encoding: Encoding,
    ) -> Result<Option<&Attachment>> {
        if bytes.is_empty() {
            warn!(name, "no data received from input stream; attachment skipped");
            return Ok(None);
        }
        self.items.push(Attachment::new(name, mime_type, bytes, encoding));
        Ok(self.items.last())
    }

    fn check_limit(&self) -> Result<()> {
        if self.items.len() >= ATTACHMENT_LIMIT {
            return Err(GcliError::AttachmentLimit(ATTACHMENT_LIMIT));
        }
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<Attachment> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attachment> {
        self.items.iter()
    }

    /// Text of framed attachments, concatenated in attach order.
    pub fn framed_text(&self) -> String {
        self.items
            .iter()
            .filter_map(|item| item.part.as_text())
            .collect()
    }

    /// Parts of every pending attachment, leaving the list empty.
    pub fn take_parts(&mut self) -> Vec<Part> {
        self.items.drain(..).map(|item| item.part).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        assert!(is_path_safe("notes/today.md"));
        assert!(!is_path_safe(""));
        assert!(!is_path_safe("../secret"));
        assert!(!is_path_safe("a/../../b"));
        assert!(!is_path_safe("/etc/passwd"));
    }

    #[test]
    fn mime_types_follow_extension() {
        assert_eq!(mime_type("main.RS"), "text/plain");
        assert_eq!(mime_type("photo.JPEG"), "image/jpeg");
        assert_eq!(mime_type("doc.pdf"), "application/pdf");
        assert_eq!(mime_type("data.json"), "application/json");
        assert_eq!(mime_type("Makefile"), "text/plain");
        assert_eq!(mime_type("archive.tar.zst"), "text/plain");
    }

    #[test]
    fn stdin_is_framed_as_pasted_text() {
        let mut pending = Attachments::new();
        let item = pending
            .add_reader(Cursor::new("hello"), STDIN_NAME, Encoding::Framed)
            .unwrap()
            .unwrap();
        assert_eq!(
            item.part,
            Part::text("\n--- Pasted Text ---\nhello\n--- End of Pasted Text ---\n")
        );
    }

    #[test]
    fn inline_encoding_is_base64() {
        let mut pending = Attachments::new();
        let item = pending
            .add_reader(Cursor::new("hi"), "note.txt", Encoding::Inline)
            .unwrap()
            .unwrap();
        assert_eq!(item.part, Part::file("note.txt", "text/plain", "aGk=".into()));
        assert_eq!(item.size, 2);
    }

    #[test]
    fn empty_input_is_skipped() {
        let mut pending = Attachments::new();
        assert!(pending
            .add_reader(Cursor::new(""), STDIN_NAME, Encoding::Framed)
            .unwrap()
            .is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn remove_out_of_range_is_none() {
        let mut pending = Attachments::new();
        pending
            .add_reader(Cursor::new("x"), "a.txt", Encoding::Framed)
            .unwrap();
        assert!(pending.remove(3).is_none());
        assert_eq!(pending.remove(0).map(|item| item.name), Some("a.txt".to_owned()));
    }
}
