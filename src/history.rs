//! Conversation history and its on-disk document.
//!
//! The saved document is the same object sent to the API: `contents`,
//! `systemInstruction`, `tools` and `generationConfig`. Only the first two
//! are read back.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::error::{GcliError, Result};
use crate::request::GenerateRequest;

pub const ROLE_USER: &str = "user";
pub const ROLE_MODEL: &str = "model";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
        /// Display name; never serialized.
        #[serde(skip)]
        filename: Option<String>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn file(filename: impl Into<String>, mime_type: impl Into<String>, data: String) -> Self {
        Part::File {
            inline_data: InlineData {
                mime_type: mime_type.into(),
                data,
            },
            filename: Some(filename.into()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            Part::File { .. } => None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Part::File { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: ROLE_USER.to_owned(),
            parts,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ROLE_MODEL.to_owned(),
            parts: vec![Part::text(text)],
        }
    }

    /// Text of the first part, when that part is text.
    pub fn leading_text(&self) -> Option<&str> {
        self.parts.first().and_then(Part::as_text)
    }
}

/// `user` becomes `User`.
pub fn role_title(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Address of one part inside the history, written `msg:part`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartId {
    pub message: usize,
    pub part: usize,
}

impl FromStr for PartId {
    type Err = PartIdError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let (message, part) = raw.split_once(':').ok_or(PartIdError::Format)?;
        Ok(Self {
            message: message.trim().parse().map_err(|_| PartIdError::Format)?,
            part: part.trim().parse().map_err(|_| PartIdError::Format)?,
        })
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.message, self.part)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartIdError {
    #[error("Invalid ID format. Use <msg_idx:part_idx>.")]
    Format,
    #[error("Invalid message index {0}.")]
    Message(usize),
    #[error("Invalid part index {part} for message {message}.")]
    Part { message: usize, part: usize },
    #[error("Part [{0}] is not a file attachment.")]
    NotAFile(PartId),
}

/// A file part found in the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryAttachment<'a> {
    pub id: PartId,
    pub role: &'a str,
    pub filename: Option<&'a str>,
    pub mime_type: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    contents: Vec<Content>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_contents(contents: Vec<Content>) -> Self {
        Self { contents }
    }

    pub fn contents(&self) -> &[Content] {
        &self.contents
    }

    pub fn push(&mut self, content: Content) {
        self.contents.push(content);
    }

    /// Drop the most recent turn, e.g. a user turn whose request failed.
    pub fn pop(&mut self) -> Option<Content> {
        self.contents.pop()
    }

    pub fn clear(&mut self) {
        self.contents.clear();
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Bytes of leading text across all turns; what the key-free endpoint receives.
    pub fn text_len(&self) -> usize {
        self.contents
            .iter()
            .filter_map(Content::leading_text)
            .map(str::len)
            .sum()
    }

    pub fn attachments(&self) -> Vec<HistoryAttachment<'_>> {
        let mut found = Vec::new();
        for (message, content) in self.contents.iter().enumerate() {
            for (part, item) in content.parts.iter().enumerate() {
                if let Part::File {
                    inline_data,
                    filename,
                } = item
                {
                    found.push(HistoryAttachment {
                        id: PartId { message, part },
                        role: &content.role,
                        filename: filename.as_deref(),
                        mime_type: &inline_data.mime_type,
                    });
                }
            }
        }
        found
    }

    pub fn remove_attachment(&mut self, id: PartId) -> std::result::Result<Part, PartIdError> {
        let content = self
            .contents
            .get_mut(id.message)
            .ok_or(PartIdError::Message(id.message))?;
        let part = content.parts.get(id.part).ok_or(PartIdError::Part {
            message: id.message,
            part: id.part,
        })?;
        if !part.is_file() {
            return Err(PartIdError::NotAFile(id));
        }
        Ok(content.parts.remove(id.part))
    }

    pub fn to_markdown(&self, system_prompt: Option<&str>) -> String {
        let mut out = String::new();
        if let Some(prompt) = system_prompt {
            out.push_str(&format!("## System Prompt\n\n```\n{prompt}\n```\n\n---\n\n"));
        }

        for (index, content) in self.contents.iter().enumerate() {
            out.push_str(&format!("### {}\n\n", role_title(&content.role)));

            let mut has_text = false;
            for part in &content.parts {
                match part {
                    Part::Text { text } => {
                        out.push_str(text);
                        out.push('\n');
                        has_text = true;
                    }
                    Part::File {
                        inline_data,
                        filename,
                    } => {
                        let name = filename.as_deref().unwrap_or("Pasted Data");
                        out.push_str(&format!(
                            "\n`[Attached File: {name} ({})]`\n",
                            inline_data.mime_type
                        ));
                    }
                }
            }
            if has_text {
                out.push('\n');
            }
            if index + 1 < self.contents.len() {
                out.push_str("---\n\n");
            }
        }
        out
    }
}

/// History and system prompt read back from a saved document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedHistory {
    pub history: History,
    pub system_prompt: Option<String>,
}

pub fn save(path: &Path, request: &GenerateRequest) -> Result<()> {
    let json = serde_json::to_string_pretty(request)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn load(path: &Path) -> Result<LoadedHistory> {
    let raw = fs::read_to_string(path)?;
    parse_document(&raw)
}

/// Lenient reader: turns without a role or a parts array are skipped, and so
/// are parts that are neither text nor inline data.
pub fn parse_document(raw: &str) -> Result<LoadedHistory> {
    let root: Value = serde_json::from_str(raw)?;
    let Some(object) = root.as_object() else {
        return Err(GcliError::InvalidHistory("expected a JSON object".into()));
    };

    let mut history = History::new();
    for item in object
        .get("contents")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let (Some(role), Some(parts)) = (
            item.get("role").and_then(Value::as_str),
            item.get("parts").and_then(Value::as_array),
        ) else {
            warn!("skipping history entry without role or parts");
            continue;
        };

        let parts = parts
            .iter()
            .filter_map(|part| match serde_json::from_value::<Part>(part.clone()) {
                Ok(part) => Some(part),
                Err(error) => {
                    warn!(%error, "skipping unreadable history part");
                    None
                }
            })
            .collect();
        history.push(Content {
            role: role.to_owned(),
            parts,
        });
    }

    let system_prompt = object
        .get("systemInstruction")
        .and_then(|instruction| instruction.get("parts"))
        .and_then(|parts| parts.get(0))
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    Ok(LoadedHistory {
        history,
        system_prompt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parts_serialize_in_wire_shape() {
        let parts = vec![
            Part::text("hi"),
            Part::file("a.png", "image/png", "AAAA".into()),
        ];
        assert_eq!(
            serde_json::to_value(&parts).unwrap(),
            json!([{"text": "hi"}, {"inlineData": {"mimeType": "image/png", "data": "AAAA"}}])
        );
    }

    #[test]
    fn role_title_capitalises_first_letter() {
        assert_eq!(role_title("model"), "Model");
        assert_eq!(role_title(""), "");
    }

    #[test]
    fn part_id_parses_and_rejects() {
        assert_eq!("2:1".parse::<PartId>(), Ok(PartId { message: 2, part: 1 }));
        assert_eq!("2".parse::<PartId>(), Err(PartIdError::Format));
        assert_eq!("a:1".parse::<PartId>(), Err(PartIdError::Format));
    }

    #[test]
    fn remove_attachment_checks_bounds_and_kind() {
        let mut history = History::from_contents(vec![Content::user(vec![
            Part::file("a.txt", "text/plain", "YQ==".into()),
            Part::text("look"),
        ])]);

        assert_eq!(
            history.remove_attachment(PartId { message: 3, part: 0 }),
            Err(PartIdError::Message(3))
        );
        assert_eq!(
            history.remove_attachment(PartId { message: 0, part: 5 }),
            Err(PartIdError::Part { message: 0, part: 5 })
        );
        assert!(matches!(
            history.remove_attachment(PartId { message: 0, part: 1 }),
            Err(PartIdError::NotAFile(_))
        ));
        assert!(history.remove_attachment(PartId { message: 0, part: 0 }).is_ok());
        assert_eq!(history.contents()[0].parts, vec![Part::text("look")]);
    }

    #[test]
    fn text_len_counts_leading_text_only() {
        let history = History::from_contents(vec![
            Content::user(vec![Part::text("abc"), Part::text("ignored")]),
            Content::user(vec![Part::file("f", "text/plain", String::new())]),
            Content::model("de"),
        ]);
        assert_eq!(history.text_len(), 5);
    }
}
