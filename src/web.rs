//! Key-free endpoint used by the Gemini web frontend.
//!
//! The request is a form field holding a doubly encoded JSON array; the reply
//! streams nested arrays behind an anti-hijacking preamble. Both formats are
//! undocumented, so the payload mirrors what the frontend sends.

use std::env;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, ORIGIN, REFERER};
use serde_json::{json, Value};
use tracing::debug;

use crate::api::{error_message, http_client};
use crate::error::{GcliError, Result};
use crate::history::{role_title, History};
use crate::retry::RetryPolicy;
use crate::stream::{pump, FinalResponse, LocationRequest, Sink, StreamAssembler, Transfer};

pub const WEB_ENDPOINT: &str = "https://gemini.google.com/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate?bl=&f.sid=&hl=en&_reqid=&rt=c";
const WEB_ORIGIN: &str = "https://gemini.google.com";
const WEB_REFERER: &str = "https://gemini.google.com/";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// Bytes of conversation text the endpoint accepts.
pub const CONTEXT_LIMIT: usize = 102_400;
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// `en_GB.UTF-8` becomes `en-GB`. Unset and C/POSIX locales give `None`.
pub fn normalize_locale(raw: &str) -> Option<String> {
    if raw.is_empty() || raw == "C" || raw.starts_with("C.") || raw == "POSIX" {
        return None;
    }
    let base = raw.split(['.', '@']).next().unwrap_or(raw);
    if base.is_empty() {
        return None;
    }
    Some(base.replacen('_', "-", 1))
}

/// Language tag of the user's locale, from `LC_ALL` then `LANG`.
pub fn system_language() -> String {
    ["LC_ALL", "LANG"]
        .into_iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.is_empty())
        .and_then(|value| normalize_locale(&value))
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned())
}

/// Whole conversation flattened to `Role: text` paragraphs.
///
/// The endpoint keeps no state between calls, so every turn resends the
/// transcript. Turns that do not start with text are left out.
pub fn transcript(history: &History, prompt: &str) -> String {
    let mut out = String::new();
    for content in history.contents() {
        if let Some(text) = content.leading_text() {
            out.push_str(&role_title(&content.role));
            out.push_str(": ");
            out.push_str(text);
            out.push_str("\n\n");
        }
    }
    out.push_str("User: ");
    out.push_str(prompt);
    out
}

/// Reject a turn that would push the transcript past [`CONTEXT_LIMIT`].
pub fn check_context(history: &History, turn: &str) -> Result<()> {
    let total = history.text_len() + turn.len() + 1;
    if total > CONTEXT_LIMIT {
        return Err(GcliError::ContextTooLarge { kib: total / 1024 });
    }
    Ok(())
}

/// `f.req` value: `[null, "<inner array as JSON>"]`.
pub fn build_payload(history: &History, prompt: &str, is_pro: bool, language: &str) -> Result<String> {
    let mut inner = vec![
        json!([transcript(history, prompt), 0, null, null, null, null, null]),
        json!([language]),
        json!(["", "", "", null, null, null, null, null, null, ""]),
        json!(""),
        json!(""),
        Value::Null,
        json!([if is_pro { 1 } else { 0 }]),
        json!(1),
        Value::Null,
        Value::Null,
        json!(1),
        json!(1),
    ];
    inner.extend(nulls(5));
    inner.push(json!([[0]]));
    inner.push(json!(1));
    inner.extend(nulls(8));
    inner.push(json!(1));
    inner.extend(nulls(2));
    inner.push(json!([4]));
    inner.extend(nulls(10));
    inner.push(json!([if is_pro { 1 } else { 2 }]));
    inner.extend(nulls(61));
    inner.push(json!([]));

    let inner = serde_json::to_string(&inner)?;
    Ok(serde_json::to_string(&json!([null, inner]))?)
}

fn nulls(count: usize) -> impl Iterator<Item = Value> {
    std::iter::repeat(Value::Null).take(count)
}

/// A finished transfer, or one cut short once the requested place data arrived.
pub fn transfer_succeeded(status: u16, transfer: Transfer, location_gathered: bool) -> bool {
    match transfer {
        Transfer::Completed => status == 200,
        Transfer::Aborted => location_gathered,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebReply {
    pub text: String,
    pub location_gathered: bool,
}

pub struct WebClient {
    http: Client,
    retry: RetryPolicy,
    language: String,
}

impl WebClient {
    pub fn new(proxy: Option<&str>) -> Result<Self> {
        Ok(Self {
            http: http_client(proxy)?,
            retry: RetryPolicy::default(),
            language: system_language(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn send<S: Sink + ?Sized>(
        &self,
        history: &History,
        prompt: &str,
        is_pro: bool,
        places: LocationRequest,
        sink: &mut S,
    ) -> Result<WebReply> {
        let payload = build_payload(history, prompt, is_pro, &self.language)?;
        let form = format!("f.req={}", urlencoding::encode(&payload));

        self.retry.run(|attempt| {
            debug!(attempt, is_pro, "sending key-free request");
            let response = self
                .http
                .post(WEB_ENDPOINT)
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .header(ORIGIN, WEB_ORIGIN)
                .header(REFERER, WEB_REFERER)
                .body(form.clone())
                .send()?;

            let status = response.status().as_u16();
            if status != 200 {
                let body = response.text().unwrap_or_default();
                return Err(GcliError::Status {
                    status,
                    message: error_message(&body),
                });
            }

            let mut assembler = StreamAssembler::web(places);
            let mut text = FinalResponse::new();
            let transfer = pump(response, &mut assembler, &mut *sink, &mut text)?;
            let location_gathered = assembler.location_gathered();
            if !transfer_succeeded(status, transfer, location_gathered) {
                return Err(GcliError::Status {
                    status,
                    message: "transfer ended before any location data arrived".into(),
                });
            }
            Ok(WebReply {
                text: text.into_string(),
                location_gathered,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{Content, Part};
    use pretty_assertions::assert_eq;

    #[test]
    fn locales_normalise_to_language_tags() {
        assert_eq!(normalize_locale("en_GB.UTF-8").as_deref(), Some("en-GB"));
        assert_eq!(normalize_locale("de_DE@euro").as_deref(), Some("de-DE"));
        assert_eq!(normalize_locale("fr").as_deref(), Some("fr"));
        assert_eq!(normalize_locale("C.UTF-8"), None);
        assert_eq!(normalize_locale("POSIX"), None);
        assert_eq!(normalize_locale(""), None);
    }

    #[test]
    fn transcript_skips_turns_without_leading_text() {
        let history = History::from_contents(vec![
            Content::user(vec![Part::text("hello")]),
            Content::user(vec![Part::file("a.png", "image/png", "AA==".into())]),
            Content::model("hi there"),
        ]);
        assert_eq!(
            transcript(&history, "next"),
            "User: hello\n\nModel: hi there\n\nUser: next"
        );
    }

    #[test]
    fn payload_has_expected_shape() {
        let payload = build_payload(&History::new(), "ping", true, "en-GB").unwrap();
        let outer: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(outer[0], Value::Null);

        let inner: Value = serde_json::from_str(outer[1].as_str().unwrap()).unwrap();
        let inner = inner.as_array().unwrap();
        assert_eq!(inner.len(), 104);
        assert_eq!(inner[0][0], "User: ping");
        assert_eq!(inner[1], json!(["en-GB"]));
        assert_eq!(inner[6], json!([1]));
        assert_eq!(inner[17], json!([[0]]));
        assert_eq!(inner[30], json!([4]));
        assert_eq!(inner[41], json!([1]));
        assert_eq!(inner[103], json!([]));
    }

    #[test]
    fn flash_payload_switches_flags() {
        let payload = build_payload(&History::new(), "ping", false, "en-US").unwrap();
        let outer: Value = serde_json::from_str(&payload).unwrap();
        let inner: Value = serde_json::from_str(outer[1].as_str().unwrap()).unwrap();
        assert_eq!(inner[6], json!([0]));
        assert_eq!(inner[41], json!([2]));
    }

    #[test]
    fn oversized_context_is_rejected() {
        let history = History::from_contents(vec![Content::model("x".repeat(CONTEXT_LIMIT - 10))]);
        assert!(check_context(&history, "short").is_ok());
        assert!(matches!(
            check_context(&history, &"y".repeat(20)),
            Err(GcliError::ContextTooLarge { kib: 100 })
        ));
    }

    #[test]
    fn aborted_transfer_needs_location_data() {
        assert!(transfer_succeeded(200, Transfer::Completed, false));
        assert!(!transfer_succeeded(500, Transfer::Completed, false));
        assert!(transfer_succeeded(200, Transfer::Aborted, true));
        assert!(!transfer_succeeded(200, Transfer::Aborted, false));
    }
}
