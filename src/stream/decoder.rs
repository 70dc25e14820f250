use serde_json::Value;

use super::path::{JsonPath, Step};

/// Decoded unit of meaning carried by one stream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Full text of the in-progress message so far.
    Snapshot(String),
    /// Increment to append to the in-progress message.
    Chunk(String),
    /// Latest rendition of a code block, printed when the block ends.
    Code(String),
    /// Location data from the key-free endpoint's place card.
    Location(Location),
    Control(Signal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    EndOfBlock,
    Malformed(String),
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub label: Option<String>,
    /// Protocol-relative map link, e.g. `//maps.google.com/...`.
    pub map_path: Option<String>,
}

/// Turns one complete line of a response stream into fragments.
pub trait LineDecoder {
    /// Fragments carried by `line`, in order. Never fails: unusable lines
    /// decode to a [`Signal`].
    fn decode(&self, line: &str) -> Vec<Fragment>;
}

const SSE_PREFIX: &str = "data: ";

const SSE_TEXT: JsonPath = JsonPath(&[
    Step::Key("candidates"),
    Step::Index(0),
    Step::Key("content"),
    Step::Key("parts"),
    Step::Index(0),
    Step::Key("text"),
]);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextMode {
    /// Every event repeats the whole message so far.
    #[default]
    Cumulative,
    /// Every event carries only the newly generated text.
    Incremental,
}

/// Decoder for `data: <json>` server-sent events of the official API.
#[derive(Debug, Clone, Copy, Default)]
pub struct SseDecoder {
    mode: TextMode,
}

impl SseDecoder {
    pub fn new(mode: TextMode) -> Self {
        Self { mode }
    }

    pub fn incremental() -> Self {
        Self::new(TextMode::Incremental)
    }

    pub fn mode(&self) -> TextMode {
        self.mode
    }
}

impl LineDecoder for SseDecoder {
    fn decode(&self, line: &str) -> Vec<Fragment> {
        let Some(payload) = line.strip_prefix(SSE_PREFIX) else {
            return vec![Fragment::Control(Signal::Ignored)];
        };

        let value = match serde_json::from_str::<Value>(payload) {
            Ok(value) => value,
            Err(error) => return vec![Fragment::Control(Signal::Malformed(error.to_string()))],
        };

        match SSE_TEXT.lookup_str(&value) {
            Some(text) => match self.mode {
                TextMode::Cumulative => vec![Fragment::Snapshot(text.to_owned())],
                TextMode::Incremental => vec![Fragment::Chunk(text.to_owned())],
            },
            None => vec![Fragment::Control(Signal::Ignored)],
        }
    }
}

/// Marker the web frontend splices into answers; it never belongs to the text.
const IMMERSIVE_CHIP: &str = "\\\\nhttp://googleusercontent.com/immersive_entry_chip/0\\\\n";

const WEB_ENVELOPE: JsonPath = JsonPath(&[Step::Index(0)]);
const WEB_TEXT: JsonPath = JsonPath(&[Step::Index(4), Step::Index(0), Step::Index(1), Step::Index(0)]);
const WEB_CODE: JsonPath = JsonPath(&[
    Step::Index(4),
    Step::Index(0),
    Step::Index(30),
    Step::Index(0),
    Step::Index(4),
]);
const WEB_PLACE: JsonPath = JsonPath(&[Step::Index(5)]);
const WEB_PLACE_LABEL: JsonPath = JsonPath(&[Step::Index(0)]);
const WEB_PLACE_MAP: JsonPath = JsonPath(&[Step::Index(4)]);

/// Decoder for the key-free endpoint's nested-array stream.
///
/// Each line is a JSON array whose first element is an envelope array; the
/// envelope's third element is itself a JSON document serialized into a
/// string. An envelope without that element closes the current code block.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebDecoder {
    locations: bool,
}

impl WebDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that reports place data instead of text.
    pub fn with_locations() -> Self {
        Self { locations: true }
    }
}

impl LineDecoder for WebDecoder {
    fn decode(&self, line: &str) -> Vec<Fragment> {
        if !line.trim_start().starts_with('[') {
            return vec![Fragment::Control(Signal::Ignored)];
        }

        let cleaned = line.replace(IMMERSIVE_CHIP, "");
        let root = match serde_json::from_str::<Value>(&cleaned) {
            Ok(root) => root,
            Err(error) => return vec![Fragment::Control(Signal::Malformed(error.to_string()))],
        };

        let Some(envelope) = WEB_ENVELOPE.lookup(&root).and_then(Value::as_array) else {
            return vec![Fragment::Control(Signal::Ignored)];
        };
        let Some(payload) = envelope.get(2) else {
            return vec![Fragment::Control(Signal::EndOfBlock)];
        };
        let Some(inner) = payload
            .as_str()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        else {
            return vec![Fragment::Control(Signal::Ignored)];
        };

        if self.locations {
            return match WEB_PLACE.lookup(&inner) {
                Some(place) => vec![Fragment::Location(Location {
                    label: WEB_PLACE_LABEL.lookup_str(place).map(str::to_owned),
                    map_path: WEB_PLACE_MAP.lookup_str(place).map(str::to_owned),
                })],
                None => vec![Fragment::Control(Signal::Ignored)],
            };
        }

        let mut fragments = Vec::new();
        if let Some(text) = WEB_TEXT.lookup_str(&inner) {
            fragments.push(Fragment::Snapshot(text.to_owned()));
        }
        if let Some(code) = WEB_CODE.lookup_str(&inner) {
            fragments.push(Fragment::Code(code.to_owned()));
        }
        if fragments.is_empty() {
            fragments.push(Fragment::Control(Signal::Ignored));
        }
        fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn web_line(inner: Value) -> String {
        json!([["wrb.fr", null, inner.to_string()]]).to_string()
    }

    #[test]
    fn sse_requires_data_prefix() {
        let decoder = SseDecoder::default();
        assert_eq!(
            decoder.decode("event: ping"),
            vec![Fragment::Control(Signal::Ignored)]
        );
    }

    #[test]
    fn sse_incremental_emits_chunks() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"ab"}]}}]}"#;
        assert_eq!(
            SseDecoder::incremental().decode(line),
            vec![Fragment::Chunk("ab".into())]
        );
    }

    #[test]
    fn sse_missing_text_is_ignored() {
        let line = r#"data: {"candidates":[{"finishReason":"STOP"}]}"#;
        assert_eq!(
            SseDecoder::default().decode(line),
            vec![Fragment::Control(Signal::Ignored)]
        );
    }

    #[test]
    fn web_reads_text_and_code() {
        let mut candidate = vec![Value::Null; 31];
        candidate[1] = json!(["Here you go"]);
        candidate[30] = json!([[null, null, null, null, "fn main() {}"]]);
        let inner = json!([null, null, null, null, [candidate]]);

        assert_eq!(
            WebDecoder::new().decode(&web_line(inner)),
            vec![
                Fragment::Snapshot("Here you go".into()),
                Fragment::Code("fn main() {}".into())
            ]
        );
    }

    #[test]
    fn web_envelope_without_payload_ends_block() {
        let line = json!([["di", 42]]).to_string();
        assert_eq!(
            WebDecoder::new().decode(&line),
            vec![Fragment::Control(Signal::EndOfBlock)]
        );
    }

    #[test]
    fn web_null_payload_is_ignored() {
        let line = json!([["wrb.fr", null, null]]).to_string();
        assert_eq!(
            WebDecoder::new().decode(&line),
            vec![Fragment::Control(Signal::Ignored)]
        );
    }

    #[test]
    fn web_skips_non_array_lines() {
        assert_eq!(
            WebDecoder::new().decode("1234"),
            vec![Fragment::Control(Signal::Ignored)]
        );
    }

    #[test]
    fn web_strips_immersive_chip_marker() {
        let inner = json!([null, null, null, null, [[null, ["see\nhttp://googleusercontent.com/immersive_entry_chip/0\n"]]]]);
        let decoded = WebDecoder::new().decode(&web_line(inner));
        assert_eq!(decoded, vec![Fragment::Snapshot("see".into())]);
    }

    #[test]
    fn web_location_mode_reads_place_card() {
        let inner = json!([null, null, null, null, null, ["Lisbon, Portugal", null, null, null, "//maps.example/lisbon"]]);
        assert_eq!(
            WebDecoder::with_locations().decode(&web_line(inner)),
            vec![Fragment::Location(Location {
                label: Some("Lisbon, Portugal".into()),
                map_path: Some("//maps.example/lisbon".into()),
            })]
        );
    }

    #[test]
    fn web_invalid_json_is_malformed_not_fatal() {
        let fragments = WebDecoder::new().decode(r#"[["wrb.fr", oops"#);
        assert!(matches!(
            fragments.as_slice(),
            [Fragment::Control(Signal::Malformed(_))]
        ));
    }
}
