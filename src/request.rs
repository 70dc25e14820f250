use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::history::{Content, History, Part};

/// Body of `generateContent`-family requests, and of saved history files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    #[serde(default)]
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
    UrlContext {},
    GoogleSearch {},
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub seed: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    pub thinking_config: ThinkingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub thinking_budget: i32,
}

impl GenerateRequest {
    pub fn build(settings: &Settings, history: &History) -> Self {
        let mut tools = Vec::new();
        if settings.url_context {
            tools.push(Tool::UrlContext {});
        }
        if settings.google_grounding {
            tools.push(Tool::GoogleSearch {});
        }

        Self {
            system_instruction: settings.system_prompt.as_ref().map(|prompt| SystemInstruction {
                parts: vec![Part::text(prompt.clone())],
            }),
            contents: history.contents().to_vec(),
            tools,
            generation_config: Some(GenerationConfig {
                temperature: settings.temperature,
                max_output_tokens: settings.max_output_tokens,
                seed: settings.seed,
                top_k: settings.top_k,
                top_p: settings.top_p,
                thinking_config: ThinkingConfig {
                    thinking_budget: settings.thinking_budget,
                },
            }),
        }
    }

    /// The `countTokens` body: same document without tools or generation settings.
    pub fn for_token_count(mut self) -> Self {
        self.tools.clear();
        self.generation_config = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn builds_full_document() {
        let settings = Settings {
            system_prompt: Some("be brief".into()),
            top_k: Some(40),
            ..Settings::default()
        };
        let history = History::from_contents(vec![Content::user(vec![Part::text("hi")])]);

        let value = serde_json::to_value(GenerateRequest::build(&settings, &history)).unwrap();
        assert_eq!(
            value,
            json!({
                "systemInstruction": {"parts": [{"text": "be brief"}]},
                "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
                "tools": [{"urlContext": {}}, {"googleSearch": {}}],
                "generationConfig": {
                    "temperature": 0.75,
                    "maxOutputTokens": 65536,
                    "seed": 42,
                    "topK": 40,
                    "thinkingConfig": {"thinkingBudget": -1}
                }
            })
        );
    }

    #[test]
    fn disabled_tools_are_omitted() {
        let settings = Settings {
            url_context: false,
            google_grounding: false,
            ..Settings::default()
        };
        let value = serde_json::to_value(GenerateRequest::build(&settings, &History::new())).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("systemInstruction").is_none());
    }

    #[test]
    fn token_count_body_drops_settings() {
        let request = GenerateRequest::build(&Settings::default(), &History::new()).for_token_count();
        assert_eq!(serde_json::to_value(request).unwrap(), json!({"contents": []}));
    }
}
