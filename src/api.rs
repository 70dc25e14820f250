//! Official Gemini API client.

use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, ORIGIN};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::Settings;
use crate::error::{GcliError, Result};
use crate::request::GenerateRequest;
use crate::retry::RetryPolicy;
use crate::stream::{pump, FinalResponse, Sink, SseDecoder, StreamAssembler};

pub const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const API_KEY_HEADER: &str = "x-goog-api-key";
const PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelPage {
    #[serde(default)]
    models: Vec<RawModel>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    name: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenCount {
    total_tokens: u64,
}

pub struct GeminiClient {
    http: Client,
    api_key: String,
    origin: Option<String>,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or(GcliError::MissingApiKey)?;

        Ok(Self {
            http: http_client(settings.proxy.as_deref())?,
            api_key,
            origin: settings.origin_header().map(str::to_owned),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stream a reply into `sink` and return its full text.
    pub fn stream_generate<S: Sink + ?Sized>(
        &self,
        model: &str,
        request: &GenerateRequest,
        sink: &mut S,
    ) -> Result<String> {
        let url = format!("{API_BASE}/{model}:streamGenerateContent?alt=sse");
        let body = gzip(&serde_json::to_vec(request)?)?;

        self.retry.run(|attempt| {
            debug!(attempt, %url, "sending generate request");
            let response = self.send(self.post(&url, body.clone()))?;
            let mut assembler = StreamAssembler::sse(SseDecoder::incremental());
            let mut text = FinalResponse::new();
            pump(response, &mut assembler, &mut *sink, &mut text)?;
            Ok(text.into_string())
        })
    }

    /// Tokens the request's contents and system instruction would use.
    pub fn count_tokens(&self, model: &str, request: GenerateRequest) -> Result<u64> {
        let url = format!("{API_BASE}/{model}:countTokens");
        let body = gzip(&serde_json::to_vec(&request.for_token_count())?)?;
        let response = self.send(self.post(&url, body))?;
        let count: TokenCount = serde_json::from_str(&response.text()?)?;
        Ok(count.total_tokens)
    }

    /// Every model the key can see, following pagination.
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let mut models = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let url = match &token {
                Some(token) => format!(
                    "{API_BASE}?pageSize={PAGE_SIZE}&pageToken={}",
                    urlencoding::encode(token)
                ),
                None => format!("{API_BASE}?pageSize={PAGE_SIZE}"),
            };
            let page: ModelPage = self.retry.run(|_| {
                let response = self.send(self.authorized(self.http.get(&url)))?;
                Ok(serde_json::from_str(&response.text()?)?)
            })?;

            models.extend(page.models.into_iter().filter_map(|model| {
                let name = model.name?;
                Some(ModelInfo {
                    name: name.strip_prefix("models/").unwrap_or(&name).to_owned(),
                    display_name: model.display_name.unwrap_or_else(|| "N/A".to_owned()),
                })
            }));

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(models)
    }

    fn post(&self, url: &str, gzipped: Vec<u8>) -> RequestBuilder {
        self.authorized(self.http.post(url))
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(gzipped)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header(API_KEY_HEADER, &self.api_key);
        match &self.origin {
            Some(origin) => builder.header(ORIGIN, origin),
            None => builder,
        }
    }

    fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(GcliError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }
}

/// Blocking client without a total timeout, since replies stream for minutes.
pub(crate) fn http_client(proxy: Option<&str>) -> Result<Client> {
    let mut builder = Client::builder().timeout(None::<Duration>);
    if let Some(proxy) = proxy.filter(|proxy| !proxy.is_empty()) {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    Ok(builder.build()?)
}

pub fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// `error.message` from the first JSON object in the body, else the body itself.
pub fn error_message(body: &str) -> String {
    body.find('{')
        .and_then(|start| {
            serde_json::Deserializer::from_str(&body[start..])
                .into_iter::<Value>()
                .next()?
                .ok()
        })
        .and_then(|root| {
            root.get("error")?
                .get("message")?
                .as_str()
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.trim().to_owned())
}
