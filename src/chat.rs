//! One conversation: settings, history, pending attachments and the handlers
//! behind every slash command.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::api::GeminiClient;
use crate::attachment::{ensure_safe_path, Attachment, Attachments, Encoding, STDIN_NAME};
use crate::commands::{Command, ConfigAction, HistoryAction, PendingAction, SessionAction, HELP};
use crate::config::{self, Settings, AUTOMATIC_BUDGET};
use crate::error::Result;
use crate::history::{self, Content, History, LoadedHistory, Part};
use crate::notice;
use crate::request::GenerateRequest;
use crate::session::{SessionStore, UNSAVED};
use crate::stream::{LocationRequest, Sink};
use crate::web::{self, WebClient};

/// What the read loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Exit,
}

/// Where the API key and origin came from, for the startup banner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySource {
    pub key_from_env: bool,
    pub origin_from_env: bool,
}

pub struct ChatSession {
    settings: Settings,
    history: History,
    attachments: Attachments,
    last_response: Option<String>,
    session_name: String,
    places: LocationRequest,
    config_path: Option<PathBuf>,
    session_dir: Option<PathBuf>,
}

impl ChatSession {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            history: History::new(),
            attachments: Attachments::new(),
            last_response: None,
            session_name: UNSAVED.to_owned(),
            places: LocationRequest::default(),
            config_path: None,
            session_dir: None,
        }
    }

    /// Config file used by `/config`; the default location when unset.
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_dir = Some(dir.into());
        self
    }

    /// Print place details from the key-free endpoint instead of text.
    pub fn with_locations(mut self, places: LocationRequest) -> Self {
        self.places = places;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn set_session_name(&mut self, name: impl Into<String>) {
        self.session_name = name.into();
    }

    pub fn has_pending_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    fn encoding(&self) -> Encoding {
        Encoding::for_free_mode(self.settings.free_mode)
    }

    fn sessions(&self) -> Result<SessionStore> {
        match &self.session_dir {
            Some(dir) => Ok(SessionStore::new(dir)),
            None => SessionStore::open_default(),
        }
    }

    fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => config::default_config_path(),
        }
    }

    pub fn banner(&self, keys: KeySource) {
        let settings = &self.settings;
        if settings.free_mode {
            notice!("--- Running in key-free mode. API key features are disabled. ---");
        } else {
            notice!(
                "Using model: {}, Temperature: {:.2}, Seed: {}",
                settings.model,
                settings.temperature,
                settings.seed
            );
            if settings.max_output_tokens > 0 {
                notice!("Max Output Tokens: {}", settings.max_output_tokens);
            }
            if settings.thinking_budget > 0 {
                notice!("Thinking Budget: {} tokens", settings.thinking_budget);
            } else {
                notice!("Thinking Budget: automatic");
            }
            notice!("Google grounding: {}", on_off(settings.google_grounding));
            notice!("URL Context: {}", on_off(settings.url_context));
            if keys.key_from_env {
                notice!("API Key loaded from environment variable.");
            } else if settings.has_api_key() {
                notice!("API Key loaded from configuration file.");
            }
            if keys.origin_from_env {
                notice!("Origin loaded from environment variable: {}", settings.origin);
            }
        }
        notice!("--- Session: {}\n", self.session_name);
    }

    /// Send one user turn and stream the reply into `sink`.
    ///
    /// A key-free turn is recorded only once it succeeds. An official turn
    /// enters the history before the request and is dropped again on failure.
    pub fn send_prompt<S: Sink + ?Sized>(&mut self, prompt: &str, sink: &mut S) -> Result<()> {
        if self.settings.free_mode {
            self.send_free(prompt, sink)
        } else {
            self.send_official(prompt, sink)
        }
    }

    fn send_free<S: Sink + ?Sized>(&mut self, prompt: &str, sink: &mut S) -> Result<()> {
        let mut turn = self.attachments.framed_text();
        turn.push_str(prompt);
        if turn.is_empty() {
            return Ok(());
        }
        let checked = web::check_context(&self.history, &turn);
        self.attachments.clear();
        checked?;

        let client = WebClient::new(self.settings.proxy.as_deref())?;
        let reply = client.send(
            &self.history,
            &turn,
            self.settings.is_pro_model(),
            self.places,
            sink,
        )?;

        self.history.push(Content::user(vec![Part::text(turn)]));
        if !reply.text.is_empty() {
            self.history.push(Content::model(reply.text.clone()));
            self.last_response = Some(reply.text);
        }
        Ok(())
    }

    fn send_official<S: Sink + ?Sized>(&mut self, prompt: &str, sink: &mut S) -> Result<()> {
        let mut parts = self.attachments.take_parts();
        if !prompt.is_empty() {
            parts.push(Part::text(prompt));
        }
        if parts.is_empty() {
            return Ok(());
        }
        self.history.push(Content::user(parts));

        let request = GenerateRequest::build(&self.settings, &self.history);
        let reply = GeminiClient::new(&self.settings)
            .and_then(|client| client.stream_generate(&self.settings.model, &request, sink));
        match reply {
            Ok(text) => {
                self.history.push(Content::model(text.clone()));
                self.last_response = Some(text);
                Ok(())
            }
            Err(error) => {
                self.history.pop();
                Err(error)
            }
        }
    }

    /// Attach a file. Paths typed at the prompt must be relative and stay
    /// below the working directory; files named on the command line need not.
    pub fn attach_file(&mut self, path: &str, check_path: bool) -> Result<()> {
        if check_path {
            ensure_safe_path(path)?;
        }
        let encoding = self.encoding();
        let free_mode = self.settings.free_mode;
        if let Some(item) = self.attachments.add_file(path, encoding)? {
            announce(item, free_mode);
        }
        Ok(())
    }

    /// Attach everything readable from `reader` as pasted text.
    pub fn attach_reader<R: io::Read>(&mut self, reader: R) -> Result<()> {
        let encoding = self.encoding();
        let free_mode = self.settings.free_mode;
        if let Some(item) = self.attachments.add_reader(reader, STDIN_NAME, encoding)? {
            announce(item, free_mode);
        }
        Ok(())
    }

    /// Forget the conversation, its system prompt and pending attachments.
    pub fn clear(&mut self) {
        self.history.clear();
        self.last_response = None;
        self.settings.system_prompt = None;
        self.attachments.clear();
        self.session_name = UNSAVED.to_owned();
        notice!("New session started.");
    }

    pub fn load_history(&mut self, path: &Path) -> Result<()> {
        let LoadedHistory {
            history,
            system_prompt,
        } = history::load(path)?;
        self.replace_history(history, system_prompt);
        notice!("Conversation history loaded from {}", path.display());
        Ok(())
    }

    fn replace_history(&mut self, history: History, system_prompt: Option<String>) {
        self.history = history;
        if system_prompt.is_some() {
            self.settings.system_prompt = system_prompt;
        }
    }

    pub fn save_history(&self, path: &Path) -> Result<()> {
        history::save(path, &self.request())?;
        notice!("Conversation history saved to {}", path.display());
        Ok(())
    }

    pub fn request(&self) -> GenerateRequest {
        GenerateRequest::build(&self.settings, &self.history)
    }

    pub fn load_session(&mut self, name: &str) -> Result<()> {
        let store = self.sessions()?;
        let path = store.path(name)?;
        self.load_history(&path)?;
        self.session_name = name.to_owned();
        Ok(())
    }

    pub fn execute(&mut self, command: Command) -> Result<Outcome> {
        match command {
            Command::Help => notice!("{HELP}"),
            Command::Exit => return Ok(Outcome::Exit),
            Command::Clear => self.clear(),
            Command::Stats => self.stats(),
            Command::Config(action) => self.config(action)?,
            Command::System(Some(prompt)) => {
                notice!("System prompt set to: '{prompt}'");
                self.settings.system_prompt = Some(prompt);
            }
            Command::System(None) => match &self.settings.system_prompt {
                Some(prompt) => notice!("System prompt is:\n{prompt}"),
                None => notice!("System prompt is empty."),
            },
            Command::ClearSystem => {
                if self.settings.system_prompt.take().is_some() {
                    notice!("System prompt cleared.");
                } else {
                    notice!("No system prompt was set.");
                }
            }
            Command::Budget(Some(budget)) => {
                if budget < 1 {
                    self.settings.thinking_budget = AUTOMATIC_BUDGET;
                    notice!("Thinking budget set to automatic.");
                } else {
                    self.settings.thinking_budget = budget;
                    notice!("Thinking budget set to {budget} tokens.");
                }
            }
            Command::Budget(None) => {
                notice!("Thinking budget: {} tokens.", self.settings.thinking_budget)
            }
            Command::MaxTokens(Some(tokens)) => {
                self.settings.max_output_tokens = tokens;
                notice!("Max output tokens set to {tokens}.");
            }
            Command::MaxTokens(None) => {
                notice!("Max output tokens: {} tokens.", self.settings.max_output_tokens)
            }
            Command::Temperature(Some(temperature)) => {
                self.settings.temperature = temperature;
                notice!("Temperature set to {temperature:.2}.");
            }
            Command::Temperature(None) => notice!("Temperature: {:.2}.", self.settings.temperature),
            Command::TopK(Some(top_k)) => {
                self.settings.top_k = Some(top_k);
                notice!("topK set to {top_k}.");
            }
            Command::TopK(None) => match self.settings.top_k {
                Some(top_k) => notice!("topK is set to: {top_k}"),
                None => notice!("topK is not set."),
            },
            Command::TopP(Some(top_p)) => {
                self.settings.top_p = Some(top_p);
                notice!("topP set to {top_p:.2}.");
            }
            Command::TopP(None) => match self.settings.top_p {
                Some(top_p) => notice!("topP is set to: {top_p:.2}"),
                None => notice!("topP is not set."),
            },
            Command::Grounding(Some(on)) => {
                self.settings.google_grounding = on;
                notice!("Google grounding turned {}.", on_off(on));
            }
            Command::Grounding(None) => {
                notice!("Google grounding is {}.", on_off(self.settings.google_grounding))
            }
            Command::UrlContext(Some(on)) => {
                self.settings.url_context = on;
                notice!("URL context turned {}.", on_off(on));
            }
            Command::UrlContext(None) => {
                notice!("URL context is {}.", on_off(self.settings.url_context))
            }
            Command::Attach(path) => self.attach_file(&path, true)?,
            Command::Paste => {
                notice!("Pasting content. Press Ctrl+D when done.");
                self.attach_reader(io::stdin().lock())?;
            }
            Command::SaveLast(path) => self.save_last(&path)?,
            Command::Save(path) => {
                ensure_safe_path(&path)?;
                self.save_history(Path::new(&path))?;
            }
            Command::Load(path) => {
                ensure_safe_path(&path)?;
                self.load_history(Path::new(&path))?;
            }
            Command::Export(path) => self.export(&path)?,
            Command::Models => self.list_models()?,
            Command::Attachments(action) => self.pending(action)?,
            Command::History(action) => self.history_attachments(action)?,
            Command::Session(action) => self.session(action)?,
        }
        Ok(Outcome::Continue)
    }

    fn stats(&self) {
        let settings = &self.settings;
        notice!("--- Session Stats ---");
        notice!("Model: {}", settings.model);
        notice!("Temperature: {:.2}", settings.temperature);
        notice!("Seed: {}", settings.seed);
        notice!(
            "System Prompt: {}",
            settings.system_prompt.as_deref().unwrap_or("Not set")
        );
        notice!("Messages in history: {}", self.history.len());
        notice!("Pending attachments: {}", self.attachments.len());

        if !(self.history.is_empty() && self.attachments.is_empty()) {
            match self.count_tokens() {
                Ok(tokens) => notice!("Total tokens in context (incl. pending): {tokens}"),
                Err(error) => {
                    debug!(%error, "token count failed");
                    notice!("Could not retrieve token count.");
                }
            }
        }
        notice!("---------------------");
    }

    /// Tokens in the history plus the pending attachments as one more turn.
    fn count_tokens(&self) -> Result<u64> {
        let client = GeminiClient::new(&self.settings)?;
        let mut request = self.request();
        if !self.attachments.is_empty() {
            let parts = self.attachments.iter().map(|item| item.part.clone()).collect();
            request.contents.push(Content::user(parts));
        }
        client.count_tokens(&self.settings.model, request)
    }

    fn config(&mut self, action: ConfigAction) -> Result<()> {
        let path = self.config_path()?;
        match action {
            ConfigAction::Save => {
                config::save_config(&path, &self.settings)?;
                notice!("Configuration saved to {}", path.display());
            }
            ConfigAction::Load => {
                if let Some(file) = config::load_config(&path)? {
                    self.settings.apply_file(file);
                }
                notice!("Configuration reloaded from file.");
            }
        }
        Ok(())
    }

    fn save_last(&self, path: &str) -> Result<()> {
        let Some(response) = &self.last_response else {
            notice!("No last response to save.");
            return Ok(());
        };
        ensure_safe_path(path)?;
        fs::write(path, response)?;
        notice!("Last response saved to {path}");
        Ok(())
    }

    fn export(&self, path: &str) -> Result<()> {
        ensure_safe_path(path)?;
        notice!("Exporting conversation to {path}...");
        let markdown = self
            .history
            .to_markdown(self.settings.system_prompt.as_deref());
        fs::write(path, markdown)?;
        notice!("Successfully exported history to {path}");
        Ok(())
    }

    fn list_models(&self) -> Result<()> {
        let client = GeminiClient::new(&self.settings)?;
        notice!("Fetching available models...");
        let models = client.list_models()?;
        for model in &models {
            println!("- {} ({})", model.name, model.display_name);
        }
        notice!("\nFound {} models.", models.len());
        Ok(())
    }

    fn pending(&mut self, action: PendingAction) -> Result<()> {
        match action {
            PendingAction::List if self.attachments.is_empty() => {
                notice!("No pending attachments.")
            }
            PendingAction::List => {
                notice!("Pending Attachments:");
                for (index, item) in self.attachments.iter().enumerate() {
                    notice!("  [{index}] {} (MIME: {})", item.name, item.mime_type);
                }
            }
            PendingAction::Clear => {
                self.attachments.clear();
                notice!("All pending attachments cleared.");
            }
            PendingAction::Remove(index) => match self.attachments.remove(index) {
                Some(item) => notice!("Removing attachment: {}", item.name),
                None => notice!("Error: Invalid attachment index."),
            },
        }
        Ok(())
    }

    fn history_attachments(&mut self, action: HistoryAction) -> Result<()> {
        match action {
            HistoryAction::List => {
                notice!("--- Attachments in History ---");
                let found = self.history.attachments();
                if found.is_empty() {
                    notice!("  (No file attachments found in history)");
                } else {
                    notice!("  ID      | Role  | Filename / Description");
                    notice!("----------|-------|----------------------------------------");
                    for item in found {
                        notice!(
                            "  [{:<2}:{:<2}] | {:<5} | {} (MIME: {})",
                            item.id.message,
                            item.id.part,
                            item.role,
                            item.filename.unwrap_or("Pasted/Loaded Data"),
                            item.mime_type
                        );
                    }
                }
                notice!("------------------------------");
            }
            HistoryAction::Remove(id) => match self.history.remove_attachment(id) {
                Ok(Part::File { filename, .. }) => notice!(
                    "Removing attachment [{id}]: {}",
                    filename.as_deref().unwrap_or("Pasted Data")
                ),
                Ok(Part::Text { .. }) => {}
                Err(error) => notice!("Error: {error}"),
            },
        }
        Ok(())
    }

    fn session(&mut self, action: SessionAction) -> Result<()> {
        match action {
            SessionAction::New => self.clear(),
            SessionAction::List => print_sessions(&self.sessions()?.list()?),
            SessionAction::Save(name) => {
                let store = self.sessions()?;
                let path = store.save(&name, &self.request())?;
                notice!("Conversation history saved to {}", path.display());
                self.session_name = name;
            }
            SessionAction::Load(name) => self.load_session(&name)?,
            SessionAction::Delete(name) => {
                self.sessions()?.delete(&name)?;
                notice!("Session '{name}' deleted.");
            }
        }
        Ok(())
    }
}

/// Print saved session names the way `--list-sessions` shows them.
pub fn print_sessions(names: &[String]) {
    notice!("Saved Sessions:");
    if names.is_empty() {
        notice!("  (No sessions found)");
    }
    for name in names {
        notice!("  - {name}");
    }
}

fn announce(item: &Attachment, free_mode: bool) {
    let name = if free_mode { "stdin/file" } else { item.name.as_str() };
    notice!(
        "Attached {name} (MIME: {}, Size: {} bytes)",
        item.mime_type,
        item.size
    );
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::parse;
    use crate::error::GcliError;
    use crate::history::PartId;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn run(session: &mut ChatSession, line: &str) -> Outcome {
        let command = parse(line).unwrap().unwrap();
        session.execute(command).unwrap()
    }

    #[test]
    fn settings_commands_update_state() {
        let mut session = ChatSession::new(Settings::default());
        run(&mut session, "/temp 0.3");
        run(&mut session, "/budget 0");
        run(&mut session, "/topk 12");
        run(&mut session, "/grounding off");
        run(&mut session, "/system be brief");

        let settings = session.settings();
        assert_eq!(settings.temperature, 0.3);
        assert_eq!(settings.thinking_budget, AUTOMATIC_BUDGET);
        assert_eq!(settings.top_k, Some(12));
        assert!(!settings.google_grounding);
        assert_eq!(settings.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(run(&mut session, "/quit"), Outcome::Exit);
    }

    #[test]
    fn pending_attachments_can_be_removed() {
        let mut session = ChatSession::new(Settings::default());
        session.attach_reader(Cursor::new("first")).unwrap();
        session.attach_reader(Cursor::new("second")).unwrap();
        run(&mut session, "/attachments remove 0");
        run(&mut session, "/attachments remove 9");
        assert_eq!(session.attachments().len(), 1);
        assert!(session.attachments().framed_text().contains("second"));
    }

    #[test]
    fn unsafe_paths_are_refused() {
        let mut session = ChatSession::new(Settings::default());
        let error = session
            .execute(Command::Attach("../outside.txt".into()))
            .unwrap_err();
        assert!(matches!(error, GcliError::UnsafePath(_)));
    }

    #[test]
    fn clear_resets_conversation() {
        let mut session = ChatSession::new(Settings {
            system_prompt: Some("x".into()),
            ..Settings::default()
        });
        session.attach_reader(Cursor::new("pending")).unwrap();
        session.set_session_name("work");
        run(&mut session, "/clear");
        assert!(session.attachments().is_empty());
        assert_eq!(session.settings().system_prompt, None);
        assert_eq!(session.session_name(), UNSAVED);
    }

    #[test]
    fn sessions_round_trip_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ChatSession::new(Settings::default()).with_session_dir(dir.path());
        session.replace_history(
            History::from_contents(vec![
                Content::user(vec![Part::text("hi")]),
                Content::model("hello"),
            ]),
            Some("be kind".into()),
        );
        run(&mut session, "/session save work");
        assert_eq!(session.session_name(), "work");

        let mut other = ChatSession::new(Settings::default()).with_session_dir(dir.path());
        run(&mut other, "/session load work");
        assert_eq!(other.history().len(), 2);
        assert_eq!(other.settings().system_prompt.as_deref(), Some("be kind"));
        assert_eq!(other.session_name(), "work");

        run(&mut other, "/session delete work");
        assert!(SessionStore::new(dir.path()).list().unwrap().is_empty());
    }

    #[test]
    fn history_attachment_removal_reports_bad_ids() {
        let mut session = ChatSession::new(Settings::default());
        session.replace_history(
            History::from_contents(vec![Content::user(vec![
                Part::file("a.png", "image/png", "AA==".into()),
                Part::text("see"),
            ])]),
            None,
        );
        session
            .execute(Command::History(HistoryAction::Remove(PartId { message: 0, part: 1 })))
            .unwrap();
        assert_eq!(session.history().contents()[0].parts.len(), 2);
        run(&mut session, "/history attachments remove 0:0");
        assert_eq!(session.history().contents()[0].parts, vec![Part::text("see")]);
    }

    #[test]
    fn config_save_and_load_use_given_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut session =
            ChatSession::new(Settings::default()).with_config_path(Some(path.clone()));
        run(&mut session, "/temp 0.5");
        run(&mut session, "/config save");

        let mut fresh = ChatSession::new(Settings::default()).with_config_path(Some(path));
        run(&mut fresh, "/config load");
        assert_eq!(fresh.settings().temperature, 0.5);
    }

    #[test]
    fn save_last_without_response_is_a_no_op() {
        let mut session = ChatSession::new(Settings::default());
        assert_eq!(run(&mut session, "/savelast out.txt"), Outcome::Continue);
        assert!(!Path::new("out.txt").exists());
    }
}
