//! Slash commands understood by the interactive session.

use thiserror::Error;

use crate::history::{PartId, PartIdError};

pub const HELP: &str = "Commands:
  /help                      - Show this help message.
  /exit, /quit               - Exit the program.
  /clear                     - Clear history and attachments for a new chat.
  /stats                     - Show session statistics (tokens, model, etc.).
  /config <save|load>        - Save or load settings to the config file.
  /system [prompt]           - Set/show the system prompt for the conversation.
  /clear_system              - Remove the system prompt.
  /budget [tokens]           - Set/show the max thinking budget for the model.
  /maxtokens [tokens]        - Set/show the max output tokens for the response.
  /temp [temperature]        - Set/show the temperature for the response.
  /topk [integer]            - Set/show the topK for the response.
  /topp [float]              - Set/show the topP for the response.
  /grounding [on|off]        - Set/show Google Search grounding.
  /urlcontext [on|off]       - Set/show URL context fetching.
  /attach <file>             - Attach a file to the next prompt.
  /paste                     - Paste text from stdin as an attachment.
  /savelast <file.txt>       - Save the last model response to a text file.
  /save <file.json>          - (Export) Save history to a specific file path.
  /load <file.json>          - (Import) Load history from a specific file path.
  /export <file.md>          - Export the conversation to a Markdown file.
  /models                    - List all available models from the API.

History Management:
  /history attachments list    - List all file attachments in the conversation history.
  /history attachments remove <id> - Remove an attachment from history (e.g., 2:1).

Attachment Management:
  /attachments list          - List all pending attachments for the next prompt.
  /attachments remove <index>- Remove a pending attachment by its index.
  /attachments clear         - Remove all pending attachments.

Session Management:
  /session new               - Start a new, unsaved session (same as /clear).
  /session list              - List all saved sessions.
  /session save <name>       - Save the current chat to a named session.
  /session load <name>       - Load a named session.
  /session delete <name>     - Delete a named session.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    Save,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    List,
    Remove(usize),
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    List,
    Remove(PartId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    New,
    List,
    Save(String),
    Load(String),
    Delete(String),
}

/// A parsed slash command. `None` arguments ask for the current value.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Exit,
    Clear,
    Stats,
    Config(ConfigAction),
    System(Option<String>),
    ClearSystem,
    Budget(Option<i32>),
    MaxTokens(Option<u32>),
    Temperature(Option<f32>),
    TopK(Option<u32>),
    TopP(Option<f32>),
    Grounding(Option<bool>),
    UrlContext(Option<bool>),
    Attach(String),
    Paste,
    SaveLast(String),
    Save(String),
    Load(String),
    Export(String),
    Models,
    Attachments(PendingAction),
    History(HistoryAction),
    Session(SessionAction),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Error: {0}")]
    Invalid(String),
    #[error("Unknown command: {0}. Type /help for a list of commands.")]
    Unknown(String),
    #[error("{0}")]
    Unrecognized(String),
}

impl From<PartIdError> for CommandError {
    fn from(error: PartIdError) -> Self {
        CommandError::Invalid(error.to_string())
    }
}

fn invalid(message: &str) -> CommandError {
    CommandError::Invalid(message.to_owned())
}

/// Parse `line` if it is a slash command; anything else is a prompt.
pub fn parse(line: &str) -> Option<Result<Command, CommandError>> {
    let line = line.trim();
    if !line.starts_with('/') {
        return None;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (line, ""),
    };
    Some(parse_command(word, rest))
}

fn parse_command(word: &str, arg: &str) -> Result<Command, CommandError> {
    let arg = (!arg.is_empty()).then_some(arg);
    let command = match word {
        "/help" => Command::Help,
        "/exit" | "/quit" => Command::Exit,
        "/clear" => Command::Clear,
        "/stats" => Command::Stats,
        "/models" => Command::Models,
        "/paste" => Command::Paste,
        "/clear_system" => Command::ClearSystem,
        "/config" => match arg {
            Some("save") => Command::Config(ConfigAction::Save),
            Some("load") => Command::Config(ConfigAction::Load),
            _ => return Err(CommandError::Usage("/config <save|load>")),
        },
        "/system" => Command::System(arg.map(str::to_owned)),
        "/budget" => Command::Budget(
            arg.map(|raw| {
                raw.parse::<i32>()
                    .ok()
                    .filter(|budget| *budget >= 0)
                    .ok_or_else(|| invalid("Invalid budget value."))
            })
            .transpose()?,
        ),
        "/maxtokens" => Command::MaxTokens(
            arg.map(|raw| positive(raw, "Invalid max tokens value."))
                .transpose()?,
        ),
        "/topk" => Command::TopK(
            arg.map(|raw| positive(raw, "Invalid topK value. Must be a positive integer."))
                .transpose()?,
        ),
        "/topp" => Command::TopP(
            arg.map(|raw| {
                raw.parse::<f32>()
                    .ok()
                    .filter(|p| p.is_finite() && *p > 0.0 && *p <= 1.0)
                    .ok_or_else(|| invalid("Invalid topP value. Must be between 0.0 and 1.0."))
            })
            .transpose()?,
        ),
        "/temp" => Command::Temperature(
            arg.map(|raw| {
                raw.parse::<f32>()
                    .ok()
                    .filter(|t| t.is_finite() && *t > 0.0)
                    .ok_or_else(|| invalid("Invalid temperature value."))
            })
            .transpose()?,
        ),
        "/grounding" => Command::Grounding(toggle(arg, "/grounding [on|off]")?),
        "/urlcontext" => Command::UrlContext(toggle(arg, "/urlcontext [on|off]")?),
        "/attach" => Command::Attach(required(arg, "/attach <filename>")?),
        "/savelast" => Command::SaveLast(arg.unwrap_or_default().to_owned()),
        "/save" => Command::Save(required(arg, "/save <file.json>")?),
        "/load" => Command::Load(required(arg, "/load <file.json>")?),
        "/export" => Command::Export(required(arg, "/export <filename.md>")?),
        "/attachments" => Command::Attachments(pending_action(arg.unwrap_or_default())?),
        "/history" => Command::History(history_action(arg.unwrap_or_default())?),
        "/session" => Command::Session(session_action(arg.unwrap_or_default())?),
        other => return Err(CommandError::Unknown(other.to_owned())),
    };
    Ok(command)
}

fn positive(raw: &str, message: &str) -> Result<u32, CommandError> {
    raw.parse::<u32>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| invalid(message))
}

fn required(arg: Option<&str>, usage: &'static str) -> Result<String, CommandError> {
    arg.map(str::to_owned).ok_or(CommandError::Usage(usage))
}

fn toggle(arg: Option<&str>, usage: &'static str) -> Result<Option<bool>, CommandError> {
    match arg {
        None => Ok(None),
        Some(raw) if raw.eq_ignore_ascii_case("on") => Ok(Some(true)),
        Some(raw) if raw.eq_ignore_ascii_case("off") => Ok(Some(false)),
        Some(_) => Err(CommandError::Usage(usage)),
    }
}

fn pending_action(args: &str) -> Result<PendingAction, CommandError> {
    let mut words = args.split_whitespace();
    match words.next() {
        None | Some("list") => Ok(PendingAction::List),
        Some("clear") => Ok(PendingAction::Clear),
        Some("remove") => {
            let raw = words
                .next()
                .ok_or(CommandError::Usage("/attachments remove <index>"))?;
            raw.parse()
                .map(PendingAction::Remove)
                .map_err(|_| invalid("Invalid attachment index."))
        }
        Some(other) => Err(CommandError::Unrecognized(format!(
            "Unknown attachments command: '{other}'. Use list, remove, or clear."
        ))),
    }
}

fn history_action(args: &str) -> Result<HistoryAction, CommandError> {
    let mut words = args.split_whitespace();
    if words.next() != Some("attachments") {
        return Err(CommandError::Unrecognized(
            "Unknown command for '/history'. Try '/history attachments'.".into(),
        ));
    }
    match words.next() {
        None | Some("list") => Ok(HistoryAction::List),
        Some("remove") => {
            let raw = words.next().ok_or(CommandError::Usage(
                "/history attachments remove <msg_idx:part_idx>",
            ))?;
            Ok(HistoryAction::Remove(raw.parse()?))
        }
        Some(_) => Err(CommandError::Unrecognized(
            "Unknown command for '/history attachments'. Use 'list' or 'remove'.".into(),
        )),
    }
}

fn session_action(args: &str) -> Result<SessionAction, CommandError> {
    let mut words = args.split_whitespace();
    let sub = words.next().unwrap_or_default();
    let name = words.next().map(str::to_owned);
    match sub {
        "new" => Ok(SessionAction::New),
        "list" => Ok(SessionAction::List),
        "save" => name
            .map(SessionAction::Save)
            .ok_or(CommandError::Usage("/session save <name>")),
        "load" => name
            .map(SessionAction::Load)
            .ok_or(CommandError::Usage("/session load <name>")),
        "delete" => name
            .map(SessionAction::Delete)
            .ok_or(CommandError::Usage("/session delete <name>")),
        other => Err(CommandError::Unrecognized(format!(
            "Unknown session command: '{other}'. Use '/help' to see options."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn command(line: &str) -> Result<Command, CommandError> {
        parse(line).expect("line should be a command")
    }

    #[test]
    fn prompts_are_not_commands() {
        assert!(parse("hello /there").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn values_are_optional() {
        assert_eq!(command("/temp"), Ok(Command::Temperature(None)));
        assert_eq!(command("/temp 0.3"), Ok(Command::Temperature(Some(0.3))));
        assert_eq!(command("/budget 0"), Ok(Command::Budget(Some(0))));
        assert_eq!(command("/grounding OFF"), Ok(Command::Grounding(Some(false))));
    }

    #[test]
    fn invalid_values_report_what_is_expected() {
        assert_eq!(
            command("/topp 1.5").unwrap_err().to_string(),
            "Error: Invalid topP value. Must be between 0.0 and 1.0."
        );
        assert_eq!(
            command("/topk 0").unwrap_err().to_string(),
            "Error: Invalid topK value. Must be a positive integer."
        );
        assert_eq!(
            command("/budget -4").unwrap_err().to_string(),
            "Error: Invalid budget value."
        );
        assert_eq!(
            command("/temp nan").unwrap_err().to_string(),
            "Error: Invalid temperature value."
        );
        assert_eq!(
            command("/urlcontext maybe").unwrap_err().to_string(),
            "Usage: /urlcontext [on|off]"
        );
    }

    #[test]
    fn top_p_accepts_one() {
        assert_eq!(command("/topp 1"), Ok(Command::TopP(Some(1.0))));
    }

    #[test]
    fn system_prompt_keeps_spaces() {
        assert_eq!(
            command("/system   You are  terse."),
            Ok(Command::System(Some("You are  terse.".into())))
        );
    }

    #[test]
    fn nested_subcommands() {
        assert_eq!(
            command("/history attachments remove 2:1"),
            Ok(Command::History(HistoryAction::Remove(PartId { message: 2, part: 1 })))
        );
        assert_eq!(
            command("/history attachments remove 2").unwrap_err().to_string(),
            "Error: Invalid ID format. Use <msg_idx:part_idx>."
        );
        assert_eq!(command("/attachments"), Ok(Command::Attachments(PendingAction::List)));
        assert_eq!(
            command("/attachments remove x").unwrap_err().to_string(),
            "Error: Invalid attachment index."
        );
        assert_eq!(
            command("/session save work"),
            Ok(Command::Session(SessionAction::Save("work".into())))
        );
        assert_eq!(
            command("/session load").unwrap_err(),
            CommandError::Usage("/session load <name>")
        );
    }

    #[test]
    fn unknown_commands_are_reported() {
        assert_eq!(
            command("/frobnicate now").unwrap_err().to_string(),
            "Unknown command: /frobnicate. Type /help for a list of commands."
        );
    }
}
