use std::io::{self, Write};

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, warn};

use crate::chat::{ChatSession, Outcome};
use crate::commands;
use crate::config;
use crate::error::Result;
use crate::notice;
use crate::stream::TerminalSink;

pub const USER_PROMPT: &str = "\x1b[1;36m◇  User:\x1b[0m ";
pub const AI_HEADER: &str = "\x1b[1;36m◆  AI\x1b[0m\n└  ";

const HISTORY_FILE: &str = "history.txt";

/// Interactive loop; returns when the user exits or input ends.
pub fn run(session: &mut ChatSession) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let history_path = config::app_dir().ok().map(|dir| dir.join(HISTORY_FILE));
    if let Some(path) = &history_path {
        if let Err(error) = editor.load_history(path) {
            debug!(path = %path.display(), %error, "no line history loaded");
        }
    }

    loop {
        let line = match editor.readline(USER_PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(error) => return Err(error.into()),
        };

        let input = line.trim_start();
        if !input.is_empty() {
            if let Err(error) = editor.add_history_entry(input) {
                warn!(%error, "failed to record line history");
            }
        }
        if input.is_empty() && !session.has_pending_attachments() {
            continue;
        }

        match commands::parse(input) {
            Some(Ok(command)) => match session.execute(command) {
                Ok(Outcome::Exit) => break,
                Ok(Outcome::Continue) => {}
                Err(error) => notice!("Error: {error}"),
            },
            Some(Err(error)) => notice!("{error}"),
            None => converse(session, input)?,
        }
    }

    if let Some(path) = &history_path {
        if let Err(error) = editor.save_history(path) {
            warn!(path = %path.display(), %error, "failed to save line history");
        }
    }
    Ok(())
}

/// One prompt and its streamed reply, framed the way the chat is drawn.
pub fn converse(session: &mut ChatSession, prompt: &str) -> Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "{AI_HEADER}")?;
    stdout.flush()?;

    let mut sink = TerminalSink::stdout();
    let sent = session.send_prompt(prompt, &mut sink);
    print!("\n\n");
    stdout.flush()?;
    if let Err(error) = sent {
        notice!("Error: {error}");
    }
    Ok(())
}
