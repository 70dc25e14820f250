//! Small terminal helpers shared by the binaries.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

use crate::config::{Settings, DEFAULT_ORIGIN};
use crate::error::Result;

static QUIET: AtomicBool = AtomicBool::new(false);

/// Silence every [`notice!`] for the rest of the process.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Status line on stderr, suppressed by `--quiet`.
#[macro_export]
macro_rules! notice {
    ($($arg:tt)*) => {
        if !$crate::terminal::is_quiet() {
            eprintln!($($arg)*);
        }
    };
}

pub fn is_interactive() -> bool {
    io::stdin().is_terminal() && io::stdout().is_terminal()
}

/// Read a line without echoing it; each typed character shows as `*`.
pub fn read_masked(prompt: &str) -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    terminal::enable_raw_mode()?;
    let typed = collect_masked(&mut stderr);
    terminal::disable_raw_mode()?;
    writeln!(stderr)?;
    typed
}

fn collect_masked(out: &mut impl Write) -> Result<String> {
    let mut typed = String::new();
    loop {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event::read()?
        else {
            continue;
        };
        match code {
            KeyCode::Enter => break,
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                typed.clear();
                break;
            }
            KeyCode::Backspace => {
                if typed.pop().is_some() {
                    write!(out, "\u{8} \u{8}")?;
                }
            }
            KeyCode::Char(ch) => {
                typed.push(ch);
                write!(out, "*")?;
            }
            _ => continue,
        }
        out.flush()?;
    }
    Ok(typed)
}

/// Ask for the API key, and for the origin when none is configured.
pub fn prompt_api_key(settings: &mut Settings) -> Result<()> {
    let key = read_masked("Enter your API Key: ")?;
    if !key.is_empty() {
        settings.api_key = Some(key);
    }
    if settings.origin == DEFAULT_ORIGIN {
        let origin = read_masked("Enter your Origin (press Enter for 'default'): ")?;
        if !origin.is_empty() {
            settings.origin = origin;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_flag_round_trips() {
        set_quiet(true);
        assert!(is_quiet());
        set_quiet(false);
        assert!(!is_quiet());
    }
}
