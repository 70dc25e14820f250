use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::Path;

use clap::Parser;
use tracing::debug;

use gcli::attachment::is_path_safe;
use gcli::chat::{self, ChatSession, KeySource};
use gcli::cli::{classify_inputs, Cli, LOCATION_PROBE};
use gcli::commands::Command;
use gcli::config::{self, Settings};
use gcli::repl::{self, USER_PROMPT};
use gcli::session::SessionStore;
use gcli::stream::TerminalSink;
use gcli::{logging, notice, terminal, GcliError};

fn main() -> Result<(), GcliError> {
    let cli = Cli::parse();
    terminal::set_quiet(cli.quiet);
    logging::init(cli.verbose, cli.quiet);

    let mut settings = Settings::default();
    let config_path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => config::default_config_path().ok(),
    };
    if let Some(path) = &config_path {
        if let Some(file) = config::load_config(path)? {
            settings.apply_file(file);
        }
    }
    if let Some(path) = &cli.config {
        notice!("Loaded configuration from: {}", path.display());
    }
    cli.apply_to(&mut settings);

    if cli.list_sessions {
        chat::print_sessions(&SessionStore::open_default()?.list()?);
        return Ok(());
    }
    if cli.list {
        settings.apply_env(|name| env::var(name).ok());
        ChatSession::new(settings).execute(Command::Models)?;
        return Ok(());
    }

    let interactive = terminal::is_interactive() && !cli.execute;
    let inputs = classify_inputs(&cli.inputs, |path| Path::new(path).is_file());

    let mut prompt = inputs.prompt;
    let places = cli.locations();
    if !places.is_empty() {
        if !prompt.is_empty() {
            notice!("Note: --loc/--map used; ignoring initial prompt text.");
        }
        prompt = LOCATION_PROBE.to_owned();
    }
    settings.clamp_thinking_budget();

    let keys = if settings.free_mode {
        KeySource::default()
    } else {
        resolve_api_key(&mut settings, interactive)?
    };

    let mut session = ChatSession::new(settings)
        .with_config_path(cli.config.clone())
        .with_locations(places);

    if let Some(name) = &cli.load_session {
        if let Err(error) = session.load_session(name) {
            notice!("Error: {error}");
        }
    }
    for path in &inputs.histories {
        if let Err(error) = session.load_history(Path::new(path)) {
            notice!("Error: {error}");
        }
    }
    for path in &inputs.files {
        if let Err(error) = session.attach_file(path, false) {
            notice!("Error: {error}");
        }
    }

    let stdin = io::stdin();
    if !interactive && !stdin.is_terminal() {
        if prompt.is_empty() {
            stdin.lock().read_to_string(&mut prompt)?;
            if prompt.ends_with('\n') {
                prompt.pop();
            }
        } else {
            session.attach_reader(stdin.lock())?;
        }
    }

    if interactive {
        session.banner(keys);
    }

    if !prompt.is_empty() {
        if interactive {
            notice!("Initial prompt provided. Sending request...");
            println!("{USER_PROMPT}{prompt}");
            repl::converse(&mut session, &prompt)?;
        } else {
            let mut sink = TerminalSink::stdout();
            session.send_prompt(&prompt, &mut sink)?;
            if places.is_empty() {
                println!();
            }
        }
    }

    if interactive {
        repl::run(&mut session)?;
    }

    if let Some(path) = &cli.save_session {
        if is_path_safe(path) {
            session.save_history(Path::new(path))?;
        } else {
            notice!("Error: Unsafe file path specified for saving session: {path}");
        }
    }

    if interactive {
        notice!("\nExiting session.");
    }
    Ok(())
}

/// Key and origin from the environment, then a masked prompt when a person
/// is at the terminal. Without a key the session falls back to key-free mode.
fn resolve_api_key(settings: &mut Settings, interactive: bool) -> Result<KeySource, GcliError> {
    let overrides = settings.apply_env(|name| env::var(name).ok());
    if !settings.has_api_key() && interactive {
        terminal::prompt_api_key(settings)?;
    }
    if !settings.has_api_key() {
        debug!("no API key available; using the key-free endpoint");
        settings.free_mode = true;
    }
    Ok(KeySource {
        key_from_env: overrides.api_key,
        origin_from_env: overrides.origin,
    })
}
