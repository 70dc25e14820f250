use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use gcli::logging;
use gcli::wrappers::commit::{self, DEFAULT_PROMPT, DEFAULT_TEMPERATURE, PROMPT_LIMIT};
use gcli::wrappers::{read_prompt_file, GcliInvocation, WrapperError, DEFAULT_GCLI, DEFAULT_MODEL};

#[derive(Parser)]
#[command(
    name = "gcommit",
    version,
    about = "Generate conventional commit messages using AI based on staged git changes",
    after_help = "Requires a git repository with staged changes and a configured gcli."
)]
struct Cli {
    /// Model to ask
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature
    #[arg(short = 't', long = "temp", default_value = DEFAULT_TEMPERATURE)]
    temperature: String,

    /// Use a custom prompt file
    #[arg(short, long, value_name = "FILE")]
    prompt: Option<String>,

    /// Path to the gcli binary
    #[arg(short = 'g', long = "gcli", value_name = "PATH", default_value = DEFAULT_GCLI)]
    gcli: String,

    /// Show the diff being sent and the gcli command line
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, false);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error @ WrapperError::NothingStaged) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), WrapperError> {
    commit::ensure_repository()?;
    commit::ensure_staged_changes()?;
    let diff = commit::staged_diff()?;

    if cli.verbose {
        println!("=== Staged Changes ===");
        print!("{diff}");
        println!("======================\n");
    }

    let prompt = match &cli.prompt {
        Some(path) => read_prompt_file(path, PROMPT_LIMIT)?,
        None => DEFAULT_PROMPT.to_owned(),
    };

    let call = GcliInvocation {
        program: &cli.gcli,
        model: &cli.model,
        temperature: &cli.temperature,
        prompt: &prompt,
    };
    if cli.verbose {
        println!("Executing: {}\n", call.display());
    }

    call.run(&diff, false).map_err(|error| {
        debug!(%error, "gcli did not produce a commit message");
        WrapperError::Generation("commit message")
    })?;
    Ok(())
}
