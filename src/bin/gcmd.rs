use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use gcli::logging;
use gcli::wrappers::shell::{
    self, GeneratedCommand, Mode, DEFAULT_TEMPERATURE, PROMPT_LIMIT,
};
use gcli::wrappers::{read_prompt_file, GcliInvocation, WrapperError, DEFAULT_GCLI, DEFAULT_MODEL};

#[derive(Parser)]
#[command(
    name = "gcmd",
    version,
    about = "Generate shell commands from natural language using AI",
    after_help = "Commands are shown before execution and dangerous ones need confirmation. \
                  Use --dry-run to see what would be executed."
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

    /// Target shell (bash, zsh, fish, ...)
    #[arg(short, long)]
    shell: Option<String>,

    /// Execute the command immediately
    #[arg(short, long)]
    execute: bool,

    /// Copy the command to the clipboard (default)
    #[arg(short, long)]
    copy: bool,

    /// Only output the command
    #[arg(short, long)]
    quiet: bool,

    /// Show the prompt being sent
    #[arg(short, long)]
    verbose: bool,

    /// Show what would be executed without running it
    #[arg(long)]
    dry_run: bool,

    /// What the command should do
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    request: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode, WrapperError> {
    let request = cli.request.join(" ");
    let custom = cli
        .prompt
        .as_deref()
        .map(|path| read_prompt_file(path, PROMPT_LIMIT))
        .transpose()?;
    let prompt = shell::build_prompt(custom.as_deref(), cli.shell.as_deref());

    if !cli.quiet {
        if let Some(target) = &cli.shell {
            println!("Target shell: {target}\n");
        }
    }
    if cli.verbose {
        println!("=== Prompt being sent to AI ===\n{prompt}");
        println!("=== Natural language input ===\n{request}");
        println!("===============================\n");
    }

    let call = GcliInvocation {
        program: &cli.gcli,
        model: &cli.model,
        temperature: &cli.temperature,
        prompt: &prompt,
    };
    let output = call.run(&request, true).map_err(|error| {
        debug!(%error, "gcli did not produce a command");
        WrapperError::Generation("command")
    })?;
    let generated = GeneratedCommand::parse(&output).ok_or(WrapperError::NoCommand)?;

    match Mode::select(cli.quiet, cli.dry_run, cli.execute, cli.copy)? {
        Mode::Print => println!("{}", generated.command),
        Mode::QuietExecute => return Ok(exit_code(shell::execute(&generated.command)?)),
        Mode::DryRun => print!(
            "{}",
            shell::render_tree(&generated, "Dry run - command not executed")
        ),
        Mode::Execute => return execute(&generated),
        Mode::Copy => print!("{}", shell::copy_and_show(&generated)),
    }
    Ok(ExitCode::SUCCESS)
}

fn execute(generated: &GeneratedCommand) -> Result<ExitCode, WrapperError> {
    if shell::is_dangerous(&generated.command)
        && !shell::confirm(&generated.command, io::stdin().lock(), io::stdout())?
    {
        println!("Operation cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", shell::render_tree(generated, "Executing command"));
    let status = shell::execute(&generated.command)?;
    if !status.success() {
        println!(
            "Command failed with exit code {}",
            status.code().unwrap_or(1)
        );
    }
    Ok(exit_code(status))
}

fn exit_code(status: std::process::ExitStatus) -> ExitCode {
    match status.code() {
        Some(0) => ExitCode::SUCCESS,
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    }
}
