//! Shell-command generation: prompt assembly, reply parsing and what to do
//! with the command once it arrives.

use std::io::{self, BufRead, Write};
use std::process::{Command, ExitStatus};

use tracing::warn;

use super::WrapperError;

pub const DEFAULT_TEMPERATURE: &str = "0.3";
pub const PROMPT_LIMIT: u64 = 2048;
pub const FALLBACK_DESCRIPTION: &str = "Generated shell command";
const SEPARATOR: &str = "|||";

pub const DEFAULT_PROMPT: &str = concat!(
    "You are an expert system administrator and shell command generator. ",
    "Convert the following natural language request into a precise shell command with description. ",
    "Rules: ",
    "1. Return EXACTLY in this format: COMMAND|||DESCRIPTION ",
    "2. COMMAND: The shell command only, no explanation or formatting ",
    "3. DESCRIPTION: A clear explanation of what the command does ",
    "4. Use standard POSIX commands when possible ",
    "5. Prefer safe, commonly available commands ",
    "6. For complex tasks, provide a single command or pipeline ",
    "7. Do not include dangerous commands like 'rm -rf /' or 'dd' without explicit safety ",
    "8. If the request is unclear, provide the most reasonable interpretation ",
    "9. Do not use markdown formatting, backticks, or code blocks ",
    "Examples: ",
    "'list all files' -> 'ls -la|||Lists all files and directories with detailed information including hidden files' ",
    "'find large files' -> 'find . -type f -size +100M -ls|||Searches for all files larger than 100MB in the current directory and subdirectories' ",
    "'check disk usage' -> 'df -h|||Displays disk space usage in human-readable format for all mounted filesystems' ",
    "'show running processes' -> 'ps aux|||Shows all running processes with detailed information including user, CPU, and memory usage' ",
    "Convert this request: ",
);

/// Substrings that make a command worth a second look before running it.
const DANGEROUS_PATTERNS: [&str; 12] = [
    "rm -rf /",
    "rm -rf /*",
    "dd if=",
    "mkfs",
    "fdisk",
    "parted",
    ":(){ :|:& };:",
    "chmod 777 /",
    "chown root /",
    "> /dev/sda",
    "format c:",
    "del /s /q c:\\",
];

/// Base prompt (custom or default), plus the target shell when one is named.
pub fn build_prompt(custom: Option<&str>, shell: Option<&str>) -> String {
    let mut prompt = custom.unwrap_or(DEFAULT_PROMPT).to_owned();
    if let Some(shell) = shell {
        prompt.push_str(&format!(" Generate commands for {shell} shell syntax."));
    }
    prompt
}

pub fn is_dangerous(command: &str) -> bool {
    DANGEROUS_PATTERNS
        .iter()
        .any(|pattern| command.contains(pattern))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCommand {
    pub command: String,
    pub description: String,
}

impl GeneratedCommand {
    /// Split a `COMMAND|||DESCRIPTION` reply. Empty output yields `None`.
    pub fn parse(output: &str) -> Option<Self> {
        let output = output.trim();
        if output.is_empty() {
            return None;
        }
        let (command, description) = match output.split_once(SEPARATOR) {
            Some((command, description)) => (command.trim(), description.trim()),
            None => (output, FALLBACK_DESCRIPTION),
        };
        Some(Self {
            command: command.to_owned(),
            description: description.to_owned(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print the bare command.
    Print,
    /// Run it without any framing and exit with its status.
    QuietExecute,
    DryRun,
    Execute,
    Copy,
}

impl Mode {
    pub fn select(quiet: bool, dry_run: bool, execute: bool, copy: bool) -> Result<Self, WrapperError> {
        if quiet {
            return Ok(if execute { Mode::QuietExecute } else { Mode::Print });
        }
        if dry_run {
            return Ok(Mode::DryRun);
        }
        match (execute, copy) {
            (true, true) => Err(WrapperError::ExecuteAndCopy),
            (true, false) => Ok(Mode::Execute),
            _ => Ok(Mode::Copy),
        }
    }
}

/// The tree drawn around a generated command.
pub fn render_tree(generated: &GeneratedCommand, heading: &str) -> String {
    format!(
        "\x1b[1;36m◇  Command for:\x1b[0m\n│\n│  {}\n│\n\x1b[1;36m◆  {heading}:\x1b[0m\n│\n└  {}\n",
        generated.description, generated.command
    )
}

pub const COPY_FAILED: &str =
    "\n\x1b[1;36m◆  Failed to copy to clipboard:\x1b[0m\n│\n└  Command is shown above\n";

/// Ask before running a dangerous command; anything but `y` declines.
pub fn confirm<R: BufRead, W: Write>(command: &str, mut input: R, mut output: W) -> io::Result<bool> {
    writeln!(output, "WARNING: This command may be dangerous:")?;
    writeln!(output, "Command: {command}")?;
    write!(output, "Do you want to continue? (y/N): ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim_start().chars().next(), Some('y' | 'Y')))
}

/// Run through the platform shell with inherited stdio.
pub fn execute(command: &str) -> io::Result<ExitStatus> {
    let mut shell = if cfg!(windows) {
        let mut shell = Command::new("cmd");
        shell.arg("/C");
        shell
    } else {
        let mut shell = Command::new("sh");
        shell.arg("-c");
        shell
    };
    shell.arg(command).status()
}

pub fn copy_to_clipboard(command: &str) -> Result<(), WrapperError> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(command)?;
    Ok(())
}

/// Copy, falling back to showing the command when no clipboard is reachable.
pub fn copy_and_show(generated: &GeneratedCommand) -> String {
    let mut out = render_tree(generated, "Command copied to clipboard");
    if let Err(error) = copy_to_clipboard(&generated.command) {
        warn!(%error, "clipboard copy failed");
        out.push_str(COPY_FAILED);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn reply_splits_on_separator() {
        let parsed = GeneratedCommand::parse("  ls -la ||| Lists files \n").unwrap();
        assert_eq!(parsed.command, "ls -la");
        assert_eq!(parsed.description, "Lists files");
    }

    #[test]
    fn reply_without_separator_gets_fallback_description() {
        let parsed = GeneratedCommand::parse("df -h\n").unwrap();
        assert_eq!(parsed.command, "df -h");
        assert_eq!(parsed.description, FALLBACK_DESCRIPTION);
        assert!(GeneratedCommand::parse(" \n\t").is_none());
    }

    #[test]
    fn shell_is_appended_to_prompt() {
        assert_eq!(
            build_prompt(Some("Base."), Some("fish")),
            "Base. Generate commands for fish shell syntax."
        );
        assert_eq!(build_prompt(None, None), DEFAULT_PROMPT);
    }

    #[test]
    fn dangerous_patterns_are_flagged() {
        assert!(is_dangerous("sudo rm -rf / --no-preserve-root"));
        assert!(is_dangerous("dd if=/dev/zero of=/dev/sda"));
        assert!(is_dangerous(":(){ :|:& };:"));
        assert!(!is_dangerous("rm -rf ./build"));
        assert!(!is_dangerous("ls -la"));
    }

    #[test]
    fn mode_precedence() {
        assert_eq!(Mode::select(true, true, true, true).unwrap(), Mode::QuietExecute);
        assert_eq!(Mode::select(true, false, false, false).unwrap(), Mode::Print);
        assert_eq!(Mode::select(false, true, true, true).unwrap(), Mode::DryRun);
        assert!(matches!(
            Mode::select(false, false, true, true),
            Err(WrapperError::ExecuteAndCopy)
        ));
        assert_eq!(Mode::select(false, false, true, false).unwrap(), Mode::Execute);
        assert_eq!(Mode::select(false, false, false, false).unwrap(), Mode::Copy);
    }

    #[test]
    fn tree_shows_description_then_command() {
        let generated = GeneratedCommand {
            command: "ps aux".into(),
            description: "Shows processes".into(),
        };
        assert_eq!(
            render_tree(&generated, "Dry run - command not executed"),
            "\x1b[1;36m◇  Command for:\x1b[0m\n│\n│  Shows processes\n│\n\
             \x1b[1;36m◆  Dry run - command not executed:\x1b[0m\n│\n└  ps aux\n"
        );
    }

    #[test]
    fn confirmation_needs_yes() {
        let mut shown = Vec::new();
        assert!(confirm("mkfs /dev/sdb", Cursor::new("y\n"), &mut shown).unwrap());
        assert!(String::from_utf8(shown).unwrap().contains("Command: mkfs /dev/sdb"));
        assert!(!confirm("mkfs /dev/sdb", Cursor::new("\n"), io::sink()).unwrap());
        assert!(!confirm("mkfs /dev/sdb", Cursor::new(""), io::sink()).unwrap());
    }
}
