//! Shared plumbing for `gcommit` and `gcmd`, which drive `gcli` as a child
//! process with their input on its standard input.

pub mod commit;
pub mod shell;

use std::fs;
use std::io::{self, Write};
use std::iter;
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::debug;

pub const DEFAULT_GCLI: &str = "gcli";
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro-latest";

#[derive(Debug, Error)]
pub enum WrapperError {
    #[error("Prompt file too large (max {limit} bytes)")]
    PromptTooLarge { limit: u64 },
    #[error("Failed to read prompt file '{path}': {source}")]
    PromptFile { path: String, source: io::Error },
    #[error("Not in a git repository")]
    NotARepository,
    #[error("No staged changes found. Stage some changes first with 'git add'.")]
    NothingStaged,
    #[error("Failed to get staged changes")]
    NoDiff,
    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
    #[error("Failed to generate {0}")]
    Generation(&'static str),
    #[error("No command generated")]
    NoCommand,
    #[error("Cannot use both --execute and --copy flags")]
    ExecuteAndCopy,
    #[error("clipboard unavailable: {0}")]
    Clipboard(#[from] arboard::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Contents of a custom prompt file no larger than `limit` bytes.
pub fn read_prompt_file(path: &str, limit: u64) -> Result<String, WrapperError> {
    let prompt_file = |source| WrapperError::PromptFile {
        path: path.to_owned(),
        source,
    };
    let size = fs::metadata(path).map_err(prompt_file)?.len();
    if size > limit {
        return Err(WrapperError::PromptTooLarge { limit });
    }
    fs::read_to_string(path).map_err(prompt_file)
}

/// A quiet, non-interactive `gcli` call.
#[derive(Debug, Clone, Copy)]
pub struct GcliInvocation<'a> {
    pub program: &'a str,
    pub model: &'a str,
    pub temperature: &'a str,
    pub prompt: &'a str,
}

impl GcliInvocation<'_> {
    pub fn args(&self) -> Vec<&str> {
        vec!["-q", "-e", "-m", self.model, "-t", self.temperature, self.prompt]
    }

    /// Shell-quoted command line, for verbose output.
    pub fn display(&self) -> String {
        shell_words::join(iter::once(self.program).chain(self.args()))
    }

    /// Run with `input` on stdin. With `capture` the reply is returned,
    /// otherwise it goes straight to our stdout and an empty string comes back.
    pub fn run(&self, input: &str, capture: bool) -> Result<String, WrapperError> {
        debug!(command = %self.display(), capture, "running gcli");
        let spawn_error = |source| WrapperError::Spawn {
            program: self.program.to_owned(),
            source,
        };
        let mut child = Command::new(self.program)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(if capture { Stdio::piped() } else { Stdio::inherit() })
            .spawn()
            .map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(input.as_bytes()) {
                Err(error) if error.kind() != io::ErrorKind::BrokenPipe => return Err(error.into()),
                _ => {}
            }
        }

        let output = child.wait_with_output().map_err(spawn_error)?;
        if !output.status.success() {
            return Err(WrapperError::Failed {
                program: self.program.to_owned(),
                status: output.status,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    #[test]
    fn invocation_quotes_prompt() {
        let call = GcliInvocation {
            program: "gcli",
            model: DEFAULT_MODEL,
            temperature: "0.7",
            prompt: "it's a prompt",
        };
        assert_eq!(
            call.display(),
            r#"gcli -q -e -m gemini-1.5-pro-latest -t 0.7 'it'\''s a prompt'"#
        );
    }

    #[test]
    fn oversized_prompt_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[b'x'; 32]).unwrap();
        let path = file.path().to_str().unwrap();
        assert!(matches!(
            read_prompt_file(path, 16),
            Err(WrapperError::PromptTooLarge { limit: 16 })
        ));
        assert_eq!(read_prompt_file(path, 32).unwrap().len(), 32);
    }

    #[test]
    fn missing_prompt_file_names_the_path() {
        let error = read_prompt_file("no/such/prompt.txt", 10).unwrap_err();
        assert!(error.to_string().starts_with("Failed to read prompt file 'no/such/prompt.txt'"));
    }
}
