//! Commit-message generation from the staged diff.

use std::process::{Command, Stdio};

use super::WrapperError;

pub const DEFAULT_TEMPERATURE: &str = "0.7";
pub const PROMPT_LIMIT: u64 = 4096;
/// Largest diff handed to the model; the rest is dropped.
pub const MAX_DIFF_BYTES: usize = 65_535;

pub const DEFAULT_PROMPT: &str = concat!(
    "You are an expert at following the Conventional Commit specification. ",
    "Given the git diff listed below, please generate a commit message for me: ",
    "1. First line: conventional commit format (type: concise description) ",
    "(remember to use semantic types like feat, fix, docs, style, refactor, perf, test, chore, etc.) ",
    "2. Optional bullet points if more context helps: ",
    "- Keep the second line blank ",
    "- Keep them short and direct ",
    "- Focus on what changed ",
    "- Always be terse ",
    "- Don't overly explain ",
    "- Drop any fluffy or formal language ",
    "Return ONLY the commit message - no introduction, no explanation, no quotes around it. ",
    "Examples: ",
    "feat: add user auth system\n\n",
    "- Add JWT tokens for API auth\n",
    "- Handle token refresh for long sessions\n\n",
    "fix: resolve memory leak in worker pool\n\n",
    "- Clean up idle connections\n",
    "- Add timeout for stale work\n\n",
    "Simple change example: ",
    "fix: typo in README.md ",
    "Very important: Do not respond with any of the examples. ",
    "Your message must be based off the diff that is about to be provided, ",
    "with a little bit of styling informed by the recent commits you're about to see. ",
    "Based on this format, generate appropriate commit messages. ",
    "Respond with message only. ",
    "DO NOT format the message in Markdown code blocks, DO NOT use backticks",
);

fn git(args: &[&str]) -> Command {
    let mut command = Command::new("git");
    command.args(args).stdin(Stdio::null());
    command
}

pub fn ensure_repository() -> Result<(), WrapperError> {
    let status = git(&["rev-parse", "--git-dir"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(WrapperError::NotARepository)
    }
}

/// `git diff --staged --quiet` exits non-zero when something is staged.
pub fn ensure_staged_changes() -> Result<(), WrapperError> {
    let status = git(&["diff", "--staged", "--quiet"]).status()?;
    if status.success() {
        Err(WrapperError::NothingStaged)
    } else {
        Ok(())
    }
}

pub fn staged_diff() -> Result<String, WrapperError> {
    let output = git(&["diff", "--staged"]).stderr(Stdio::inherit()).output()?;
    let diff = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() || diff.is_empty() {
        return Err(WrapperError::NoDiff);
    }
    Ok(truncate_diff(&diff, MAX_DIFF_BYTES).to_owned())
}

/// At most `limit` bytes of `diff`, cut on a character boundary.
pub fn truncate_diff(diff: &str, limit: usize) -> &str {
    if diff.len() <= limit {
        return diff;
    }
    let mut end = limit;
    while !diff.is_char_boundary(end) {
        end -= 1;
    }
    &diff[..end]
}
