use std::io;

use thiserror::Error;

use crate::stream::StreamError;

#[derive(Debug, Error)]
pub enum GcliError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("API call failed after {attempts} attempts (last HTTP code: {status})")]
    RetriesExhausted { attempts: u32, status: u16 },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("not a valid history object: {0}")]
    InvalidHistory(String),
    #[error("unsafe or absolute file path specified: {0}")]
    UnsafePath(String),
    #[error("session name cannot contain '/', '\\', or '.' characters: {0}")]
    InvalidSessionName(String),
    #[error("no API key configured")]
    MissingApiKey,
    #[error("could not determine the configuration directory")]
    NoConfigDir,
    #[error("context is too large for free mode (approx. {kib} KB); use /clear or restart the session")]
    ContextTooLarge { kib: usize },
    #[error("attachment limit of {0} reached")]
    AttachmentLimit(usize),
    #[error("line editor failed: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}

impl GcliError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GcliError::Status { status, .. } | GcliError::RetriesExhausted { status, .. } => {
                Some(*status)
            }
            GcliError::Transport(error) => error.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GcliError>;
