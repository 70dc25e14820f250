//! Command-line client for Gemini: streaming chat against the official API
//! or the key-free web endpoint, with saved sessions, attachments and the
//! `gcommit` / `gcmd` helpers built on top of the `gcli` binary.

pub mod api;
pub mod attachment;
pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod repl;
pub mod request;
pub mod retry;
pub mod session;
pub mod stream;
pub mod terminal;
pub mod web;
pub mod wrappers;

pub use error::{GcliError, Result};
