use anyhow::{Context, Result};
use async_trait::async_trait;

use freebusy_companion::{parse_redirect_callback, Config, TokenSession};

pub mod auth;
pub mod calendar;

/// Trait for all command implementations
#[async_trait]
pub trait Command {
    /// Execute the command with the provided context
    async fn execute(&mut self, context: &CommandContext) -> Result<()>;
}

/// Shared context for all commands
pub struct CommandContext {
    pub config: Config,
    pub debug: bool,
}

impl CommandContext {
    pub fn new(config: Config, debug: bool) -> Self {
        Self { config, debug }
    }

    /// Rebuild the session from the redirect the user was sent back with
    pub fn session_from_callback(&self, callback: &str) -> Result<TokenSession> {
        let tokens = parse_redirect_callback(callback).context("Failed to read the sign-in redirect")?;
        Ok(TokenSession::new(tokens)?)
    }
}
