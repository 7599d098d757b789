//! Command registration metadata.
//!
//! The hub stores commands and their metadata; actual argument parsing is
//! the host CLI library's concern.

use std::sync::Arc;

use serde_json::Value;

use foundation_errors::Result;

/// The callable behind a command. Receives raw argument strings and
/// returns a JSON-renderable result.
pub type CommandHandler = Arc<dyn Fn(&[String]) -> Result<Value> + Send + Sync>;

/// Command metadata carried in the registry's `command` dimension.
#[derive(Debug, Clone)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
    pub aliases: Vec<String>,
    pub hidden: bool,
    pub category: Option<String>,
}

/// A registered command: metadata plus its handler.
#[derive(Clone)]
pub struct RegisteredCommand {
    pub info: CommandInfo,
    pub handler: CommandHandler,
}

impl std::fmt::Debug for RegisteredCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredCommand")
            .field("info", &self.info)
            .finish()
    }
}
