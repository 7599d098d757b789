//! Field source tags and precedence.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a configuration field's value came from.
///
/// Precedence is numeric: when two sources provide the same field, the
/// higher value wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfigSource {
    Default = 0,
    File = 10,
    Env = 20,
    Runtime = 30,
}

impl ConfigSource {
    pub fn precedence(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfigSource::Default => "default",
            ConfigSource::File => "file",
            ConfigSource::Env => "env",
            ConfigSource::Runtime => "runtime",
        };
        write!(f, "{label}")
    }
}
