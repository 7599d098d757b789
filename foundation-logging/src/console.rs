//! Standardized console output.
//!
//! `pout`/`perr` are for user-facing command output (as opposed to log
//! events): they honor the JSON-mode toggle so machine consumers get one
//! JSON object per line, and the shared color policy otherwise.

use std::io::{IsTerminal, Write};

use serde_json::json;

use crate::logger::current_pipeline;

/// True when the initialized pipeline runs in JSON mode.
fn json_mode() -> bool {
    current_pipeline()
        .map(|pipeline| pipeline.config().json_output)
        .unwrap_or(false)
}

fn render(message: &str, stream: &str, json_mode: bool) -> String {
    if json_mode {
        json!({ "message": message, "stream": stream }).to_string()
    } else {
        message.to_string()
    }
}

/// Writes a line to stdout.
pub fn pout(message: &str) {
    let line = render(message, "stdout", json_mode());
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    let _ = writeln!(handle, "{line}");
}

/// Writes a line to stderr.
pub fn perr(message: &str) {
    let line = render(message, "stderr", json_mode());
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = writeln!(handle, "{line}");
}

/// Whether console color should be used for ad-hoc output, honoring
/// `NO_COLOR`/`FORCE_COLOR` and stdout TTY state.
pub fn console_color_enabled() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    std::io::stdout().is_terminal()
}
