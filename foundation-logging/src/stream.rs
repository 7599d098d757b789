//! Process-wide log stream management.
//!
//! A single replaceable output stream backs the sink. The write mutex is
//! held only across each line write, which keeps rendered lines atomic
//! without serializing the processors themselves.

use std::io::{IsTerminal, Write};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

enum Target {
    Stderr,
    Custom {
        writer: Arc<Mutex<dyn Write + Send>>,
        is_terminal: bool,
    },
}

struct StreamState {
    target: Mutex<Target>,
}

fn state() -> &'static StreamState {
    static STATE: OnceLock<StreamState> = OnceLock::new();
    STATE.get_or_init(|| StreamState {
        target: Mutex::new(Target::Stderr),
    })
}

/// Replaces the process log stream (tests point this at a buffer). The
/// stream is treated as a non-terminal, which disables color unless
/// `FORCE_COLOR` is set.
pub fn set_log_stream(writer: Arc<Mutex<dyn Write + Send>>) {
    *state().target.lock() = Target::Custom {
        writer,
        is_terminal: false,
    };
}

/// Restores the default stderr stream.
pub fn reset_log_stream() {
    *state().target.lock() = Target::Stderr;
}

/// Whether the current stream is an interactive terminal.
pub fn stream_is_terminal() -> bool {
    match &*state().target.lock() {
        Target::Stderr => std::io::stderr().is_terminal(),
        Target::Custom { is_terminal, .. } => *is_terminal,
    }
}

/// Writes one rendered line (plus newline) atomically to the current
/// stream. Write failures are swallowed: the logger must never take the
/// process down.
pub fn write_line(line: &str) {
    let target = state().target.lock();
    match &*target {
        Target::Stderr => {
            let stderr = std::io::stderr();
            let mut handle = stderr.lock();
            let _ = writeln!(handle, "{line}");
        }
        Target::Custom { writer, .. } => {
            let mut writer = writer.lock();
            let _ = writeln!(writer, "{line}");
        }
    }
}

/// An in-memory capture stream for tests.
#[derive(Clone, Default)]
pub struct CaptureStream {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CaptureStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs this capture as the process log stream.
    pub fn install(&self) {
        let buffer = Arc::clone(&self.buffer);
        set_log_stream(Arc::new(Mutex::new(CaptureWriter { buffer })));
    }

    /// Everything written so far, as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Complete lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.contents()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Serializes tests that touch the process-wide stream or pipeline state.
#[cfg(test)]
pub(crate) fn test_guard() -> parking_lot::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock()
}
